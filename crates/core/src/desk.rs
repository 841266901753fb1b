//! Workflow desks.
//!
//! A desk wires the engines to a [`RemoteStore`] and enforces the concurrency rules:
//!
//! - at most one in-flight transition per entity id (a keyed mutex map);
//! - transitions are evaluated against the latest state the desk knows, which only changes after
//!   a successful store write;
//! - a refresh replaces the whole incident collection in one step and never interleaves with an
//!   in-flight transition;
//! - a store failure leaves in-memory state untouched.
//!
//! Campaigns and notification batches are not cached: each transition re-reads the entity from
//! the store while holding that entity's lock.

use crate::aggregation::{self, CampaignSummary, IncidentQuery, IncidentTally, Rollup};
use crate::codec::{self, IncidentMetadata};
use crate::error::{WorkflowError, WorkflowResult};
use crate::model::{
    CampaignEvent, Incident, IncidentStatus, NewCampaignEvent, NewIncidentRecord,
    NotificationBatch, Priority,
};
use crate::responses::{self, ChannelEffectiveness, ResponseTally};
use crate::status::{
    self, BatchAction, EmergencyAction, IncidentAction, ProcessAction, RecordResponse,
    RecordResult,
};
use crate::store::RemoteStore;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sickbay_types::NonEmptyText;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use utoipa::ToSchema;

// ============================================================================
// Per-entity serialisation
// ============================================================================

/// Hands out one mutex per entity id.
#[derive(Debug, Default)]
pub struct EntityLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    /// Returns the lock slot for `id`, creating it on first use.
    pub fn slot(&self, id: &str) -> WorkflowResult<Arc<Mutex<()>>> {
        let mut slots = self.slots.lock().map_err(|_| poisoned())?;
        Ok(slots
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Hands `slot` back, dropping the entry for `id` once no other caller holds it.
    pub fn release(&self, id: &str, slot: Arc<Mutex<()>>) {
        let Ok(mut slots) = self.slots.lock() else {
            return;
        };
        // One reference lives in the map, the other is `slot`.
        if Arc::strong_count(&slot) <= 2 {
            slots.remove(id);
        }
    }

    /// Number of ids currently holding a slot.
    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> WorkflowError {
    WorkflowError::InvalidInput("workflow lock poisoned by an earlier panic".into())
}

/// Runs `f` while holding the lock for `id`.
fn serialized<T>(
    locks: &EntityLocks,
    id: &str,
    f: impl FnOnce() -> WorkflowResult<T>,
) -> WorkflowResult<T> {
    let slot = locks.slot(id)?;
    let result = match slot.lock() {
        Ok(_guard) => f(),
        Err(_) => Err(poisoned()),
    };
    locks.release(id, slot);
    result
}

fn log_rejection<T>(result: &WorkflowResult<T>, id: &str) {
    if let Err(err @ WorkflowError::InvalidTransition { .. }) = result {
        tracing::warn!("rejected transition on {}: {}", id, err);
    }
}

// ============================================================================
// Incidents
// ============================================================================

/// Intake form fields for a new incident.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IncidentIntake {
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub class_name: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    /// Defaults to Medium.
    pub priority: Option<Priority>,
    pub description: Option<String>,
    pub contact_status: Option<String>,
    pub action_taken: Option<String>,
    #[serde(default)]
    pub notified_parent: bool,
}

pub const DEFAULT_INTAKE_PRIORITY: Priority = Priority::Medium;
pub const DEFAULT_INTAKE_CONTACT_STATUS: &str = "Not contacted";

pub struct IncidentDesk {
    store: Arc<dyn RemoteStore>,
    incidents: RwLock<Arc<Vec<Incident>>>,
    refresh_gate: RwLock<()>,
    locks: EntityLocks,
}

impl IncidentDesk {
    /// Creates a desk with an empty collection. Call [`IncidentDesk::refresh`] to load it.
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            incidents: RwLock::new(Arc::new(Vec::new())),
            refresh_gate: RwLock::new(()),
            locks: EntityLocks::default(),
        }
    }

    /// Re-fetches every incident and swaps the collection in whole.
    ///
    /// Waits for in-flight transitions to finish first. On failure the previous collection stays.
    pub fn refresh(&self) -> WorkflowResult<usize> {
        let _gate = self.refresh_gate.write().map_err(|_| poisoned())?;
        let records = self.store.list_incidents().map_err(|e| {
            tracing::error!("incident refresh failed: {}", e);
            e
        })?;

        let now = Utc::now();
        let incidents: Vec<Incident> = records
            .into_iter()
            .map(|record| Incident::from_record(record, now))
            .collect();
        let count = incidents.len();

        *self.incidents.write().map_err(|_| poisoned())? = Arc::new(incidents);
        tracing::info!("refreshed {} incidents", count);
        Ok(count)
    }

    /// The current collection. Never partially updated.
    pub fn snapshot(&self) -> Arc<Vec<Incident>> {
        self.incidents
            .read()
            .map(|guard| Arc::clone(&*guard))
            .unwrap_or_else(|poisoned| Arc::clone(&*poisoned.into_inner()))
    }

    pub fn get(&self, id: &str) -> WorkflowResult<Incident> {
        self.snapshot()
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found("incident", id))
    }

    pub fn list(&self, query: &IncidentQuery) -> Vec<Incident> {
        let snapshot = self.snapshot();
        query.apply(&snapshot).into_iter().cloned().collect()
    }

    pub fn tally(&self) -> IncidentTally {
        aggregation::tally_incidents(&self.snapshot())
    }

    /// Records a new incident as Pending.
    pub fn intake(&self, intake: IncidentIntake) -> WorkflowResult<Incident> {
        let _gate = self.refresh_gate.read().map_err(|_| poisoned())?;

        if intake.priority == Some(Priority::Other) {
            return Err(WorkflowError::InvalidInput(
                "priority must be low, medium or high".into(),
            ));
        }

        let contact_status = NonEmptyText::optional(intake.contact_status)
            .map(NonEmptyText::into_inner)
            .unwrap_or_else(|| DEFAULT_INTAKE_CONTACT_STATUS.to_string());
        let notes = codec::encode(&IncidentMetadata {
            title: intake.title,
            location: intake.location,
            priority: Some(intake.priority.unwrap_or(DEFAULT_INTAKE_PRIORITY)),
            contact_status: Some(contact_status),
        });

        let record = self.store.create_incident(NewIncidentRecord {
            student_id: intake.student_id,
            student_name: intake.student_name,
            class_name: intake.class_name,
            description: intake.description,
            status: IncidentStatus::Pending.label().to_string(),
            action_taken: intake.action_taken,
            notified_parent: intake.notified_parent,
            notes: Some(notes),
        })?;

        let incident = Incident::from_record(record, Utc::now());
        self.upsert(incident.clone())?;
        tracing::info!("incident {} recorded", incident.id);
        Ok(incident)
    }

    pub fn process(&self, id: &str, action: ProcessAction) -> WorkflowResult<Incident> {
        self.apply(id, IncidentAction::Process(action))
    }

    pub fn escalate(&self, id: &str, action: EmergencyAction) -> WorkflowResult<Incident> {
        self.apply(id, IncidentAction::Emergency(action))
    }

    fn apply(&self, id: &str, action: IncidentAction) -> WorkflowResult<Incident> {
        let _gate = self.refresh_gate.read().map_err(|_| poisoned())?;
        let result = serialized(&self.locks, id, || {
            let current = self.get(id)?;
            let updated = status::transition(&current, action)?;

            let record = self
                .store
                .update_incident(id, updated.to_patch())
                .map_err(|e| {
                    tracing::error!("failed to persist incident {}: {}", id, e);
                    e
                })?;

            let persisted = Incident::from_record(record, updated.created_at);
            self.upsert(persisted.clone())?;
            tracing::info!(
                "incident {}: {} -> {}",
                id,
                current.status,
                persisted.status
            );
            Ok(persisted)
        });
        log_rejection(&result, id);
        result
    }

    /// Replaces (or appends) one incident by swapping in a new collection.
    fn upsert(&self, incident: Incident) -> WorkflowResult<()> {
        let mut guard = self.incidents.write().map_err(|_| poisoned())?;
        let mut next: Vec<Incident> = guard.as_ref().clone();
        match next.iter_mut().find(|i| i.id == incident.id) {
            Some(existing) => *existing = incident,
            None => next.push(incident),
        }
        *guard = Arc::new(next);
        Ok(())
    }
}

// ============================================================================
// Campaigns
// ============================================================================

pub struct CampaignDesk {
    store: Arc<dyn RemoteStore>,
    locks: EntityLocks,
}

impl CampaignDesk {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            locks: EntityLocks::default(),
        }
    }

    pub fn list(&self) -> WorkflowResult<Vec<CampaignEvent>> {
        Ok(self.store.list_vaccination_events()?)
    }

    pub fn get(&self, id: &str) -> WorkflowResult<CampaignEvent> {
        self.list()?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| WorkflowError::not_found("campaign", id))
    }

    pub fn summaries(&self) -> WorkflowResult<Vec<CampaignSummary>> {
        Ok(self
            .list()?
            .iter()
            .map(aggregation::summarize_campaign)
            .collect())
    }

    pub fn rollup(&self, id: &str) -> WorkflowResult<Rollup> {
        Ok(aggregation::rollup_campaign(&self.get(id)?))
    }

    pub fn create(&self, fields: NewCampaignEvent) -> WorkflowResult<CampaignEvent> {
        if NonEmptyText::new(&fields.title).is_err() {
            return Err(WorkflowError::InvalidInput(
                "campaign title cannot be empty".into(),
            ));
        }
        let event = self.store.create_vaccination_event(fields)?;
        tracing::info!(
            "campaign {} created with {} classes",
            event.id,
            event.classes.len()
        );
        Ok(event)
    }

    pub fn delete(&self, id: &str) -> WorkflowResult<()> {
        serialized(&self.locks, id, || {
            self.store.delete_vaccination_event(id)?;
            tracing::info!("campaign {} deleted", id);
            Ok(())
        })
    }

    /// Records one student's outcome and re-derives the class counters.
    pub fn record_result(
        &self,
        campaign_id: &str,
        class_name: &str,
        student_id: &str,
        result: RecordResult,
    ) -> WorkflowResult<CampaignEvent> {
        let outcome = serialized(&self.locks, campaign_id, || {
            let mut event = self.get(campaign_id)?;
            let class = event
                .class_mut(class_name)
                .ok_or_else(|| WorkflowError::not_found("class", class_name))?;
            let student = class
                .students
                .iter_mut()
                .find(|s| s.student_id == student_id)
                .ok_or_else(|| WorkflowError::not_found("student", student_id))?;

            *student = status::transition(&*student, result)?;
            class.resync_counts();

            let saved = self.store.update_vaccination_event(event)?;
            tracing::info!(
                "campaign {}: recorded result for student {}",
                campaign_id,
                student_id
            );
            Ok(saved)
        });
        log_rejection(&outcome, student_id);
        outcome
    }
}

// ============================================================================
// Notifications
// ============================================================================

pub struct NotificationDesk {
    store: Arc<dyn RemoteStore>,
    locks: EntityLocks,
}

impl NotificationDesk {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            locks: EntityLocks::default(),
        }
    }

    pub fn list(&self) -> WorkflowResult<Vec<NotificationBatch>> {
        Ok(self.store.list_notification_batches()?)
    }

    pub fn get(&self, id: &str) -> WorkflowResult<NotificationBatch> {
        self.list()?
            .into_iter()
            .find(|b| b.id == id)
            .ok_or_else(|| WorkflowError::not_found("notification batch", id))
    }

    pub fn schedule(&self, id: &str, checkup_date: NaiveDate) -> WorkflowResult<NotificationBatch> {
        self.apply(id, BatchAction::Schedule { checkup_date })
    }

    pub fn send(&self, id: &str, at: DateTime<Utc>) -> WorkflowResult<NotificationBatch> {
        self.apply(id, BatchAction::Send { at })
    }

    pub fn record_response(
        &self,
        id: &str,
        response: RecordResponse,
        at: DateTime<Utc>,
    ) -> WorkflowResult<NotificationBatch> {
        self.apply(id, BatchAction::RecordResponse { response, at })
    }

    pub fn tally(&self, id: &str) -> WorkflowResult<ResponseTally> {
        Ok(responses::tally_responses(&self.get(id)?.responses))
    }

    pub fn channel_report(&self) -> WorkflowResult<Vec<ChannelEffectiveness>> {
        Ok(responses::tally_channels(&self.list()?))
    }

    fn apply(&self, id: &str, action: BatchAction) -> WorkflowResult<NotificationBatch> {
        let result = serialized(&self.locks, id, || {
            let current = self.get(id)?;
            let updated = status::transition(&current, action)?;
            let saved = self.store.update_notification_batch(updated)?;
            tracing::info!("notification batch {} is {}", id, saved.status);
            Ok(saved)
        });
        log_rejection(&result, id);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CAMPAIGNS_FILENAME, INCIDENTS_FILENAME, NOTIFICATIONS_FILENAME};
    use crate::model::{
        BatchStatus, ClassProgress, IncidentPatch, IncidentRecord, Participation, ResponseStatus,
        Staff, Student, StudentResponse,
    };
    use crate::store::{write_collection, JsonFileStore, StoreError, StoreResult};
    use chrono::TimeZone;
    use std::thread;
    use tempfile::TempDir;

    fn desk_with(records: Vec<IncidentRecord>) -> (TempDir, IncidentDesk) {
        let dir = TempDir::new().unwrap();
        write_collection(dir.path(), INCIDENTS_FILENAME, &records).unwrap();
        let desk = IncidentDesk::new(Arc::new(JsonFileStore::new(dir.path())));
        desk.refresh().unwrap();
        (dir, desk)
    }

    fn record(id: &str, status: &str) -> IncidentRecord {
        IncidentRecord {
            id: id.into(),
            status: Some(status.into()),
            description: Some("Sprained ankle".into()),
            notes: Some("Title: Ankle | Location: Gym | Priority: Low".into()),
            ..IncidentRecord::default()
        }
    }

    #[test]
    fn refresh_loads_canonical_incidents() {
        let (_dir, desk) = desk_with(vec![
            record("a", "pending"),
            record("b", "waiting"),
            record("c", "completed"),
        ]);
        let tally = desk.tally();
        assert_eq!(tally.total, 3);
        assert_eq!(tally.by_status["Pending"], 2);
        assert_eq!(tally.by_status["Resolved"], 1);
    }

    #[test]
    fn intake_defaults_to_pending_medium() {
        let (_dir, desk) = desk_with(Vec::new());
        let incident = desk
            .intake(IncidentIntake {
                student_name: Some("Hoang Mai".into()),
                title: Some("Nosebleed".into()),
                location: Some("Library".into()),
                ..IncidentIntake::default()
            })
            .unwrap();

        assert_eq!(incident.status, IncidentStatus::Pending);
        assert_eq!(incident.priority, Priority::Medium);
        assert_eq!(incident.contact_status, DEFAULT_INTAKE_CONTACT_STATUS);
        assert_eq!(desk.snapshot().len(), 1);

        desk.refresh().unwrap();
        let reread = desk.get(&incident.id).unwrap();
        assert_eq!(reread.title, "Nosebleed");
        assert_eq!(reread.location, "Library");
    }

    #[test]
    fn process_persists_and_survives_refresh() {
        let (_dir, desk) = desk_with(vec![record("a", "pending")]);
        let updated = desk
            .process(
                "a",
                ProcessAction {
                    status: IncidentStatus::Processing,
                    contact_status: Some("Calling".into()),
                    action_taken: Some("Ice pack".into()),
                    notified_parent: None,
                },
            )
            .unwrap();
        assert_eq!(updated.status, IncidentStatus::Processing);

        desk.refresh().unwrap();
        let reread = desk.get("a").unwrap();
        assert_eq!(reread.status, IncidentStatus::Processing);
        assert_eq!(reread.contact_status, "Calling");
        assert_eq!(reread.action_taken, "Ice pack");
        assert_eq!(reread.title, "Ankle");
    }

    #[test]
    fn structured_fields_follow_process_and_escalate() {
        let (_dir, desk) = desk_with(vec![IncidentRecord {
            id: "s".into(),
            status: Some("pending".into()),
            priority: Some("low".into()),
            contact_status: Some("Not contacted".into()),
            ..IncidentRecord::default()
        }]);

        let processed = desk
            .process(
                "s",
                ProcessAction {
                    contact_status: Some("Contacted".into()),
                    ..ProcessAction::to(IncidentStatus::Processing)
                },
            )
            .unwrap();
        assert_eq!(processed.contact_status, "Contacted");

        let escalated = desk
            .escalate(
                "s",
                EmergencyAction {
                    immediate_action: NonEmptyText::new("Called ambulance").unwrap(),
                    notified_parent: true,
                    transfer_to_hospital: false,
                    hospital_name: None,
                },
            )
            .unwrap();
        assert_eq!(escalated.priority, Priority::High);
        assert_eq!(escalated.contact_status, "Contacted");

        desk.refresh().unwrap();
        let reread = desk.get("s").unwrap();
        assert_eq!(reread.priority, Priority::High);
        assert_eq!(reread.contact_status, "Contacted");
        assert_eq!(reread.status, IncidentStatus::Processing);
    }

    #[test]
    fn intake_rejects_unrecognised_priority() {
        let (_dir, desk) = desk_with(Vec::new());
        let err = desk
            .intake(IncidentIntake {
                title: Some("Rash".into()),
                priority: Some(Priority::Other),
                ..IncidentIntake::default()
            })
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
        assert!(desk.snapshot().is_empty());
    }

    #[test]
    fn resolved_incident_cannot_be_processed() {
        let (_dir, desk) = desk_with(vec![record("a", "resolved")]);
        let err = desk
            .process("a", ProcessAction::to(IncidentStatus::Processing))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        assert_eq!(desk.get("a").unwrap().status, IncidentStatus::Resolved);
    }

    #[test]
    fn escalation_forces_high_priority() {
        let (_dir, desk) = desk_with(vec![record("a", "pending")]);
        let updated = desk
            .escalate(
                "a",
                EmergencyAction {
                    immediate_action: NonEmptyText::new("Applied epinephrine").unwrap(),
                    notified_parent: true,
                    transfer_to_hospital: true,
                    hospital_name: Some("City Hospital".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.priority, Priority::High);
        assert!(updated
            .action_taken
            .ends_with("| Transferred to hospital: City Hospital"));

        desk.refresh().unwrap();
        assert_eq!(desk.get("a").unwrap().priority, Priority::High);
    }

    #[test]
    fn unknown_incident_is_not_found() {
        let (_dir, desk) = desk_with(Vec::new());
        let err = desk
            .process("missing", ProcessAction::to(IncidentStatus::Resolved))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }

    #[test]
    fn lock_slots_are_released_after_use() {
        let (_dir, desk) = desk_with(vec![record("a", "pending")]);
        for n in 0..5 {
            let missing = desk.process(
                &format!("ghost-{n}"),
                ProcessAction::to(IncidentStatus::Resolved),
            );
            assert!(matches!(missing, Err(WorkflowError::NotFound { .. })));
        }
        assert!(desk.locks.is_empty());

        desk.process("a", ProcessAction::to(IncidentStatus::Processing))
            .unwrap();
        assert!(desk.locks.is_empty());
    }

    #[test]
    fn concurrent_transitions_on_one_incident_are_serialised() {
        let (_dir, desk) = desk_with(vec![record("a", "pending")]);
        let desk = Arc::new(desk);

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let desk = Arc::clone(&desk);
                thread::spawn(move || {
                    desk.process(
                        "a",
                        ProcessAction {
                            status: IncidentStatus::Processing,
                            contact_status: None,
                            action_taken: Some(format!("step {n}")),
                            notified_parent: None,
                        },
                    )
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        desk.refresh().unwrap();
        let steps = desk.get("a").unwrap().action_taken;
        assert_eq!(steps.split(" | ").count(), 8);
        assert!(desk.locks.is_empty());
    }

    /// Store whose writes always fail, for checking that state is left alone.
    struct ReadOnlyStore(JsonFileStore);

    impl RemoteStore for ReadOnlyStore {
        fn list_incidents(&self) -> StoreResult<Vec<IncidentRecord>> {
            self.0.list_incidents()
        }
        fn create_incident(&self, _: NewIncidentRecord) -> StoreResult<IncidentRecord> {
            Err(StoreError::Unavailable("read only".into()))
        }
        fn update_incident(&self, _: &str, _: IncidentPatch) -> StoreResult<IncidentRecord> {
            Err(StoreError::Unavailable("read only".into()))
        }
        fn list_students(&self) -> StoreResult<Vec<Student>> {
            self.0.list_students()
        }
        fn list_staff(&self) -> StoreResult<Vec<Staff>> {
            self.0.list_staff()
        }
        fn list_students_by_grade(&self, grade: &str) -> StoreResult<Vec<Student>> {
            self.0.list_students_by_grade(grade)
        }
        fn list_vaccination_events(&self) -> StoreResult<Vec<CampaignEvent>> {
            self.0.list_vaccination_events()
        }
        fn create_vaccination_event(&self, _: NewCampaignEvent) -> StoreResult<CampaignEvent> {
            Err(StoreError::Unavailable("read only".into()))
        }
        fn update_vaccination_event(&self, _: CampaignEvent) -> StoreResult<CampaignEvent> {
            Err(StoreError::Unavailable("read only".into()))
        }
        fn delete_vaccination_event(&self, _: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("read only".into()))
        }
        fn list_notification_batches(&self) -> StoreResult<Vec<NotificationBatch>> {
            self.0.list_notification_batches()
        }
        fn update_notification_batch(
            &self,
            _: NotificationBatch,
        ) -> StoreResult<NotificationBatch> {
            Err(StoreError::Unavailable("read only".into()))
        }
    }

    #[test]
    fn remote_failure_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        write_collection(dir.path(), INCIDENTS_FILENAME, &[record("a", "pending")]).unwrap();
        let desk = IncidentDesk::new(Arc::new(ReadOnlyStore(JsonFileStore::new(dir.path()))));
        desk.refresh().unwrap();

        let err = desk
            .process("a", ProcessAction::to(IncidentStatus::Resolved))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Remote(_)));
        assert!(err.is_retryable());
        assert_eq!(desk.get("a").unwrap().status, IncidentStatus::Pending);
    }

    #[test]
    fn failed_refresh_keeps_previous_collection() {
        let (dir, desk) = desk_with(vec![record("a", "pending")]);
        std::fs::write(dir.path().join(INCIDENTS_FILENAME), "[{").unwrap();
        assert!(desk.refresh().is_err());
        assert_eq!(desk.snapshot().len(), 1);
    }

    fn campaign_desk() -> (TempDir, CampaignDesk) {
        let dir = TempDir::new().unwrap();
        let event = CampaignEvent {
            id: "c1".into(),
            title: "Hepatitis B".into(),
            classes: vec![ClassProgress {
                class_name: "1A".into(),
                completed_count: 0,
                total_count: 2,
                students: vec![StudentResponse::new("s1", "An"), StudentResponse::new("s2", "Binh")],
            }],
            ..CampaignEvent::default()
        };
        write_collection(dir.path(), CAMPAIGNS_FILENAME, &[event]).unwrap();
        let desk = CampaignDesk::new(Arc::new(JsonFileStore::new(dir.path())));
        (dir, desk)
    }

    fn result(outcome: Participation) -> RecordResult {
        RecordResult {
            outcome,
            result_date: NaiveDate::from_ymd_opt(2024, 10, 2).unwrap(),
            reaction: "none".into(),
            follow_up_plan: String::new(),
        }
    }

    #[test]
    fn recording_results_updates_class_counts() {
        let (_dir, desk) = campaign_desk();
        desk.record_result("c1", "1A", "s1", result(Participation::Completed))
            .unwrap();
        desk.record_result("c1", "1A", "s2", result(Participation::Contraindicated))
            .unwrap();

        let event = desk.get("c1").unwrap();
        assert_eq!(event.classes[0].completed_count, 1);
        let rollup = desk.rollup("c1").unwrap();
        assert_eq!(rollup.completed, 1);
        assert_eq!(rollup.contraindicated, 1);
        assert_eq!(rollup.pending, 0);
        assert_eq!(rollup.completion_pct.value(), 50);
    }

    #[test]
    fn contraindicated_student_cannot_be_recorded_again() {
        let (_dir, desk) = campaign_desk();
        desk.record_result("c1", "1A", "s1", result(Participation::Contraindicated))
            .unwrap();
        let err = desk
            .record_result("c1", "1A", "s1", result(Participation::Completed))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn recording_for_unknown_class_is_not_found() {
        let (_dir, desk) = campaign_desk();
        let err = desk
            .record_result("c1", "9Z", "s1", result(Participation::Completed))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { kind: "class", .. }));
    }

    #[test]
    fn campaign_remote_failure_keeps_stored_event() {
        let (dir, _) = campaign_desk();
        let desk = CampaignDesk::new(Arc::new(ReadOnlyStore(JsonFileStore::new(dir.path()))));
        let before = desk.get("c1").unwrap();

        let err = desk
            .record_result("c1", "1A", "s1", result(Participation::Completed))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Remote(_)));
        assert!(err.is_retryable());
        assert_eq!(desk.get("c1").unwrap(), before);
        assert!(desk.locks.is_empty());
    }

    #[test]
    fn deleting_a_campaign_drops_its_lock() {
        let (_dir, desk) = campaign_desk();
        desk.record_result("c1", "1A", "s1", result(Participation::Completed))
            .unwrap();
        desk.delete("c1").unwrap();
        assert!(desk.locks.is_empty());
        assert!(matches!(
            desk.get("c1").unwrap_err(),
            WorkflowError::NotFound { .. }
        ));
    }

    #[test]
    fn create_rejects_blank_title() {
        let (_dir, desk) = campaign_desk();
        let err = desk
            .create(NewCampaignEvent {
                title: "  ".into(),
                ..NewCampaignEvent::default()
            })
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
    }

    #[test]
    fn batch_remote_failure_keeps_stored_batch() {
        let dir = TempDir::new().unwrap();
        let batch = NotificationBatch {
            id: "n1".into(),
            title: "Dental check".into(),
            total_recipients: 2,
            ..NotificationBatch::default()
        };
        write_collection(dir.path(), NOTIFICATIONS_FILENAME, &[batch]).unwrap();
        let desk = NotificationDesk::new(Arc::new(ReadOnlyStore(JsonFileStore::new(dir.path()))));
        let before = desk.get("n1").unwrap();

        let at = Utc.with_ymd_and_hms(2024, 9, 20, 7, 0, 0).unwrap();
        let err = desk.send("n1", at).unwrap_err();
        assert!(matches!(err, WorkflowError::Remote(_)));
        assert_eq!(desk.get("n1").unwrap(), before);
        assert_eq!(before.status, BatchStatus::Draft);
    }

    #[test]
    fn notification_lifecycle_and_tally() {
        let dir = TempDir::new().unwrap();
        let batch = NotificationBatch {
            id: "n1".into(),
            title: "Eye check consent".into(),
            total_recipients: 4,
            ..NotificationBatch::default()
        };
        write_collection(dir.path(), NOTIFICATIONS_FILENAME, &[batch]).unwrap();
        let desk = NotificationDesk::new(Arc::new(JsonFileStore::new(dir.path())));

        let at = Utc.with_ymd_and_hms(2024, 9, 20, 7, 0, 0).unwrap();
        let sent = desk.send("n1", at).unwrap();
        assert_eq!(sent.status, BatchStatus::Sent);
        assert!(desk
            .schedule("n1", NaiveDate::from_ymd_opt(2024, 10, 1).unwrap())
            .is_err());

        for (student, response) in [
            ("An", ResponseStatus::Agreed),
            ("Binh", ResponseStatus::Declined),
            ("Chi", ResponseStatus::Agreed),
            ("Dung", ResponseStatus::NoResponse),
        ] {
            desk.record_response(
                "n1",
                RecordResponse {
                    student_name: student.into(),
                    parent_name: format!("Parent of {student}"),
                    class_name: "3A".into(),
                    response,
                    note: String::new(),
                },
                at,
            )
            .unwrap();
        }

        let tally = desk.tally("n1").unwrap();
        assert_eq!((tally.agreed, tally.declined, tally.no_response), (2, 1, 1));
        assert_eq!(tally.response_rate_pct.value(), 75);
        assert_eq!(desk.get("n1").unwrap().response_count, 3);

        let channels = desk.channel_report().unwrap();
        assert_eq!(channels[0].sent, 4);
        assert_eq!(channels[0].rate_pct.value(), 75);
    }
}
