//! Status engine.
//!
//! Every entity with a lifecycle implements [`Lifecycle`]: a transition table mapping
//! `(state, action kind)` to the states that action may lead to, plus the side effects of an
//! accepted action. [`transition`] performs the table lookup and applies the action to a copy, so
//! a caller either gets back an entity whose status and side effects both changed, or an
//! [`WorkflowError::InvalidTransition`] and the original untouched.
//!
//! Tables:
//!
//! | Entity | From | Action | To |
//! |---|---|---|---|
//! | Incident | Pending, Processing | process | Processing, Resolved |
//! | Incident | Pending, Processing | emergency | Processing |
//! | Student | NotYet | record | Completed, Contraindicated |
//! | Batch | Draft | schedule | Scheduled |
//! | Batch | Draft, Scheduled | send | Sent |
//! | Batch | Sent | record_response | Sent |

use crate::error::{WorkflowError, WorkflowResult};
use crate::model::{
    BatchStatus, Incident, IncidentStatus, NotificationBatch, Participation, Priority,
    RecipientResponse, ResponseStatus, StudentResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sickbay_types::NonEmptyText;
use utoipa::ToSchema;

/// An entity governed by a transition table.
pub trait Lifecycle: Clone {
    type State: Copy + Eq + std::fmt::Display + 'static;
    type Action;

    /// Entity name used in error messages.
    const ENTITY: &'static str;

    /// `(from, action kind, allowed targets)` rows.
    const TABLE: &'static [(Self::State, &'static str, &'static [Self::State])];

    fn state(&self) -> Self::State;

    fn action_kind(action: &Self::Action) -> &'static str;

    /// The state the action asks for.
    fn requested_state(&self, action: &Self::Action) -> Self::State;

    /// Applies the state change and its side effects. Only called for legal transitions.
    fn apply(&mut self, next: Self::State, action: Self::Action);
}

/// Looks up `(state, action)` in the entity's table.
///
/// Returns the next state, or `InvalidTransition` naming the offending pair.
pub fn check<E: Lifecycle>(entity: &E, action: &E::Action) -> WorkflowResult<E::State> {
    let state = entity.state();
    let kind = E::action_kind(action);
    let next = entity.requested_state(action);

    let allowed = E::TABLE
        .iter()
        .any(|(from, k, targets)| *from == state && *k == kind && targets.contains(&next));

    if allowed {
        Ok(next)
    } else {
        Err(WorkflowError::invalid_transition(E::ENTITY, state, kind))
    }
}

/// Validates and applies an action, returning the updated entity.
pub fn transition<E: Lifecycle>(entity: &E, action: E::Action) -> WorkflowResult<E> {
    let next = check(entity, &action)?;
    let mut updated = entity.clone();
    updated.apply(next, action);
    Ok(updated)
}

// ============================================================================
// Incidents
// ============================================================================

/// Payload of an ordinary processing step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProcessAction {
    pub status: IncidentStatus,
    #[serde(default)]
    pub contact_status: Option<String>,
    /// Appended to what has already been recorded.
    #[serde(default)]
    pub action_taken: Option<String>,
    #[serde(default)]
    pub notified_parent: Option<bool>,
}

impl ProcessAction {
    /// A bare status change with no other side effects.
    pub fn to(status: IncidentStatus) -> Self {
        Self {
            status,
            contact_status: None,
            action_taken: None,
            notified_parent: None,
        }
    }
}

/// Payload of an emergency escalation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EmergencyAction {
    #[schema(value_type = String)]
    pub immediate_action: NonEmptyText,
    #[serde(default)]
    pub notified_parent: bool,
    #[serde(default)]
    pub transfer_to_hospital: bool,
    #[serde(default)]
    pub hospital_name: Option<String>,
}

impl EmergencyAction {
    /// `immediate_action`, plus the hospital-transfer note when a transfer was made.
    pub fn action_text(&self) -> String {
        let mut text = self.immediate_action.as_str().to_string();
        if self.transfer_to_hospital {
            let hospital = NonEmptyText::optional(self.hospital_name.as_deref());
            let hospital = hospital.as_ref().map_or("unspecified", NonEmptyText::as_str);
            text.push_str(&format!(" | Transferred to hospital: {hospital}"));
        }
        text
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum IncidentAction {
    Process(ProcessAction),
    Emergency(EmergencyAction),
}

const ACTIVE_TARGETS: &[IncidentStatus] = &[IncidentStatus::Processing, IncidentStatus::Resolved];
const EMERGENCY_TARGETS: &[IncidentStatus] = &[IncidentStatus::Processing];

impl Lifecycle for Incident {
    type State = IncidentStatus;
    type Action = IncidentAction;

    const ENTITY: &'static str = "incident";

    const TABLE: &'static [(IncidentStatus, &'static str, &'static [IncidentStatus])] = &[
        (IncidentStatus::Pending, "process", ACTIVE_TARGETS),
        (IncidentStatus::Processing, "process", ACTIVE_TARGETS),
        (IncidentStatus::Pending, "emergency", EMERGENCY_TARGETS),
        (IncidentStatus::Processing, "emergency", EMERGENCY_TARGETS),
    ];

    fn state(&self) -> IncidentStatus {
        self.status
    }

    fn action_kind(action: &IncidentAction) -> &'static str {
        match action {
            IncidentAction::Process(_) => "process",
            IncidentAction::Emergency(_) => "emergency",
        }
    }

    fn requested_state(&self, action: &IncidentAction) -> IncidentStatus {
        match action {
            IncidentAction::Process(p) => p.status,
            IncidentAction::Emergency(_) => IncidentStatus::Processing,
        }
    }

    fn apply(&mut self, next: IncidentStatus, action: IncidentAction) {
        self.status = next;
        match action {
            IncidentAction::Process(p) => {
                if let Some(contact) = NonEmptyText::optional(p.contact_status) {
                    self.contact_status = contact.into_inner();
                }
                if let Some(step) = NonEmptyText::optional(p.action_taken) {
                    if self.action_taken.trim().is_empty() {
                        self.action_taken = step.into_inner();
                    } else {
                        self.action_taken = format!("{} | {}", self.action_taken.trim(), step);
                    }
                }
                if let Some(notified) = p.notified_parent {
                    self.notified_parent = notified;
                }
            }
            IncidentAction::Emergency(e) => {
                self.priority = Priority::High;
                self.notified_parent = e.notified_parent;
                self.action_taken = e.action_text();
            }
        }
    }
}

/// Escalates an incident: priority High, status Processing, action text rebuilt.
pub fn apply_emergency(incident: &Incident, action: EmergencyAction) -> WorkflowResult<Incident> {
    transition(incident, IncidentAction::Emergency(action))
}

// ============================================================================
// Campaign student entries
// ============================================================================

/// Outcome recorded for one student.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecordResult {
    pub outcome: Participation,
    pub result_date: NaiveDate,
    #[serde(default)]
    pub reaction: String,
    #[serde(default)]
    pub follow_up_plan: String,
}

const RECORD_TARGETS: &[Participation] = &[Participation::Completed, Participation::Contraindicated];

impl Lifecycle for StudentResponse {
    type State = Participation;
    type Action = RecordResult;

    const ENTITY: &'static str = "student response";

    const TABLE: &'static [(Participation, &'static str, &'static [Participation])] =
        &[(Participation::NotYet, "record", RECORD_TARGETS)];

    fn state(&self) -> Participation {
        self.participation
    }

    fn action_kind(_: &RecordResult) -> &'static str {
        "record"
    }

    fn requested_state(&self, action: &RecordResult) -> Participation {
        action.outcome
    }

    fn apply(&mut self, next: Participation, action: RecordResult) {
        self.participation = next;
        self.result_date = Some(action.result_date);
        self.reaction = action.reaction.trim().to_string();
        self.follow_up_plan = action.follow_up_plan.trim().to_string();
        self.has_issue = self.derive_has_issue();
    }
}

// ============================================================================
// Notification batches
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecordResponse {
    pub student_name: String,
    pub parent_name: String,
    #[serde(default)]
    pub class_name: String,
    pub response: ResponseStatus,
    #[serde(default)]
    pub note: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BatchAction {
    Schedule { checkup_date: NaiveDate },
    Send { at: DateTime<Utc> },
    RecordResponse { response: RecordResponse, at: DateTime<Utc> },
}

impl Lifecycle for NotificationBatch {
    type State = BatchStatus;
    type Action = BatchAction;

    const ENTITY: &'static str = "notification batch";

    const TABLE: &'static [(BatchStatus, &'static str, &'static [BatchStatus])] = &[
        (BatchStatus::Draft, "schedule", &[BatchStatus::Scheduled]),
        (BatchStatus::Draft, "send", &[BatchStatus::Sent]),
        (BatchStatus::Scheduled, "send", &[BatchStatus::Sent]),
        (BatchStatus::Sent, "record_response", &[BatchStatus::Sent]),
    ];

    fn state(&self) -> BatchStatus {
        self.status
    }

    fn action_kind(action: &BatchAction) -> &'static str {
        match action {
            BatchAction::Schedule { .. } => "schedule",
            BatchAction::Send { .. } => "send",
            BatchAction::RecordResponse { .. } => "record_response",
        }
    }

    fn requested_state(&self, action: &BatchAction) -> BatchStatus {
        match action {
            BatchAction::Schedule { .. } => BatchStatus::Scheduled,
            BatchAction::Send { .. } | BatchAction::RecordResponse { .. } => BatchStatus::Sent,
        }
    }

    fn apply(&mut self, next: BatchStatus, action: BatchAction) {
        self.status = next;
        match action {
            BatchAction::Schedule { checkup_date } => {
                self.scheduled_checkup_date = Some(checkup_date);
            }
            BatchAction::Send { at } => {
                self.sent_date = Some(at);
            }
            BatchAction::RecordResponse { response, at } => {
                let responded_at = (response.response != ResponseStatus::NoResponse).then_some(at);
                let existing = self.responses.iter_mut().find(|r| {
                    r.student_name == response.student_name && r.parent_name == response.parent_name
                });
                match existing {
                    Some(entry) => {
                        entry.response = response.response;
                        entry.responded_at = responded_at;
                        entry.note = response.note;
                        if !response.class_name.is_empty() {
                            entry.class_name = response.class_name;
                        }
                    }
                    None => self.responses.push(RecipientResponse {
                        student_name: response.student_name,
                        class_name: response.class_name,
                        parent_name: response.parent_name,
                        response: response.response,
                        responded_at,
                        note: response.note,
                    }),
                }
                self.response_count = self.answered();
                self.total_recipients = self.total_recipients.max(self.responses.len());
            }
        }
    }
}
