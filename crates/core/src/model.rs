//! Canonical data model.
//!
//! Backend records arrive with free-text status vocabularies and, for incidents, with most display
//! fields packed into a notes string. This module defines the canonical shapes the engines work
//! on, and the boundary normalisation that maps backend vocabularies onto them.

use crate::codec;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================================
// Vocabularies
// ============================================================================

/// Lifecycle status of an incident.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum IncidentStatus {
    Pending,
    Processing,
    Resolved,
    /// The backend returned a status outside the canonical vocabulary.
    ///
    /// Kept so tallies never drop rows. No transition leaves this state.
    Other,
}

impl IncidentStatus {
    /// Maps a backend or legacy status string onto the canonical vocabulary.
    ///
    /// Accepts both backend vocabularies (`pending/processing/resolved` and
    /// `waiting/processing/completed`) and the Vietnamese display labels.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pending" | "waiting" | "new" | "chờ xử lý" => Self::Pending,
            "processing" | "in progress" | "in_progress" | "đang xử lý" => Self::Processing,
            "resolved" | "completed" | "done" | "đã xử lý" | "đã xử lý xong" => Self::Resolved,
            _ => Self::Other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Resolved => "Resolved",
            Self::Other => "Other",
        }
    }

    /// Display label used by the school's exports.
    pub fn vi_label(self) -> &'static str {
        match self {
            Self::Pending => "Chờ xử lý",
            Self::Processing => "Đang xử lý",
            Self::Resolved => "Đã xử lý",
            Self::Other => "Khác",
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Incident priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Priority {
    Low,
    Medium,
    High,
    /// Structured priority text outside the canonical vocabulary.
    Other,
}

impl Priority {
    /// Parses a priority label, returning `None` for anything unrecognised.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" | "thấp" => Some(Self::Low),
            "medium" | "normal" | "trung bình" => Some(Self::Medium),
            "high" | "urgent" | "cao" => Some(Self::High),
            _ => None,
        }
    }

    /// Like [`Priority::parse`], but keeps unrecognised text as [`Priority::Other`].
    pub fn normalize(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(Self::Other)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Other => "Other",
        }
    }

    pub fn vi_label(self) -> &'static str {
        match self {
            Self::Low => "Thấp",
            Self::Medium => "Trung bình",
            Self::High => "Cao",
            Self::Other => "Khác",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A student's outcome within a campaign.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Participation {
    /// Vaccinated or examined.
    Completed,
    #[default]
    NotYet,
    /// Medically ineligible, or needs follow-up before the procedure.
    Contraindicated,
}

impl Participation {
    pub fn label(self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::NotYet => "NotYet",
            Self::Contraindicated => "Contraindicated",
        }
    }
}

impl std::fmt::Display for Participation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Status of a parent notification batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum BatchStatus {
    #[default]
    Draft,
    Scheduled,
    Sent,
}

impl BatchStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Scheduled => "Scheduled",
            Self::Sent => "Sent",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A parent's answer to a notification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ResponseStatus {
    Agreed,
    Declined,
    #[default]
    NoResponse,
}

/// Channel a notification batch went out on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Channel {
    #[default]
    App,
    Email,
    Sms,
    Printed,
}

// ============================================================================
// Incidents
// ============================================================================

/// An incident as the backend stores it.
///
/// The backend has no dedicated title/location/priority/contact-status columns; older screens
/// pack those into `notes`. The structured fields are honoured if a backend ever returns them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IncidentRecord {
    pub id: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub action_taken: Option<String>,
    #[serde(default)]
    pub notified_parent: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub contact_status: Option<String>,
}

/// Canonical incident.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub class_name: Option<String>,
    pub location: String,
    pub priority: Priority,
    pub description: String,
    pub status: IncidentStatus,
    pub contact_status: String,
    pub action_taken: String,
    pub notified_parent: bool,
    pub created_at: DateTime<Utc>,
    pub raw_notes: Option<String>,
}

impl Incident {
    /// Normalises a backend record into the canonical shape.
    ///
    /// Structured fields win over values decoded from `notes`; a structured contact status is
    /// passed to the codec as the authoritative one. The workflow status always comes from the
    /// record itself and a missing status means the incident has not been picked up yet.
    /// `now` stands in for a missing `created_at`.
    pub fn from_record(record: IncidentRecord, now: DateTime<Utc>) -> Self {
        let authoritative_contact = non_blank(record.contact_status.clone());
        let decoded = codec::decode(
            record.notes.as_deref(),
            record.description.as_deref(),
            authoritative_contact.as_deref(),
        );

        let status = record
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(IncidentStatus::normalize)
            .unwrap_or(IncidentStatus::Pending);

        let priority = record
            .priority
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(Priority::normalize)
            .unwrap_or(decoded.priority);

        Self {
            id: record.id,
            title: non_blank(record.title).unwrap_or(decoded.title),
            student_id: record.student_id,
            student_name: record.student_name,
            class_name: record.class_name,
            location: non_blank(record.location).unwrap_or(decoded.location),
            priority,
            description: record.description.unwrap_or_default(),
            status,
            contact_status: decoded.contact_status,
            action_taken: record.action_taken.unwrap_or_default(),
            notified_parent: record.notified_parent,
            created_at: record.created_at.unwrap_or(now),
            raw_notes: record.notes,
        }
    }

    /// Builds the partial update the backend needs to persist this incident's workflow fields.
    ///
    /// Display fields travel in the notes string for backends without dedicated columns, and are
    /// also written to the structured fields so a record carrying those never shadows the update.
    pub fn to_patch(&self) -> IncidentPatch {
        IncidentPatch {
            status: Some(self.status.label().to_string()),
            action_taken: Some(self.action_taken.clone()),
            notified_parent: Some(self.notified_parent),
            title: Some(self.title.clone()),
            location: Some(self.location.clone()),
            priority: Some(self.priority.label().to_string()),
            contact_status: Some(self.contact_status.clone()),
            notes: Some(codec::encode(&codec::IncidentMetadata {
                title: Some(self.title.clone()),
                location: Some(self.location.clone()),
                priority: Some(self.priority),
                contact_status: Some(self.contact_status.clone()),
            })),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fields sent to the backend when creating an incident.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewIncidentRecord {
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub class_name: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub action_taken: Option<String>,
    pub notified_parent: bool,
    pub notes: Option<String>,
}

/// Partial update sent to the backend; `None` leaves the stored value untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IncidentPatch {
    pub status: Option<String>,
    pub action_taken: Option<String>,
    pub notified_parent: Option<bool>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub priority: Option<String>,
    pub contact_status: Option<String>,
    pub notes: Option<String>,
}

impl IncidentPatch {
    pub fn apply_to(self, record: &mut IncidentRecord) {
        if let Some(status) = self.status {
            record.status = Some(status);
        }
        if let Some(action_taken) = self.action_taken {
            record.action_taken = Some(action_taken);
        }
        if let Some(notified_parent) = self.notified_parent {
            record.notified_parent = notified_parent;
        }
        if let Some(title) = self.title {
            record.title = Some(title);
        }
        if let Some(location) = self.location {
            record.location = Some(location);
        }
        if let Some(priority) = self.priority {
            record.priority = Some(priority);
        }
        if let Some(contact_status) = self.contact_status {
            record.contact_status = Some(contact_status);
        }
        if let Some(notes) = self.notes {
            record.notes = Some(notes);
        }
    }
}

// ============================================================================
// Campaigns
// ============================================================================

/// A vaccination or health-check drive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CampaignEvent {
    pub id: String,
    pub title: String,
    /// Vaccine or examination type.
    pub kind: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub location: String,
    pub supervisor: String,
    #[serde(default)]
    pub grade_levels: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub classes: Vec<ClassProgress>,
}

impl CampaignEvent {
    pub fn class(&self, class_name: &str) -> Option<&ClassProgress> {
        self.classes.iter().find(|c| c.class_name == class_name)
    }

    pub fn class_mut(&mut self, class_name: &str) -> Option<&mut ClassProgress> {
        self.classes.iter_mut().find(|c| c.class_name == class_name)
    }
}

/// Per-class participation within a campaign.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClassProgress {
    pub class_name: String,
    pub completed_count: usize,
    pub total_count: usize,
    #[serde(default)]
    pub students: Vec<StudentResponse>,
}

impl ClassProgress {
    /// Re-derives the class counters from its student list.
    ///
    /// Classes tracked by counters alone (no student rows) keep their counters, clamped so
    /// `completed_count <= total_count`.
    pub fn resync_counts(&mut self) {
        if !self.students.is_empty() {
            self.completed_count = self
                .students
                .iter()
                .filter(|s| s.participation == Participation::Completed)
                .count();
            self.total_count = self.total_count.max(self.students.len());
        }
        self.completed_count = self.completed_count.min(self.total_count);
    }
}

/// One student's outcome within a class's campaign participation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StudentResponse {
    pub student_id: String,
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub participation: Participation,
    pub result_date: Option<NaiveDate>,
    #[serde(default)]
    pub reaction: String,
    #[serde(default)]
    pub follow_up_plan: String,
    #[serde(default)]
    pub has_issue: bool,
}

impl StudentResponse {
    pub fn new(student_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// True when the reaction or follow-up plan says something other than "nothing to report".
    pub fn derive_has_issue(&self) -> bool {
        is_meaningful(&self.reaction) || is_meaningful(&self.follow_up_plan)
    }
}

const NONE_SENTINELS: &[&str] = &[
    "none",
    "no",
    "n/a",
    "na",
    "-",
    "normal",
    "không",
    "không có",
    "bình thường",
];

fn is_meaningful(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    !text.is_empty() && !NONE_SENTINELS.contains(&text.as_str())
}

/// Fields sent to the backend when creating a campaign.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewCampaignEvent {
    pub title: String,
    pub kind: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub location: String,
    pub supervisor: String,
    pub grade_level: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub student_ids: Vec<String>,
}

// ============================================================================
// Notifications
// ============================================================================

/// One parent-facing communication about a campaign.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationBatch {
    pub id: String,
    pub title: String,
    pub target: String,
    pub scheduled_checkup_date: Option<NaiveDate>,
    pub sent_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: BatchStatus,
    #[serde(default)]
    pub channel: Channel,
    pub total_recipients: usize,
    #[serde(default)]
    pub response_count: usize,
    #[serde(default)]
    pub responses: Vec<RecipientResponse>,
}

impl NotificationBatch {
    /// Number of recipients who answered either way.
    pub fn answered(&self) -> usize {
        self.responses
            .iter()
            .filter(|r| r.response != ResponseStatus::NoResponse)
            .count()
    }
}

/// One recipient's answer to a notification batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecipientResponse {
    pub student_name: String,
    pub class_name: String,
    pub parent_name: String,
    #[serde(default)]
    pub response: ResponseStatus,
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: String,
}

// ============================================================================
// Lookups
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub class_name: String,
    pub grade: String,
    pub birth_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Staff {
    pub id: String,
    pub name: String,
    pub role: String,
}
