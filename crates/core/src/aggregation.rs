//! Derived, read-only statistics over canonical collections.
//!
//! Nothing here mutates its input or fails: empty and degenerate inputs produce zeroed results.

use crate::model::{
    CampaignEvent, ClassProgress, Incident, IncidentStatus, Participation, Priority,
    RecipientResponse,
};
use serde::{Deserialize, Serialize};
use sickbay_types::Percent;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use utoipa::ToSchema;

// ============================================================================
// Incident dashboard
// ============================================================================

/// Dashboard counts for a list of incidents.
///
/// Only buckets that occur are present. Unrecognised values land in `Other`, so each map sums to
/// `total`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IncidentTally {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
}

pub fn tally_incidents(incidents: &[Incident]) -> IncidentTally {
    let mut tally = IncidentTally::default();
    for incident in incidents {
        tally.total += 1;
        *tally
            .by_status
            .entry(incident.status.label().to_string())
            .or_default() += 1;
        *tally
            .by_priority
            .entry(incident.priority.label().to_string())
            .or_default() += 1;
    }
    tally
}

// ============================================================================
// Campaign rollups
// ============================================================================

/// Participation counts for a campaign or one of its classes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Rollup {
    pub total_students: usize,
    pub completed: usize,
    pub pending: usize,
    pub contraindicated: usize,
    #[schema(value_type = u8)]
    pub completion_pct: Percent,
}

impl Rollup {
    fn absorb(&mut self, other: &Rollup) {
        self.total_students += other.total_students;
        self.completed += other.completed;
        self.pending += other.pending;
        self.contraindicated += other.contraindicated;
        self.completion_pct = Percent::ratio(self.completed, self.total_students);
    }
}

/// Rolls up one class.
///
/// Totals come from the class counters, with `completed` clamped to the class total. Pending and
/// contraindicated counts come from scanning the student list.
pub fn rollup_class(class: &ClassProgress) -> Rollup {
    let total_students = class.total_count;
    let completed = class.completed_count.min(total_students);
    let count = |p: Participation| {
        class
            .students
            .iter()
            .filter(|s| s.participation == p)
            .count()
    };

    Rollup {
        total_students,
        completed,
        pending: count(Participation::NotYet),
        contraindicated: count(Participation::Contraindicated),
        completion_pct: Percent::ratio(completed, total_students),
    }
}

/// Rolls up a whole campaign as the sum of its class rollups.
pub fn rollup_campaign(event: &CampaignEvent) -> Rollup {
    event
        .classes
        .iter()
        .map(rollup_class)
        .fold(Rollup::default(), |mut acc, class| {
            acc.absorb(&class);
            acc
        })
}

/// A campaign with its rollup and per-class breakdown, as list views show it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CampaignSummary {
    pub id: String,
    pub title: String,
    pub rollup: Rollup,
    pub classes: Vec<ClassSummary>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClassSummary {
    pub class_name: String,
    pub rollup: Rollup,
    /// Students whose record needs staff attention.
    pub with_issues: usize,
}

pub fn summarize_campaign(event: &CampaignEvent) -> CampaignSummary {
    CampaignSummary {
        id: event.id.clone(),
        title: event.title.clone(),
        rollup: rollup_campaign(event),
        classes: event
            .classes
            .iter()
            .map(|class| ClassSummary {
                class_name: class.class_name.clone(),
                rollup: rollup_class(class),
                with_issues: class.students.iter().filter(|s| s.has_issue).count(),
            })
            .collect(),
    }
}

// ============================================================================
// List views: search, filter, sort
// ============================================================================

/// Records that can be found by free-text search.
pub trait Searchable {
    /// The name/title/location fields a search box looks at.
    fn search_fields(&self) -> Vec<&str>;

    /// Case-insensitive substring match against any search field. Blank needles match everything.
    fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        needle.is_empty()
            || self
                .search_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
    }
}

impl Searchable for Incident {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.title.as_str(), self.location.as_str()];
        fields.extend(self.student_name.as_deref());
        fields.extend(self.class_name.as_deref());
        fields
    }
}

impl Searchable for CampaignEvent {
    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.title.as_str(),
            self.kind.as_str(),
            self.location.as_str(),
            self.supervisor.as_str(),
        ]
    }
}

impl Searchable for RecipientResponse {
    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.student_name.as_str(),
            self.parent_name.as_str(),
            self.class_name.as_str(),
        ]
    }
}

/// Filters any searchable collection by free text.
pub fn search<'a, T: Searchable>(items: &'a [T], needle: &str) -> Vec<&'a T> {
    items.iter().filter(|item| item.matches_text(needle)).collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSortKey {
    Title,
    Student,
    Class,
    Location,
    Priority,
    Status,
    CreatedAt,
}

/// Incident list query: free-text search, exact enum filters, and an optional sort.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IncidentQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<IncidentStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub sort: Option<IncidentSortKey>,
    #[serde(default)]
    pub direction: SortDirection,
}

impl IncidentQuery {
    pub fn apply<'a>(&self, incidents: &'a [Incident]) -> Vec<&'a Incident> {
        let mut rows: Vec<&Incident> = incidents
            .iter()
            .filter(|i| self.search.as_deref().map_or(true, |s| i.matches_text(s)))
            .filter(|i| self.status.map_or(true, |s| i.status == s))
            .filter(|i| self.priority.map_or(true, |p| i.priority == p))
            .collect();

        if let Some(key) = self.sort {
            sort_empty_last(&mut rows, self.direction, |i| sort_value(i, key));
        }
        rows
    }
}

/// Sortable projection of an incident field. `None` means empty.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Text(String),
    Rank(u8),
    Time(i64),
}

fn sort_value(incident: &Incident, key: IncidentSortKey) -> Option<SortValue> {
    let text = |s: Option<&str>| {
        s.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| SortValue::Text(s.to_lowercase()))
    };
    match key {
        IncidentSortKey::Title => text(Some(incident.title.as_str())),
        IncidentSortKey::Student => text(incident.student_name.as_deref()),
        IncidentSortKey::Class => text(incident.class_name.as_deref()),
        IncidentSortKey::Location => text(Some(incident.location.as_str())),
        IncidentSortKey::Priority => match incident.priority {
            Priority::Low => Some(SortValue::Rank(0)),
            Priority::Medium => Some(SortValue::Rank(1)),
            Priority::High => Some(SortValue::Rank(2)),
            Priority::Other => None,
        },
        IncidentSortKey::Status => match incident.status {
            IncidentStatus::Pending => Some(SortValue::Rank(0)),
            IncidentStatus::Processing => Some(SortValue::Rank(1)),
            IncidentStatus::Resolved => Some(SortValue::Rank(2)),
            IncidentStatus::Other => None,
        },
        IncidentSortKey::CreatedAt => Some(SortValue::Time(incident.created_at.timestamp_millis())),
    }
}

/// Stable sort that keeps empty values after every non-empty value in both directions.
pub fn sort_empty_last<T, K, F>(items: &mut [T], direction: SortDirection, key: F)
where
    K: Ord,
    F: Fn(&T) -> Option<K>,
{
    items.sort_by(|a, b| match (key(a), key(b)) {
        (Some(x), Some(y)) => match direction {
            SortDirection::Asc => x.cmp(&y),
            SortDirection::Desc => y.cmp(&x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
