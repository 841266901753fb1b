//! Backend boundary.
//!
//! [`RemoteStore`] is the only way the desks read or write data. [`JsonFileStore`] implements it
//! over a directory holding one JSON document per collection, which is what the binaries and tests
//! run against.
//!
//! Directory layout:
//!
//! ```text
//! <data_dir>/
//!   incidents.json       [IncidentRecord]
//!   campaigns.json       [CampaignEvent]
//!   notifications.json   [NotificationBatch]
//!   students.json        [Student]
//!   staff.json           [Staff]
//! ```

use crate::constants::{
    CAMPAIGNS_FILENAME, INCIDENTS_FILENAME, NOTIFICATIONS_FILENAME, STAFF_FILENAME,
    STUDENTS_FILENAME,
};
use crate::model::{
    CampaignEvent, ClassProgress, IncidentPatch, IncidentRecord, NewCampaignEvent,
    NewIncidentRecord, NotificationBatch, Staff, Student, StudentResponse,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("failed to read {path}: {source}", path = path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}", path = path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to deserialize {path}: {source}", path = path.display())]
    Deserialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// I/O and availability failures may clear up on their own; bad data and missing rows will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Read { .. } | Self::Write { .. } | Self::Unavailable(_)
        )
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Operations the backend exposes.
pub trait RemoteStore: Send + Sync {
    fn list_incidents(&self) -> StoreResult<Vec<IncidentRecord>>;
    fn create_incident(&self, fields: NewIncidentRecord) -> StoreResult<IncidentRecord>;
    fn update_incident(&self, id: &str, patch: IncidentPatch) -> StoreResult<IncidentRecord>;

    fn list_students(&self) -> StoreResult<Vec<Student>>;
    fn list_staff(&self) -> StoreResult<Vec<Staff>>;
    fn list_students_by_grade(&self, grade: &str) -> StoreResult<Vec<Student>>;

    fn list_vaccination_events(&self) -> StoreResult<Vec<CampaignEvent>>;
    fn create_vaccination_event(&self, fields: NewCampaignEvent) -> StoreResult<CampaignEvent>;
    fn update_vaccination_event(&self, event: CampaignEvent) -> StoreResult<CampaignEvent>;
    fn delete_vaccination_event(&self, id: &str) -> StoreResult<()>;

    fn list_notification_batches(&self) -> StoreResult<Vec<NotificationBatch>>;
    fn update_notification_batch(&self, batch: NotificationBatch)
        -> StoreResult<NotificationBatch>;
}

// ============================================================================
// JSON file store
// ============================================================================

/// Directory-backed store. Missing collection files read as empty.
#[derive(Debug)]
pub struct JsonFileStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn read<T: DeserializeOwned>(&self, filename: &str) -> StoreResult<Vec<T>> {
        let path = self.data_dir.join(filename);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents).map_err(|source| StoreError::Deserialization { path, source })
    }

    /// Whole-file write via a temporary sibling and rename, so readers never see half a file.
    fn write<T: Serialize>(&self, filename: &str, rows: &[T]) -> StoreResult<()> {
        let path = self.data_dir.join(filename);
        let tmp = self.data_dir.join(format!(".{filename}.tmp"));
        let json = serde_json::to_string_pretty(rows).map_err(StoreError::Serialization)?;

        fs::create_dir_all(&self.data_dir).map_err(|source| StoreError::Write {
            path: self.data_dir.clone(),
            source,
        })?;
        fs::write(&tmp, json).map_err(|source| StoreError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Write { path, source })
    }

    /// Runs a read-modify-write cycle on one collection while holding the write lock.
    fn modify<T, R, F>(&self, filename: &str, f: F) -> StoreResult<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<T>) -> StoreResult<R>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("write lock poisoned".into()))?;
        let mut rows = self.read::<T>(filename)?;
        let result = f(&mut rows)?;
        self.write(filename, &rows)?;
        Ok(result)
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl RemoteStore for JsonFileStore {
    fn list_incidents(&self) -> StoreResult<Vec<IncidentRecord>> {
        self.read(INCIDENTS_FILENAME)
    }

    fn create_incident(&self, fields: NewIncidentRecord) -> StoreResult<IncidentRecord> {
        let record = IncidentRecord {
            id: new_id(),
            student_id: fields.student_id,
            student_name: fields.student_name,
            class_name: fields.class_name,
            description: fields.description,
            status: Some(fields.status),
            action_taken: fields.action_taken,
            notified_parent: fields.notified_parent,
            created_at: Some(Utc::now()),
            notes: fields.notes,
            ..IncidentRecord::default()
        };
        self.modify(INCIDENTS_FILENAME, |rows: &mut Vec<IncidentRecord>| {
            rows.push(record.clone());
            Ok(record)
        })
    }

    fn update_incident(&self, id: &str, patch: IncidentPatch) -> StoreResult<IncidentRecord> {
        self.modify(INCIDENTS_FILENAME, |rows: &mut Vec<IncidentRecord>| {
            let row = rows
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "incident",
                    id: id.to_string(),
                })?;
            patch.apply_to(row);
            Ok(row.clone())
        })
    }

    fn list_students(&self) -> StoreResult<Vec<Student>> {
        self.read(STUDENTS_FILENAME)
    }

    fn list_staff(&self) -> StoreResult<Vec<Staff>> {
        self.read(STAFF_FILENAME)
    }

    fn list_students_by_grade(&self, grade: &str) -> StoreResult<Vec<Student>> {
        let grade = grade.trim();
        Ok(self
            .list_students()?
            .into_iter()
            .filter(|s| s.grade.trim().eq_ignore_ascii_case(grade))
            .collect())
    }

    fn list_vaccination_events(&self) -> StoreResult<Vec<CampaignEvent>> {
        self.read(CAMPAIGNS_FILENAME)
    }

    /// Creates the event with one class entry per class among the selected students.
    fn create_vaccination_event(&self, fields: NewCampaignEvent) -> StoreResult<CampaignEvent> {
        let students = self.list_students()?;
        let mut classes: BTreeMap<String, ClassProgress> = BTreeMap::new();

        for student_id in &fields.student_ids {
            let Some(student) = students.iter().find(|s| &s.id == student_id) else {
                tracing::warn!("skipping unknown student {} for new campaign", student_id);
                continue;
            };
            let class = classes
                .entry(student.class_name.clone())
                .or_insert_with(|| ClassProgress {
                    class_name: student.class_name.clone(),
                    ..ClassProgress::default()
                });
            class.students.push(StudentResponse {
                birth_date: student.birth_date,
                ..StudentResponse::new(&student.id, &student.name)
            });
            class.total_count += 1;
        }

        let event = CampaignEvent {
            id: new_id(),
            title: fields.title,
            kind: fields.kind,
            scheduled_at: fields.scheduled_at,
            location: fields.location,
            supervisor: fields.supervisor,
            grade_levels: vec![fields.grade_level],
            description: fields.description,
            classes: classes.into_values().collect(),
        };

        self.modify(CAMPAIGNS_FILENAME, |rows: &mut Vec<CampaignEvent>| {
            rows.push(event.clone());
            Ok(event)
        })
    }

    fn update_vaccination_event(&self, event: CampaignEvent) -> StoreResult<CampaignEvent> {
        self.modify(CAMPAIGNS_FILENAME, |rows: &mut Vec<CampaignEvent>| {
            let row = rows
                .iter_mut()
                .find(|r| r.id == event.id)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "campaign",
                    id: event.id.clone(),
                })?;
            *row = event.clone();
            Ok(event)
        })
    }

    fn delete_vaccination_event(&self, id: &str) -> StoreResult<()> {
        self.modify(CAMPAIGNS_FILENAME, |rows: &mut Vec<CampaignEvent>| {
            let before = rows.len();
            rows.retain(|r| r.id != id);
            if rows.len() == before {
                return Err(StoreError::NotFound {
                    kind: "campaign",
                    id: id.to_string(),
                });
            }
            Ok(())
        })
    }

    fn list_notification_batches(&self) -> StoreResult<Vec<NotificationBatch>> {
        self.read(NOTIFICATIONS_FILENAME)
    }

    fn update_notification_batch(
        &self,
        batch: NotificationBatch,
    ) -> StoreResult<NotificationBatch> {
        self.modify(NOTIFICATIONS_FILENAME, |rows: &mut Vec<NotificationBatch>| {
            let row = rows
                .iter_mut()
                .find(|r| r.id == batch.id)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "notification batch",
                    id: batch.id.clone(),
                })?;
            *row = batch.clone();
            Ok(batch)
        })
    }
}

/// Seeds a collection file. Used by tests and by the CLI's fixture loading.
pub fn write_collection<T: Serialize>(
    data_dir: &Path,
    filename: &str,
    rows: &[T],
) -> StoreResult<()> {
    JsonFileStore::new(data_dir).write(filename, rows)
}
