//! Spreadsheet export of the incident list.

use crate::model::Incident;
use chrono::NaiveDate;

const BOM: char = '\u{feff}';

pub const CSV_HEADER: [&str; 7] = [
    "Tiêu đề",
    "Học sinh",
    "Lớp",
    "Địa điểm",
    "Mức độ ưu tiên",
    "Trạng thái",
    "Ngày tạo",
];

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Renders incidents as a BOM-prefixed CSV document with every field quoted.
pub fn incidents_csv(incidents: &[Incident]) -> String {
    let mut out = String::new();
    out.push(BOM);
    out.push_str(&CSV_HEADER.join(","));
    out.push('\n');

    for incident in incidents {
        let created = incident.created_at.format(DATE_FORMAT).to_string();
        let row = [
            incident.title.as_str(),
            incident.student_name.as_deref().unwrap_or_default(),
            incident.class_name.as_deref().unwrap_or_default(),
            incident.location.as_str(),
            incident.priority.vi_label(),
            incident.status.vi_label(),
            created.as_str(),
        ];
        let quoted: Vec<String> = row.iter().map(|field| quote(field)).collect();
        out.push_str(&quoted.join(","));
        out.push('\n');
    }
    out
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

pub fn export_filename(date: NaiveDate) -> String {
    format!("danh-sach-su-kien-y-te-{}.csv", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IncidentStatus, Priority};
    use chrono::{TimeZone, Utc};

    fn incident() -> Incident {
        Incident {
            id: "i1".into(),
            title: "Fell on \"wet\" floor".into(),
            student_id: None,
            student_name: Some("Pham Duc".into()),
            class_name: None,
            location: "Hallway, 2nd floor".into(),
            priority: Priority::High,
            description: String::new(),
            status: IncidentStatus::Processing,
            contact_status: "Pending".into(),
            action_taken: String::new(),
            notified_parent: false,
            created_at: Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap(),
            raw_notes: None,
        }
    }

    #[test]
    fn renders_header_and_quoted_rows() {
        let csv = incidents_csv(&[incident()]);
        let mut lines = csv.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with('\u{feff}'));
        assert!(header.ends_with("Trạng thái,Ngày tạo"));

        assert_eq!(
            lines.next().unwrap(),
            "\"Fell on \"\"wet\"\" floor\",\"Pham Duc\",\"\",\"Hallway, 2nd floor\",\"Cao\",\"Đang xử lý\",\"07/03/2024 09:05\""
        );
        assert!(lines.next().is_none());
        assert!(!csv.contains('\r'));
    }

    #[test]
    fn empty_list_is_header_only() {
        let csv = incidents_csv(&[]);
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn filename_carries_date() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 2).unwrap();
        assert_eq!(export_filename(date), "danh-sach-su-kien-y-te-2024-11-02.csv");
    }
}
