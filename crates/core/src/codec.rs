//! Incident metadata codec.
//!
//! The backend incident record has no columns for title, location, priority or contact status,
//! so they travel inside the free-text notes field using a small key-value grammar:
//!
//! ```text
//! Title: Fall in yard | Location: Playground | Priority: High | Contact Status: Calling
//! ```
//!
//! Decoding never fails. Each field is looked up independently and anything missing, blank or
//! unparseable falls back to a fixed default, because notes written by older screens are known to
//! be inconsistent.
//!
//! Values containing `|` cannot be represented. Values containing `:` decode correctly in
//! practice (only the first colon of a segment separates key from value) but are not guaranteed.

use crate::model::Priority;

/// Version of the key-value grammar written by [`encode`].
pub const CODEC_VERSION: u32 = 1;

pub const TITLE_KEY: &str = "Title";
pub const LOCATION_KEY: &str = "Location";
pub const PRIORITY_KEY: &str = "Priority";
pub const CONTACT_STATUS_KEY: &str = "Contact Status";

const FIELD_SEPARATOR: &str = " | ";

pub const DEFAULT_TITLE: &str = "Unspecified incident";
pub const DEFAULT_LOCATION: &str = "Unknown";
pub const DEFAULT_PRIORITY: Priority = Priority::Low;
pub const DEFAULT_CONTACT_STATUS: &str = "Pending";

/// Fields packed into the notes string. `None` means "not provided".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncidentMetadata {
    pub title: Option<String>,
    pub location: Option<String>,
    pub priority: Option<Priority>,
    pub contact_status: Option<String>,
}

/// Fully resolved metadata after decoding; every field has a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedMetadata {
    pub title: String,
    pub location: String,
    pub priority: Priority,
    pub contact_status: String,
}

/// Serialises the present fields as `Key: value | Key: value`.
///
/// Blank values count as absent. An empty string is returned when nothing is present.
pub fn encode(fields: &IncidentMetadata) -> String {
    let entries = [
        (TITLE_KEY, fields.title.as_deref()),
        (LOCATION_KEY, fields.location.as_deref()),
        (PRIORITY_KEY, fields.priority.map(Priority::label)),
        (CONTACT_STATUS_KEY, fields.contact_status.as_deref()),
    ];

    entries
        .into_iter()
        .filter_map(|(key, value)| {
            let value = value?.trim();
            (!value.is_empty()).then(|| format!("{key}: {value}"))
        })
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

/// Parses a notes string back into resolved metadata.
///
/// # Arguments
///
/// * `blob` - The notes string, if any.
/// * `fallback_description` - Used as the title when the blob carries none.
/// * `authoritative_contact_status` - A contact status the backend returned explicitly. When
///   present it always wins over the blob, which is a display hint rather than workflow state.
pub fn decode(
    blob: Option<&str>,
    fallback_description: Option<&str>,
    authoritative_contact_status: Option<&str>,
) -> DecodedMetadata {
    let blob = blob.map(str::trim).filter(|b| !b.is_empty());
    let lookup = |key: &str| blob.and_then(|b| find_field(b, key));

    let title = lookup(TITLE_KEY)
        .or_else(|| fallback_description.map(str::trim).filter(|d| !d.is_empty()))
        .unwrap_or(DEFAULT_TITLE);

    let priority = lookup(PRIORITY_KEY)
        .and_then(Priority::parse)
        .unwrap_or(DEFAULT_PRIORITY);

    let contact_status = authoritative_contact_status
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| lookup(CONTACT_STATUS_KEY))
        .unwrap_or(DEFAULT_CONTACT_STATUS);

    DecodedMetadata {
        title: title.to_string(),
        location: lookup(LOCATION_KEY).unwrap_or(DEFAULT_LOCATION).to_string(),
        priority,
        contact_status: contact_status.to_string(),
    }
}

/// Returns the trimmed value of the first `key: value` segment matching `key`.
fn find_field<'a>(blob: &'a str, key: &str) -> Option<&'a str> {
    blob.split('|').find_map(|segment| {
        let (candidate, value) = segment.split_once(':')?;
        if !candidate.trim().eq_ignore_ascii_case(key) {
            return None;
        }
        let value = value.trim();
        (!value.is_empty()).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> IncidentMetadata {
        IncidentMetadata {
            title: Some("Fall in yard".into()),
            location: Some("Playground".into()),
            priority: Some(Priority::High),
            contact_status: Some("Parent en route".into()),
        }
    }

    #[test]
    fn encodes_fields_in_fixed_order() {
        assert_eq!(
            encode(&full()),
            "Title: Fall in yard | Location: Playground | Priority: High | Contact Status: Parent en route"
        );
    }

    #[test]
    fn encode_omits_absent_and_blank_fields() {
        let fields = IncidentMetadata {
            title: Some("Headache".into()),
            location: Some("   ".into()),
            priority: None,
            contact_status: None,
        };
        assert_eq!(encode(&fields), "Title: Headache");
        assert_eq!(encode(&IncidentMetadata::default()), "");
    }

    #[test]
    fn decode_reproduces_encoded_fields() {
        let fields = full();
        let decoded = decode(Some(&encode(&fields)), None, None);
        assert_eq!(Some(decoded.title), fields.title);
        assert_eq!(Some(decoded.location), fields.location);
        assert_eq!(Some(decoded.priority), fields.priority);
        assert_eq!(Some(decoded.contact_status), fields.contact_status);
    }

    #[test]
    fn decode_partial_blob_fills_defaults() {
        let only_location = IncidentMetadata {
            location: Some("Gym".into()),
            ..IncidentMetadata::default()
        };
        let decoded = decode(Some(&encode(&only_location)), None, None);
        assert_eq!(decoded.location, "Gym");
        assert_eq!(decoded.title, DEFAULT_TITLE);
        assert_eq!(decoded.priority, Priority::Low);
        assert_eq!(decoded.contact_status, DEFAULT_CONTACT_STATUS);
    }

    #[test]
    fn decode_without_blob_uses_fallbacks() {
        let decoded = decode(None, Some("Stomach ache"), Some("Contacted"));
        assert_eq!(decoded.title, "Stomach ache");
        assert_eq!(decoded.location, "Unknown");
        assert_eq!(decoded.priority, Priority::Low);
        assert_eq!(decoded.contact_status, "Contacted");

        let decoded = decode(Some("   "), None, None);
        assert_eq!(decoded.title, DEFAULT_TITLE);
        assert_eq!(decoded.contact_status, "Pending");
    }

    #[test]
    fn authoritative_contact_status_wins_over_blob() {
        let decoded = decode(Some("Contact Status: Calling"), None, Some("Contacted"));
        assert_eq!(decoded.contact_status, "Contacted");
    }

    #[test]
    fn malformed_blob_degrades_field_by_field() {
        let decoded = decode(
            Some("Title: Cut finger | garbage without colon | Priority: Extreme | Location:"),
            Some("ignored"),
            None,
        );
        assert_eq!(decoded.title, "Cut finger");
        assert_eq!(decoded.priority, Priority::Low);
        assert_eq!(decoded.location, "Unknown");
    }

    #[test]
    fn free_text_without_keys_falls_back_to_description() {
        let decoded = decode(Some("student felt dizzy after PE"), Some("Dizziness"), None);
        assert_eq!(decoded.title, "Dizziness");
    }

    #[test]
    fn first_occurrence_wins_and_keys_ignore_case() {
        let decoded = decode(Some("title: First | Title: Second"), None, None);
        assert_eq!(decoded.title, "First");
    }

    #[test]
    fn contact_status_key_does_not_shadow_other_keys() {
        let decoded = decode(Some("Contact Status: Calling | Location: Office"), None, None);
        assert_eq!(decoded.contact_status, "Calling");
        assert_eq!(decoded.location, "Office");
    }
}
