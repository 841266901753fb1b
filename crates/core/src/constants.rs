//! Constants used throughout the sickbay core crate.
//!
//! Collection filenames and runtime defaults live here so the store, the configuration and the
//! binaries agree on them.

/// Default directory for the JSON store when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "sickbay_data";

/// Default bind address for the REST API.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Filename for incident records.
pub const INCIDENTS_FILENAME: &str = "incidents.json";

/// Filename for vaccination and health-check campaigns.
pub const CAMPAIGNS_FILENAME: &str = "campaigns.json";

/// Filename for parent notification batches.
pub const NOTIFICATIONS_FILENAME: &str = "notifications.json";

/// Filename for the student lookup list.
pub const STUDENTS_FILENAME: &str = "students.json";

/// Filename for the staff lookup list.
pub const STAFF_FILENAME: &str = "staff.json";
