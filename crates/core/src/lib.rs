//! # Sickbay Core
//!
//! Core workflow logic for school health operations: incident intake and triage, vaccination and
//! checkup campaign tracking, and parent notification batches.
//!
//! This crate contains the pure engines and the desks that drive them:
//! - `codec`: the notes-string metadata grammar
//! - `status`: transition tables for every entity with a lifecycle
//! - `aggregation` / `responses`: derived counts, percentages and list queries
//! - `desk`: serialised workflow services over a [`RemoteStore`]
//! - `store`: the backend boundary and a JSON directory implementation
//!
//! **No API concerns**: HTTP servers and command-line handling belong in `api-rest` and `sickbay-cli`.

pub mod aggregation;
pub mod codec;
pub mod config;
pub mod constants;
pub mod desk;
pub mod error;
pub mod export;
pub mod model;
pub mod responses;
pub mod status;
pub mod store;

pub use config::CoreConfig;
pub use desk::{CampaignDesk, IncidentDesk, NotificationDesk};
pub use error::{WorkflowError, WorkflowResult};
pub use store::{JsonFileStore, RemoteStore, StoreError, StoreResult};
