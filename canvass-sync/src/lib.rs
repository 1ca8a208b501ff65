//! canvass-sync library interface
//!
//! Offline-first interview synchronization engine: walks the queue of locally
//! stored, not-yet-delivered interview records and drives each one through
//! submit -> attach-media -> verify -> finalize against the collection server,
//! with idempotency and bounded per-class retry.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, FailureClass, SyncError};
pub use crate::services::sync_engine::{SyncEngine, SyncPolicy};
