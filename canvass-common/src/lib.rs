//! # Canvass Common Library
//!
//! Shared code for the Canvass field-interview client:
//! - Error types
//! - Sync event types and the broadcast EventBus
//! - Configuration loading (data root, server URL)

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
