//! Utility modules for the upload agent.

pub mod errors;
pub mod logger;

pub use errors::{Result, SyncError};
