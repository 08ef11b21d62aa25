//! Upload Agent Library
//!
//! Incremental, content-verified upload of a local directory tree to S3.

pub mod config;
pub mod executor;
pub mod fs;
pub mod report;
pub mod shutdown;
pub mod storage;
pub mod sync;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::accountant::RunResult;
pub use executor::{RunOptions, SyncExecutor};
pub use utils::errors::{Result, SyncError};
