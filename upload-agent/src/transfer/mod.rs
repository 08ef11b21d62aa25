//! Upload transfer and progress reporting.

pub mod engine;
pub mod progress;

pub use engine::{TransferEngine, TransferSettings};
pub use progress::{LogProgress, NoProgress, ProgressObserver};
