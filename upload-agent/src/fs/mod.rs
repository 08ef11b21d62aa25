//! Local file system side of a run: path filtering and tree walking.

pub mod filter;
pub mod walker;

pub use filter::PathFilter;
pub use walker::{FileCollector, FileEntry};
