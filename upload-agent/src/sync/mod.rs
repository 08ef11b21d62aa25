//! Content fingerprinting, the skip/upload decision and post-upload verification.

pub mod checksum;
pub mod decision;
pub mod verify;

pub use checksum::{fingerprint, Fingerprint};
pub use decision::{decide, Decision};
pub use verify::verify;
