//! Test infrastructure for the virtual router command dispatcher
//!
//! Provides:
//! - A recording, scriptable remote executor
//! - Router and command fixtures
//! - Serialization and aggregate-document verification helpers

pub mod fixtures;
mod recording;
mod verification;

pub use fixtures::*;
pub use recording::{script_named, ApplyRecord, RecordingExecutor};
pub use verification::*;
