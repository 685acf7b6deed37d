//! Remote execution for virtual router command dispatch.
//!
//! - [`RemoteExecutor`]: the contract the dispatcher applies config items through
//! - [`SshExecutor`]: the production executor, running scripts over ssh
//! - [`TransportError`]: connection-setup, timeout and cancellation signals
//! - [`InFlightBatch`]: the envelope attached to timeouts and cancellations
//! - [`shell`]: local process execution and quoting

pub mod envelope;
pub mod error;
pub mod executor;
pub mod shell;
pub mod ssh;

pub use envelope::{InFlightBatch, SequenceRegistry};
pub use error::{TransportError, TransportResult};
pub use executor::RemoteExecutor;
pub use ssh::{SshConfig, SshExecutor};
