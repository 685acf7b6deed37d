//! The remote executor contract.

use async_trait::async_trait;
use std::time::Duration;
use vr_types::{ConfigItem, ExecutionResult, NetworkElementCommand, RouterTarget};

use crate::error::TransportResult;

/// Applies config items on a router.
///
/// `apply` blocks until the item completed, failed, or `timeout` expired.
/// A script that ran and failed is an `Ok` with a failed
/// [`ExecutionResult`]; an `Err` means the transport itself could not
/// deliver a definite outcome. Implementations never retry internally.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn apply(
        &self,
        target: &RouterTarget,
        item: &ConfigItem,
        timeout: Duration,
    ) -> TransportResult<ExecutionResult>;

    /// Runs before a mutating command is processed.
    async fn prepare(&self, _command: &NetworkElementCommand) -> ExecutionResult {
        ExecutionResult::ok("")
    }

    /// Runs after a command completed, unless it was absorbed into an
    /// aggregation session.
    async fn cleanup(&self, _command: &NetworkElementCommand) -> ExecutionResult {
        ExecutionResult::ok("")
    }
}
