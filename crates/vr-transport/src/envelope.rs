//! In-flight batch envelope and per-connection sequence numbers.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use vr_types::NetworkElementCommand;

/// The batch of commands a timed-out or cancelled operation was carrying.
///
/// `commands` is dropped when the envelope is serialized; only the target,
/// sequence number, wait time and activity flag cross a process boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InFlightBatch {
    #[serde(skip)]
    pub commands: Vec<NetworkElementCommand>,
    pub target: String,
    pub sequence: u64,
    pub waited: Duration,
    /// True if the connection had been established and was carrying traffic.
    pub connection_active: bool,
}

impl InFlightBatch {
    pub fn new(target: impl Into<String>, sequence: u64, waited: Duration) -> Self {
        Self {
            commands: Vec::new(),
            target: target.into(),
            sequence,
            waited,
            connection_active: false,
        }
    }

    pub fn with_connection_active(mut self, active: bool) -> Self {
        self.connection_active = active;
        self
    }

    pub fn with_commands(mut self, commands: Vec<NetworkElementCommand>) -> Self {
        self.commands = commands;
        self
    }
}

impl fmt::Display for InFlightBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "target {} seq {} after {}ms ({} command(s), connection {})",
            self.target,
            self.sequence,
            self.waited.as_millis(),
            self.commands.len(),
            if self.connection_active {
                "active"
            } else {
                "idle"
            }
        )
    }
}

/// Hands out monotonically increasing sequence numbers per target connection.
#[derive(Debug, Default)]
pub struct SequenceRegistry {
    counters: DashMap<String, u64>,
}

impl SequenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next sequence number for `target`, starting at 1.
    pub fn next(&self, target: &str) -> u64 {
        let mut counter = self.counters.entry(target.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Returns the last issued sequence number for `target` (0 if none).
    pub fn current(&self, target: &str) -> u64 {
        self.counters.get(target).map(|c| *c).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_sequence_per_target() {
        let seq = SequenceRegistry::new();
        assert_eq!(seq.current("r-1"), 0);
        assert_eq!(seq.next("r-1"), 1);
        assert_eq!(seq.next("r-1"), 2);
        assert_eq!(seq.next("r-2"), 1);
        assert_eq!(seq.current("r-1"), 2);
    }

    #[test]
    fn test_sequence_concurrent_monotonic() {
        let seq = Arc::new(SequenceRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || {
                    (0..100).map(|_| seq.next("r-1")).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
        assert_eq!(seq.current("r-1"), 800);
    }

    #[test]
    fn test_commands_not_serialized() {
        let batch = InFlightBatch::new("r-1", 4, Duration::from_secs(3))
            .with_connection_active(true)
            .with_commands(vec![NetworkElementCommand::new(
                "r-1@10.0.0.1".parse().unwrap(),
                vr_types::CommandPayload::BumpUpPriority,
            )]);

        let json = serde_json::to_string(&batch).unwrap();
        assert!(!json.contains("commands"));

        let decoded: InFlightBatch = serde_json::from_str(&json).unwrap();
        assert!(decoded.commands.is_empty());
        assert_eq!(decoded.target, "r-1");
        assert_eq!(decoded.sequence, 4);
        assert_eq!(decoded.waited, Duration::from_secs(3));
        assert!(decoded.connection_active);
    }

    #[test]
    fn test_display() {
        let batch = InFlightBatch::new("r-1", 9, Duration::from_millis(1500));
        assert_eq!(
            batch.to_string(),
            "target r-1 seq 9 after 1500ms (0 command(s), connection idle)"
        );
    }
}
