//! Answers returned to the orchestration caller.

use serde::Serialize;
use vr_transport::TransportError;
use vr_types::{CommandKind, ExecutionResult};

/// Outcome of a dispatched command.
///
/// Every dispatch resolves to exactly one of these; nothing is raised to
/// the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "answer", content = "body", rename_all = "snake_case")]
pub enum Answer {
    /// Single result.
    Plain(PlainAnswer),
    /// One detail line per applied config item.
    Group(GroupAnswer),
    /// No handler exists for the command kind.
    Unsupported(UnsupportedAnswer),
    /// The transport could not deliver a definite outcome.
    Transport(TransportError),
    CheckRouter(CheckRouterAnswer),
    Version(VersionAnswer),
    S2sVpn(S2sVpnAnswer),
    RouterAlerts(RouterAlertsAnswer),
}

impl Answer {
    pub fn success(details: impl Into<String>) -> Self {
        Answer::Plain(PlainAnswer {
            result: true,
            details: details.into(),
        })
    }

    pub fn failure(details: impl Into<String>) -> Self {
        Answer::Plain(PlainAnswer {
            result: false,
            details: details.into(),
        })
    }

    pub fn unsupported(kind: CommandKind) -> Self {
        Answer::Unsupported(UnsupportedAnswer {
            kind: format!("{:?}", kind),
        })
    }

    /// True if the command took effect.
    pub fn result(&self) -> bool {
        match self {
            Answer::Plain(a) => a.result,
            Answer::Group(a) => a.result,
            Answer::Unsupported(_) | Answer::Transport(_) => false,
            Answer::CheckRouter(a) => a.result,
            Answer::Version(a) => a.result,
            Answer::S2sVpn(a) => a.result,
            Answer::RouterAlerts(a) => a.result,
        }
    }

    /// Human-readable detail string.
    pub fn details(&self) -> String {
        match self {
            Answer::Plain(a) => a.details.clone(),
            Answer::Group(a) => a.results.join("\n"),
            Answer::Unsupported(a) => format!("Unsupported command: {}", a.kind),
            Answer::Transport(err) => err.to_string(),
            Answer::CheckRouter(a) => a.details.clone(),
            Answer::Version(a) => a.details.clone(),
            Answer::S2sVpn(a) => a.details.clone(),
            Answer::RouterAlerts(a) => a.details.clone(),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Answer::Unsupported(_))
    }

    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Answer::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ExecutionResult> for Answer {
    fn from(result: ExecutionResult) -> Self {
        Answer::Plain(PlainAnswer {
            result: result.success,
            details: result.details,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlainAnswer {
    pub result: bool,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupAnswer {
    pub result: bool,
    pub results: Vec<String>,
}

impl GroupAnswer {
    pub fn count(&self) -> usize {
        self.results.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsupportedAnswer {
    pub kind: String,
}

/// Redundancy role reported by a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RedundantState {
    Primary,
    Backup,
    Fault,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckRouterAnswer {
    pub result: bool,
    pub state: RedundantState,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionAnswer {
    pub result: bool,
    pub template_version: String,
    pub scripts_version: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VpnConnectionState {
    pub peer_ip: String,
    pub connected: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct S2sVpnAnswer {
    pub result: bool,
    pub connections: Vec<VpnConnectionState>,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterAlertsAnswer {
    pub result: bool,
    pub alerts: Vec<String>,
    /// Timestamp to pass as the continuation on the next poll.
    pub last_alert_timestamp: Option<String>,
    pub details: String,
}
