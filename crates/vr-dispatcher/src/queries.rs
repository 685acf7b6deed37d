//! Read-only query handlers.
//!
//! Each query runs one script on the router and parses its output into a
//! typed answer. Queries never go through translation or aggregation.

use std::time::Duration;
use tracing::{debug, warn};
use vr_transport::shell::shellquote;
use vr_transport::{RemoteExecutor, TransportResult};
use vr_types::{CommandPayload, ConfigItem, ExecutionResult, NetworkElementCommand, RouterTarget};

use crate::answer::{
    Answer, CheckRouterAnswer, RedundantState, RouterAlertsAnswer, S2sVpnAnswer, VersionAnswer,
    VpnConnectionState,
};
use crate::error::{DispatchError, DispatchResult};

pub const CHECK_ROUTER_SCRIPT: &str = "checkrouter.sh";
pub const VERSION_SCRIPT: &str = "get_template_version.sh";
pub const S2S_VPN_CHECK_SCRIPT: &str = "checkbatchs2svpn.sh";
pub const ROUTER_ALERTS_SCRIPT: &str = "getRouterAlerts.sh";
pub const DIAGNOSTICS_SCRIPT: &str = "diagnostics.py";
pub const RETRIEVE_DIAGNOSTICS_SCRIPT: &str = "get_diagnostics_files.py";
pub const CLEANUP_SCRIPT: &str = "cleanup.sh";

const NO_ALERTS: &str = "No Alerts";

/// Runs a query command and builds its answer.
///
/// Transport failures come back as `Ok(Answer::Transport(..))` and
/// malformed arguments as a failure answer without touching the router; an
/// `Err` means the command is not a query.
pub async fn execute_query(
    command: &NetworkElementCommand,
    executor: &dyn RemoteExecutor,
    timeout: Duration,
) -> DispatchResult<Answer> {
    if !command.is_query() {
        return Err(DispatchError::unsupported(command.kind()));
    }
    if let Err(e) = command.payload.validate() {
        warn!(router = %command.target.name, error = %e, "Query rejected");
        return Ok(Answer::failure(e.to_string()));
    }

    let target = &command.target;
    let answer = match &command.payload {
        CommandPayload::CheckRouter => {
            run(executor, target, CHECK_ROUTER_SCRIPT, String::new(), timeout)
                .await
                .map(|r| Answer::CheckRouter(parse_check_router(r)))
        }
        CommandPayload::GetVersion => {
            run(executor, target, VERSION_SCRIPT, String::new(), timeout)
                .await
                .map(|r| Answer::Version(parse_version(r)))
        }
        CommandPayload::CheckS2sVpnConnections { peer_ips } => {
            let args = peer_ips
                .iter()
                .map(|ip| ip.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            run(executor, target, S2S_VPN_CHECK_SCRIPT, args, timeout)
                .await
                .map(|r| Answer::S2sVpn(parse_s2s_vpn(r)))
        }
        CommandPayload::GetRouterAlerts {
            previous_alert_timestamp,
        } => {
            let args = shellquote(previous_alert_timestamp);
            run(executor, target, ROUTER_ALERTS_SCRIPT, args, timeout)
                .await
                .map(|r| Answer::RouterAlerts(parse_router_alerts(r)))
        }
        CommandPayload::Diagnostics {
            diagnostics_type,
            destination,
            optional_args,
        } => {
            let args = quote_all(
                [diagnostics_type.as_str(), destination.as_str()]
                    .into_iter()
                    .chain(optional_args.split_whitespace()),
            );
            run(executor, target, DIAGNOSTICS_SCRIPT, args, timeout)
                .await
                .map(Answer::from)
        }
        CommandPayload::PrepareFiles { files } => {
            let args = quote_all(files.iter().map(String::as_str));
            run(executor, target, RETRIEVE_DIAGNOSTICS_SCRIPT, args, timeout)
                .await
                .map(|r| Answer::from(trim_details(r)))
        }
        CommandPayload::DeleteFile { path } => {
            run(executor, target, CLEANUP_SCRIPT, shellquote(path), timeout)
                .await
                .map(Answer::from)
        }
        _ => return Err(DispatchError::unsupported(command.kind())),
    };
    Ok(answer.unwrap_or_else(Answer::Transport))
}

fn quote_all<'a>(args: impl Iterator<Item = &'a str>) -> String {
    args.map(shellquote).collect::<Vec<_>>().join(" ")
}

async fn run(
    executor: &dyn RemoteExecutor,
    target: &RouterTarget,
    script: &str,
    args: String,
    timeout: Duration,
) -> TransportResult<ExecutionResult> {
    let item = ConfigItem::script(script, args);
    debug!(router = %target.name, item = %item, "Running query");
    executor.apply(target, &item, timeout).await
}

fn trim_details(result: ExecutionResult) -> ExecutionResult {
    ExecutionResult {
        success: result.success,
        details: result.details.trim().to_string(),
    }
}

/// Parses `Status: <STATE>` from the router check output.
pub fn parse_check_router(result: ExecutionResult) -> CheckRouterAnswer {
    let state = if result.success {
        result
            .details
            .lines()
            .find_map(|line| line.trim().strip_prefix("Status:"))
            .map(|s| match s.trim() {
                "PRIMARY" | "MASTER" => RedundantState::Primary,
                "BACKUP" => RedundantState::Backup,
                "FAULT" => RedundantState::Fault,
                _ => RedundantState::Unknown,
            })
            .unwrap_or(RedundantState::Unknown)
    } else {
        RedundantState::Unknown
    };
    CheckRouterAnswer {
        result: result.success,
        state,
        details: result.details,
    }
}

/// Parses `<template version>&<scripts signature>`.
pub fn parse_version(result: ExecutionResult) -> VersionAnswer {
    let parsed = result
        .success
        .then(|| result.details.trim().split_once('&'))
        .flatten()
        .map(|(t, s)| (t.trim().to_string(), s.trim().to_string()));
    match parsed {
        Some((template_version, scripts_version)) => VersionAnswer {
            result: true,
            template_version,
            scripts_version,
            details: result.details,
        },
        None => VersionAnswer {
            result: false,
            template_version: String::new(),
            scripts_version: String::new(),
            details: if result.success {
                format!("Unrecognised version output: {}", result.details.trim())
            } else {
                result.details
            },
        },
    }
}

/// Parses `<peer ip>:<code>:<message>` entries separated by `&` or newlines.
/// Code 0 means the tunnel is up.
pub fn parse_s2s_vpn(result: ExecutionResult) -> S2sVpnAnswer {
    let connections = if result.success {
        result
            .details
            .split(['&', '\n'])
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                let mut parts = entry.splitn(3, ':');
                let peer_ip = parts.next()?.to_string();
                let code = parts.next()?.trim();
                let message = parts.next().unwrap_or_default().trim().to_string();
                Some(VpnConnectionState {
                    peer_ip,
                    connected: code == "0",
                    message,
                })
            })
            .collect()
    } else {
        Vec::new()
    };
    S2sVpnAnswer {
        result: result.success,
        connections,
        details: result.details,
    }
}

/// Parses `<timestamp>,<message>` lines. The last alert's timestamp is the
/// continuation for the next poll.
pub fn parse_router_alerts(result: ExecutionResult) -> RouterAlertsAnswer {
    let mut alerts = Vec::new();
    let mut last_alert_timestamp = None;
    if result.success && result.details.trim() != NO_ALERTS {
        for line in result.details.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some((timestamp, _)) = line.split_once(',') {
                last_alert_timestamp = Some(timestamp.trim().to_string());
            }
            alerts.push(line.to_string());
        }
    }
    RouterAlertsAnswer {
        result: result.success,
        alerts,
        last_alert_timestamp,
        details: result.details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vr_dispatch_test::{command, payloads, RecordingExecutor};
    use vr_transport::{InFlightBatch, TransportError};
    use vr_types::DiagnosticsType;

    const TIMEOUT: Duration = Duration::from_secs(600);

    #[test]
    fn test_parse_check_router() {
        let answer = parse_check_router(ExecutionResult::ok("Status: BACKUP\n"));
        assert_eq!(answer.state, RedundantState::Backup);
        assert!(answer.result);

        let answer = parse_check_router(ExecutionResult::ok("garbage"));
        assert_eq!(answer.state, RedundantState::Unknown);

        let answer = parse_check_router(ExecutionResult::failed("Status: PRIMARY"));
        assert_eq!(answer.state, RedundantState::Unknown);
        assert!(!answer.result);
    }

    #[test]
    fn test_parse_version() {
        let answer = parse_version(ExecutionResult::ok("Cloud Router 4.19&abc123\n"));
        assert!(answer.result);
        assert_eq!(answer.template_version, "Cloud Router 4.19");
        assert_eq!(answer.scripts_version, "abc123");

        let answer = parse_version(ExecutionResult::ok("no separator"));
        assert!(!answer.result);
        assert!(answer.details.starts_with("Unrecognised version output"));
    }

    #[test]
    fn test_parse_s2s_vpn() {
        let answer = parse_s2s_vpn(ExecutionResult::ok(
            "203.0.113.1:0:IPsec SA found&203.0.113.2:1:IPsec SA not found\n",
        ));
        assert_eq!(
            answer.connections,
            vec![
                VpnConnectionState {
                    peer_ip: "203.0.113.1".into(),
                    connected: true,
                    message: "IPsec SA found".into(),
                },
                VpnConnectionState {
                    peer_ip: "203.0.113.2".into(),
                    connected: false,
                    message: "IPsec SA not found".into(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_router_alerts() {
        let answer = parse_router_alerts(ExecutionResult::ok(
            "2026-10-01 10:00:00,disk almost full\n2026-10-01 10:05:00,dnsmasq restarted\n",
        ));
        assert_eq!(answer.alerts.len(), 2);
        assert_eq!(
            answer.last_alert_timestamp.as_deref(),
            Some("2026-10-01 10:05:00")
        );

        let answer = parse_router_alerts(ExecutionResult::ok("No Alerts"));
        assert!(answer.result);
        assert!(answer.alerts.is_empty());
        assert_eq!(answer.last_alert_timestamp, None);
    }

    #[tokio::test]
    async fn test_alerts_timestamp_is_quoted() {
        let executor = RecordingExecutor::new();
        let cmd = command(
            "r-1",
            CommandPayload::GetRouterAlerts {
                previous_alert_timestamp: "2026-10-01 10:00:00".into(),
            },
        );
        execute_query(&cmd, &executor, TIMEOUT).await.unwrap();
        assert_eq!(
            executor.scripts(),
            vec![ConfigItem::script(
                ROUTER_ALERTS_SCRIPT,
                "\"2026-10-01 10:00:00\""
            )]
        );
    }

    #[tokio::test]
    async fn test_diagnostics_args() {
        let executor = RecordingExecutor::new();
        let cmd = command(
            "r-1",
            CommandPayload::Diagnostics {
                diagnostics_type: DiagnosticsType::Ping,
                destination: "8.8.8.8".into(),
                optional_args: "-c 5".into(),
            },
        );
        execute_query(&cmd, &executor, TIMEOUT).await.unwrap();
        assert_eq!(
            executor.scripts(),
            vec![ConfigItem::script(
                DIAGNOSTICS_SCRIPT,
                "\"ping\" \"8.8.8.8\" \"-c\" \"5\""
            )]
        );
    }

    #[tokio::test]
    async fn test_diagnostics_rejects_shell_metacharacters_in_destination() {
        let executor = RecordingExecutor::new();
        let cmd = command(
            "r-1",
            CommandPayload::Diagnostics {
                diagnostics_type: DiagnosticsType::Ping,
                destination: "8.8.8.8; rm -rf /etc".into(),
                optional_args: String::new(),
            },
        );
        let answer = execute_query(&cmd, &executor, TIMEOUT).await.unwrap();
        assert!(!answer.result());
        assert!(answer.details().contains("invalid destination host"));
        assert_eq!(executor.apply_count(), 0);
    }

    #[tokio::test]
    async fn test_optional_args_cannot_escape_quoting() {
        let executor = RecordingExecutor::new();
        let cmd = command(
            "r-1",
            CommandPayload::Diagnostics {
                diagnostics_type: DiagnosticsType::Traceroute,
                destination: "router.example".into(),
                optional_args: "-n;reboot $(id)".into(),
            },
        );
        execute_query(&cmd, &executor, TIMEOUT).await.unwrap();
        assert_eq!(
            executor.scripts(),
            vec![ConfigItem::script(
                DIAGNOSTICS_SCRIPT,
                "\"traceroute\" \"router.example\" \"-n;reboot\" \"\\$(id)\""
            )]
        );
    }

    #[tokio::test]
    async fn test_delete_file_path_is_quoted() {
        let executor = RecordingExecutor::new();
        let cmd = command(
            "r-1",
            CommandPayload::DeleteFile {
                path: "/root/diag `x`.zip".into(),
            },
        );
        execute_query(&cmd, &executor, TIMEOUT).await.unwrap();
        assert_eq!(
            executor.scripts(),
            vec![ConfigItem::script(CLEANUP_SCRIPT, "\"/root/diag \\`x\\`.zip\"")]
        );
    }

    #[tokio::test]
    async fn test_prepare_files_returns_archive_path() {
        let executor = RecordingExecutor::new();
        executor.respond_to_script(
            RETRIEVE_DIAGNOSTICS_SCRIPT,
            ExecutionResult::ok("/root/diagnostics_files_1.zip\n"),
        );
        let cmd = command(
            "r-1",
            CommandPayload::PrepareFiles {
                files: vec!["/var/log/messages".into(), "iptables".into()],
            },
        );
        let answer = execute_query(&cmd, &executor, TIMEOUT).await.unwrap();
        assert_eq!(answer.details(), "/root/diagnostics_files_1.zip");
        assert_eq!(
            executor.scripts(),
            vec![ConfigItem::script(
                RETRIEVE_DIAGNOSTICS_SCRIPT,
                "\"/var/log/messages\" \"iptables\""
            )]
        );
    }

    #[tokio::test]
    async fn test_transport_error_becomes_answer() {
        let executor = RecordingExecutor::new();
        let err = TransportError::OperationTimeout(InFlightBatch::new("r-1", 3, TIMEOUT));
        executor.transport_error_when(|_, _| true, err.clone());
        let answer = execute_query(&command("r-1", CommandPayload::CheckRouter), &executor, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(answer, Answer::Transport(err));
    }

    #[tokio::test]
    async fn test_non_query_rejected() {
        let executor = RecordingExecutor::new();
        let result = execute_query(&command("r-1", payloads::firewall_port(22)), &executor, TIMEOUT).await;
        assert!(matches!(result, Err(DispatchError::Unsupported { .. })));
        assert_eq!(executor.apply_count(), 0);
    }
}
