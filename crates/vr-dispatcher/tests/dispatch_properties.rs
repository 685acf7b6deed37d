//! Integration tests for dispatch ordering, batching and failure handling
//!
//! These drive a full [`Dispatcher`] against a recording executor and check
//! what the router would have seen.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use vr_dispatch_test::{
    aggregation_finish, aggregation_start, assert_fragments_in_order, assert_serialized, command,
    file_contents, payloads, script_named, RecordingExecutor,
};
use vr_dispatcher::{
    Answer, Dispatcher, DispatcherConfig, AGGREGATE_HEADER, CHECK_ROUTER_SCRIPT, VR_CFG_SCRIPT,
};
use vr_transport::{InFlightBatch, TransportError};
use vr_types::{CommandPayload, ConfigItem, DiagnosticsType, ExecutionResult};

fn setup() -> (Arc<RecordingExecutor>, Arc<Dispatcher>) {
    setup_with(DispatcherConfig::default())
}

fn setup_with(config: DispatcherConfig) -> (Arc<RecordingExecutor>, Arc<Dispatcher>) {
    let executor = Arc::new(RecordingExecutor::new());
    let dispatcher = Arc::new(Dispatcher::new(executor.clone(), &config));
    (executor, dispatcher)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_target_applies_never_overlap() {
    let executor = Arc::new(RecordingExecutor::new().with_delay(Duration::from_millis(10)));
    let dispatcher = Arc::new(Dispatcher::new(
        executor.clone(),
        &DispatcherConfig::default(),
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        for target in ["r-1", "r-2"] {
            let dispatcher = dispatcher.clone();
            let cmd = command(target, payloads::dhcp_entry(&format!("vm-{}", i)));
            handles.push(tokio::spawn(async move { dispatcher.dispatch(&cmd).await }));
        }
    }
    for handle in handles {
        assert!(handle.await.unwrap().result());
    }

    // two items (file + script) per command
    assert_eq!(executor.records_for("r-1").len(), 16);
    assert_eq!(executor.records_for("r-2").len(), 16);
    assert_serialized(&executor.records()).unwrap();
    assert_eq!(executor.overlap_count(), 0);
}

#[tokio::test]
async fn test_empty_batch_applies_one_file_and_one_script() {
    let (executor, dispatcher) = setup();
    assert!(dispatcher.dispatch(&aggregation_start("r-1")).await.result());
    assert!(dispatcher.dispatch(&aggregation_finish("r-1")).await.result());

    let files = executor.files();
    assert_eq!(files.len(), 1);
    assert_eq!(executor.scripts().len(), 1);
    assert_eq!(
        file_contents(&files[0]),
        Some("#Virtual Router Config File\n<version>\n1.0\n</version>\n")
    );
}

#[tokio::test]
async fn test_five_commands_collapse_into_one_apply() {
    let (executor, dispatcher) = setup();
    dispatcher.dispatch(&aggregation_start("r-1")).await;
    for i in 1..=5 {
        let answer = dispatcher
            .dispatch(&command("r-1", payloads::dhcp_entry(&format!("vm-{}", i))))
            .await;
        assert_eq!(answer, Answer::success(""));
    }
    assert_eq!(executor.apply_count(), 0);

    dispatcher.dispatch(&aggregation_finish("r-1")).await;
    assert_eq!(executor.files().len(), 1);
    assert_eq!(executor.scripts().len(), 1);
}

#[tokio::test]
async fn test_batch_fragments_follow_submission_order() {
    let (executor, dispatcher) = setup();
    dispatcher.dispatch(&aggregation_start("r-1")).await;
    let hosts = ["vm-c", "vm-a", "vm-e", "vm-b", "vm-d"];
    for host in hosts {
        dispatcher
            .dispatch(&command("r-1", payloads::dhcp_entry(host)))
            .await;
    }
    dispatcher.dispatch(&aggregation_finish("r-1")).await;

    let files = executor.files();
    let doc = file_contents(&files[0]).unwrap();
    let markers: Vec<String> = hosts
        .iter()
        .map(|h| format!("\"host_name\":\"{}\"", h))
        .collect();
    let markers: Vec<&str> = markers.iter().map(String::as_str).collect();
    assert_fragments_in_order(doc, &markers).unwrap();
}

#[tokio::test]
async fn test_batch_timeout_scales_with_answers() {
    let (executor, dispatcher) = setup();
    dispatcher.dispatch(&aggregation_start("r-1")).await;
    // 3 + 1 + 1 expected answers
    dispatcher
        .dispatch(&command("r-1", payloads::ip_association(3)))
        .await;
    dispatcher
        .dispatch(&command("r-1", payloads::firewall_port(22)))
        .await;
    dispatcher
        .dispatch(&command("r-1", payloads::static_nat("10.0.0.5")))
        .await;
    dispatcher.dispatch(&aggregation_finish("r-1")).await;

    let records = executor.records();
    assert_eq!(records.len(), 2);
    for record in records {
        assert_eq!(record.timeout, Duration::from_secs(600 + 600 * 5));
    }
}

#[tokio::test]
async fn test_small_batch_timeout_floor() {
    let (executor, dispatcher) = setup_with(DispatcherConfig {
        aggregation_each_timeout_secs: 30,
        ..DispatcherConfig::default()
    });
    dispatcher.dispatch(&aggregation_start("r-1")).await;
    dispatcher.dispatch(&aggregation_finish("r-1")).await;
    assert_eq!(executor.records()[0].timeout, Duration::from_secs(120));
}

#[tokio::test]
async fn test_unknown_command_is_unsupported_without_applies() {
    let (executor, dispatcher) = setup();
    let answer = dispatcher
        .dispatch(&command("r-1", payloads::opaque("ConfigureOvsCommand")))
        .await;
    assert!(answer.is_unsupported());
    assert!(!answer.result());
    assert_eq!(executor.apply_count(), 0);
}

#[tokio::test]
async fn test_failed_file_write_still_discards_session() {
    let (executor, dispatcher) = setup();
    executor.fail_file_writes("No space left on device");

    dispatcher.dispatch(&aggregation_start("r-1")).await;
    dispatcher
        .dispatch(&command("r-1", payloads::firewall_port(22)))
        .await;
    let answer = dispatcher.dispatch(&aggregation_finish("r-1")).await;
    assert_eq!(answer, Answer::failure("No space left on device"));
    assert!(executor.scripts().is_empty());

    assert!(!dispatcher.has_open_session("r-1").await);
    assert!(dispatcher.dispatch(&aggregation_start("r-1")).await.result());
}

#[tokio::test]
async fn test_batch_timeout_carries_queued_commands() {
    let (executor, dispatcher) = setup();
    executor.transport_error_when(
        script_named(VR_CFG_SCRIPT),
        TransportError::OperationTimeout(InFlightBatch::new(
            "r-1",
            4,
            Duration::from_secs(1800),
        )),
    );

    dispatcher.dispatch(&aggregation_start("r-1")).await;
    dispatcher
        .dispatch(&command("r-1", payloads::firewall_port(22)))
        .await;
    dispatcher
        .dispatch(&command("r-1", payloads::static_nat("10.0.0.5")))
        .await;
    let answer = dispatcher.dispatch(&aggregation_finish("r-1")).await;

    let err = answer.transport_error().unwrap();
    assert!(err.marks_target_unhealthy());
    assert!(!err.is_retryable());
    assert_eq!(err.batch().unwrap().commands.len(), 2);
    assert!(!dispatcher.has_open_session("r-1").await);
}

#[tokio::test]
async fn test_cancellation_is_not_unhealthy() {
    let (executor, dispatcher) = setup();
    executor.transport_error_when(
        |_, _| true,
        TransportError::OperationCancelled(InFlightBatch::new("r-1", 1, Duration::from_secs(3))),
    );
    let answer = dispatcher
        .dispatch(&command("r-1", payloads::dhcp_entry("vm-1")))
        .await;
    let err = answer.transport_error().unwrap();
    assert!(err.is_cancellation());
    assert!(!err.marks_target_unhealthy());
    assert_eq!(err.batch().unwrap().commands.len(), 1);
}

#[tokio::test]
async fn test_query_skips_session_prepare_and_cleanup() {
    let (executor, dispatcher) = setup();
    executor.respond_to_script(CHECK_ROUTER_SCRIPT, ExecutionResult::ok("Status: PRIMARY"));

    dispatcher.dispatch(&aggregation_start("r-1")).await;
    let cleaned_before = executor.cleaned().len();

    let answer = dispatcher
        .dispatch(&command("r-1", CommandPayload::CheckRouter))
        .await;
    let Answer::CheckRouter(check) = answer else {
        panic!("expected check router answer, got {:?}", answer);
    };
    assert!(check.result);

    assert_eq!(executor.apply_count(), 1);
    assert!(executor.prepared().is_empty());
    assert_eq!(executor.cleaned().len(), cleaned_before);

    // still open and still empty
    dispatcher.dispatch(&aggregation_finish("r-1")).await;
    let files = executor.files();
    assert_eq!(
        file_contents(&files[0]).unwrap(),
        format!("{}<version>\n1.0\n</version>\n", AGGREGATE_HEADER)
    );
}

#[tokio::test]
async fn test_multi_item_success_requires_every_item() {
    let (executor, dispatcher) = setup();
    // file write fails, script afterwards succeeds
    executor.fail_file_writes("permission denied");

    let answer = dispatcher
        .dispatch(&command("r-1", payloads::dhcp_entry("vm-1")))
        .await;
    let Answer::Group(group) = answer else {
        panic!("expected group answer, got {:?}", answer);
    };
    assert!(!group.result);
    assert_eq!(group.count(), 2);
    assert!(group.results[0].ends_with("failed: permission denied"));
    assert!(group.results[1].contains("success"));
}

#[tokio::test]
async fn test_finish_without_start_fails() {
    let (executor, dispatcher) = setup();
    let answer = dispatcher.dispatch(&aggregation_finish("r-1")).await;
    assert!(!answer.result());
    assert_eq!(executor.apply_count(), 0);
}

#[tokio::test]
async fn test_sessions_are_per_target() {
    let (executor, dispatcher) = setup();
    dispatcher.dispatch(&aggregation_start("r-1")).await;

    let answer = dispatcher
        .dispatch(&command("r-2", payloads::static_nat("10.0.0.9")))
        .await;
    assert!(answer.result());
    assert_eq!(executor.records_for("r-2").len(), 2);
    assert!(executor.records_for("r-1").is_empty());

    let scripts = executor.scripts();
    assert!(matches!(
        &scripts[0],
        ConfigItem::Script { script, .. } if script == "update_config.py"
    ));
}

#[tokio::test]
async fn test_malformed_diagnostics_never_reach_router() {
    let (executor, dispatcher) = setup();
    let answer = dispatcher
        .dispatch(&command(
            "r-1",
            CommandPayload::Diagnostics {
                diagnostics_type: DiagnosticsType::Ping,
                destination: "8.8.8.8; rm -rf /etc".into(),
                optional_args: String::new(),
            },
        ))
        .await;
    assert!(!answer.result());
    assert!(answer.details().contains("invalid destination host"));
    assert_eq!(executor.apply_count(), 0);
}

#[tokio::test]
async fn test_queued_commands_are_prepared() {
    let (executor, dispatcher) = setup();
    dispatcher.dispatch(&aggregation_start("r-1")).await;
    for port in [22, 443] {
        dispatcher
            .dispatch(&command("r-1", payloads::firewall_port(port)))
            .await;
    }
    assert_eq!(executor.prepared().len(), 2);
    assert_eq!(executor.apply_count(), 0);
}
