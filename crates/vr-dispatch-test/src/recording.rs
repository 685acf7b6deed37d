//! A scriptable in-memory [`RemoteExecutor`] that records every call.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use vr_transport::{RemoteExecutor, TransportError, TransportResult};
use vr_types::{ConfigItem, ExecutionResult, NetworkElementCommand, RouterTarget};

type Matcher = Box<dyn Fn(&RouterTarget, &ConfigItem) -> bool + Send + Sync>;

/// One recorded `apply` call.
#[derive(Debug, Clone)]
pub struct ApplyRecord {
    pub target: String,
    pub item: ConfigItem,
    pub timeout: Duration,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Debug, Clone)]
enum Response {
    Result(ExecutionResult),
    Transport(TransportError),
}

struct Rule {
    matcher: Matcher,
    response: Response,
}

/// Records applies, prepares and cleanups; responds per registered rules.
///
/// Unmatched applies succeed with empty details.
pub struct RecordingExecutor {
    records: Mutex<Vec<ApplyRecord>>,
    rules: Mutex<Vec<Rule>>,
    delay: Mutex<Duration>,
    prepare_result: Mutex<ExecutionResult>,
    prepared: Mutex<Vec<NetworkElementCommand>>,
    cleaned: Mutex<Vec<NetworkElementCommand>>,
    active: Mutex<HashMap<String, usize>>,
    overlaps: AtomicUsize,
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            rules: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            prepare_result: Mutex::new(ExecutionResult::ok("")),
            prepared: Mutex::new(Vec::new()),
            cleaned: Mutex::new(Vec::new()),
            active: Mutex::new(HashMap::new()),
            overlaps: AtomicUsize::new(0),
        }
    }

    /// Every apply sleeps for `delay` before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = delay;
        self
    }

    /// Answers matching applies with `result`.
    pub fn respond_when<F>(&self, matcher: F, result: ExecutionResult)
    where
        F: Fn(&RouterTarget, &ConfigItem) -> bool + Send + Sync + 'static,
    {
        self.rules.lock().push(Rule {
            matcher: Box::new(matcher),
            response: Response::Result(result),
        });
    }

    /// Fails matching applies with `details`.
    pub fn fail_when<F>(&self, matcher: F, details: &str)
    where
        F: Fn(&RouterTarget, &ConfigItem) -> bool + Send + Sync + 'static,
    {
        self.respond_when(matcher, ExecutionResult::failed(details));
    }

    /// Raises `error` from matching applies.
    pub fn transport_error_when<F>(&self, matcher: F, error: TransportError)
    where
        F: Fn(&RouterTarget, &ConfigItem) -> bool + Send + Sync + 'static,
    {
        self.rules.lock().push(Rule {
            matcher: Box::new(matcher),
            response: Response::Transport(error),
        });
    }

    /// Answers runs of `script` with `output`.
    pub fn respond_to_script(&self, script: &str, output: ExecutionResult) {
        self.respond_when(script_named(script), output);
    }

    /// Fails every file write.
    pub fn fail_file_writes(&self, details: &str) {
        self.fail_when(|_, item| matches!(item, ConfigItem::File { .. }), details);
    }

    pub fn set_prepare_result(&self, result: ExecutionResult) {
        *self.prepare_result.lock() = result;
    }

    pub fn records(&self) -> Vec<ApplyRecord> {
        self.records.lock().clone()
    }

    pub fn records_for(&self, target: &str) -> Vec<ApplyRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.target == target)
            .cloned()
            .collect()
    }

    pub fn apply_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Items of all recorded file writes.
    pub fn files(&self) -> Vec<ConfigItem> {
        self.records
            .lock()
            .iter()
            .filter(|r| matches!(r.item, ConfigItem::File { .. }))
            .map(|r| r.item.clone())
            .collect()
    }

    /// Items of all recorded script runs.
    pub fn scripts(&self) -> Vec<ConfigItem> {
        self.records
            .lock()
            .iter()
            .filter(|r| matches!(r.item, ConfigItem::Script { .. }))
            .map(|r| r.item.clone())
            .collect()
    }

    pub fn prepared(&self) -> Vec<NetworkElementCommand> {
        self.prepared.lock().clone()
    }

    pub fn cleaned(&self) -> Vec<NetworkElementCommand> {
        self.cleaned.lock().clone()
    }

    /// Number of applies that started while another apply for the same
    /// target was still running.
    pub fn overlap_count(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn respond(&self, target: &RouterTarget, item: &ConfigItem) -> Response {
        self.rules
            .lock()
            .iter()
            .find(|rule| (rule.matcher)(target, item))
            .map(|rule| rule.response.clone())
            .unwrap_or_else(|| Response::Result(ExecutionResult::ok("")))
    }
}

/// Matches script items running `name`.
pub fn script_named(name: &str) -> impl Fn(&RouterTarget, &ConfigItem) -> bool + Send + Sync {
    let name = name.to_string();
    move |_, item| matches!(item, ConfigItem::Script { script, .. } if *script == name)
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn apply(
        &self,
        target: &RouterTarget,
        item: &ConfigItem,
        timeout: Duration,
    ) -> TransportResult<ExecutionResult> {
        {
            let mut active = self.active.lock();
            let running = active.entry(target.name.clone()).or_insert(0);
            if *running > 0 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            *running += 1;
        }

        let started = Instant::now();
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let response = self.respond(target, item);
        let finished = Instant::now();

        if let Some(running) = self.active.lock().get_mut(&target.name) {
            *running -= 1;
        }
        self.records.lock().push(ApplyRecord {
            target: target.name.clone(),
            item: item.clone(),
            timeout,
            started,
            finished,
        });

        match response {
            Response::Result(result) => Ok(result),
            Response::Transport(err) => Err(err),
        }
    }

    async fn prepare(&self, command: &NetworkElementCommand) -> ExecutionResult {
        self.prepared.lock().push(command.clone());
        self.prepare_result.lock().clone()
    }

    async fn cleanup(&self, command: &NetworkElementCommand) -> ExecutionResult {
        self.cleaned.lock().push(command.clone());
        ExecutionResult::ok("")
    }
}
