//! The command dispatcher.
//!
//! `dispatch` takes the target's lock, routes the command to the query,
//! keystore, aggregation or translate-and-apply path, releases the lock and
//! runs the executor's cleanup step. Everything resolves to an [`Answer`].

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};
use vr_transport::RemoteExecutor;
use vr_types::{AggregationAction, CommandPayload, ConfigItem, ExecutionResult, NetworkElementCommand};

use crate::aggregation::AggregationManager;
use crate::answer::{Answer, GroupAnswer};
use crate::config::DispatcherConfig;
use crate::error::DispatchResult;
use crate::keystore;
use crate::lock_registry::{LockRegistry, TargetState};
use crate::queries;
use crate::timeout::TimeoutPolicy;
use crate::translator::{Translation, Translator};

pub struct Dispatcher {
    locks: LockRegistry,
    translator: Translator,
    aggregation: AggregationManager,
    executor: Arc<dyn RemoteExecutor>,
    policy: TimeoutPolicy,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: &DispatcherConfig) -> Self {
        Self::with_translator(executor, config, Translator::with_default_facades())
    }

    pub fn with_translator(
        executor: Arc<dyn RemoteExecutor>,
        config: &DispatcherConfig,
        translator: Translator,
    ) -> Self {
        let policy = config.timeout_policy();
        Self {
            locks: LockRegistry::new(),
            translator,
            aggregation: AggregationManager::new(config.config_version.clone(), policy),
            executor,
            policy,
        }
    }

    /// Returns true if an aggregation session is open for `target`.
    ///
    /// Waits for the target's lock.
    pub async fn has_open_session(&self, target: &str) -> bool {
        self.locks.acquire(target).await.has_session()
    }

    /// Processes one command under its target's lock.
    #[instrument(skip(self, command), fields(router = %command.target.name, kind = ?command.kind()))]
    pub async fn dispatch(&self, command: &NetworkElementCommand) -> Answer {
        let started = Instant::now();
        let mut state = self.locks.acquire(&command.target.name).await;
        let waited_ms = started.elapsed().as_millis() as u64;

        if command.is_query() {
            let answer = into_answer(
                queries::execute_query(command, self.executor.as_ref(), self.policy.script).await,
            );
            drop(state);
            debug!(waited_ms, elapsed_ms = started.elapsed().as_millis() as u64, result = answer.result(), "Query answered");
            return answer;
        }

        let (answer, absorbed) = self.execute_locked(&mut state, command).await;
        drop(state);

        if !absorbed {
            let cleanup = self.executor.cleanup(command).await;
            if !cleanup.success {
                error!(details = %cleanup.details, "Cleanup after command failed");
            }
        }
        debug!(
            waited_ms,
            elapsed_ms = started.elapsed().as_millis() as u64,
            result = answer.result(),
            absorbed,
            "Command dispatched"
        );
        answer
    }

    /// Returns the answer and whether the command was absorbed into an open
    /// aggregation session.
    async fn execute_locked(
        &self,
        state: &mut TargetState,
        command: &NetworkElementCommand,
    ) -> (Answer, bool) {
        if command.kind().is_keystore() {
            let result =
                keystore::execute_keystore(command, self.executor.as_ref(), self.policy.keystore)
                    .await;
            return (into_answer(result), false);
        }

        if let CommandPayload::AggregationControl { action } = &command.payload {
            let answer = match action {
                AggregationAction::Start => self.aggregation.start(state, &command.target),
                AggregationAction::Finish => {
                    self.aggregation
                        .finish(
                            state,
                            &command.target,
                            &self.translator,
                            self.executor.as_ref(),
                        )
                        .await
                }
            };
            return (answer, false);
        }

        let prepared = self.executor.prepare(command).await;
        if !prepared.success {
            warn!(details = %prepared.details, "Prepare step failed");
            return (Answer::failure(prepared.details), false);
        }

        if let Some(session) = state.session_mut() {
            session.enqueue(command.clone());
            debug!(queued = session.len(), "Command queued for aggregation");
            return (Answer::success(""), true);
        }

        (self.translate_and_apply(command).await, false)
    }

    async fn translate_and_apply(&self, command: &NetworkElementCommand) -> Answer {
        let items = match self.translator.translate(command) {
            Ok(Translation::Items(items)) => items,
            Ok(Translation::Unsupported(kind)) => {
                warn!("No facade registered for command");
                return Answer::unsupported(kind);
            }
            Err(e) => {
                warn!(error = %e, "Command rejected");
                return Answer::failure(e.to_string());
            }
        };

        let mut results = Vec::with_capacity(items.len());
        for item in &items {
            let started = Instant::now();
            match self
                .executor
                .apply(&command.target, item, self.policy.script)
                .await
            {
                Ok(result) => {
                    debug!(
                        item = %item,
                        success = result.success,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Applied config item"
                    );
                    results.push((item, result));
                }
                Err(e) => {
                    warn!(item = %item, error = %e, "Transport failure applying config item");
                    return Answer::Transport(e.with_commands(vec![command.clone()]));
                }
            }
        }
        combine_results(results)
    }
}

/// One result becomes a plain answer, several a group answer that succeeds
/// only if every item did.
fn combine_results(mut results: Vec<(&ConfigItem, ExecutionResult)>) -> Answer {
    if results.len() == 1 {
        if let Some((_, result)) = results.pop() {
            return Answer::from(result);
        }
    }
    let result = results.iter().all(|(_, r)| r.success);
    let results = results
        .into_iter()
        .map(|(item, r)| {
            format!(
                "{} - {}: {}",
                item.description(),
                if r.success { "success" } else { "failed" },
                r.details
            )
        })
        .collect();
    Answer::Group(GroupAnswer { result, results })
}

fn into_answer(result: DispatchResult<Answer>) -> Answer {
    result.unwrap_or_else(|e| Answer::failure(e.to_string()))
}
