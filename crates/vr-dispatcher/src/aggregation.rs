//! Aggregation sessions.
//!
//! Between Start and Finish a target's mutating commands are queued instead
//! of applied. Finish folds the queue into a single config document, writes
//! it to the router once and runs the batch script on it once.

use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vr_transport::RemoteExecutor;
use vr_types::{ConfigItem, RouterTarget, CONFIG_CACHE_LOCATION};

use crate::answer::Answer;
use crate::lock_registry::TargetState;
use crate::timeout::TimeoutPolicy;
use crate::translator::{Translation, Translator};

/// First line of every aggregate document.
pub const AGGREGATE_HEADER: &str = "#Virtual Router Config File\n";

/// Batch-apply script on the router.
pub const VR_CFG_SCRIPT: &str = "vr_cfg.sh";

pub const DEFAULT_CONFIG_VERSION: &str = "1.0";

/// Fresh `VR-<uuid>.cfg` name for an aggregate document.
pub fn aggregate_file_name() -> String {
    format!("VR-{}.cfg", Uuid::new_v4())
}

/// Header, version section, then every fragment in order.
pub fn build_document<'a>(
    config_version: &str,
    items: impl IntoIterator<Item = &'a ConfigItem>,
) -> String {
    let mut doc = String::from(AGGREGATE_HEADER);
    doc.push_str("<version>\n");
    doc.push_str(config_version);
    doc.push_str("\n</version>\n");
    for item in items {
        doc.push_str(&item.aggregate_form());
    }
    doc
}

#[derive(Debug, Clone)]
pub struct AggregationManager {
    config_version: String,
    policy: TimeoutPolicy,
}

impl AggregationManager {
    pub fn new(config_version: impl Into<String>, policy: TimeoutPolicy) -> Self {
        Self {
            config_version: config_version.into(),
            policy,
        }
    }

    /// Opens a session on a locked target.
    pub fn start(&self, state: &mut TargetState, target: &RouterTarget) -> Answer {
        if !state.open_session() {
            tracing::error!(router = %target.name, "Aggregation session already open");
            return Answer::failure(format!(
                "Aggregation session already open for {}",
                target.name
            ));
        }
        info!(router = %target.name, "Aggregation session started");
        Answer::success(format!("Aggregation started for {}", target.name))
    }

    /// Applies the queued commands as one batch and discards the session.
    ///
    /// The session is removed before anything is applied, so it is gone
    /// whatever the outcome.
    pub async fn finish(
        &self,
        state: &mut TargetState,
        target: &RouterTarget,
        translator: &Translator,
        executor: &dyn RemoteExecutor,
    ) -> Answer {
        let Some(session) = state.take_session() else {
            warn!(router = %target.name, "Aggregation finish without an open session");
            return Answer::failure(format!("No aggregation session open for {}", target.name));
        };

        if session.is_empty() {
            debug!(router = %target.name, "Finishing an empty aggregation batch");
        }
        let answers = session.answers_count();
        let commands = session.into_commands();
        let mut items = Vec::new();
        for command in &commands {
            match translator.translate(command) {
                Ok(Translation::Items(translated)) => items.extend(translated),
                Ok(Translation::Unsupported(kind)) => {
                    warn!(router = %target.name, kind = ?kind, "Skipping unsupported command in aggregation batch");
                }
                Err(e) => {
                    warn!(router = %target.name, kind = ?command.kind(), error = %e, "Skipping invalid command in aggregation batch");
                }
            }
        }

        let document = build_document(&self.config_version, &items);
        let file_name = aggregate_file_name();
        let path = format!("{}{}", CONFIG_CACHE_LOCATION, file_name);
        let timeout = self.policy.aggregation_timeout(answers);
        info!(
            router = %target.name,
            commands = commands.len(),
            items = items.len(),
            answers,
            timeout_secs = timeout.as_secs(),
            path = %path,
            "Applying aggregated configuration"
        );

        let file = ConfigItem::file(CONFIG_CACHE_LOCATION, file_name, document);
        let started = Instant::now();
        match executor.apply(target, &file, timeout).await {
            Ok(result) if !result.success => {
                warn!(router = %target.name, details = %result.details, "Aggregate file write failed");
                return Answer::from(result);
            }
            Ok(_) => {}
            Err(e) => return Answer::Transport(e.with_commands(commands)),
        }
        debug!(router = %target.name, elapsed_ms = started.elapsed().as_millis() as u64, "Aggregate file written");

        let script = ConfigItem::script(VR_CFG_SCRIPT, format!("-c {}", path));
        match executor.apply(target, &script, timeout).await {
            Ok(result) => {
                info!(
                    router = %target.name,
                    success = result.success,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Aggregated configuration applied"
                );
                Answer::from(result)
            }
            Err(e) => Answer::Transport(e.with_commands(commands)),
        }
    }
}
