//! Virtual router command dispatcher
//!
//! Applies management-plane commands to virtual router appliances:
//!
//! - one command at a time per router, through [`LockRegistry`]
//! - Start/Finish aggregation collapsing a burst of commands into one
//!   config document and one script run ([`AggregationManager`])
//! - per-kind facades translating commands into config items ([`Translator`])
//! - timeouts scaled with batch size ([`TimeoutPolicy`])
//!
//! [`Dispatcher::dispatch`] always resolves to an [`Answer`].

mod aggregation;
mod answer;
mod config;
mod dispatcher;
mod error;
mod facades;
mod keystore;
mod lock_registry;
mod queries;
mod timeout;
mod translator;

pub use aggregation::{
    aggregate_file_name, build_document, AggregationManager, AGGREGATE_HEADER,
    DEFAULT_CONFIG_VERSION, VR_CFG_SCRIPT,
};
pub use answer::{
    Answer, CheckRouterAnswer, GroupAnswer, PlainAnswer, RedundantState, RouterAlertsAnswer,
    S2sVpnAnswer, UnsupportedAnswer, VersionAnswer, VpnConnectionState,
};
pub use config::{AppConfig, DispatcherConfig, LoggingConfig, DEFAULT_CONFIG_PATH};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, DispatchResult};
pub use facades::{ConfigItemFacade, JsonConfigFacade, ScriptFacade, UPDATE_CONFIG_SCRIPT};
pub use keystore::{keystore_item, KEYSTORE_IMPORT_SCRIPT, KEYSTORE_SETUP_SCRIPT};
pub use lock_registry::{AggregationSession, LockRegistry, TargetGuard, TargetState};
pub use queries::{
    parse_check_router, parse_router_alerts, parse_s2s_vpn, parse_version, CHECK_ROUTER_SCRIPT,
    CLEANUP_SCRIPT, DIAGNOSTICS_SCRIPT, RETRIEVE_DIAGNOSTICS_SCRIPT, ROUTER_ALERTS_SCRIPT,
    S2S_VPN_CHECK_SCRIPT, VERSION_SCRIPT,
};
pub use timeout::TimeoutPolicy;
pub use translator::{Translation, Translator};
