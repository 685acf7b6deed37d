//! Common types for virtual router command dispatch.
//!
//! This crate provides the data model shared by the dispatcher, the
//! transport layer and the test infrastructure:
//!
//! - [`RouterTarget`]: the appliance a command is addressed to
//! - [`NetworkElementCommand`]: an immutable command plus its typed payload
//! - [`ConfigItem`]: a unit of remote effect (file write or script run)
//! - [`ExecutionResult`]: outcome of applying one config item

mod command;
mod config_item;
mod target;

pub use command::{
    AclAction, AclRule, AggregationAction, CommandKind, CommandPayload, DhcpEntry,
    DiagnosticsType, FirewallRule, FirewallRules, GuestNetwork, IpAddressEntry, IpAssociation,
    LoadBalancerConfig, LoadBalancerDestination, LoadBalancerRule, MonitorService,
    MonitoredService, NetworkAcl, NetworkElementCommand, PortForwardingRule, PortForwardingRules,
    Protocol, RemoteAccessVpn, Site2SiteVpn, StaticNatRule, StaticNatRules, StaticRoute,
    StaticRoutes, VmData, VmDataEntry, VmPassword, VpnUser, VpnUsers,
};
pub use config_item::{ConfigItem, ExecutionResult, CONFIG_CACHE_LOCATION, VR_SCRIPT_DIR};
pub use target::RouterTarget;

/// Error raised when a command's arguments are malformed or contradictory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid port range {start}-{end}")]
    InvalidPortRange { start: u16, end: u16 },

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("load balancer rule '{0}' has no destinations")]
    NoDestinations(String),

    #[error("invalid router target: {0}")]
    InvalidTarget(String),

    #[error("invalid destination host '{0}'")]
    InvalidHost(String),
}
