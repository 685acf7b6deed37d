//! Network element commands and their typed payloads.

use crate::{RouterTarget, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// A command addressed to a single router.
///
/// Commands are immutable once submitted; the dispatcher only ever borrows
/// or clones them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkElementCommand {
    pub target: RouterTarget,
    pub payload: CommandPayload,
}

impl NetworkElementCommand {
    pub fn new(target: RouterTarget, payload: CommandPayload) -> Self {
        Self { target, payload }
    }

    pub fn kind(&self) -> CommandKind {
        self.payload.kind()
    }

    /// Returns true if the command has no side effects on the router.
    pub fn is_query(&self) -> bool {
        self.payload.kind().is_query()
    }

    /// Number of answers the management plane expects for this command.
    pub fn answers_count(&self) -> usize {
        self.payload.answers_count()
    }
}

/// Field-less discriminant of [`CommandPayload`], used as the facade key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    CheckRouter,
    GetVersion,
    CheckS2sVpnConnections,
    GetRouterAlerts,
    Diagnostics,
    PrepareFiles,
    DeleteFile,
    SetupKeyStore,
    SetupCertificate,
    AggregationControl,
    IpAssociation,
    FirewallRules,
    PortForwarding,
    StaticNat,
    LoadBalancer,
    RemoteAccessVpn,
    Site2SiteVpn,
    VpnUsers,
    DhcpEntry,
    VmData,
    GuestNetwork,
    MonitorService,
    NetworkAcl,
    VmPassword,
    StaticRoutes,
    BumpUpPriority,
    Opaque,
}

impl CommandKind {
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            CommandKind::CheckRouter
                | CommandKind::GetVersion
                | CommandKind::CheckS2sVpnConnections
                | CommandKind::GetRouterAlerts
                | CommandKind::Diagnostics
                | CommandKind::PrepareFiles
                | CommandKind::DeleteFile
        )
    }

    pub fn is_keystore(&self) -> bool {
        matches!(self, CommandKind::SetupKeyStore | CommandKind::SetupCertificate)
    }
}

/// Start or finish an aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationAction {
    Start,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsType {
    Ping,
    Traceroute,
    Arping,
}

impl DiagnosticsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticsType::Ping => "ping",
            DiagnosticsType::Traceroute => "traceroute",
            DiagnosticsType::Arping => "arping",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    All,
}

/// Command payloads, one variant per command type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandPayload {
    CheckRouter,
    GetVersion,
    CheckS2sVpnConnections {
        peer_ips: Vec<IpAddr>,
    },
    GetRouterAlerts {
        previous_alert_timestamp: String,
    },
    Diagnostics {
        diagnostics_type: DiagnosticsType,
        destination: String,
        #[serde(default)]
        optional_args: String,
    },
    PrepareFiles {
        files: Vec<String>,
    },
    DeleteFile {
        path: String,
    },
    SetupKeyStore {
        keystore_password: String,
        validity_days: u32,
    },
    SetupCertificate {
        certificate: String,
        ca_certificates: String,
        private_key: String,
    },
    AggregationControl {
        action: AggregationAction,
    },
    IpAssociation(IpAssociation),
    FirewallRules(FirewallRules),
    PortForwarding(PortForwardingRules),
    StaticNat(StaticNatRules),
    LoadBalancer(LoadBalancerConfig),
    RemoteAccessVpn(RemoteAccessVpn),
    Site2SiteVpn(Site2SiteVpn),
    VpnUsers(VpnUsers),
    DhcpEntry(DhcpEntry),
    VmData(VmData),
    GuestNetwork(GuestNetwork),
    MonitorService(MonitorService),
    NetworkAcl(NetworkAcl),
    VmPassword(VmPassword),
    StaticRoutes(StaticRoutes),
    BumpUpPriority,
    /// A command type this build has no model for.
    Opaque {
        type_name: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
}

impl CommandPayload {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandPayload::CheckRouter => CommandKind::CheckRouter,
            CommandPayload::GetVersion => CommandKind::GetVersion,
            CommandPayload::CheckS2sVpnConnections { .. } => CommandKind::CheckS2sVpnConnections,
            CommandPayload::GetRouterAlerts { .. } => CommandKind::GetRouterAlerts,
            CommandPayload::Diagnostics { .. } => CommandKind::Diagnostics,
            CommandPayload::PrepareFiles { .. } => CommandKind::PrepareFiles,
            CommandPayload::DeleteFile { .. } => CommandKind::DeleteFile,
            CommandPayload::SetupKeyStore { .. } => CommandKind::SetupKeyStore,
            CommandPayload::SetupCertificate { .. } => CommandKind::SetupCertificate,
            CommandPayload::AggregationControl { .. } => CommandKind::AggregationControl,
            CommandPayload::IpAssociation(_) => CommandKind::IpAssociation,
            CommandPayload::FirewallRules(_) => CommandKind::FirewallRules,
            CommandPayload::PortForwarding(_) => CommandKind::PortForwarding,
            CommandPayload::StaticNat(_) => CommandKind::StaticNat,
            CommandPayload::LoadBalancer(_) => CommandKind::LoadBalancer,
            CommandPayload::RemoteAccessVpn(_) => CommandKind::RemoteAccessVpn,
            CommandPayload::Site2SiteVpn(_) => CommandKind::Site2SiteVpn,
            CommandPayload::VpnUsers(_) => CommandKind::VpnUsers,
            CommandPayload::DhcpEntry(_) => CommandKind::DhcpEntry,
            CommandPayload::VmData(_) => CommandKind::VmData,
            CommandPayload::GuestNetwork(_) => CommandKind::GuestNetwork,
            CommandPayload::MonitorService(_) => CommandKind::MonitorService,
            CommandPayload::NetworkAcl(_) => CommandKind::NetworkAcl,
            CommandPayload::VmPassword(_) => CommandKind::VmPassword,
            CommandPayload::StaticRoutes(_) => CommandKind::StaticRoutes,
            CommandPayload::BumpUpPriority => CommandKind::BumpUpPriority,
            CommandPayload::Opaque { .. } => CommandKind::Opaque,
        }
    }

    /// Rule-list payloads expect one answer per entry, everything else one.
    pub fn answers_count(&self) -> usize {
        let entries = match self {
            CommandPayload::IpAssociation(p) => p.ip_addresses.len(),
            CommandPayload::FirewallRules(p) => p.rules.len(),
            CommandPayload::PortForwarding(p) => p.rules.len(),
            CommandPayload::StaticNat(p) => p.rules.len(),
            CommandPayload::LoadBalancer(p) => p.rules.len(),
            CommandPayload::VpnUsers(p) => p.users.len(),
            CommandPayload::VmData(p) => p.entries.len(),
            CommandPayload::NetworkAcl(p) => p.rules.len(),
            CommandPayload::StaticRoutes(p) => p.routes.len(),
            _ => 1,
        };
        entries.max(1)
    }

    /// Checks the payload's arguments for malformed or contradictory values.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            CommandPayload::IpAssociation(p) => {
                if p.ip_addresses.is_empty() {
                    return Err(ValidationError::EmptyField {
                        field: "ip_addresses",
                    });
                }
            }
            CommandPayload::FirewallRules(p) => {
                for rule in &p.rules {
                    check_range(rule.port_start, rule.port_end)?;
                }
            }
            CommandPayload::PortForwarding(p) => {
                for rule in &p.rules {
                    check_range(Some(rule.source_port_start), Some(rule.source_port_end))?;
                    check_range(
                        Some(rule.destination_port_start),
                        Some(rule.destination_port_end),
                    )?;
                }
            }
            CommandPayload::LoadBalancer(p) => {
                if let Some(rule) = p
                    .rules
                    .iter()
                    .find(|r| !r.revoked && r.destinations.is_empty())
                {
                    return Err(ValidationError::NoDestinations(rule.name.clone()));
                }
            }
            CommandPayload::RemoteAccessVpn(p) if p.create && p.pre_shared_key.is_empty() => {
                return Err(ValidationError::EmptyField {
                    field: "pre_shared_key",
                });
            }
            CommandPayload::Site2SiteVpn(p) if p.create && p.ipsec_psk.is_empty() => {
                return Err(ValidationError::EmptyField { field: "ipsec_psk" });
            }
            CommandPayload::VmData(p) => {
                if p.entries.iter().any(|e| e.folder.is_empty() || e.file.is_empty()) {
                    return Err(ValidationError::EmptyField {
                        field: "vm_data.folder/file",
                    });
                }
            }
            CommandPayload::NetworkAcl(p) => {
                for rule in &p.rules {
                    check_range(rule.port_start, rule.port_end)?;
                }
            }
            CommandPayload::Diagnostics { destination, .. } => {
                if !is_valid_host(destination) {
                    return Err(ValidationError::InvalidHost(destination.clone()));
                }
            }
            CommandPayload::PrepareFiles { files } => {
                if files.is_empty() || files.iter().any(|f| f.trim().is_empty()) {
                    return Err(ValidationError::EmptyField { field: "files" });
                }
            }
            CommandPayload::DeleteFile { path } if path.trim().is_empty() => {
                return Err(ValidationError::EmptyField { field: "path" });
            }
            _ => {}
        }
        Ok(())
    }
}

/// Accepts an IP address or an RFC 1123 host name.
fn is_valid_host(host: &str) -> bool {
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    !host.is_empty()
        && host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

fn check_range(start: Option<u16>, end: Option<u16>) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => {
            Err(ValidationError::InvalidPortRange { start, end })
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpAddressEntry {
    pub public_ip: IpAddr,
    pub add: bool,
    #[serde(default)]
    pub source_nat: bool,
    #[serde(default)]
    pub one_to_one_nat: bool,
    pub netmask: String,
    pub vlan_gateway: IpAddr,
    pub vif_mac_address: String,
    #[serde(default)]
    pub nic_dev_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpAssociation {
    pub ip_addresses: Vec<IpAddressEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub id: u64,
    pub source_ip: Option<IpAddr>,
    pub protocol: Protocol,
    pub port_start: Option<u16>,
    pub port_end: Option<u16>,
    #[serde(default)]
    pub source_cidrs: Vec<String>,
    #[serde(default)]
    pub revoked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallRules {
    pub rules: Vec<FirewallRule>,
    #[serde(default)]
    pub egress: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortForwardingRule {
    pub source_ip: IpAddr,
    pub source_port_start: u16,
    pub source_port_end: u16,
    pub destination_ip: IpAddr,
    pub destination_port_start: u16,
    pub destination_port_end: u16,
    pub protocol: Protocol,
    #[serde(default)]
    pub revoked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortForwardingRules {
    pub rules: Vec<PortForwardingRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticNatRule {
    pub source_ip: IpAddr,
    pub destination_ip: IpAddr,
    #[serde(default)]
    pub revoked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticNatRules {
    pub rules: Vec<StaticNatRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerDestination {
    pub ip: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerRule {
    pub name: String,
    pub public_ip: IpAddr,
    pub public_port: u16,
    pub algorithm: String,
    pub destinations: Vec<LoadBalancerDestination>,
    #[serde(default)]
    pub revoked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub rules: Vec<LoadBalancerRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAccessVpn {
    pub create: bool,
    pub local_ip: IpAddr,
    pub local_cidr: String,
    pub ip_range: String,
    pub pre_shared_key: String,
    #[serde(default)]
    pub vpc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site2SiteVpn {
    pub create: bool,
    pub local_public_ip: IpAddr,
    pub local_guest_cidr: String,
    pub peer_gateway_ip: IpAddr,
    pub peer_guest_cidr_list: String,
    pub ipsec_psk: String,
    pub ike_policy: String,
    pub esp_policy: String,
    pub ike_lifetime: u64,
    pub esp_lifetime: u64,
    #[serde(default)]
    pub dpd: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpnUser {
    pub username: String,
    pub password: String,
    pub add: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpnUsers {
    pub users: Vec<VpnUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhcpEntry {
    pub mac_address: String,
    pub ip_address: IpAddr,
    pub host_name: String,
    #[serde(default)]
    pub default_entry: bool,
    #[serde(default)]
    pub remove: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmDataEntry {
    pub folder: String,
    pub file: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmData {
    pub vm_ip: IpAddr,
    pub entries: Vec<VmDataEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestNetwork {
    pub add: bool,
    pub mac_address: String,
    pub router_ip: IpAddr,
    pub cidr: String,
    pub gateway: IpAddr,
    #[serde(default)]
    pub dns: Vec<IpAddr>,
    #[serde(default)]
    pub domain_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredService {
    pub service_name: String,
    pub process_name: String,
    pub pidfile: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorService {
    pub enabled: bool,
    pub services: Vec<MonitoredService>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclRule {
    pub number: u32,
    pub protocol: Protocol,
    pub port_start: Option<u16>,
    pub port_end: Option<u16>,
    pub cidr: String,
    pub action: AclAction,
    #[serde(default)]
    pub egress: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAcl {
    pub nic_mac_address: String,
    pub rules: Vec<AclRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmPassword {
    pub vm_ip: IpAddr,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub cidr: String,
    pub gateway: IpAddr,
    #[serde(default)]
    pub revoked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticRoutes {
    pub routes: Vec<StaticRoute>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    fn firewall(port_start: u16, port_end: u16) -> CommandPayload {
        CommandPayload::FirewallRules(FirewallRules {
            rules: vec![FirewallRule {
                id: 1,
                source_ip: Some(ip(10, 0, 0, 5)),
                protocol: Protocol::Tcp,
                port_start: Some(port_start),
                port_end: Some(port_end),
                source_cidrs: vec!["0.0.0.0/0".to_string()],
                revoked: false,
            }],
            egress: false,
        })
    }

    #[test]
    fn test_query_kinds() {
        assert!(CommandPayload::CheckRouter.kind().is_query());
        assert!(CommandPayload::DeleteFile {
            path: "/tmp/x".into()
        }
        .kind()
        .is_query());
        assert!(!CommandPayload::BumpUpPriority.kind().is_query());
        assert!(!firewall(22, 22).kind().is_query());
    }

    #[test]
    fn test_keystore_kinds() {
        assert!(CommandKind::SetupKeyStore.is_keystore());
        assert!(CommandKind::SetupCertificate.is_keystore());
        assert!(!CommandKind::AggregationControl.is_keystore());
    }

    #[test]
    fn test_answers_count() {
        assert_eq!(firewall(22, 22).answers_count(), 1);
        let routes = CommandPayload::StaticRoutes(StaticRoutes {
            routes: vec![
                StaticRoute {
                    cidr: "10.1.0.0/16".into(),
                    gateway: ip(10, 0, 0, 1),
                    revoked: false,
                },
                StaticRoute {
                    cidr: "10.2.0.0/16".into(),
                    gateway: ip(10, 0, 0, 1),
                    revoked: true,
                },
            ],
        });
        assert_eq!(routes.answers_count(), 2);
        assert_eq!(
            CommandPayload::StaticRoutes(StaticRoutes { routes: vec![] }).answers_count(),
            1
        );
        assert_eq!(CommandPayload::BumpUpPriority.answers_count(), 1);
    }

    #[test]
    fn test_validate_port_range() {
        assert!(firewall(22, 22).validate().is_ok());
        assert_eq!(
            firewall(100, 10).validate(),
            Err(ValidationError::InvalidPortRange {
                start: 100,
                end: 10
            })
        );
    }

    #[test]
    fn test_validate_empty_ip_association() {
        let payload = CommandPayload::IpAssociation(IpAssociation {
            ip_addresses: vec![],
        });
        assert!(matches!(
            payload.validate(),
            Err(ValidationError::EmptyField {
                field: "ip_addresses"
            })
        ));
    }

    #[test]
    fn test_validate_vpn_psk() {
        let mut vpn = RemoteAccessVpn {
            create: true,
            local_ip: ip(10, 1, 1, 1),
            local_cidr: "10.1.1.0/24".into(),
            ip_range: "10.1.2.2-10.1.2.8".into(),
            pre_shared_key: String::new(),
            vpc: false,
        };
        assert!(CommandPayload::RemoteAccessVpn(vpn.clone()).validate().is_err());

        // Removing a VPN does not need a key
        vpn.create = false;
        assert!(CommandPayload::RemoteAccessVpn(vpn).validate().is_ok());
    }

    #[test]
    fn test_validate_load_balancer_without_destinations() {
        let payload = CommandPayload::LoadBalancer(LoadBalancerConfig {
            rules: vec![LoadBalancerRule {
                name: "web".into(),
                public_ip: ip(192, 0, 2, 10),
                public_port: 80,
                algorithm: "roundrobin".into(),
                destinations: vec![],
                revoked: false,
            }],
        });
        assert_eq!(
            payload.validate(),
            Err(ValidationError::NoDestinations("web".into()))
        );
    }

    fn diagnostics(destination: &str) -> CommandPayload {
        CommandPayload::Diagnostics {
            diagnostics_type: DiagnosticsType::Ping,
            destination: destination.into(),
            optional_args: String::new(),
        }
    }

    #[test]
    fn test_validate_diagnostics_destination() {
        assert!(diagnostics("8.8.8.8").validate().is_ok());
        assert!(diagnostics("fd00::1").validate().is_ok());
        assert!(diagnostics("mirror.example-1.org").validate().is_ok());

        for bad in ["", "8.8.8.8; rm -rf /etc", "$(reboot)", "-oops.example", "a..b"] {
            assert_eq!(
                diagnostics(bad).validate(),
                Err(ValidationError::InvalidHost(bad.into())),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_validate_diagnostics_files() {
        assert!(CommandPayload::PrepareFiles { files: vec![] }.validate().is_err());
        assert!(CommandPayload::PrepareFiles {
            files: vec!["iptables".into(), " ".into()]
        }
        .validate()
        .is_err());
        assert!(CommandPayload::DeleteFile { path: "".into() }.validate().is_err());
        assert!(CommandPayload::DeleteFile {
            path: "/root/diagnostics_files_1.zip".into()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_serde_tagging() {
        let json = r#"{"type":"aggregation_control","action":"start"}"#;
        let payload: CommandPayload = serde_json::from_str(json).unwrap();
        assert_eq!(
            payload,
            CommandPayload::AggregationControl {
                action: AggregationAction::Start
            }
        );

        let json = r#"{"type":"opaque","type_name":"SetBgpPeersCommand"}"#;
        let payload: CommandPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.kind(), CommandKind::Opaque);
    }
}
