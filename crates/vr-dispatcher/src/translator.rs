//! Command-kind to facade dispatch table.

use std::collections::HashMap;
use vr_types::{CommandKind, ConfigItem, NetworkElementCommand};

use crate::error::DispatchResult;
use crate::facades::{ConfigItemFacade, JsonConfigFacade, ScriptFacade};

/// Outcome of translating one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Items(Vec<ConfigItem>),
    /// No facade is registered for the command's kind.
    Unsupported(CommandKind),
}

/// Maps command kinds to their facades. Built once, then read-only.
pub struct Translator {
    facades: HashMap<CommandKind, Box<dyn ConfigItemFacade>>,
}

/// (kind, router config type, cache file name) for every JSON-backed kind.
const JSON_FACADES: &[(CommandKind, &str, &str)] = &[
    (CommandKind::IpAssociation, "ips", "ip_associations.json"),
    (CommandKind::FirewallRules, "firewallrules", "firewall_rules.json"),
    (CommandKind::PortForwarding, "forwardrules", "forwarding_rules.json"),
    (CommandKind::StaticNat, "staticnatrules", "static_nat_rules.json"),
    (CommandKind::LoadBalancer, "loadbalancer", "load_balancer.json"),
    (CommandKind::RemoteAccessVpn, "remoteaccessvpn", "remote_access_vpn.json"),
    (CommandKind::Site2SiteVpn, "site2sitevpn", "site_2_site_vpn.json"),
    (CommandKind::VpnUsers, "vpnuserlist", "vpn_user_list.json"),
    (CommandKind::DhcpEntry, "dhcpentry", "vm_dhcp_entry.json"),
    (CommandKind::VmData, "vmdata", "vm_metadata.json"),
    (CommandKind::GuestNetwork, "guestnetwork", "guest_network.json"),
    (CommandKind::MonitorService, "monitorservice", "monitor_service.json"),
    (CommandKind::NetworkAcl, "networkacl", "network_acl.json"),
    (CommandKind::VmPassword, "vmpassword", "vm_password.json"),
    (CommandKind::StaticRoutes, "staticroutes", "static_routes.json"),
];

impl Default for Translator {
    fn default() -> Self {
        Self::with_default_facades()
    }
}

impl Translator {
    /// A translator with no facades; every command is unsupported.
    pub fn empty() -> Self {
        Self {
            facades: HashMap::new(),
        }
    }

    pub fn with_default_facades() -> Self {
        let mut translator = Self::empty();
        for &(kind, config_type, file_name) in JSON_FACADES {
            translator.register(kind, JsonConfigFacade::new(config_type, file_name));
        }
        translator.register(
            CommandKind::BumpUpPriority,
            ScriptFacade::new("bumpup_priority.sh", ""),
        );
        translator
    }

    /// Registers `facade` for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: CommandKind, facade: F)
    where
        F: ConfigItemFacade + 'static,
    {
        self.facades.insert(kind, Box::new(facade));
    }

    pub fn supports(&self, kind: CommandKind) -> bool {
        self.facades.contains_key(&kind)
    }

    /// Validates the command and emits its config items.
    pub fn translate(&self, command: &NetworkElementCommand) -> DispatchResult<Translation> {
        let kind = command.kind();
        let Some(facade) = self.facades.get(&kind) else {
            return Ok(Translation::Unsupported(kind));
        };
        command.payload.validate()?;
        Ok(Translation::Items(facade.generate_items(command)?))
    }
}
