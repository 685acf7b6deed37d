//! Test fixtures for common dispatch scenarios
//!
//! Provides reusable routers and command payloads

use std::net::{IpAddr, Ipv4Addr};
use vr_types::{
    AggregationAction, CommandPayload, DhcpEntry, FirewallRule, FirewallRules, IpAddressEntry,
    IpAssociation, NetworkElementCommand, Protocol, RouterTarget, StaticNatRule, StaticNatRules,
};

/// A router on the link-local control network.
///
/// The address is derived from the name so distinct routers get distinct
/// addresses.
pub fn router(name: &str) -> RouterTarget {
    let sum: u32 = name.bytes().map(u32::from).sum();
    let addr = Ipv4Addr::new(169, 254, (sum / 250 % 250) as u8, (sum % 250 + 1) as u8);
    RouterTarget::new(name, IpAddr::V4(addr))
}

pub fn command(target: &str, payload: CommandPayload) -> NetworkElementCommand {
    NetworkElementCommand::new(router(target), payload)
}

pub fn aggregation_start(target: &str) -> NetworkElementCommand {
    command(
        target,
        CommandPayload::AggregationControl {
            action: AggregationAction::Start,
        },
    )
}

pub fn aggregation_finish(target: &str) -> NetworkElementCommand {
    command(
        target,
        CommandPayload::AggregationControl {
            action: AggregationAction::Finish,
        },
    )
}

fn ip(s: &str) -> IpAddr {
    s.parse().expect("fixture IP must parse")
}

/// Common command payload fixtures
pub mod payloads {
    use super::*;

    /// One static NAT rule mapping `public_ip` to a guest address.
    pub fn static_nat(public_ip: &str) -> CommandPayload {
        CommandPayload::StaticNat(StaticNatRules {
            rules: vec![StaticNatRule {
                source_ip: ip(public_ip),
                destination_ip: ip("10.1.1.20"),
                revoked: false,
            }],
        })
    }

    /// Ingress firewall rule opening a single TCP port.
    pub fn firewall_port(port: u16) -> CommandPayload {
        firewall_range(port, port)
    }

    pub fn firewall_range(start: u16, end: u16) -> CommandPayload {
        CommandPayload::FirewallRules(FirewallRules {
            rules: vec![FirewallRule {
                id: u64::from(start),
                source_ip: Some(ip("192.0.2.10")),
                protocol: Protocol::Tcp,
                port_start: Some(start),
                port_end: Some(end),
                source_cidrs: vec!["0.0.0.0/0".to_string()],
                revoked: false,
            }],
            egress: false,
        })
    }

    /// Associates `count` public IPs.
    pub fn ip_association(count: u8) -> CommandPayload {
        CommandPayload::IpAssociation(IpAssociation {
            ip_addresses: (0..count)
                .map(|i| IpAddressEntry {
                    public_ip: IpAddr::V4(Ipv4Addr::new(192, 0, 2, 100 + i)),
                    add: true,
                    source_nat: i == 0,
                    one_to_one_nat: false,
                    netmask: "255.255.255.0".to_string(),
                    vlan_gateway: ip("192.0.2.1"),
                    vif_mac_address: format!("06:00:00:00:00:{:02x}", i),
                    nic_dev_id: 2,
                })
                .collect(),
        })
    }

    pub fn dhcp_entry(host_name: &str) -> CommandPayload {
        CommandPayload::DhcpEntry(DhcpEntry {
            mac_address: "02:00:4c:5f:00:01".to_string(),
            ip_address: ip("10.1.1.20"),
            host_name: host_name.to_string(),
            default_entry: true,
            remove: false,
        })
    }

    /// A command type with no registered facade.
    pub fn opaque(type_name: &str) -> CommandPayload {
        CommandPayload::Opaque {
            type_name: type_name.to_string(),
            params: Default::default(),
        }
    }
}
