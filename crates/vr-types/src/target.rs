//! Router target identity.

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// The appliance a command is addressed to.
///
/// `name` is the stable identifier used for per-target serialization,
/// `access_ip` is the address the transport connects to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouterTarget {
    pub name: String,
    pub access_ip: IpAddr,
}

impl RouterTarget {
    pub fn new(name: impl Into<String>, access_ip: IpAddr) -> Self {
        Self {
            name: name.into(),
            access_ip,
        }
    }
}

impl fmt::Display for RouterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.access_ip)
    }
}

/// Parses `name@address`.
impl FromStr for RouterTarget {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, addr) = s
            .split_once('@')
            .ok_or_else(|| ValidationError::InvalidTarget(s.to_string()))?;
        if name.is_empty() {
            return Err(ValidationError::InvalidTarget(s.to_string()));
        }
        let access_ip = addr
            .parse::<IpAddr>()
            .map_err(|_| ValidationError::InvalidTarget(s.to_string()))?;
        Ok(Self::new(name, access_ip))
    }
}
