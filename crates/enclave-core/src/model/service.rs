use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::ids::ServiceId;

/// Transport protocol of a declared port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Sctp,
}

impl TransportProtocol {
    /// Parse a protocol name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            "sctp" => Some(Self::Sctp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Sctp => "SCTP",
        }
    }
}

impl Default for TransportProtocol {
    fn default() -> Self {
        Self::Tcp
    }
}

/// A port a service declares it listens on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub number: u16,
    pub transport_protocol: TransportProtocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_protocol: Option<String>,
}

impl PortSpec {
    pub fn tcp(number: u16) -> Self {
        Self {
            number,
            transport_protocol: TransportProtocol::Tcp,
            application_protocol: None,
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.transport_protocol.as_str())?;
        if let Some(app) = &self.application_protocol {
            write!(f, " ({})", app)?;
        }
        Ok(())
    }
}

/// Backend-issued reference to a running container
///
/// Opaque to this crate; only the backend interprets the contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a service inside the enclave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Registered,
    Started,
    Stopped,
    Removed,
}

/// Everything the model knows about one registered service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub ip: Ipv4Addr,
    pub ports: BTreeMap<String, PortSpec>,
    pub state: ServiceState,
    /// Set once the backend has started a container; stays `None` in dry runs
    pub handle: Option<ContainerHandle>,
}

impl ServiceRecord {
    pub fn registered(id: ServiceId, ip: Ipv4Addr) -> Self {
        Self {
            id,
            ip,
            ports: BTreeMap::new(),
            state: ServiceState::Registered,
            handle: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.state == ServiceState::Started
    }
}
