//! Units of work handed to the worker pool.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;
use crate::session::LegacyAlgorithms;
use crate::vendor::Vendor;

/// Line protocol used to reach a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ssh,
    Telnet,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ssh => "ssh",
            Protocol::Telnet => "telnet",
        }
    }

    /// Well-known port for the protocol.
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Ssh => 22,
            Protocol::Telnet => 23,
        }
    }
}

impl FromStr for Protocol {
    type Err = HarvestError;

    /// Parses a protocol tag. A blank tag means SSH.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "ssh" => Ok(Protocol::Ssh),
            "telnet" => Ok(Protocol::Telnet),
            _ => Err(HarvestError::UnknownProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device with its connection parameters fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub address: String,
    /// Never 0: filled from [`Protocol::default_port`] when the inventory omits it.
    pub port: u16,
    pub protocol: Protocol,
}

impl Target {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        port: Option<u16>,
        protocol: Protocol,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port: port
                .filter(|p| *p != 0)
                .unwrap_or_else(|| protocol.default_port()),
            protocol,
        }
    }
}

/// One collection job: a device, the credentials to log in and the vendor
/// dialect to speak.
///
/// Retries reuse the same value; nothing in it changes after creation.
#[derive(Clone)]
pub struct Job {
    pub vendor: Vendor,
    pub username: String,
    pub password: String,
    pub target: Target,
    /// Per-command read timeout, also used for connect and login.
    pub timeout: Duration,
    /// Legacy SSH algorithms shared by every job of the run.
    pub legacy: Option<Arc<LegacyAlgorithms>>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("vendor", &self.vendor)
            .field("username", &self.username)
            .field("password", &"***")
            .field("target", &self.target)
            .field("timeout", &self.timeout)
            .field("legacy", &self.legacy.is_some())
            .finish()
    }
}

impl fmt::Display for Job {
    /// Identity fields used in every log line about this job.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "asset={} vendor={} address={} protocol={}",
            self.target.name, self.vendor, self.target.address, self.target.protocol
        )
    }
}
