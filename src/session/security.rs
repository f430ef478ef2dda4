use super::*;

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;

use async_ssh2_tokio::ServerCheckMethod;
use log::{info, warn};
use russh::keys::Algorithm;
use russh::{Preferred, cipher, kex, mac};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config;

/// Opt-in list of deprecated SSH algorithms, as written in the inventory.
///
/// Empty kex, cipher and MAC lists fall back to the `LEGACY_DEFAULT_*` tables
/// in [`config`]. An empty host key list keeps the backend's default order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SshLegacy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kex_algorithms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ciphers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub macs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_key_algorithms: Vec<String>,
}

/// Legacy algorithm lists resolved to the SSH backend's types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyAlgorithms {
    pub kex: Vec<kex::Name>,
    pub ciphers: Vec<cipher::Name>,
    pub macs: Vec<mac::Name>,
    /// `None` keeps the backend's default host key algorithms.
    pub host_keys: Option<Vec<Algorithm>>,
}

impl SshLegacy {
    /// Resolves the configured names, or `None` when legacy mode is off.
    ///
    /// Any name the SSH backend does not implement is a configuration error.
    pub fn resolve(&self) -> Result<Option<LegacyAlgorithms>, HarvestError> {
        if !self.enabled {
            return Ok(None);
        }
        Ok(Some(LegacyAlgorithms {
            kex: resolve_names(
                &self.kex_algorithms,
                config::LEGACY_DEFAULT_KEX,
                "kex algorithm",
                config::kex_by_name,
            )?,
            ciphers: resolve_names(
                &self.ciphers,
                config::LEGACY_DEFAULT_CIPHERS,
                "cipher",
                config::cipher_by_name,
            )?,
            macs: resolve_names(
                &self.macs,
                config::LEGACY_DEFAULT_MACS,
                "mac",
                config::mac_by_name,
            )?,
            host_keys: if self.host_key_algorithms.is_empty() {
                None
            } else {
                Some(resolve_names(
                    &self.host_key_algorithms,
                    &[],
                    "host key algorithm",
                    config::key_type_by_name,
                )?)
            },
        }))
    }
}

fn resolve_names<T>(
    configured: &[String],
    defaults: &[&str],
    kind: &str,
    lookup: fn(&str) -> Option<T>,
) -> Result<Vec<T>, HarvestError> {
    let names: Vec<&str> = if configured.is_empty() {
        defaults.to_vec()
    } else {
        configured.iter().map(|n| n.trim()).collect()
    };
    names
        .into_iter()
        .map(|name| {
            lookup(name).ok_or_else(|| {
                HarvestError::Config(format!("ssh_legacy: unsupported {kind} {name:?}"))
            })
        })
        .collect()
}

impl LegacyAlgorithms {
    pub(super) fn preferred(&self) -> Preferred {
        let defaults = Preferred::default();
        Preferred {
            kex: Cow::Owned(self.kex.clone()),
            key: match &self.host_keys {
                Some(keys) => Cow::Owned(keys.clone()),
                None => defaults.key.clone(),
            },
            cipher: Cow::Owned(self.ciphers.clone()),
            mac: Cow::Owned(self.macs.clone()),
            ..defaults
        }
    }
}

/// Host identity verification for SSH targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Verify host keys against a known_hosts file.
    KnownHosts(PathBuf),
    /// Accept any host key.
    AcceptAny,
}

impl HostKeyPolicy {
    /// Builds the policy from the inventory's `known_hosts_file` setting.
    ///
    /// A missing setting or a missing file degrades to [`HostKeyPolicy::AcceptAny`]
    /// with a warning, so a fresh deployment can still collect.
    pub fn from_known_hosts_file(path: Option<&str>) -> Self {
        match path.map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) if std::path::Path::new(path).is_file() => {
                info!("using known_hosts path={}", path);
                HostKeyPolicy::KnownHosts(PathBuf::from(path))
            }
            Some(path) => {
                warn!(
                    "known_hosts file not found, accepting any host key path={}",
                    path
                );
                HostKeyPolicy::AcceptAny
            }
            None => {
                warn!("known_hosts_file not configured, accepting any host key");
                HostKeyPolicy::AcceptAny
            }
        }
    }

    pub(super) fn server_check(&self) -> ServerCheckMethod {
        match self {
            HostKeyPolicy::KnownHosts(path) => {
                ServerCheckMethod::KnownHostsFile(path.to_string_lossy().into_owned())
            }
            HostKeyPolicy::AcceptAny => ServerCheckMethod::NoCheck,
        }
    }
}

/// Everything the SSH variant needs besides address and credentials.
#[derive(Debug, Clone)]
pub struct ConnectionSecurityOptions {
    pub host_keys: HostKeyPolicy,
    pub legacy: Option<Arc<LegacyAlgorithms>>,
}

impl ConnectionSecurityOptions {
    pub fn new(host_keys: HostKeyPolicy, legacy: Option<Arc<LegacyAlgorithms>>) -> Self {
        Self { host_keys, legacy }
    }

    pub(super) fn preferred(&self) -> Preferred {
        match self.legacy.as_deref() {
            Some(legacy) => legacy.preferred(),
            None => Preferred::default(),
        }
    }
}
