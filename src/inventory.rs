//! Inventory file: run settings, device groups and their credentials.
//!
//! The inventory is a JSON document. [`Inventory::validate`] rejects anything
//! that would make the run meaningless before a single connection is opened;
//! [`Inventory::plan_jobs`] then turns every active asset into a [`Job`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{
    DEFAULT_BASE_DIR, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_SECS, MAX_CONCURRENCY, MAX_TIMEOUT_SECS,
};
use crate::error::HarvestError;
use crate::job::{Job, Protocol, Target};
use crate::session::{HostKeyPolicy, LegacyAlgorithms, SshLegacy};
use crate::vendor::Vendor;

/// Top-level inventory document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Inventory {
    /// Root directory for transcripts. A dated subdirectory is created per run.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_dir: String,
    /// Per-command read timeout in seconds.
    #[serde(default)]
    pub timeout_seconds: i64,
    /// Number of devices collected in parallel.
    #[serde(default)]
    pub concurrency: i64,
    /// Extra attempts after a failed one.
    #[serde(default)]
    pub max_retries: i64,
    /// OpenSSH known_hosts file used to verify SSH host keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_hosts_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_legacy: Option<SshLegacy>,
    /// Resolve every planned address before the run and abort on the first
    /// name that does not resolve. Off by default: such a job fails on its own.
    #[serde(default)]
    pub resolve_addresses: bool,
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// Devices of one vendor sharing default credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Group {
    /// `huawei` or `zte`.
    pub vendor: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Environment variable holding the password. Wins over `password` when set.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password_env: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// A single device. Empty credential fields inherit from the group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Asset {
    pub name: String,
    pub address: String,
    /// 0 or absent selects the protocol's well-known port.
    #[serde(default)]
    pub port: i64,
    /// `ssh` (default) or `telnet`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password_env: String,
    /// Inactive assets are counted but never collected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl Asset {
    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(true)
    }
}

/// Run-wide settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub base_dir: PathBuf,
    pub timeout: Duration,
    pub concurrency: usize,
    pub max_retries: u32,
    pub resolve_addresses: bool,
}

/// Jobs produced from an inventory, with the counts logged at startup.
#[derive(Debug, Clone)]
pub struct JobPlan {
    pub jobs: Vec<Job>,
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    /// Active assets left out because no password could be resolved.
    pub skipped: usize,
}

/// Reads `var` from the environment, treating an empty value as unset.
pub fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn resolve_password(
    password: &str,
    password_env: &str,
    env: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    let from_env = if password_env.is_empty() {
        None
    } else {
        env(password_env).filter(|p| !p.is_empty())
    };
    from_env.or_else(|| Some(password.to_string()).filter(|p| !p.is_empty()))
}

impl Inventory {
    /// Loads and parses an inventory file. Does not validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HarvestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, HarvestError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Checks limits, vendors, credentials and addresses.
    pub fn validate(&self) -> Result<(), HarvestError> {
        let fail = |msg: String| Err(HarvestError::Config(msg));

        if self.groups.is_empty() {
            return fail("no groups defined in groups[]".to_string());
        }
        if self.concurrency > MAX_CONCURRENCY as i64 {
            return fail(format!("concurrency too high (max: {MAX_CONCURRENCY})"));
        }
        if self.timeout_seconds > MAX_TIMEOUT_SECS as i64 {
            return fail(format!("timeout too high (max: {MAX_TIMEOUT_SECS}s)"));
        }

        for (i, group) in self.groups.iter().enumerate() {
            if let Err(e) = group.vendor.parse::<Vendor>() {
                return fail(format!("groups[{i}]: {e}"));
            }
            if group.username.trim().is_empty() {
                return fail(format!("groups[{i}]: username must not be empty"));
            }
            if group.password.is_empty() && group.password_env.is_empty() {
                return fail(format!("groups[{i}]: set password or password_env"));
            }
            if group.assets.is_empty() {
                return fail(format!("groups[{i}]: no assets defined"));
            }

            for (j, asset) in group.assets.iter().enumerate() {
                if asset.name.trim().is_empty() {
                    return fail(format!("groups[{i}].assets[{j}]: name must not be empty"));
                }
                let address = asset.address.trim();
                if address.is_empty() || address.contains(char::is_whitespace) {
                    return fail(format!(
                        "groups[{i}].assets[{j}]: invalid address {:?}",
                        asset.address
                    ));
                }
                if !(0..=i64::from(u16::MAX)).contains(&asset.port) {
                    return fail(format!(
                        "groups[{i}].assets[{j}]: invalid port {}",
                        asset.port
                    ));
                }
                if let Err(e) = asset.protocol.parse::<Protocol>() {
                    return fail(format!("groups[{i}].assets[{j}]: {e}"));
                }
            }
        }

        self.legacy_algorithms()?;
        Ok(())
    }

    /// Settings with defaults filled in for missing or non-positive values.
    pub fn settings(&self) -> RunSettings {
        let base_dir = match self.base_dir.trim() {
            "" => DEFAULT_BASE_DIR,
            dir => dir,
        };
        let timeout_secs = if self.timeout_seconds <= 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            self.timeout_seconds as u64
        };
        let concurrency = if self.concurrency <= 0 {
            DEFAULT_CONCURRENCY
        } else {
            self.concurrency as usize
        };
        RunSettings {
            base_dir: PathBuf::from(base_dir),
            timeout: Duration::from_secs(timeout_secs),
            concurrency,
            max_retries: u32::try_from(self.max_retries.max(0)).unwrap_or(u32::MAX),
            resolve_addresses: self.resolve_addresses,
        }
    }

    /// Resolved legacy SSH algorithms, or `None` when legacy mode is off.
    pub fn legacy_algorithms(&self) -> Result<Option<LegacyAlgorithms>, HarvestError> {
        match &self.ssh_legacy {
            Some(legacy) => legacy.resolve(),
            None => Ok(None),
        }
    }

    pub fn host_key_policy(&self) -> HostKeyPolicy {
        HostKeyPolicy::from_known_hosts_file(self.known_hosts_file.as_deref())
    }

    /// Builds one job per active asset.
    ///
    /// `env` looks up `password_env` variables. Call [`Inventory::validate`]
    /// first; invalid vendor or protocol tags are still reported here.
    pub fn plan_jobs(
        &self,
        settings: &RunSettings,
        legacy: Option<Arc<LegacyAlgorithms>>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<JobPlan, HarvestError> {
        let mut plan = JobPlan {
            jobs: Vec::new(),
            total: 0,
            active: 0,
            inactive: 0,
            skipped: 0,
        };

        for group in &self.groups {
            let vendor: Vendor = group.vendor.parse()?;
            let group_password = resolve_password(&group.password, &group.password_env, &env);

            for asset in &group.assets {
                plan.total += 1;
                if !asset.is_active() {
                    plan.inactive += 1;
                    info!(
                        "asset inactive, skipping asset={} address={}",
                        asset.name, asset.address
                    );
                    continue;
                }
                plan.active += 1;

                let username = match asset.username.trim() {
                    "" => group.username.trim(),
                    name => name,
                };
                let Some(password) = resolve_password(&asset.password, &asset.password_env, &env)
                    .or_else(|| group_password.clone())
                else {
                    error!(
                        "password not configured, skipping asset={} vendor={} username={}",
                        asset.name, vendor, username
                    );
                    plan.skipped += 1;
                    continue;
                };

                let protocol: Protocol = asset.protocol.parse()?;
                let port = u16::try_from(asset.port).map_err(|_| {
                    HarvestError::Config(format!(
                        "asset {}: invalid port {}",
                        asset.name, asset.port
                    ))
                })?;

                plan.jobs.push(Job {
                    vendor,
                    username: username.to_string(),
                    password,
                    target: Target::new(
                        asset.name.trim(),
                        asset.address.trim(),
                        Some(port),
                        protocol,
                    ),
                    timeout: settings.timeout,
                    legacy: legacy.clone(),
                });
            }
        }
        Ok(plan)
    }
}
