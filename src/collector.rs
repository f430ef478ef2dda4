//! One collection run from a loaded inventory to the final report.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::HarvestError;
use crate::executor::Harvester;
use crate::inventory::{Inventory, JobPlan, RunSettings, process_env};
use crate::job::Job;
use crate::pool::{PoolReport, WorkerPool};
use crate::retry::RetryPolicy;

/// Everything resolved from the inventory before any device is contacted.
#[derive(Debug)]
pub struct PreparedRun {
    pub settings: RunSettings,
    pub plan: JobPlan,
}

/// Validates the inventory and resolves all jobs without touching the network.
pub fn prepare(inventory: &Inventory) -> Result<PreparedRun, HarvestError> {
    inventory.validate()?;
    let settings = inventory.settings();

    let legacy = inventory.legacy_algorithms()?.map(Arc::new);
    if let Some(legacy) = &legacy {
        warn!(
            "SSH legacy mode enabled, deprecated algorithms allowed \
             kex={:?} ciphers={:?} macs={:?} host_keys={:?}",
            legacy.kex, legacy.ciphers, legacy.macs, legacy.host_keys
        );
    }

    let plan = inventory.plan_jobs(&settings, legacy, process_env)?;
    info!(
        "jobs planned total_assets={} active={} inactive={} skipped={}",
        plan.total, plan.active, plan.inactive, plan.skipped
    );
    Ok(PreparedRun { settings, plan })
}

/// Resolves the address of every job once, before any device is contacted.
///
/// IP literals are accepted as they are. The first name that does not
/// resolve is a configuration error.
pub async fn resolve_targets(jobs: &[Job]) -> Result<(), HarvestError> {
    for job in jobs {
        let target = &job.target;
        if target.address.parse::<IpAddr>().is_ok() {
            continue;
        }
        let resolved = tokio::net::lookup_host((target.address.as_str(), target.port))
            .await
            .map(|mut addrs| addrs.next().is_some());
        match resolved {
            Ok(true) => debug!("{} address resolved", job),
            Ok(false) => {
                return Err(HarvestError::Config(format!(
                    "asset {}: address {} resolves to nothing",
                    target.name, target.address
                )));
            }
            Err(e) => {
                return Err(HarvestError::Config(format!(
                    "asset {}: cannot resolve {}: {}",
                    target.name, target.address, e
                )));
            }
        }
    }
    Ok(())
}

/// Directory for today's transcripts under `base_dir`.
pub fn dated_output_dir(settings: &RunSettings) -> PathBuf {
    settings
        .base_dir
        .join(Local::now().format("%Y-%m-%d").to_string())
}

/// Runs every job of `inventory` and waits for all workers to finish.
///
/// Only configuration problems and a failure to create the output directory
/// are returned as errors; per-device failures are counted in the report.
pub async fn collect(
    inventory: &Inventory,
    cancel: &CancellationToken,
) -> Result<PoolReport, HarvestError> {
    let PreparedRun { settings, plan } = prepare(inventory)?;
    if settings.resolve_addresses {
        resolve_targets(&plan.jobs).await?;
    }

    let output_dir = dated_output_dir(&settings);
    tokio::fs::create_dir_all(&output_dir)
        .await
        .map_err(|e| HarvestError::Config(format!("create {}: {}", output_dir.display(), e)))?;

    info!(
        "starting collection output_dir={} concurrency={} timeout={:?} max_retries={}",
        output_dir.display(),
        settings.concurrency,
        settings.timeout,
        settings.max_retries
    );

    let harvester = Arc::new(Harvester::new(inventory.host_key_policy(), output_dir));
    let pool = WorkerPool::new(settings.concurrency, RetryPolicy::new(settings.max_retries));
    let report = pool.run(plan.jobs, harvester, cancel).await;

    info!(
        "collection finished total={} succeeded={} failed={} cancelled={} not_started={}",
        report.total,
        report.succeeded,
        report.failed,
        report.cancelled,
        report.not_started()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_rejects_invalid_inventory() {
        let err = prepare(&Inventory::default()).expect_err("no groups");
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[test]
    fn dated_output_dir_is_under_base_dir() {
        let settings = Inventory::default().settings();
        let dir = dated_output_dir(&settings);

        assert!(dir.starts_with(&settings.base_dir));
        let day = dir
            .file_name()
            .and_then(|d| d.to_str())
            .expect("day component");
        assert!(chrono::NaiveDate::parse_from_str(day, "%Y-%m-%d").is_ok());
    }

    fn job_at(address: &str) -> Job {
        Job {
            vendor: crate::vendor::Vendor::Huawei,
            username: "u".to_string(),
            password: "p".to_string(),
            target: crate::job::Target::new("a", address, None, crate::job::Protocol::Ssh),
            timeout: std::time::Duration::from_secs(5),
            legacy: None,
        }
    }

    #[tokio::test]
    async fn ip_literals_and_local_names_resolve() {
        resolve_targets(&[job_at("10.0.0.1"), job_at("fe80::1"), job_at("localhost")])
            .await
            .expect("resolvable");
    }

    #[tokio::test]
    async fn unresolvable_name_is_a_config_error() {
        let err = resolve_targets(&[job_at("10.0.0.1"), job_at("no-such-device.invalid")])
            .await
            .expect_err("unresolvable");

        assert!(
            matches!(err, HarvestError::Config(ref msg) if msg.contains("no-such-device.invalid")),
            "{err}"
        );
    }

    #[test]
    fn unresolvable_name_still_validates_without_opt_in() {
        let inventory = Inventory::from_json(
            r#"{ "groups": [ { "vendor": "huawei", "username": "u", "password": "p",
                 "assets": [ { "name": "a", "address": "no-such-device.invalid" } ] } ] }"#,
        )
        .expect("parse");

        let prepared = prepare(&inventory).expect("names are not resolved by default");
        assert!(!prepared.settings.resolve_addresses);
        assert_eq!(prepared.plan.jobs.len(), 1);
    }

    #[tokio::test]
    async fn collect_with_cancelled_token_runs_nothing() {
        let base = tempfile::tempdir().expect("tempdir");
        let inventory = Inventory::from_json(&format!(
            r#"{{ "base_dir": {:?}, "groups": [ {{ "vendor": "zte", "username": "u",
                 "password": "p", "assets": [
                   {{ "name": "a", "address": "127.0.0.1", "port": 1 }}
                 ] }} ] }}"#,
            base.path().display().to_string()
        ))
        .expect("parse");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = collect(&inventory, &cancel).await.expect("collect");

        assert_eq!(report.total, 1);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.not_started(), 1);
    }
}
