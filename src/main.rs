use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use rharvest::collector;
use rharvest::inventory::Inventory;
use rharvest::logging::{LogFormat, init_logging};

/// Collects CLI diagnostics from network devices listed in an inventory file.
#[derive(Debug, Parser)]
#[command(name = "rharvest", version, about)]
struct Cli {
    /// Path to the JSON inventory.
    #[arg(required_unless_present = "print_schema")]
    inventory: Option<PathBuf>,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Raise log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate the inventory and plan jobs without contacting any device.
    #[arg(long)]
    dry_run: bool,

    /// Print the inventory JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.print_schema {
        return match print_schema() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{e:#}");
                ExitCode::FAILURE
            }
        };
    }

    init_logging(cli.verbose, cli.log_format);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

fn print_schema() -> Result<()> {
    let schema = schemars::schema_for!(Inventory);
    let text = serde_json::to_string_pretty(&schema).context("serialize inventory schema")?;
    println!("{text}");
    Ok(())
}

async fn run(cli: &Cli) -> Result<()> {
    let path = cli
        .inventory
        .as_deref()
        .context("missing inventory path")?;
    let inventory = Inventory::load(path)
        .with_context(|| format!("load inventory {}", path.display()))?;

    if cli.dry_run {
        let prepared = collector::prepare(&inventory).context("invalid inventory")?;
        if prepared.settings.resolve_addresses {
            collector::resolve_targets(&prepared.plan.jobs)
                .await
                .context("invalid inventory")?;
        }
        let output_dir = collector::dated_output_dir(&prepared.settings);
        info!(
            "dry run, nothing collected jobs={} output_dir={}",
            prepared.plan.jobs.len(),
            output_dir.display()
        );
        println!("{} jobs -> {}", prepared.plan.jobs.len(), output_dir.display());
        return Ok(());
    }

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    collector::collect(&inventory, &cancel)
        .await
        .context("collection aborted")?;
    Ok(())
}

/// Cancels `cancel` on SIGINT or, on Unix, SIGTERM.
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("failed to install SIGTERM handler: {}", e);
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received, cancelling");
                        cancel.cancel();
                    }
                    return;
                }
            };
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if res.is_err() {
                        return;
                    }
                    warn!("interrupt received, cancelling");
                }
                _ = sigterm.recv() => warn!("SIGTERM received, cancelling"),
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("interrupt received, cancelling");
        }
        cancel.cancel();
    });
}
