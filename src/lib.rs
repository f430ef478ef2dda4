//! # rharvest - Bulk CLI Diagnostics Collector for Network Devices
//!
//! `rharvest` logs into many network devices in parallel over SSH or Telnet,
//! runs a fixed vendor-specific list of diagnostic commands on each, and
//! stores one raw text transcript per device.
//!
//! ## Features
//!
//! - **Two Transports**: PTY shell over SSH, or plain Telnet with login handshake
//! - **Vendor Profiles**: Huawei and ZTE command lists and prompt terminators
//! - **Bounded Concurrency**: A fixed worker pool drains one shared job queue
//! - **Retries**: Linear backoff between attempts, cancellable at any point
//! - **Legacy SSH**: Opt-in deprecated algorithms for old device firmware
//! - **Graceful Shutdown**: One cancellation token reaches every read and sleep
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rharvest::collector;
//! use rharvest::inventory::Inventory;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let inventory = Inventory::load("inventory.json")?;
//!     let cancel = CancellationToken::new();
//!
//!     let report = collector::collect(&inventory, &cancel).await?;
//!     println!("{} of {} devices collected", report.succeeded, report.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`inventory::Inventory`] - JSON inventory, validation and job planning
//! - [`pool::WorkerPool`] - Concurrent job execution with retries
//! - [`executor::Harvester`] - One attempt of one job, from connect to transcript file
//! - [`session::Transport`] - Line-oriented session contract shared by SSH and Telnet
//! - [`error::HarvestError`] - Error types for configuration, sessions and persistence

pub mod collector;
pub mod config;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod job;
pub mod logging;
pub mod pool;
pub mod retry;
pub mod session;
pub mod transcript;
pub mod vendor;
