//! Single-job execution: connect, log in, run the vendor commands, persist.
//!
//! [`Harvester`] performs exactly one attempt. Retrying is left to
//! [`run_with_retry`](crate::retry::run_with_retry), which sees the harvester
//! through the [`JobRunner`] trait.

use std::path::PathBuf;

use chrono::Local;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::{EXIT_COMMAND, EXIT_DRAIN_DELAY, INITIAL_PROMPT_TIMEOUT};
use crate::error::HarvestError;
use crate::job::{Job, Protocol};
use crate::retry::JobRunner;
use crate::session::{
    ConnectionSecurityOptions, HostKeyPolicy, PromptSet, ReadStatus, SshSession, TelnetSession,
    Transport,
};
use crate::transcript::Transcript;

/// Runs collection jobs against real devices and stores their transcripts.
#[derive(Debug, Clone)]
pub struct Harvester {
    host_keys: HostKeyPolicy,
    output_dir: PathBuf,
}

impl Harvester {
    /// `output_dir` must exist; transcripts are written directly into it.
    pub fn new(host_keys: HostKeyPolicy, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            host_keys,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    /// Runs one attempt of `job` and returns the captured transcript.
    ///
    /// Nothing touches the network when `cancel` is already triggered.
    pub async fn execute(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<Transcript, HarvestError> {
        if cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }
        let target = &job.target;
        debug!("{} connecting", job);

        match target.protocol {
            Protocol::Ssh => {
                let security =
                    ConnectionSecurityOptions::new(self.host_keys.clone(), job.legacy.clone());
                let session = SshSession::connect(
                    &target.address,
                    target.port,
                    &job.username,
                    &job.password,
                    &security,
                    job.timeout,
                    cancel,
                )
                .await?;
                run_session(session, job, cancel).await
            }
            Protocol::Telnet => {
                let session =
                    TelnetSession::connect(&target.address, target.port, job.timeout, cancel)
                        .await?;
                run_session(session, job, cancel).await
            }
        }
    }

    async fn persist(&self, transcript: Transcript) -> Result<PathBuf, HarvestError> {
        let dir = self.output_dir.clone();
        tokio::task::spawn_blocking(move || transcript.persist(&dir))
            .await
            .map_err(|e| HarvestError::Io(std::io::Error::other(e)))?
    }
}

impl JobRunner for Harvester {
    async fn run(&self, job: &Job, cancel: &CancellationToken) -> Result<(), HarvestError> {
        let transcript = self.execute(job, cancel).await?;
        let path = self.persist(transcript).await?;
        info!("{} transcript saved path={}", job, path.display());
        Ok(())
    }
}

/// Drives an open session and always closes it afterwards.
async fn run_session<T: Transport>(
    mut session: T,
    job: &Job,
    cancel: &CancellationToken,
) -> Result<Transcript, HarvestError> {
    let res = drive(&mut session, job, cancel).await;
    session.close().await;
    res
}

async fn drive<T: Transport>(
    session: &mut T,
    job: &Job,
    cancel: &CancellationToken,
) -> Result<Transcript, HarvestError> {
    let started_at = Local::now();
    session
        .authenticate(&job.username, &job.password, job.timeout, cancel)
        .await?;

    let prompts = PromptSet::exact(job.vendor.prompts());
    let banner = session
        .read_until(&prompts, INITIAL_PROMPT_TIMEOUT, cancel)
        .await;
    if banner.status == ReadStatus::Cancelled {
        return Err(HarvestError::Cancelled);
    }
    session.check_login(&banner)?;
    if banner.status == ReadStatus::TimedOut {
        warn!("{} no initial prompt, continuing", job);
    }

    let mut transcript = Transcript::new(&job.target, job.vendor, started_at);
    run_commands(
        session,
        job.vendor.commands(),
        &prompts,
        job.timeout,
        &mut transcript,
        cancel,
    )
    .await?;

    if session.send_line(EXIT_COMMAND).await.is_ok() {
        tokio::time::sleep(EXIT_DRAIN_DELAY).await;
    }
    Ok(transcript)
}

/// Sends each command in order and records what came back.
///
/// Blank commands are skipped. A read that times out still produces a block
/// with the partial output. A command that cannot be written is logged and
/// skipped. On cancellation the blocks recorded so far stay in `transcript`
/// and [`HarvestError::Cancelled`] is returned.
pub async fn run_commands<T: Transport>(
    session: &mut T,
    commands: &[&str],
    prompts: &PromptSet,
    timeout: std::time::Duration,
    transcript: &mut Transcript,
    cancel: &CancellationToken,
) -> Result<(), HarvestError> {
    for (index, command) in commands.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }
        let command = command.trim();
        if command.is_empty() {
            continue;
        }

        if let Err(e) = session.send_line(command).await {
            let err = HarvestError::Write {
                index,
                command: command.to_string(),
                reason: e.to_string(),
            };
            warn!("{} {}", session.peer(), err);
            continue;
        }

        let outcome = session.read_until(prompts, timeout, cancel).await;
        match outcome.status {
            ReadStatus::Matched => {}
            ReadStatus::TimedOut => warn!(
                "{} command timed out, keeping partial output command={:?} timeout={:?}",
                session.peer(),
                command,
                timeout
            ),
            ReadStatus::Closed => warn!(
                "{} connection closed during command command={:?}",
                session.peer(),
                command
            ),
            ReadStatus::Cancelled => {
                transcript.push(index, command, outcome.text, outcome.status);
                return Err(HarvestError::Cancelled);
            }
        }
        transcript.push(index, command, outcome.text, outcome.status);
    }
    Ok(())
}
