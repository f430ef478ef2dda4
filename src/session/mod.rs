//! Interactive CLI sessions over SSH and Telnet.
//!
//! Both transports share the [`Transport`] contract: send a line, then read
//! until one of a set of prompt strings shows up in the accumulated output or
//! a deadline passes. Reads poll in short slices so a cancellation is noticed
//! within one [`POLL_INTERVAL`](crate::config::POLL_INTERVAL).
//!
//! # Main Components
//!
//! - [`SshSession`] - PTY-backed interactive shell over `async-ssh2-tokio`
//! - [`TelnetSession`] - raw Telnet stream with minimal option negotiation
//! - [`PromptSet`] / [`ReadBuffer`] - prompt detection over accumulated output

use std::future::Future;
use std::time::Duration;

use log::{debug, trace};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::POLL_INTERVAL;
use crate::error::HarvestError;

pub use buffer::{PromptSet, ReadBuffer};
pub use security::{ConnectionSecurityOptions, HostKeyPolicy, LegacyAlgorithms, SshLegacy};
pub use ssh::SshSession;
pub use telnet::TelnetSession;

/// How a [`Transport::read_until`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// A prompt was found in the output.
    Matched,
    /// The deadline passed before any prompt showed up.
    TimedOut,
    /// The peer closed the stream. Whatever arrived before is kept.
    Closed,
    /// The run was cancelled while waiting.
    Cancelled,
}

/// Text captured by one [`Transport::read_until`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Everything read during the call, including the matched prompt.
    pub text: String,
    pub status: ReadStatus,
}

impl ReadOutcome {
    pub fn matched(&self) -> bool {
        self.status == ReadStatus::Matched
    }
}

/// Result of a single poll on the underlying stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Data(Vec<u8>),
    /// Nothing arrived within the poll window.
    Idle,
    /// The stream reached its end.
    Closed,
}

/// A line-oriented interactive session with one device.
///
/// Implementations provide raw chunk polling and line writes; prompt
/// detection is shared through [`Transport::read_until`].
pub trait Transport: Send {
    /// `address:port` of the peer, for log lines.
    fn peer(&self) -> &str;

    /// Logs in on transports that authenticate after connecting.
    ///
    /// SSH authenticates during the handshake, so its implementation is a no-op.
    fn authenticate(
        &mut self,
        username: &str,
        password: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Writes `line` followed by the transport's line terminator.
    fn send_line(&mut self, line: &str) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Waits at most `wait` for the next chunk of output.
    fn read_chunk(&mut self, wait: Duration) -> impl Future<Output = Chunk> + Send;

    /// The accumulation buffer of this session.
    fn buffer(&mut self) -> &mut ReadBuffer;

    /// Closes the connection. Errors are ignored.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    /// Checks the first read after login for a failed login.
    ///
    /// The default rejects a stream that ended before the first prompt.
    fn check_login(&self, banner: &ReadOutcome) -> Result<(), HarvestError> {
        if banner.status == ReadStatus::Closed {
            return Err(HarvestError::Shell {
                addr: self.peer().to_string(),
                reason: "connection closed before the first prompt".to_string(),
            });
        }
        Ok(())
    }

    /// Reads until a prompt appears anywhere in the accumulated output.
    ///
    /// Returns the whole accumulated text on every exit path: match, timeout,
    /// end of stream or cancellation.
    fn read_until(
        &mut self,
        prompts: &PromptSet,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> impl Future<Output = ReadOutcome> + Send {
        async move {
            let deadline = Instant::now() + timeout;
            let status = loop {
                if cancel.is_cancelled() {
                    break ReadStatus::Cancelled;
                }
                let now = Instant::now();
                if now >= deadline {
                    break ReadStatus::TimedOut;
                }
                let wait = POLL_INTERVAL.min(deadline - now);

                let chunk = tokio::select! {
                    _ = cancel.cancelled() => break ReadStatus::Cancelled,
                    chunk = self.read_chunk(wait) => chunk,
                };

                match chunk {
                    Chunk::Data(data) => {
                        trace!("{} <- {:?}", self.peer(), String::from_utf8_lossy(&data));
                        if self.buffer().push(&data, prompts) {
                            break ReadStatus::Matched;
                        }
                    }
                    Chunk::Idle => {}
                    Chunk::Closed => {
                        debug!("{} stream closed while reading", self.peer());
                        break ReadStatus::Closed;
                    }
                }
            };

            ReadOutcome {
                text: self.buffer().take(),
                status,
            }
        }
    }
}

/// Races a connect future against the cancellation token and a deadline.
pub(crate) async fn connect_within<T, F>(
    addr: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    connect: F,
) -> Result<T, HarvestError>
where
    F: Future<Output = Result<T, HarvestError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(HarvestError::Cancelled),
        res = tokio::time::timeout(timeout, connect) => match res {
            Ok(res) => res,
            Err(_) => Err(HarvestError::Connect {
                addr: addr.to_string(),
                reason: format!("timed out after {}s", timeout.as_secs()),
            }),
        },
    }
}

mod buffer;
mod security;
mod ssh;
mod telnet;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays fixed chunks, then reports idle or closed.
    struct Replay {
        chunks: VecDeque<Vec<u8>>,
        close_when_empty: bool,
        buffer: ReadBuffer,
    }

    impl Replay {
        fn new(chunks: &[&str], close_when_empty: bool) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
                close_when_empty,
                buffer: ReadBuffer::new(),
            }
        }
    }

    impl Transport for Replay {
        fn peer(&self) -> &str {
            "replay:0"
        }

        async fn authenticate(
            &mut self,
            _username: &str,
            _password: &str,
            _timeout: Duration,
            _cancel: &CancellationToken,
        ) -> Result<(), HarvestError> {
            Ok(())
        }

        async fn send_line(&mut self, _line: &str) -> Result<(), HarvestError> {
            Ok(())
        }

        async fn read_chunk(&mut self, wait: Duration) -> Chunk {
            match self.chunks.pop_front() {
                Some(data) => Chunk::Data(data),
                None if self.close_when_empty => Chunk::Closed,
                None => {
                    tokio::time::sleep(wait).await;
                    Chunk::Idle
                }
            }
        }

        fn buffer(&mut self) -> &mut ReadBuffer {
            &mut self.buffer
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn read_until_stops_at_first_prompt() {
        let mut replay = Replay::new(&["show ver\r\n", "V1.0\r\nZXR10#", "late"], false);
        let prompts = PromptSet::exact(["#"]);

        let outcome = replay
            .read_until(&prompts, Duration::from_secs(5), &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, ReadStatus::Matched);
        assert_eq!(outcome.text, "show ver\r\nV1.0\r\nZXR10#");
    }

    #[tokio::test(start_paused = true)]
    async fn read_until_returns_partial_text_on_timeout() {
        let mut replay = Replay::new(&["partial output"], false);
        let prompts = PromptSet::exact(["#"]);

        let outcome = replay
            .read_until(&prompts, Duration::from_secs(3), &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, ReadStatus::TimedOut);
        assert_eq!(outcome.text, "partial output");
    }

    #[tokio::test]
    async fn end_of_stream_keeps_partial_text() {
        let mut replay = Replay::new(&["last output\r\n"], true);
        let prompts = PromptSet::exact(["#"]);

        let outcome = replay
            .read_until(&prompts, Duration::from_secs(5), &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, ReadStatus::Closed);
        assert_eq!(outcome.text, "last output\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_long_read() {
        let mut replay = Replay::new(&[], false);
        let prompts = PromptSet::exact(["#"]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome = replay
            .read_until(&prompts, Duration::from_secs(300), &cancel)
            .await;

        assert_eq!(outcome.status, ReadStatus::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn stream_closed_before_first_prompt_fails_login_check() {
        let replay = Replay::new(&[], true);
        let closed = ReadOutcome {
            text: String::new(),
            status: ReadStatus::Closed,
        };
        let silent = ReadOutcome {
            text: "Welcome\r\n".to_string(),
            status: ReadStatus::TimedOut,
        };

        let err = replay.check_login(&closed).expect_err("closed");
        assert!(matches!(err, HarvestError::Shell { .. }), "{err}");
        replay.check_login(&silent).expect("timeout only warns");
    }

    #[tokio::test]
    async fn connect_within_reports_cancellation_before_dialing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let res: Result<(), HarvestError> =
            connect_within("10.0.0.1:22", Duration::from_secs(5), &cancel, async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;

        assert!(matches!(res, Err(HarvestError::Cancelled)));
    }
}
