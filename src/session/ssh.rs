use super::*;

use async_ssh2_tokio::Config;
use async_ssh2_tokio::client::{AuthMethod, Client};
use russh::{ChannelMsg, Pty};
use tokio::sync::mpsc::{self, Receiver, Sender};

/// Terminal modes for the PTY: no echo, nominal line speed.
const PTY_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 0),
    (Pty::TTY_OP_ISPEED, 14400),
    (Pty::TTY_OP_OSPEED, 14400),
];
const PTY_TERM: &str = "vt100";
const PTY_COLUMNS: u32 = 80;
const PTY_ROWS: u32 = 200;

/// An interactive shell on a PTY over SSH.
///
/// The russh channel is owned by a background I/O task; this handle talks to
/// it through two mpsc queues, one per direction. Dropping the outgoing queue
/// ends the task and closes the channel.
pub struct SshSession {
    client: Client,
    peer: String,
    sender: Option<Sender<Vec<u8>>>,
    recv: Receiver<Vec<u8>>,
    buffer: ReadBuffer,
}

impl SshSession {
    /// Connects, authenticates with a password and opens a PTY shell.
    ///
    /// Host key verification and algorithm selection come from `security`.
    pub async fn connect(
        addr: &str,
        port: u16,
        username: &str,
        password: &str,
        security: &ConnectionSecurityOptions,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<SshSession, HarvestError> {
        let peer = format!("{addr}:{port}");

        let config = Config {
            preferred: security.preferred(),
            inactivity_timeout: Some(timeout.saturating_mul(2)),
            ..Default::default()
        };

        let handshake = async {
            Client::connect_with_config(
                (addr.to_string(), port),
                username,
                AuthMethod::with_password(password),
                security.host_keys.server_check(),
                config,
            )
            .await
            .map_err(|err| classify_connect_error(&peer, err))
        };
        let client = connect_within(&peer, timeout, cancel, handshake).await?;
        debug!("{} SSH handshake successful", peer);

        let shell_err = |err: russh::Error| HarvestError::Shell {
            addr: peer.clone(),
            reason: err.to_string(),
        };
        let mut channel = client
            .get_channel()
            .await
            .map_err(|err| HarvestError::Shell {
                addr: peer.clone(),
                reason: err.to_string(),
            })?;
        channel
            .request_pty(false, PTY_TERM, PTY_COLUMNS, PTY_ROWS, 0, 0, PTY_MODES)
            .await
            .map_err(shell_err)?;
        channel.request_shell(false).await.map_err(shell_err)?;
        debug!("{} Shell request successful", peer);

        let (sender_to_shell, mut receiver_from_user) = mpsc::channel::<Vec<u8>>(64);
        let (sender_to_user, receiver_from_shell) = mpsc::channel::<Vec<u8>>(256);

        let io_task_peer = peer.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    data = receiver_from_user.recv() => match data {
                        Some(data) => {
                            if let Err(e) = channel.data(&data[..]).await {
                                debug!("{} Failed to send data to shell: {:?}", io_task_peer, e);
                                break;
                            }
                        }
                        None => {
                            let _ = channel.eof().await;
                            let _ = channel.close().await;
                            break;
                        }
                    },
                    msg = channel.wait() => match msg {
                        Some(ChannelMsg::Data { ref data }) => {
                            if sender_to_user.send(data.to_vec()).await.is_err() {
                                debug!(
                                    "{} Shell output receiver dropped. Closing task.",
                                    io_task_peer
                                );
                                break;
                            }
                        }
                        Some(ChannelMsg::ExitStatus { exit_status }) => {
                            debug!(
                                "{} Shell exited with status code: {}",
                                io_task_peer, exit_status
                            );
                            let _ = channel.eof().await;
                            break;
                        }
                        Some(ChannelMsg::Eof) | None => {
                            debug!("{} Shell sent EOF.", io_task_peer);
                            break;
                        }
                        Some(_) => {}
                    }
                }
            }
            debug!("{} SSH I/O task ended.", io_task_peer);
        });

        Ok(SshSession {
            client,
            peer,
            sender: Some(sender_to_shell),
            recv: receiver_from_shell,
            buffer: ReadBuffer::new(),
        })
    }
}

/// Sorts handshake failures into credential/host-key rejections and the rest.
fn classify_connect_error(peer: &str, err: async_ssh2_tokio::Error) -> HarvestError {
    match err {
        async_ssh2_tokio::Error::PasswordWrong | async_ssh2_tokio::Error::ServerCheckFailed => {
            HarvestError::Auth {
                addr: peer.to_string(),
                reason: err.to_string(),
            }
        }
        other => HarvestError::Connect {
            addr: peer.to_string(),
            reason: other.to_string(),
        },
    }
}

impl Transport for SshSession {
    fn peer(&self) -> &str {
        &self.peer
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

    async fn send_line(&mut self, line: &str) -> Result<(), HarvestError> {
        let sender = self.sender.as_ref().ok_or_else(|| HarvestError::Connect {
            addr: self.peer.clone(),
            reason: "session already closed".to_string(),
        })?;
        sender
            .send(format!("{line}\n").into_bytes())
            .await
            .map_err(|_| HarvestError::Connect {
                addr: self.peer.clone(),
                reason: "shell channel closed".to_string(),
            })
    }

    async fn read_chunk(&mut self, wait: Duration) -> Chunk {
        match tokio::time::timeout(wait, self.recv.recv()).await {
            Ok(Some(data)) => Chunk::Data(data),
            Ok(None) => Chunk::Closed,
            Err(_) => Chunk::Idle,
        }
    }

    fn buffer(&mut self) -> &mut ReadBuffer {
        &mut self.buffer
    }

    async fn close(&mut self) {
        debug!("{} Closing SSH session", self.peer);
        // Dropping the sender makes the I/O task send EOF and close the channel.
        self.sender.take();
        self.recv.close();
        if let Err(e) = self.client.disconnect().await {
            debug!("{} SSH disconnect failed: {:?}", self.peer, e);
        }
    }
}
