use super::*;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SUPPRESS_GO_AHEAD: u8 = 3;

const READ_CHUNK_SIZE: usize = 4096;

/// Login and password prompt fragments, matched ignoring case.
const LOGIN_PROMPTS: &[&str] = &["sername:", "ogin:"];
const PASSWORD_PROMPTS: &[&str] = &["assword:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IacState {
    Data,
    /// Last byte was a CR; a following NUL is padding.
    Cr,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Strips Telnet commands from the inbound stream and builds replies.
///
/// The server may enable echo and suppress-go-ahead on its side; every option
/// it asks us to enable is refused.
#[derive(Debug)]
struct IacParser {
    state: IacState,
}

impl IacParser {
    fn new() -> Self {
        Self {
            state: IacState::Data,
        }
    }

    /// Returns the payload bytes and the negotiation replies for `input`.
    fn feed(&mut self, input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::with_capacity(input.len());
        let mut replies = Vec::new();

        for &byte in input {
            self.state = match (self.state, byte) {
                (IacState::Data | IacState::Cr, IAC) => IacState::Iac,
                (IacState::Cr, 0) => IacState::Data,
                (IacState::Data | IacState::Cr, b'\r') => {
                    data.push(byte);
                    IacState::Cr
                }
                (IacState::Data | IacState::Cr, _) => {
                    data.push(byte);
                    IacState::Data
                }
                (IacState::Iac, IAC) => {
                    data.push(IAC);
                    IacState::Data
                }
                (IacState::Iac, DO | DONT | WILL | WONT) => IacState::Negotiate(byte),
                (IacState::Iac, SB) => IacState::Sub,
                (IacState::Iac, _) => IacState::Data,
                (IacState::Negotiate(cmd), option) => {
                    if let Some(reply) = negotiation_reply(cmd, option) {
                        replies.extend_from_slice(&[IAC, reply, option]);
                    }
                    IacState::Data
                }
                (IacState::Sub, IAC) => IacState::SubIac,
                (IacState::Sub, _) => IacState::Sub,
                (IacState::SubIac, SE) => IacState::Data,
                (IacState::SubIac, _) => IacState::Sub,
            };
        }

        (data, replies)
    }
}

fn negotiation_reply(cmd: u8, option: u8) -> Option<u8> {
    match cmd {
        DO => Some(WONT),
        WILL if option == OPT_ECHO || option == OPT_SUPPRESS_GO_AHEAD => Some(DO),
        WILL => Some(DONT),
        // DONT and WONT confirm a state we never left.
        _ => None,
    }
}

/// Whether the last non-blank line of `text` asks for credentials.
///
/// Devices answer a wrong password by printing an error and prompting for the
/// username again.
fn asks_for_credentials(text: &str) -> bool {
    let last = text
        .trim_end()
        .rsplit(['\r', '\n'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    LOGIN_PROMPTS
        .iter()
        .chain(PASSWORD_PROMPTS)
        .any(|prompt| last.ends_with(*prompt))
}

/// Escapes IAC bytes and terminates the line with CR LF.
fn encode_line(line: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len() + 2);
    for &byte in line.as_bytes() {
        if byte == IAC {
            out.push(IAC);
        }
        out.push(byte);
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// A Telnet session over any byte stream.
///
/// Production code uses [`TelnetSession::connect`] on TCP; tests drive the
/// same state machine over in-memory pipes.
pub struct TelnetSession<S = TcpStream> {
    stream: S,
    peer: String,
    parser: IacParser,
    buffer: ReadBuffer,
}

impl TelnetSession<TcpStream> {
    /// Opens a TCP connection to `addr:port`.
    pub async fn connect(
        addr: &str,
        port: u16,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self, HarvestError> {
        let peer = format!("{addr}:{port}");
        let dial = async {
            TcpStream::connect((addr, port))
                .await
                .map_err(|e| HarvestError::Connect {
                    addr: peer.clone(),
                    reason: e.to_string(),
                })
        };
        let stream = connect_within(&peer, timeout, cancel, dial).await?;
        debug!("{} Telnet TCP connection successful", peer);
        Ok(Self::new(stream, peer))
    }
}

impl<S> TelnetSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream,
            peer: peer.into(),
            parser: IacParser::new(),
            buffer: ReadBuffer::new(),
        }
    }

    async fn expect_prompt(
        &mut self,
        prompts: &[&str],
        what: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), HarvestError> {
        let outcome = self
            .read_until(&PromptSet::ignore_case(prompts), timeout, cancel)
            .await;
        match outcome.status {
            ReadStatus::Matched => Ok(()),
            ReadStatus::Cancelled => Err(HarvestError::Cancelled),
            ReadStatus::TimedOut => Err(HarvestError::Auth {
                addr: self.peer.clone(),
                reason: format!("timeout waiting for {what} prompt"),
            }),
            ReadStatus::Closed => Err(HarvestError::Auth {
                addr: self.peer.clone(),
                reason: format!("connection closed waiting for {what} prompt"),
            }),
        }
    }
}

impl<S> Transport for TelnetSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), HarvestError> {
        let peer = self.peer.clone();
        let auth_err = |err: HarvestError| HarvestError::Auth {
            addr: peer.clone(),
            reason: err.to_string(),
        };

        self.expect_prompt(LOGIN_PROMPTS, "login", timeout, cancel)
            .await?;
        self.send_line(username).await.map_err(auth_err)?;
        self.expect_prompt(PASSWORD_PROMPTS, "password", timeout, cancel)
            .await?;
        self.send_line(password).await.map_err(auth_err)?;
        debug!("{} Telnet credentials sent", self.peer);
        Ok(())
    }

    /// Telnet only learns the login result from what follows the password.
    fn check_login(&self, banner: &ReadOutcome) -> Result<(), HarvestError> {
        let reason = if banner.status == ReadStatus::Closed {
            "connection closed after the password was sent"
        } else if asks_for_credentials(&banner.text) {
            "credentials rejected, device prompted for login again"
        } else {
            return Ok(());
        };
        Err(HarvestError::Auth {
            addr: self.peer.clone(),
            reason: reason.to_string(),
        })
    }

    async fn send_line(&mut self, line: &str) -> Result<(), HarvestError> {
        self.stream.write_all(&encode_line(line)).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_chunk(&mut self, wait: Duration) -> Chunk {
        let mut raw = [0u8; READ_CHUNK_SIZE];
        match tokio::time::timeout(wait, self.stream.read(&mut raw)).await {
            Err(_) => Chunk::Idle,
            Ok(Ok(0)) => Chunk::Closed,
            Ok(Ok(n)) => {
                let (data, replies) = self.parser.feed(&raw[..n]);
                if !replies.is_empty() {
                    trace!("{} negotiation reply {:?}", self.peer, replies);
                    if let Err(e) = self.stream.write_all(&replies).await {
                        debug!("{} Failed to send negotiation reply: {:?}", self.peer, e);
                    }
                }
                if data.is_empty() {
                    Chunk::Idle
                } else {
                    Chunk::Data(data)
                }
            }
            Ok(Err(e)) => {
                debug!("{} Telnet read failed: {:?}", self.peer, e);
                Chunk::Closed
            }
        }
    }

    fn buffer(&mut self) -> &mut ReadBuffer {
        &mut self.buffer
    }

    async fn close(&mut self) {
        debug!("{} Closing Telnet session", self.peer);
        if let Err(e) = self.stream.shutdown().await {
            debug!("{} Telnet shutdown failed: {:?}", self.peer, e);
        }
    }
}
