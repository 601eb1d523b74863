//! Module `channel`
//!
//! The FTP control connection: connects, reads the greeting, authenticates and
//! exchanges strictly paired commands and replies.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;

use crate::control::{ConnectionOptions, ConnectionState};
use crate::error::{FtpClientError, Operation, Result, TimeoutKind, classify_failure};
use crate::protocol::{Command, Response, ResponseAssembler, ResponseClass};
use crate::transfer::{IdleHandler, IdleStop, IdleWatch, TransferMode};

/// Extra time allowed after an ABOR for a late second reply
const ABORT_SETTLE: Duration = Duration::from_millis(250);

/// A control connection to one FTP server.
///
/// Single-operation-at-a-time: a command is never written while the reply
/// to the previous one (including the completion reply of a running
/// transfer) is outstanding.
pub struct ControlChannel {
    stream: Option<BufReader<TcpStream>>,
    state: ConnectionState,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    welcome: Option<Response>,
    last_response: Option<Response>,
    options: ConnectionOptions,
    line_buf: Vec<u8>,
    awaiting_completion: bool,
}

/// Maps a failed TCP connect to the matching error kind
pub(crate) fn map_connect_error(target: &str, error: io::Error) -> FtpClientError {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => {
            FtpClientError::ConnectionRefused(format!("{}: {}", target, error))
        }
        io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::AddrNotAvailable => {
            FtpClientError::HostUnreachable(format!("{}: {}", target, error))
        }
        io::ErrorKind::TimedOut => FtpClientError::Timeout(TimeoutKind::Connect),
        _ => FtpClientError::ConnectionLost(error),
    }
}

impl ControlChannel {
    /// Opens a TCP connection and consumes the server greeting.
    ///
    /// Each resolved address is tried in turn within the connect timeout.
    pub async fn connect(host: &str, port: u16, options: ConnectionOptions) -> Result<Self> {
        let target = format!("{}:{}", host, port);
        info!("Connecting to FTP server {}", target);

        let addrs: Vec<SocketAddr> = lookup_host(target.as_str())
            .await
            .map_err(|e| FtpClientError::HostUnreachable(format!("{}: {}", target, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(FtpClientError::HostUnreachable(format!(
                "{}: no addresses resolved",
                target
            )));
        }

        let connect_all = async {
            let mut last_error = None;
            for addr in &addrs {
                match TcpStream::connect(*addr).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        debug!("Connect to {} failed: {}", addr, e);
                        last_error = Some(e);
                    }
                }
            }
            Err(last_error.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable)))
        };

        let stream = match timeout(options.connect_timeout, connect_all).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(map_connect_error(&target, e)),
            Err(_) => return Err(FtpClientError::Timeout(TimeoutKind::Connect)),
        };

        Self::from_stream(stream, options).await
    }

    /// Wraps an already connected socket and reads the greeting
    pub async fn from_stream(stream: TcpStream, options: ConnectionOptions) -> Result<Self> {
        let peer_addr = stream.peer_addr().map_err(FtpClientError::ConnectionLost)?;
        let local_addr = stream.local_addr().map_err(FtpClientError::ConnectionLost)?;
        // Control replies are small; avoid Nagle delays on command lines
        let _ = stream.set_nodelay(true);

        let mut channel = Self {
            stream: Some(BufReader::new(stream)),
            state: ConnectionState::Disconnected,
            peer_addr,
            local_addr,
            welcome: None,
            last_response: None,
            options,
            line_buf: Vec::new(),
            awaiting_completion: false,
        };

        // A server that accepts but never greets counts against the connect timeout
        let limit = channel.options.connect_timeout;
        let greeting = match timeout(limit, channel.read_greeting()).await {
            Ok(greeting) => greeting?,
            Err(_) => {
                warn!("No greeting from {} within {:?}", peer_addr, limit);
                channel.shutdown().await;
                return Err(FtpClientError::Timeout(TimeoutKind::Connect));
            }
        };

        if !greeting.is_completion() {
            channel.shutdown().await;
            return Err(FtpClientError::ConnectionRefused(format!(
                "{} rejected the session: {}",
                peer_addr, greeting
            )));
        }

        info!("Connected to {}: {}", peer_addr, greeting);
        channel.welcome = Some(greeting);
        channel.advance(ConnectionState::Connected);
        Ok(channel)
    }

    async fn read_greeting(&mut self) -> Result<Response> {
        // 120 "ready in nnn minutes" precedes the real greeting
        loop {
            let response = self.read_response().await?;
            if !response.is_preliminary() {
                return Ok(response);
            }
            debug!("Server not ready yet: {}", response);
        }
    }

    // --------------------
    // Getter methods
    // --------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The server greeting read on connect
    pub fn welcome(&self) -> Option<&Response> {
        self.welcome.as_ref()
    }

    /// The most recent reply received on this connection
    pub fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn transfer_mode(&self) -> TransferMode {
        self.options.transfer_mode
    }

    /// Whether a transfer's completion reply is still outstanding
    pub fn is_awaiting_completion(&self) -> bool {
        self.awaiting_completion
    }

    /// Authenticated, open and not in the middle of a transfer
    pub fn is_reusable(&self) -> bool {
        self.state == ConnectionState::Authenticated
            && self.stream.is_some()
            && !self.awaiting_completion
    }

    // --------------------
    // Setter methods
    // --------------------

    pub fn set_transfer_mode(&mut self, mode: TransferMode) {
        self.options.transfer_mode = mode;
    }

    /// Registers an idle handler invoked whenever `idle` elapses without a
    /// reply or data socket activity
    pub fn set_idle_handler(&mut self, idle: Duration, handler: IdleHandler) {
        self.options.idle_timeout = Some(idle);
        self.options.idle_handler = Some(handler);
    }

    pub fn clear_idle_handler(&mut self) {
        self.options.idle_timeout = None;
        self.options.idle_handler = None;
    }

    pub(crate) fn idle_watch(&self) -> IdleWatch {
        IdleWatch::new(self.options.idle_timeout, self.options.idle_handler.clone())
    }

    fn advance(&mut self, next: ConnectionState) {
        if self.state != next && self.state.can_advance_to(next) {
            debug!("Control connection {}: {} -> {}", self.peer_addr, self.state, next);
            self.state = next;
        }
    }

    // --------------------
    // Protocol operations
    // --------------------

    /// Sends USER and, if the server asks for it, PASS.
    ///
    /// On rejection the state stays `Connected`, so QUIT/close still work.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(FtpClientError::InvalidState(format!(
                "login requires a connected session, state is {}",
                self.state
            )));
        }

        let response = self.send_command(Command::User(username.to_string())).await?;
        let response = match response.class() {
            ResponseClass::PositiveCompletion => response,
            ResponseClass::PositiveIntermediate => {
                let reply = self.send_command(Command::Pass(password.to_string())).await?;
                if !reply.is_completion() {
                    warn!("Login rejected for user {}: {}", username, reply);
                    return Err(classify_failure(Operation::Login, reply));
                }
                reply
            }
            _ => {
                warn!("USER rejected for {}: {}", username, response);
                return Err(classify_failure(Operation::Login, response));
            }
        };

        info!("Logged in as {} ({})", username, response);
        self.advance(ConnectionState::Authenticated);
        Ok(())
    }

    /// Writes one command and reads its complete reply
    pub async fn send_command(&mut self, command: Command) -> Result<Response> {
        self.check_can_send(&command)?;
        self.write_command(&command).await?;
        self.read_response().await
    }

    /// Sends a command and requires a reply of class `expected`;
    /// anything else is classified according to `operation`
    pub async fn execute(
        &mut self,
        command: Command,
        expected: ResponseClass,
        operation: Operation,
    ) -> Result<Response> {
        let response = self.send_command(command).await?;
        if response.class() == expected {
            Ok(response)
        } else {
            Err(classify_failure(operation, response))
        }
    }

    /// Sends a transfer command (RETR, STOR, LIST, NLST) and expects a
    /// preliminary reply; the completion reply is then outstanding until
    /// `read_completion` or `abort`.
    pub(crate) async fn send_transfer_command(
        &mut self,
        command: Command,
        operation: Operation,
    ) -> Result<Response> {
        let response = self.send_command(command).await?;
        if response.is_preliminary() {
            self.awaiting_completion = true;
            Ok(response)
        } else {
            Err(classify_failure(operation, response))
        }
    }

    /// Reads the completion reply of the running transfer
    pub(crate) async fn read_completion(&mut self) -> Result<Response> {
        let response = self.read_response().await?;
        self.awaiting_completion = false;
        Ok(response)
    }

    /// Sends ABOR and drains the replies it produces.
    ///
    /// The data connection must already be closed. Servers answer with either
    /// a single 2xx or a 4xx for the interrupted transfer followed by a 2xx
    /// for the ABOR itself.
    pub async fn abort(&mut self) -> Result<()> {
        self.write_abort().await?;
        self.drain_abort().await
    }

    /// Writes ABOR without waiting for the reply
    pub(crate) async fn write_abort(&mut self) -> Result<()> {
        info!("Aborting transfer on {}", self.peer_addr);
        self.write_command(&Command::Abor).await
    }

    /// Consumes the replies produced by a previously written ABOR
    pub(crate) async fn drain_abort(&mut self) -> Result<()> {
        let was_transferring = self.awaiting_completion;
        let limit = self.options.abort_timeout;

        let drained = timeout(limit, async {
            let first = self.read_reply_unwatched().await?;
            if first.is_negative() || first.is_preliminary() {
                let second = self.read_reply_unwatched().await?;
                debug!("ABOR drained: {} / {}", first, second);
                return Ok::<bool, FtpClientError>(false);
            }
            debug!("ABOR answered: {}", first);
            Ok(was_transferring)
        })
        .await;

        self.awaiting_completion = false;
        match drained {
            Ok(Ok(false)) => Ok(()),
            Ok(Ok(true)) => {
                // The 2xx may have been the transfer's own completion; pick up
                // the ABOR reply if it follows shortly
                if let Ok(Ok(late)) = timeout(ABORT_SETTLE, self.read_reply_unwatched()).await {
                    debug!("Late reply after ABOR: {}", late);
                }
                Ok(())
            }
            Ok(Err(e)) => {
                self.shutdown().await;
                Err(e)
            }
            Err(_) => {
                warn!("No reply to ABOR from {} within {:?}", self.peer_addr, limit);
                self.shutdown().await;
                Err(FtpClientError::Timeout(TimeoutKind::Abort))
            }
        }
    }

    /// Sends QUIT (best effort) and releases the socket. Safe to call on every
    /// exit path; later calls are no-ops.
    pub async fn close(&mut self) -> Result<()> {
        if self.stream.is_none() {
            self.advance(ConnectionState::Closed);
            return Ok(());
        }

        let limit = self.options.abort_timeout;
        let quit = timeout(limit, async {
            self.write_command(&Command::Quit).await?;
            self.read_reply_unwatched().await
        })
        .await;

        match quit {
            Ok(Ok(response)) => debug!("QUIT answered: {}", response),
            Ok(Err(e)) => debug!("QUIT failed on {}: {}", self.peer_addr, e),
            Err(_) => warn!("No reply to QUIT from {} within {:?}", self.peer_addr, limit),
        }

        self.shutdown().await;
        info!("Closed control connection to {}", self.peer_addr);
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.get_mut().shutdown().await;
        }
        self.awaiting_completion = false;
        self.advance(ConnectionState::Closed);
    }

    fn check_can_send(&self, command: &Command) -> Result<()> {
        if self.stream.is_none() || self.state == ConnectionState::Closed {
            return Err(FtpClientError::InvalidState(
                "control connection is closed".to_string(),
            ));
        }
        if self.awaiting_completion {
            return Err(FtpClientError::InvalidState(format!(
                "cannot send {} while a transfer reply is outstanding",
                command.verb()
            )));
        }
        if self.state != ConnectionState::Authenticated && !command.allowed_before_login() {
            return Err(FtpClientError::NotAuthenticated);
        }
        if command.has_line_break() {
            return Err(FtpClientError::InvalidArgument(format!(
                "{} argument contains a line break",
                command.verb()
            )));
        }
        Ok(())
    }

    async fn write_command(&mut self, command: &Command) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            FtpClientError::InvalidState("control connection is closed".to_string())
        })?;
        debug!("> {}", command.redacted());
        let result = async {
            stream.get_mut().write_all(&command.encode()).await?;
            stream.get_mut().flush().await
        }
        .await;
        if let Err(e) = result {
            self.shutdown().await;
            return Err(FtpClientError::ConnectionLost(e));
        }
        Ok(())
    }

    /// Reads lines until a complete reply is assembled.
    ///
    /// When the idle handler cancels the wait, the reply is still owed by the
    /// server: a running transfer is aborted and drained, otherwise the
    /// connection is closed so the late reply can never answer a later command.
    pub(crate) async fn read_response(&mut self) -> Result<Response> {
        let watch = self.idle_watch();
        match self.read_response_with(watch).await {
            Err(e @ FtpClientError::Cancelled { .. }) => {
                self.discard_pending_reply().await;
                Err(e)
            }
            other => other,
        }
    }

    async fn discard_pending_reply(&mut self) {
        if self.awaiting_completion {
            if let Err(e) = self.abort().await {
                debug!("ABOR after cancelled reply wait failed: {}", e);
            }
        } else {
            warn!("Reply wait cancelled on {}; closing the connection", self.peer_addr);
            self.shutdown().await;
        }
    }

    /// Reads a reply without the idle timer; callers bound the wait themselves
    async fn read_reply_unwatched(&mut self) -> Result<Response> {
        self.read_response_with(IdleWatch::default()).await
    }

    async fn read_response_with(&mut self, mut watch: IdleWatch) -> Result<Response> {
        let mut assembler = ResponseAssembler::new();

        loop {
            let line = match self.read_line(&mut watch).await {
                Ok(line) => line,
                Err(e) => {
                    if e.is_fatal() {
                        self.shutdown().await;
                    }
                    return Err(e);
                }
            };

            match assembler.push_line(&line) {
                Ok(Some(response)) => {
                    debug!("< {}", response);
                    self.last_response = Some(response.clone());
                    return Ok(response);
                }
                Ok(None) => continue,
                Err(e) => {
                    self.shutdown().await;
                    return Err(e);
                }
            }
        }
    }

    async fn read_line(&mut self, watch: &mut IdleWatch) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            FtpClientError::InvalidState("control connection is closed".to_string())
        })?;

        loop {
            let Some(read) = watch.run(stream.read_until(b'\n', &mut self.line_buf)).await else {
                match watch.on_idle() {
                    Ok(()) => continue,
                    Err(IdleStop::TimedOut) => {
                        return Err(FtpClientError::Timeout(TimeoutKind::Idle));
                    }
                    Err(IdleStop::Cancelled) => {
                        return Err(FtpClientError::Cancelled { transferred: 0 });
                    }
                }
            };

            match read {
                Ok(0) => {
                    return Err(FtpClientError::ConnectionLost(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "server closed the control connection",
                    )));
                }
                Ok(_) if self.line_buf.ends_with(b"\n") => {
                    return Ok(std::mem::take(&mut self.line_buf));
                }
                // EOF in the middle of a line
                Ok(_) => {
                    return Err(FtpClientError::ConnectionLost(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "server closed the control connection mid-line",
                    )));
                }
                Err(e) => return Err(FtpClientError::ConnectionLost(e)),
            }
        }
    }
}
