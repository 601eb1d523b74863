//! Module `data_channel`
//!
//! Negotiates the per-transfer data connection (PASV, EPSV or PORT), sends
//! the triggering command and wraps the resulting socket.

use std::io;
use std::net::{IpAddr, SocketAddr, SocketAddrV4};

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::control::ControlChannel;
use crate::control::channel::map_connect_error;
use crate::error::{FtpClientError, Operation, Result, TimeoutKind, classify_failure};
use crate::protocol::{Command, Response, ResponseClass, parse_epsv, parse_pasv};
use crate::transfer::{IdleStop, IdleWatch, TransferMode, restart_at};

/// Direction of the bytes on the data connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Server to client (RETR, LIST, NLST)
    Read,
    /// Client to server (STOR)
    Write,
}

/// An established data connection.
///
/// Borrows its control channel for its whole life, so the control channel
/// cannot be used for anything else until the transfer is finished or aborted.
pub struct DataChannel<'a> {
    stream: Option<TcpStream>,
    direction: Direction,
    bytes: u64,
    control: &'a mut ControlChannel,
    opening: Response,
    watch: IdleWatch,
}

/// Data connection waiting for the triggering command's reply
enum Pending {
    Connected(TcpStream),
    Listening(TcpListener),
}

impl<'a> DataChannel<'a> {
    /// Sets up a data connection in the control channel's mode, then sends
    /// `command` and waits for its preliminary reply. A non-zero `restart`
    /// sends `REST restart` right before `command`, with nothing in between.
    ///
    /// If the server refuses the setup command and the control channel has
    /// mode fallback enabled, the other mode is tried once.
    pub async fn open(
        control: &'a mut ControlChannel,
        command: Command,
        direction: Direction,
        restart: u64,
        cancel: &CancellationToken,
    ) -> Result<DataChannel<'a>> {
        if cancel.is_cancelled() {
            return Err(FtpClientError::Cancelled { transferred: 0 });
        }

        let operation = match direction {
            Direction::Read => Operation::Lookup,
            Direction::Write => Operation::Mutation,
        };

        let mode = control.transfer_mode();
        let pending = match prepare(control, mode).await {
            Err(
                e @ (FtpClientError::PassiveModeUnsupported(_)
                | FtpClientError::PortModeRefused(_)),
            ) if control.options().mode_fallback => {
                let other = mode.fallback();
                warn!("{}; retrying data connection in {:?} mode", e, other);
                let pending = prepare(control, other).await?;
                control.set_transfer_mode(other);
                pending
            }
            other => other?,
        };

        // Last chance to stop before the server starts the transfer
        if cancel.is_cancelled() {
            drop(pending);
            return Err(FtpClientError::Cancelled { transferred: 0 });
        }

        if restart > 0 {
            restart_at(control, restart).await?;
        }
        let opening = control.send_transfer_command(command, operation).await?;

        let stream = match pending {
            Pending::Connected(stream) => stream,
            Pending::Listening(listener) => {
                let limit = control.options().accept_timeout;
                match timeout(limit, listener.accept()).await {
                    Ok(Ok((stream, peer))) => {
                        debug!("Accepted data connection from {}", peer);
                        stream
                    }
                    Ok(Err(e)) => {
                        let _ = control.abort().await;
                        return Err(FtpClientError::ConnectionLost(e));
                    }
                    Err(_) => {
                        warn!("Server did not connect back within {:?}", limit);
                        let _ = control.abort().await;
                        return Err(FtpClientError::DataConnectionTimeout(limit));
                    }
                }
            }
        };

        info!("Data connection open ({:?}): {}", direction, opening);
        let watch = control.idle_watch();
        Ok(DataChannel {
            stream: Some(stream),
            direction,
            bytes: 0,
            control,
            opening,
            watch,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Bytes moved over this data connection so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// The preliminary reply to the triggering command
    pub fn opening_response(&self) -> &Response {
        &self.opening
    }

    pub fn buffer_size(&self) -> usize {
        self.control.options().buffer_size.max(1)
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| FtpClientError::InvalidState("data connection closed".to_string()))
    }

    fn idle_error(&self, stop: IdleStop) -> FtpClientError {
        match stop {
            IdleStop::TimedOut => FtpClientError::Timeout(TimeoutKind::Idle),
            IdleStop::Cancelled => FtpClientError::Cancelled {
                transferred: self.bytes,
            },
        }
    }

    /// Reads one chunk; `Ok(0)` is end of data
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut watch = std::mem::take(&mut self.watch);
        let result = loop {
            let stream = self.stream()?;
            match watch.run(stream.read(buf)).await {
                Some(Ok(n)) => break Ok(n),
                Some(Err(e)) => break Err(FtpClientError::ConnectionLost(e)),
                None => {
                    if let Err(stop) = watch.on_idle() {
                        break Err(self.idle_error(stop));
                    }
                }
            }
        };
        self.watch = watch;
        let n = result?;
        self.bytes += n as u64;
        Ok(n)
    }

    /// Writes a whole chunk
    pub async fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        let mut watch = std::mem::take(&mut self.watch);
        let result = loop {
            if data.is_empty() {
                break Ok(());
            }
            let stream = self.stream()?;
            match watch.run(stream.write(data)).await {
                Some(Ok(0)) => {
                    break Err(FtpClientError::ConnectionLost(io::Error::from(
                        io::ErrorKind::WriteZero,
                    )));
                }
                Some(Ok(n)) => {
                    self.bytes += n as u64;
                    data = &data[n..];
                }
                Some(Err(e)) => break Err(FtpClientError::ConnectionLost(e)),
                None => {
                    if let Err(stop) = watch.on_idle() {
                        break Err(self.idle_error(stop));
                    }
                }
            }
        };
        self.watch = watch;
        result
    }

    /// Closes the data connection and reads the transfer's completion reply,
    /// which must be 2xx.
    pub async fn finish(mut self) -> Result<Response> {
        if let Some(mut stream) = self.stream.take() {
            if self.direction == Direction::Write {
                // Half-close tells the server the upload is complete
                if let Err(e) = stream.shutdown().await {
                    debug!("Data shutdown failed: {}", e);
                }
            }
            drop(stream);
        }

        let response = self.control.read_completion().await?;
        if response.is_completion() {
            info!("Transfer complete: {} bytes ({})", self.bytes, response);
            Ok(response)
        } else {
            Err(classify_failure(Operation::Other, response))
        }
    }

    /// Closes the data connection before the server finished sending and reads
    /// the completion reply, accepting either the 2xx or the 4xx the server
    /// produces for the interrupted send.
    pub async fn close_early(mut self) -> Result<Response> {
        drop(self.stream.take());
        let response = self.control.read_completion().await?;
        match response.class() {
            ResponseClass::PositiveCompletion | ResponseClass::TransientNegative => {
                debug!("Bounded read closed after {} bytes: {}", self.bytes, response);
                Ok(response)
            }
            _ => Err(classify_failure(Operation::Other, response)),
        }
    }

    /// Closes the data connection and aborts the transfer on the control
    /// channel, leaving it ready for the next command.
    pub async fn abort(mut self) -> Result<()> {
        match self.direction {
            Direction::Read => {
                drop(self.stream.take());
                self.control.abort().await
            }
            Direction::Write => {
                // ABOR goes out first so the server does not take the closed
                // socket for a finished upload
                let sent = self.control.write_abort().await;
                drop(self.stream.take());
                sent?;
                self.control.drain_abort().await
            }
        }
    }

    /// Drops the data connection after a socket failure and consumes whatever
    /// completion reply the server sends, so the control channel stays paired.
    pub async fn abandon(mut self) {
        drop(self.stream.take());
        match self.control.read_completion().await {
            Ok(response) => debug!("Reply after failed transfer: {}", response),
            Err(e) => debug!("No reply after failed transfer: {}", e),
        }
    }
}

/// Runs the mode-specific setup command and opens (or listens for) the data
/// connection
async fn prepare(control: &mut ControlChannel, mode: TransferMode) -> Result<Pending> {
    match mode {
        TransferMode::Passive => {
            let response = control
                .execute(Command::Pasv, ResponseClass::PositiveCompletion, Operation::Passive)
                .await?;
            let addr = SocketAddr::V4(parse_pasv(&response)?);
            debug!("Passive data address {}", addr);
            connect_data(control, addr).await.map(Pending::Connected)
        }
        TransferMode::ExtendedPassive => {
            let response = control
                .execute(Command::Epsv, ResponseClass::PositiveCompletion, Operation::Passive)
                .await?;
            let port = parse_epsv(&response)?;
            let addr = SocketAddr::new(control.peer_addr().ip(), port);
            debug!("Extended passive data address {}", addr);
            connect_data(control, addr).await.map(Pending::Connected)
        }
        TransferMode::Active => {
            let local_ip = match control.local_addr().ip() {
                IpAddr::V4(ip) => ip,
                IpAddr::V6(ip) => ip.to_ipv4_mapped().ok_or_else(|| {
                    FtpClientError::InvalidState(
                        "PORT requires an IPv4 control connection".to_string(),
                    )
                })?,
            };
            let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(local_ip), 0))
                .await
                .map_err(FtpClientError::Io)?;
            let port = listener.local_addr().map_err(FtpClientError::Io)?.port();
            let addr = SocketAddrV4::new(local_ip, port);
            debug!("Listening for data connection on {}", addr);

            control
                .execute(Command::Port(addr), ResponseClass::PositiveCompletion, Operation::Port)
                .await?;
            Ok(Pending::Listening(listener))
        }
    }
}

async fn connect_data(control: &ControlChannel, addr: SocketAddr) -> Result<TcpStream> {
    let limit = control.options().connect_timeout;
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(map_connect_error(&addr.to_string(), e)),
        Err(_) => Err(FtpClientError::Timeout(TimeoutKind::Connect)),
    }
}
