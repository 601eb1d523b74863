//! The session facade
//!
//! Sequences control channel, data channel and listing parser into logical
//! operations. By default every operation runs on a fresh control connection
//! that is closed on every exit path; with `reuse_connection` one
//! authenticated connection is kept between operations.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::auth::Credentials;
use crate::control::{ConnectionOptions, ControlChannel};
use crate::error::{FtpClientError, Operation, Result};
use crate::listing::{DirectoryEntry, ParsedListing, parse_list, parse_name_list};
use crate::protocol::{Command, Response, ResponseClass};
use crate::session::operations;
use crate::transfer::{
    IdleHandler, TransferMode, TransferReport, TransferRequest, fetch_listing, retrieve, store,
};

/// Session-level behaviour on top of the per-connection options
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub connection: ConnectionOptions,
    /// Keep one authenticated control connection between operations
    pub reuse_connection: bool,
    /// Include dot-files in `list` results
    pub show_hidden: bool,
    /// Send SIZE before downloads to learn the expected byte count
    pub probe_size: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connection: ConnectionOptions::default(),
            reuse_connection: false,
            show_hidden: false,
            probe_size: true,
        }
    }
}

/// Logical FTP operations against one server.
///
/// Not shared between tasks: concurrent operations against the same server
/// need one `FtpSession` each.
pub struct FtpSession {
    credentials: Credentials,
    options: SessionOptions,
    cached: Option<ControlChannel>,
}

impl FtpSession {
    pub fn new(credentials: Credentials, options: SessionOptions) -> Self {
        Self {
            credentials,
            options,
            cached: None,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Whether a reusable control connection is currently held
    pub fn is_connected(&self) -> bool {
        self.cached.is_some()
    }

    pub fn set_transfer_mode(&mut self, mode: TransferMode) {
        self.options.connection.transfer_mode = mode;
        if let Some(control) = self.cached.as_mut() {
            control.set_transfer_mode(mode);
        }
    }

    /// Registers an idle handler on this and every later control connection
    pub fn set_idle_handler(&mut self, idle: Duration, handler: IdleHandler) {
        self.options.connection.idle_timeout = Some(idle);
        self.options.connection.idle_handler = Some(handler.clone());
        if let Some(control) = self.cached.as_mut() {
            control.set_idle_handler(idle, handler);
        }
    }

    /// Opens and authenticates a new control connection.
    ///
    /// A connection whose login fails is closed before the error is returned.
    pub async fn connect(&self) -> Result<ControlChannel> {
        let mut control = ControlChannel::connect(
            self.credentials.host(),
            self.credentials.port(),
            self.options.connection.clone(),
        )
        .await?;

        if let Err(e) = control
            .login(self.credentials.username(), self.credentials.password())
            .await
        {
            if let Err(close_err) = control.close().await {
                debug!("Close after failed login: {}", close_err);
            }
            return Err(e);
        }
        Ok(control)
    }

    /// Closes the held control connection, if any
    pub async fn close(&mut self) -> Result<()> {
        match self.cached.take() {
            Some(mut control) => control.close().await,
            None => Ok(()),
        }
    }

    async fn checkout(&mut self) -> Result<ControlChannel> {
        if let Some(mut control) = self.cached.take() {
            if control.is_reusable() {
                debug!("Reusing control connection to {}", control.peer_addr());
                return Ok(control);
            }
            if let Err(e) = control.close().await {
                debug!("Dropping stale control connection: {}", e);
            }
        }
        self.connect().await
    }

    async fn checkin(&mut self, mut control: ControlChannel) {
        if self.options.reuse_connection && control.is_reusable() {
            self.cached = Some(control);
            return;
        }
        if let Err(e) = control.close().await {
            warn!("Failed to close control connection: {}", e);
        }
    }

    // --------------------
    // Listings
    // --------------------

    /// LIST, parsed, with the hidden-file filter applied
    pub async fn list(
        &mut self,
        path: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DirectoryEntry>> {
        let listing = self.list_all(path, cancel).await?;
        Ok(listing.visible(self.options.show_hidden))
    }

    /// LIST, parsed, every entry including hidden ones
    pub async fn list_all(
        &mut self,
        path: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ParsedListing> {
        let text = self.list_text(path, cancel).await?;
        let listing = parse_list(&text)?;
        info!(
            "Listed {} entries ({} hidden, {} lines skipped)",
            listing.entries.len(),
            listing.hidden_count(),
            listing.skipped
        );
        Ok(listing)
    }

    /// Raw LIST text
    pub async fn list_text(
        &mut self,
        path: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut control = self.checkout().await?;
        let command = Command::List(path.map(str::to_string));
        let result = fetch_listing(&mut control, command, cancel).await;
        self.checkin(control).await;
        result
    }

    /// NLST names, in server order
    pub async fn name_list(
        &mut self,
        path: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut control = self.checkout().await?;
        let command = Command::Nlst(path.map(str::to_string));
        let result = fetch_listing(&mut control, command, cancel).await;
        self.checkin(control).await;
        result.map(|text| parse_name_list(&text))
    }

    // --------------------
    // Transfers
    // --------------------

    /// Downloads into `sink`
    pub async fn download<W>(
        &mut self,
        mut request: TransferRequest,
        sink: &mut W,
    ) -> Result<TransferReport>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut control = self.checkout().await?;
        let result = download_on(&mut control, self.options.probe_size, &mut request, sink).await;
        self.checkin(control).await;
        result
    }

    /// Reads `length` bytes at `offset` into memory (`length == 0` reads to
    /// end of file)
    pub async fn read_data(
        &mut self,
        path: &str,
        offset: u64,
        length: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let request = TransferRequest::new(path)
            .offset(offset)
            .length(length)
            .cancel_with(cancel.clone());
        let mut data = Vec::new();
        self.download(request, &mut data).await?;
        Ok(data)
    }

    /// Downloads into a local file. With an offset the file is appended to,
    /// otherwise it is truncated.
    ///
    /// An empty local file is reported as `ZeroFileSize` unless a SIZE probe
    /// confirmed that the remote file is empty too.
    pub async fn download_file(
        &mut self,
        mut request: TransferRequest,
        local: &Path,
    ) -> Result<TransferReport> {
        let mut file = if request.offset > 0 {
            OpenOptions::new().create(true).append(true).open(local).await?
        } else {
            File::create(local).await?
        };

        let mut control = self.checkout().await?;
        let result =
            download_on(&mut control, self.options.probe_size, &mut request, &mut file).await;
        self.checkin(control).await;
        let report = result?;

        file.sync_all().await?;
        let written = file.metadata().await?.len();
        if written == 0 && request.expected_size != Some(0) {
            return Err(FtpClientError::ZeroFileSize(local.display().to_string()));
        }
        Ok(report)
    }

    /// Uploads from `source`; an empty source creates an empty remote file
    pub async fn upload<R>(
        &mut self,
        mut request: TransferRequest,
        source: &mut R,
    ) -> Result<TransferReport>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut control = self.checkout().await?;
        let result = store(&mut control, &mut request, source).await;
        self.checkin(control).await;
        result
    }

    pub async fn upload_data(&mut self, data: &[u8], remote: &str) -> Result<TransferReport> {
        let request = TransferRequest::new(remote).expected_size(Some(data.len() as u64));
        let mut source = data;
        self.upload(request, &mut source).await
    }

    /// Uploads a local file. With an offset, reading starts at that byte of
    /// the local file and REST is sent to the server.
    pub async fn upload_file(
        &mut self,
        local: &Path,
        request: TransferRequest,
    ) -> Result<TransferReport> {
        let mut file = File::open(local).await?;
        let size = file.metadata().await?.len();
        if request.offset > 0 {
            file.seek(std::io::SeekFrom::Start(request.offset)).await?;
        }
        let request = request.expected_size(Some(size));
        self.upload(request, &mut file).await
    }

    /// Copies a remote file to another remote path through memory, on one
    /// control connection. Returns the report of the upload half.
    pub async fn copy(
        &mut self,
        from: &str,
        to: &str,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        let mut control = self.checkout().await?;
        let result = copy_on(&mut control, self.options.probe_size, from, to, cancel).await;
        self.checkin(control).await;
        result
    }

    // --------------------
    // Navigation and metadata
    // --------------------

    pub async fn make_dir(&mut self, path: &str) -> Result<String> {
        let mut control = self.checkout().await?;
        let result = operations::make_dir(&mut control, path).await;
        self.checkin(control).await;
        result
    }

    pub async fn remove_dir(&mut self, path: &str) -> Result<()> {
        let mut control = self.checkout().await?;
        let result = operations::remove_dir(&mut control, path).await;
        self.checkin(control).await;
        result
    }

    pub async fn delete_file(&mut self, path: &str) -> Result<()> {
        let mut control = self.checkout().await?;
        let result = operations::delete_file(&mut control, path).await;
        self.checkin(control).await;
        result
    }

    pub async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let mut control = self.checkout().await?;
        let result = operations::rename(&mut control, from, to).await;
        self.checkin(control).await;
        result
    }

    pub async fn chmod(&mut self, path: &str, mode: u32) -> Result<()> {
        let mut control = self.checkout().await?;
        let result = operations::chmod(&mut control, path, mode).await;
        self.checkin(control).await;
        result
    }

    /// `None` when the server reports the file as missing
    pub async fn file_size(&mut self, path: &str) -> Result<Option<u64>> {
        let mut control = self.checkout().await?;
        let result = operations::file_size(&mut control, path).await;
        self.checkin(control).await;
        result
    }

    pub async fn last_modified(&mut self, path: &str) -> Result<DateTime<Utc>> {
        let mut control = self.checkout().await?;
        let result = operations::last_modified(&mut control, path).await;
        self.checkin(control).await;
        result
    }

    pub async fn directory_exists(&mut self, path: &str) -> Result<bool> {
        let mut control = self.checkout().await?;
        let result = operations::directory_exists(&mut control, path).await;
        self.checkin(control).await;
        result
    }

    /// Only lasts beyond this call when connections are reused
    pub async fn change_dir(&mut self, path: &str) -> Result<()> {
        let mut control = self.checkout().await?;
        let result = operations::change_dir(&mut control, path).await;
        self.checkin(control).await;
        result
    }

    pub async fn cdup(&mut self) -> Result<()> {
        let mut control = self.checkout().await?;
        let result = operations::cdup(&mut control).await;
        self.checkin(control).await;
        result
    }

    pub async fn current_dir(&mut self) -> Result<String> {
        let mut control = self.checkout().await?;
        let result = operations::current_dir(&mut control).await;
        self.checkin(control).await;
        result
    }

    pub async fn system_type(&mut self) -> Result<String> {
        let mut control = self.checkout().await?;
        let result = operations::system_type(&mut control).await;
        self.checkin(control).await;
        result
    }

    pub async fn site(&mut self, arguments: &str) -> Result<Response> {
        let mut control = self.checkout().await?;
        let result = operations::site(&mut control, arguments).await;
        self.checkin(control).await;
        result
    }

    /// Sends any non-transfer command and requires a reply of class `expected`
    pub async fn send_command(
        &mut self,
        command: Command,
        expected: ResponseClass,
    ) -> Result<Response> {
        let mut control = self.checkout().await?;
        let result = control.execute(command, expected, Operation::Other).await;
        self.checkin(control).await;
        result
    }
}

/// Optional SIZE probe, then RETR on one control connection
async fn download_on<W>(
    control: &mut ControlChannel,
    probe_size: bool,
    request: &mut TransferRequest,
    sink: &mut W,
) -> Result<TransferReport>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if probe_size && request.expected_size.is_none() {
        match operations::file_size(control, &request.remote_path).await {
            Ok(size) => request.expected_size = size,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("SIZE probe for {} failed: {}", request.remote_path, e),
        }
    }
    retrieve(control, request, sink).await
}

async fn copy_on(
    control: &mut ControlChannel,
    probe_size: bool,
    from: &str,
    to: &str,
    cancel: &CancellationToken,
) -> Result<TransferReport> {
    let mut request = TransferRequest::new(from).cancel_with(cancel.clone());
    let mut buffer = Vec::new();
    let downloaded = download_on(control, probe_size, &mut request, &mut buffer).await?;
    debug!("Copy {} -> {}: {} bytes buffered", from, to, downloaded.bytes);

    let mut request = TransferRequest::new(to)
        .expected_size(Some(buffer.len() as u64))
        .cancel_with(cancel.clone());
    let mut source = buffer.as_slice();
    let report = store(control, &mut request, &mut source).await?;
    info!("Copied {} to {} ({} bytes)", from, to, report.bytes);
    Ok(report)
}
