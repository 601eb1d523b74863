//! Transfer operations
//!
//! Byte-accurate download, upload and listing over an established data
//! channel, plus the command sequences that set them up.

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::control::ControlChannel;
use crate::error::{FtpClientError, Operation, Result, classify_failure};
use crate::protocol::{Command, Response, ResponseClass};
use crate::transfer::data_channel::{DataChannel, Direction};
use crate::transfer::{Flow, ProgressTracker, TransferReport, TransferRequest, TransferType};

/// Cleans up a data channel after a failure and hands the error back.
///
/// A broken data socket only needs its completion reply consumed; every other
/// failure (cancellation, idle timeout, local I/O) aborts the transfer.
async fn bail(data: DataChannel<'_>, error: FtpClientError) -> FtpClientError {
    match error {
        FtpClientError::ConnectionLost(_) => data.abandon().await,
        _ => {
            if let Err(e) = data.abort().await {
                warn!("ABOR after failed transfer did not complete: {}", e);
            }
        }
    }
    error
}

/// Streams the data connection into `sink`.
///
/// With `length > 0` reading stops after exactly `length` bytes and the data
/// connection is closed early; otherwise it runs to end of data.
pub async fn download<W>(
    mut data: DataChannel<'_>,
    sink: &mut W,
    length: u64,
    tracker: &mut ProgressTracker<'_>,
) -> Result<Response>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; data.buffer_size()];

    loop {
        let want = if length > 0 {
            let remaining = length.saturating_sub(tracker.transferred());
            if remaining == 0 {
                tracker.finish();
                let completion = data.close_early().await?;
                sink.flush().await?;
                return Ok(completion);
            }
            remaining.min(buf.len() as u64) as usize
        } else {
            buf.len()
        };

        let n = match data.read(&mut buf[..want]).await {
            Ok(n) => n,
            Err(e) => return Err(bail(data, e).await),
        };

        if n == 0 {
            tracker.finish();
            let completion = data.finish().await?;
            sink.flush().await?;
            return Ok(completion);
        }

        if let Err(e) = sink.write_all(&buf[..n]).await {
            return Err(bail(data, FtpClientError::Io(e)).await);
        }

        if tracker.record(n) == Flow::Cancel {
            let transferred = tracker.transferred();
            debug!("Download cancelled after {} bytes", transferred);
            return Err(bail(data, FtpClientError::Cancelled { transferred }).await);
        }
    }
}

/// Streams `source` into the data connection until the source is exhausted.
/// An empty source is a valid, zero-byte upload.
pub async fn upload<R>(
    mut data: DataChannel<'_>,
    source: &mut R,
    tracker: &mut ProgressTracker<'_>,
) -> Result<Response>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; data.buffer_size()];

    loop {
        let n = match source.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => return Err(bail(data, FtpClientError::Io(e)).await),
        };

        if n == 0 {
            tracker.finish();
            return data.finish().await;
        }

        if let Err(e) = data.write_all(&buf[..n]).await {
            return Err(bail(data, e).await);
        }

        if tracker.record(n) == Flow::Cancel {
            let transferred = tracker.transferred();
            debug!("Upload cancelled after {} bytes", transferred);
            return Err(bail(data, FtpClientError::Cancelled { transferred }).await);
        }
    }
}

/// Collects the whole listing text from the data connection
pub async fn list_raw(mut data: DataChannel<'_>, cancel: &CancellationToken) -> Result<String> {
    let mut raw = Vec::new();
    let mut buf = vec![0u8; data.buffer_size()];

    loop {
        let n = match data.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => return Err(bail(data, e).await),
        };
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);

        if cancel.is_cancelled() {
            let transferred = raw.len() as u64;
            return Err(bail(data, FtpClientError::Cancelled { transferred }).await);
        }
    }

    data.finish().await?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Sends TYPE for the representation type of the next transfer
pub async fn set_type(control: &mut ControlChannel, transfer_type: TransferType) -> Result<()> {
    control
        .execute(
            Command::Type(transfer_type),
            ResponseClass::PositiveCompletion,
            Operation::Other,
        )
        .await?;
    Ok(())
}

/// Sends REST; the server must answer 2xx or 3xx. The transfer command has
/// to follow immediately, which is why `DataChannel::open` sends it.
pub async fn restart_at(control: &mut ControlChannel, offset: u64) -> Result<()> {
    let response = control.send_command(Command::Rest(offset)).await?;
    if response.is_completion() || response.is_intermediate() {
        Ok(())
    } else {
        Err(classify_failure(Operation::Restart, response))
    }
}

/// TYPE, data connection setup, optional REST, RETR, then streams the file
/// into `sink`.
///
/// When the request carries a probed size and no length bound, receiving
/// fewer bytes than the probe promised is an `IncompleteTransfer`.
pub async fn retrieve<W>(
    control: &mut ControlChannel,
    request: &mut TransferRequest,
    sink: &mut W,
) -> Result<TransferReport>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    set_type(control, request.transfer_type).await?;

    let threshold = control.options().callback_bytes;
    let expected = request.expected_bytes();
    let length = request.length;
    let data = DataChannel::open(
        control,
        Command::Retr(request.remote_path.clone()),
        Direction::Read,
        request.offset,
        &request.cancel,
    )
    .await?;

    let mut tracker = request.tracker(threshold);
    let completion = download(data, sink, length, &mut tracker).await?;
    let bytes = tracker.transferred();

    if length == 0 {
        if let Some(expected) = expected {
            if bytes < expected {
                return Err(FtpClientError::IncompleteTransfer {
                    expected,
                    received: bytes,
                });
            }
        }
    }

    Ok(TransferReport {
        bytes,
        expected,
        completion,
    })
}

/// TYPE, data connection setup, optional REST, STOR, then streams `source`
/// to the server
pub async fn store<R>(
    control: &mut ControlChannel,
    request: &mut TransferRequest,
    source: &mut R,
) -> Result<TransferReport>
where
    R: AsyncRead + Unpin + ?Sized,
{
    set_type(control, request.transfer_type).await?;

    let threshold = control.options().callback_bytes;
    let expected = request.expected_bytes();
    let data = DataChannel::open(
        control,
        Command::Stor(request.remote_path.clone()),
        Direction::Write,
        request.offset,
        &request.cancel,
    )
    .await?;

    let mut tracker = request.tracker(threshold);
    let completion = upload(data, source, &mut tracker).await?;

    Ok(TransferReport {
        bytes: tracker.transferred(),
        expected,
        completion,
    })
}

/// Runs LIST or NLST in ASCII mode and returns the raw listing text
pub async fn fetch_listing(
    control: &mut ControlChannel,
    command: Command,
    cancel: &CancellationToken,
) -> Result<String> {
    set_type(control, TransferType::Ascii).await?;
    let data = DataChannel::open(control, command, Direction::Read, 0, cancel).await?;
    list_raw(data, cancel).await
}
