//! Progress, idle and cancellation plumbing for transfers

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Returned by callbacks to keep going or stop the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Cancel,
}

/// Called with `(bytes_transferred, total_bytes_if_known)`
pub type ProgressCallback = Box<dyn FnMut(u64, Option<u64>) -> Flow + Send>;

/// Called with the time elapsed without any socket activity
pub type IdleHandler = Arc<dyn Fn(Duration) -> Flow + Send + Sync>;

/// Per-transfer byte accounting.
///
/// Reports to the callback once at least `threshold` unreported bytes have
/// accumulated (every chunk when `threshold` is 0) and polls the cancellation
/// token on every chunk.
pub struct ProgressTracker<'a> {
    callback: Option<&'a mut (dyn FnMut(u64, Option<u64>) -> Flow + Send)>,
    cancel: &'a CancellationToken,
    threshold: u64,
    total: Option<u64>,
    transferred: u64,
    unreported: u64,
    reported: bool,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(
        callback: Option<&'a mut (dyn FnMut(u64, Option<u64>) -> Flow + Send)>,
        cancel: &'a CancellationToken,
        threshold: u64,
        total: Option<u64>,
    ) -> Self {
        Self {
            callback,
            cancel,
            threshold,
            total,
            transferred: 0,
            unreported: 0,
            reported: false,
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Accounts for one chunk
    pub fn record(&mut self, bytes: usize) -> Flow {
        self.transferred += bytes as u64;
        self.unreported += bytes as u64;

        if self.unreported >= self.threshold.max(1) {
            if let Flow::Cancel = self.report() {
                return Flow::Cancel;
            }
        }

        if self.cancel.is_cancelled() {
            Flow::Cancel
        } else {
            Flow::Continue
        }
    }

    /// Delivers the final count unless the last report already carried it.
    /// A transfer that moved no bytes still gets one report.
    pub fn finish(&mut self) -> Flow {
        if self.unreported > 0 || !self.reported { self.report() } else { Flow::Continue }
    }

    fn report(&mut self) -> Flow {
        self.unreported = 0;
        self.reported = true;
        match self.callback.as_deref_mut() {
            Some(callback) => callback(self.transferred, self.total),
            None => Flow::Continue,
        }
    }
}

/// Why an idle wait ended without activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStop {
    /// No handler registered, the idle timeout is a hard limit
    TimedOut,
    /// The handler asked to stop
    Cancelled,
}

/// Idle timer shared by control reads and data socket I/O.
///
/// Each elapsed window is reported to the handler with the total idle time so
/// far; any completed I/O resets the timer.
#[derive(Clone, Default)]
pub struct IdleWatch {
    limit: Option<Duration>,
    handler: Option<IdleHandler>,
    waited: Duration,
}

impl IdleWatch {
    pub fn new(limit: Option<Duration>, handler: Option<IdleHandler>) -> Self {
        Self {
            limit,
            handler,
            waited: Duration::ZERO,
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.waited
    }

    /// Runs `fut` for at most one idle window. `None` means the window elapsed
    /// and `fut` was dropped, so only cancel-safe futures belong here.
    pub async fn run<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        match self.limit {
            None => Some(fut.await),
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(output) => {
                    self.waited = Duration::ZERO;
                    Some(output)
                }
                Err(_) => {
                    self.waited += limit;
                    None
                }
            },
        }
    }

    /// Consults the handler after an elapsed window
    pub fn on_idle(&self) -> std::result::Result<(), IdleStop> {
        match &self.handler {
            Some(handler) => match handler(self.waited) {
                Flow::Continue => Ok(()),
                Flow::Cancel => Err(IdleStop::Cancelled),
            },
            None => Err(IdleStop::TimedOut),
        }
    }
}
