//! Transfer request and result types

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::protocol::Response;
use crate::transfer::{Flow, ProgressCallback, ProgressTracker, TransferType};

/// Parameters of one download or upload.
///
/// `length == 0` always means "until end of file".
pub struct TransferRequest {
    pub remote_path: String,
    pub transfer_type: TransferType,
    pub offset: u64,
    pub length: u64,
    /// Size reported by a prior SIZE probe, used for progress totals and
    /// incomplete-transfer detection
    pub expected_size: Option<u64>,
    pub progress: Option<ProgressCallback>,
    pub cancel: CancellationToken,
}

impl TransferRequest {
    pub fn new(remote_path: impl Into<String>) -> Self {
        Self {
            remote_path: remote_path.into(),
            transfer_type: TransferType::Binary,
            offset: 0,
            length: 0,
            expected_size: None,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn transfer_type(mut self, transfer_type: TransferType) -> Self {
        self.transfer_type = transfer_type;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn length(mut self, length: u64) -> Self {
        self.length = length;
        self
    }

    pub fn expected_size(mut self, size: Option<u64>) -> Self {
        self.expected_size = size;
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(u64, Option<u64>) -> Flow + Send + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Bytes the transfer should deliver, when known
    pub fn expected_bytes(&self) -> Option<u64> {
        let remaining = self
            .expected_size
            .map(|size| size.saturating_sub(self.offset));
        match (remaining, self.length) {
            (Some(remaining), 0) => Some(remaining),
            (Some(remaining), length) => Some(remaining.min(length)),
            (None, 0) => None,
            (None, length) => Some(length),
        }
    }

    pub(crate) fn tracker(&mut self, threshold: u64) -> ProgressTracker<'_> {
        let total = self.expected_bytes();
        let callback = self
            .progress
            .as_deref_mut()
            .map(|callback| callback as &mut (dyn FnMut(u64, Option<u64>) -> Flow + Send));
        ProgressTracker::new(callback, &self.cancel, threshold, total)
    }
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("remote_path", &self.remote_path)
            .field("transfer_type", &self.transfer_type)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("expected_size", &self.expected_size)
            .field("progress", &self.progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Outcome of a completed transfer
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub bytes: u64,
    pub expected: Option<u64>,
    /// Completion reply from the control channel
    pub completion: Response,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_bytes() {
        let request = TransferRequest::new("a.bin").expected_size(Some(100));
        assert_eq!(request.expected_bytes(), Some(100));

        let request = TransferRequest::new("a.bin").expected_size(Some(100)).offset(40);
        assert_eq!(request.expected_bytes(), Some(60));

        let request = TransferRequest::new("a.bin")
            .expected_size(Some(100))
            .offset(40)
            .length(10);
        assert_eq!(request.expected_bytes(), Some(10));

        let request = TransferRequest::new("a.bin").length(10);
        assert_eq!(request.expected_bytes(), Some(10));

        assert_eq!(TransferRequest::new("a.bin").expected_bytes(), None);
    }
}
