// A single interrupt read, and everything it owns. The buffer lives exactly as long as the
// PendingTransfer does: it moves into the backend on submission, comes back to us inside a
// Completion, and is released when we drop it (or move its payload out to the session).
use crate::{ENDPOINT_IN, PACKET_SIZE, TRANSFER_TIMEOUT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub type Payload = [u8; PACKET_SIZE];

#[derive(Debug)]
pub struct PendingTransfer {
    endpoint: u8,
    timeout: Duration,
    buffer: Box<Payload>,
    actual_length: usize,
    _live: LiveTransfer,
}

impl PendingTransfer {
    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[..]
    }

    pub fn actual_length(&self) -> usize {
        self.actual_length
    }

    /// Records how many bytes the device actually sent, clamped to the buffer size.
    pub fn set_actual_length(&mut self, length: usize) {
        self.actual_length = length.min(PACKET_SIZE);
    }

    pub fn is_full(&self) -> bool {
        self.actual_length == PACKET_SIZE
    }

    /// Consumes the transfer, handing its buffer over to whoever receives the payload.
    pub fn into_payload(self) -> Payload {
        *self.buffer
    }
}

/// Counts how many transfers are alive at any moment. Every PendingTransfer is allocated
/// through a tracker, and gives its slot back when dropped.
#[derive(Clone, Debug, Default)]
pub struct TransferTracker {
    live: Arc<AtomicUsize>,
}

impl TransferTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> PendingTransfer {
        self.live.fetch_add(1, Ordering::SeqCst);
        PendingTransfer {
            endpoint: ENDPOINT_IN,
            timeout: TRANSFER_TIMEOUT,
            buffer: Box::new([0; PACKET_SIZE]),
            actual_length: 0,
            _live: LiveTransfer {
                live: self.live.clone(),
            },
        }
    }

    pub fn outstanding(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct LiveTransfer {
    live: Arc<AtomicUsize>,
}

impl Drop for LiveTransfer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The read finished, `PendingTransfer::actual_length` says how much arrived.
    Completed,
    TimedOut,
    Cancelled,
    DeviceGone,
    Failed(rusb::Error),
}

impl TransferOutcome {
    pub fn from_usb_error(error: rusb::Error) -> Self {
        match error {
            rusb::Error::Timeout => TransferOutcome::TimedOut,
            rusb::Error::NoDevice => TransferOutcome::DeviceGone,
            rusb::Error::Interrupted => TransferOutcome::Cancelled,
            error => TransferOutcome::Failed(error),
        }
    }
}

/// A transfer returned by the backend, along with how it ended.
#[derive(Debug)]
pub struct Completion {
    pub transfer: PendingTransfer,
    pub outcome: TransferOutcome,
}
