//! Control-plane messages
//!
//! Every interaction between the GUI side, the driver and downstream DSP is a
//! [`Message`] value pushed onto a [`MessageQueue`]. Queues are unbounded and
//! multi-producer; each consumer handles its messages in delivery order.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use super::settings::OutputSettings;

/// Emitted downstream whenever applied settings change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalNotification {
    /// Device-side sample rate in Hz
    pub sample_rate: u32,
    /// Center frequency in Hz
    pub center_frequency: u64,
}

/// Control-plane message kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    // ─────────────────────────────────────────────────────────────
    // Handled by the driver
    // ─────────────────────────────────────────────────────────────
    /// Apply a full settings snapshot (every field when `force`)
    ConfigureSettings { settings: OutputSettings, force: bool },
    /// Resume or pause the worker without recreating it
    ConfigureWork(bool),
    /// Ask for the worker's consumed-sample counter
    ConfigureStreamTiming,
    /// Start (`true`) or stop (`false`) generation
    StartStop(bool),

    // ─────────────────────────────────────────────────────────────
    // Reports to the GUI side
    // ─────────────────────────────────────────────────────────────
    /// Generation is now on or off
    ReportGeneration(bool),
    /// Samples consumed by the worker since start
    ReportStreamTiming(u64),

    // ─────────────────────────────────────────────────────────────
    // Downstream DSP
    // ─────────────────────────────────────────────────────────────
    SignalChanged(SignalNotification),
}

impl Message {
    /// Whether this is a request the driver acts on
    pub fn is_driver_request(&self) -> bool {
        matches!(
            self,
            Message::ConfigureSettings { .. }
                | Message::ConfigureWork(_)
                | Message::ConfigureStreamTiming
                | Message::StartStop(_)
        )
    }
}

/// Ordered, asynchronous, multi-producer message queue
///
/// Cloning yields another handle onto the same queue.
#[derive(Debug, Clone)]
pub struct MessageQueue {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl MessageQueue {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    /// Enqueue a message; never blocks
    pub fn push(&self, message: Message) {
        // Both ends live in `self`, so the channel cannot be disconnected
        let _ = self.tx.send(message);
    }

    /// Dequeue the oldest message, if any
    pub fn pop(&self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next message
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Message> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take every message currently queued, oldest first
    pub fn drain(&self) -> Vec<Message> {
        self.rx.try_iter().collect()
    }

    /// Sending half, for producers that only push
    pub fn sender(&self) -> Sender<Message> {
        self.tx.clone()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}
