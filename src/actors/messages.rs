//! Message types for actor communication
//!
//! Every actor owns an mpsc command receiver. Requests that need an answer carry a
//! oneshot sender.

use serde::Serialize;
use tokio::sync::oneshot;

/// Commands that can be sent to the DeliveryWorker
#[derive(Debug)]
pub enum DeliveryCommand {
    /// Exit after the item currently being sent, leaving the rest queued
    Stop,

    /// Keep delivering until the queue is empty, then exit
    DrainAndStop {
        /// Answered once the queue is empty and the worker exits
        respond_to: oneshot::Sender<()>,
    },
}

/// Delivery statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Items waiting in the queue, including ones waiting for a retry
    pub pending: usize,

    /// Envelopes acknowledged by the server
    pub delivered: u64,

    /// Failed delivery attempts (one item may fail many times)
    pub failed_attempts: u64,

    /// Envelopes given up on after exhausting the retry limit
    pub dropped: u64,
}

/// Commands that can be sent to the ShutdownPoller
#[derive(Debug)]
pub enum PollerCommand {
    /// Check immediately instead of waiting for the next interval
    CheckNow {
        /// Whether the server asked for a shutdown
        respond_to: oneshot::Sender<anyhow::Result<bool>>,
    },

    /// Stop polling
    Shutdown,
}
