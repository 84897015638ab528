//! DeliveryWorker - Drains the priority queue into the ingestion endpoint
//!
//! ## Message Flow
//!
//! ```text
//! enqueue → PriorityQueue → pop → Transport::send ─┬─ ok → (should_shutdown → ShutdownCoordinator)
//!                ▲                                 └─ err → requeue unchanged → sleep retry delay
//!                └─────────────────────────────────────────────┘
//! ```
//!
//! There is exactly one worker per queue, so a failed item is always the next one
//! retried unless something of higher priority arrived in the meantime.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    config::ServerConfig,
    envelope::MetricsEnvelope,
    queue::{Priority, PriorityQueue, QueueItem},
    shutdown::ShutdownCoordinator,
    transport::Transport,
};

use super::messages::{DeliveryCommand, QueueStats};

/// Upper bound on how long an idle worker sleeps before looking at the queue again
const IDLE_POLL: Duration = Duration::from_millis(50);

/// How long [`DeliveryQueue::stop`] waits for the worker to finish its current item
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Fixed back-off between attempts, no growth and no jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl From<&ServerConfig> for RetryPolicy {
    fn from(config: &ServerConfig) -> Self {
        Self {
            delay: config.retry_delay(),
            max_attempts: config.retry_attempts,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed_attempts: AtomicU64,
    dropped: AtomicU64,
}

enum Flow {
    Continue,
    Exit,
}

/// Single consumer of a [`PriorityQueue`]
pub struct DeliveryWorker {
    queue: Arc<PriorityQueue>,

    transport: Arc<dyn Transport>,

    /// Receives `should_shutdown` directives
    coordinator: Option<Arc<ShutdownCoordinator>>,

    retry: RetryPolicy,

    counters: Arc<Counters>,

    command_rx: mpsc::Receiver<DeliveryCommand>,

    /// Set once a drain was requested, answered when the queue runs empty
    drain_reply: Option<oneshot::Sender<()>>,
}

impl DeliveryWorker {
    /// Run until stopped, drained, or every handle is dropped
    #[instrument(skip(self), name = "delivery_worker")]
    pub async fn run(mut self) {
        debug!("starting delivery worker");

        loop {
            if let Flow::Exit = self.poll_commands() {
                break;
            }

            if let Some(item) = self.queue.pop() {
                if let Flow::Exit = self.deliver(item).await {
                    break;
                }
                continue;
            }

            if let Some(reply) = self.drain_reply.take() {
                debug!("queue drained");
                let _ = reply.send(());
                break;
            }

            tokio::select! {
                _ = self.queue.notified() => {}
                _ = tokio::time::sleep(IDLE_POLL) => {}
                command = self.command_rx.recv() => {
                    if let Flow::Exit = self.handle_command(command) {
                        break;
                    }
                }
            }
        }

        debug!("delivery worker stopped, {} items left in queue", self.queue.len());
    }

    fn poll_commands(&mut self) -> Flow {
        loop {
            match self.command_rx.try_recv() {
                Ok(command) => {
                    if let Flow::Exit = self.handle_command(Some(command)) {
                        return Flow::Exit;
                    }
                }
                Err(TryRecvError::Empty) => return Flow::Continue,
                Err(TryRecvError::Disconnected) => return self.handle_command(None),
            }
        }
    }

    fn handle_command(&mut self, command: Option<DeliveryCommand>) -> Flow {
        match command {
            Some(DeliveryCommand::Stop) => {
                debug!("received stop command");
                Flow::Exit
            }
            Some(DeliveryCommand::DrainAndStop { respond_to }) => {
                debug!("received drain command, {} items pending", self.queue.len());
                self.drain_reply = Some(respond_to);
                Flow::Continue
            }
            None => {
                warn!("command channel closed, shutting down");
                Flow::Exit
            }
        }
    }

    async fn deliver(&mut self, mut item: QueueItem) -> Flow {
        trace!(
            "sending item {} (priority {}, {} bytes)",
            item.sequence(),
            item.priority,
            item.body().len()
        );

        match self.transport.send(item.body()).await {
            Ok(response) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                info!("data sent successfully");

                if response.should_shutdown {
                    self.on_shutdown_directive().await;
                }
                Flow::Continue
            }
            Err(e) => {
                self.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
                item.record_failure();
                error!("error sending data: {e}");

                if let Some(max_attempts) = self.retry.max_attempts
                    && item.attempts() >= max_attempts
                {
                    self.give_up(&item);
                    return Flow::Continue;
                }

                self.queue.requeue(item);
                info!("retrying in {:?}", self.retry.delay);
                self.backoff().await
            }
        }
    }

    fn give_up(&self, item: &QueueItem) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        error!(
            "dropping item {} after {} failed attempts",
            item.sequence(),
            item.attempts()
        );
    }

    /// Sleep the retry delay, still answering commands
    async fn backoff(&mut self) -> Flow {
        let sleep = tokio::time::sleep(self.retry.delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Flow::Continue,
                command = self.command_rx.recv() => {
                    if let Flow::Exit = self.handle_command(command) {
                        return Flow::Exit;
                    }
                }
            }
        }
    }

    async fn on_shutdown_directive(&self) {
        match &self.coordinator {
            Some(coordinator) => {
                info!("server requested shutdown");
                let outcome = coordinator.handle_shutdown_request().await;
                debug!("shutdown request handled: {outcome:?}");
            }
            None => warn!("server requested shutdown but no coordinator is configured"),
        }
    }
}

/// Handle for enqueueing envelopes and controlling the DeliveryWorker
///
/// Cloning the handle shares the same queue and worker.
#[derive(Clone)]
pub struct DeliveryQueue {
    queue: Arc<PriorityQueue>,
    counters: Arc<Counters>,
    sender: mpsc::Sender<DeliveryCommand>,
}

impl DeliveryQueue {
    /// Create the queue and spawn its worker
    pub fn spawn(
        transport: Arc<dyn Transport>,
        coordinator: Option<Arc<ShutdownCoordinator>>,
        retry: RetryPolicy,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let queue = Arc::new(PriorityQueue::new());
        let counters = Arc::new(Counters::default());

        let worker = DeliveryWorker {
            queue: queue.clone(),
            transport,
            coordinator,
            retry,
            counters: counters.clone(),
            command_rx: cmd_rx,
            drain_reply: None,
        };

        tokio::spawn(worker.run());

        Self {
            queue,
            counters,
            sender: cmd_tx,
        }
    }

    /// Serialize and enqueue without waiting for the network.
    ///
    /// Returns `false` only if the envelope could not be serialized.
    pub fn enqueue(&self, envelope: &MetricsEnvelope, priority: Priority) -> bool {
        match serde_json::to_vec(envelope) {
            Ok(body) => {
                debug!("payload size: {} bytes", body.len());
                let pending = self.queue.push(priority, body);
                trace!("{pending} items pending");
                true
            }
            Err(e) => {
                error!("error adding item to queue: {e}");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.queue.len(),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed_attempts: self.counters.failed_attempts.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker once its current item is done and wait up to
    /// [`STOP_GRACE`] for it to exit. Queued items are left behind.
    pub async fn stop(&self) -> bool {
        self.stop_within(STOP_GRACE).await
    }

    /// Returns `false` if the worker is still busy after `grace`, e.g. while it
    /// waits for a shutdown confirmation. It exits on its own afterwards.
    pub async fn stop_within(&self, grace: Duration) -> bool {
        if self.sender.send(DeliveryCommand::Stop).await.is_err() {
            trace!("delivery worker already stopped");
        }

        if tokio::time::timeout(grace, self.sender.closed()).await.is_err() {
            warn!("delivery worker did not stop within {grace:?}");
            return false;
        }
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }

    /// Wait until every queued item was delivered (or dropped), then stop the worker
    pub async fn drain_and_stop(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DeliveryCommand::DrainAndStop { respond_to: tx })
            .await
            .context("failed to send DrainAndStop command")?;

        rx.await
            .context("delivery worker stopped before the queue was drained")
    }
}

impl std::fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("stats", &self.stats())
            .finish()
    }
}
