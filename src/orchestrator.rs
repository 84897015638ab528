//! Fixed-interval collection loop
//!
//! ```text
//! Idle ──run──▶ Running ◀──resume── Paused
//!                  │ ──pause──▶        │
//!                  └──────stop─────────┴──▶ Stopped
//! ```
//!
//! Each tick polls every registered monitor in registration order, builds one
//! envelope and hands it to the [`DeliveryQueue`]. The loop never waits on
//! delivery.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    actors::delivery::DeliveryQueue,
    envelope::{EnvelopeBuilder, MetricsEnvelope},
    error::ConfigError,
    monitors::Monitor,
    queue::Priority,
    shutdown::PauseControl,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Running,
    Paused,
    Stopped,
}

pub struct Orchestrator {
    monitors: RwLock<Vec<Arc<dyn Monitor>>>,
    builder: EnvelopeBuilder,
    queue: DeliveryQueue,
    update_interval: Duration,
    started: AtomicBool,
    paused: AtomicBool,
    stopped: AtomicBool,
    stop_signal: Notify,
}

impl Orchestrator {
    pub fn new(builder: EnvelopeBuilder, queue: DeliveryQueue, update_interval: Duration) -> Self {
        Self {
            monitors: RwLock::new(Vec::new()),
            builder,
            queue,
            update_interval,
            started: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stop_signal: Notify::new(),
        }
    }

    /// Append a monitor. Ignored once stopped.
    pub fn register(&self, monitor: Arc<dyn Monitor>) {
        if self.is_stopped() {
            warn!("not registering {} monitor, orchestrator is stopped", monitor.name());
            return;
        }

        debug!("registering {} monitor", monitor.name());
        self.monitors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(monitor);
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    pub fn state(&self) -> OrchestratorState {
        if self.is_stopped() {
            OrchestratorState::Stopped
        } else if !self.started.load(Ordering::SeqCst) {
            OrchestratorState::Idle
        } else if self.is_paused() {
            OrchestratorState::Paused
        } else {
            OrchestratorState::Running
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Collect on every interval until [`stop`](Self::stop) is called.
    ///
    /// The interval sleep also runs when a tick is skipped because monitoring is
    /// paused.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ConfigError> {
        let count = self.monitor_count();
        if count == 0 {
            error!("no monitors registered");
            return Err(ConfigError::NoMonitors);
        }

        self.started.store(true, Ordering::SeqCst);
        info!(
            "starting monitoring with {count} monitors every {:?}",
            self.update_interval
        );

        while !self.is_stopped() {
            if self.is_paused() {
                debug!("monitoring paused, skipping collection");
            } else {
                self.collect_metrics().await;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.update_interval) => {}
                _ = self.stop_signal.notified() => {}
            }
        }

        info!("monitoring stopped");
        Ok(())
    }

    /// One tick: poll every monitor, build the envelope and enqueue it.
    ///
    /// Returns the enqueued envelope, or `None` while paused or when the
    /// envelope could not be serialized.
    #[instrument(skip(self))]
    pub async fn collect_metrics(&self) -> Option<MetricsEnvelope> {
        if self.is_paused() || self.is_stopped() {
            debug!("collection skipped");
            return None;
        }

        let monitors = self
            .monitors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut collected = Vec::with_capacity(monitors.len());
        for monitor in &monitors {
            match AssertUnwindSafe(monitor.collect()).catch_unwind().await {
                Ok(Some(result)) => collected.push((monitor.name().to_string(), result)),
                Ok(None) => {}
                Err(_) => error!("error collecting {} metrics: monitor panicked", monitor.name()),
            }
        }

        let envelope = self.builder.build(collected);
        if !self.queue.enqueue(&envelope, Priority::Normal) {
            return None;
        }

        Some(envelope)
    }

    /// Stop every monitor and the delivery worker. Idempotent.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("orchestrator already stopped");
            return;
        }

        info!("stopping monitoring");
        self.stop_signal.notify_one();

        let monitors = self
            .monitors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for monitor in monitors {
            if std::panic::catch_unwind(AssertUnwindSafe(|| monitor.stop())).is_err() {
                error!("failed to stop {} monitor", monitor.name());
            }
        }

        self.queue.stop().await;
    }
}

impl PauseControl for Orchestrator {
    fn pause_monitoring(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!("monitoring paused");
        }
    }

    fn resume_monitoring(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("monitoring resumed");
        }
    }
}
