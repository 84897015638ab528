//! ShutdownPoller - Asks the server for pending shutdown requests
//!
//! Alternative to the `should_shutdown` flag on delivery responses, for servers that
//! only expose `/api/check-shutdown`. Directives are forwarded to the same
//! [`ShutdownCoordinator`] the delivery worker uses, so both sources collapse into
//! one negotiation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, instrument, warn};

use crate::{
    shutdown::{ShutdownCoordinator, control::ControlClient},
    util::unix_now,
};

use super::messages::PollerCommand;

pub struct ShutdownPoller {
    client: ControlClient,

    coordinator: Arc<ShutdownCoordinator>,

    command_rx: mpsc::Receiver<PollerCommand>,

    interval_duration: Duration,

    /// Server time of the previous check
    last_check: f64,
}

impl ShutdownPoller {
    pub fn new(
        client: ControlClient,
        coordinator: Arc<ShutdownCoordinator>,
        command_rx: mpsc::Receiver<PollerCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            client,
            coordinator,
            command_rx,
            interval_duration,
            last_check: unix_now(),
        }
    }

    #[instrument(skip(self), fields(base = %self.client.base()))]
    pub async fn run(mut self) {
        debug!("starting shutdown poller");

        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.check().await {
                        error!("failed to check for shutdown requests: {e:#}");
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(PollerCommand::CheckNow { respond_to }) => {
                            debug!("received CheckNow command");
                            let result = self.check().await;
                            let _ = respond_to.send(result);
                        }

                        Some(PollerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        debug!("shutdown poller stopped");
    }

    /// Returns whether the server asked for a shutdown
    async fn check(&mut self) -> Result<bool> {
        let check = self.client.check_shutdown(self.last_check).await?;
        self.last_check = check.server_time.unwrap_or_else(unix_now);

        if check.should_shutdown {
            let outcome = self.coordinator.handle_shutdown_request().await;
            debug!("shutdown request handled: {outcome:?}");
        }

        Ok(check.should_shutdown)
    }
}

/// Handle for controlling a ShutdownPoller
#[derive(Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollerCommand>,
}

impl PollerHandle {
    pub fn spawn(
        client: ControlClient,
        coordinator: Arc<ShutdownCoordinator>,
        interval_duration: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let poller = ShutdownPoller::new(client, coordinator, cmd_rx, interval_duration);

        tokio::spawn(poller.run());

        Self { sender: cmd_tx }
    }

    /// Check immediately
    pub async fn check_now(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::CheckNow { respond_to: tx })
            .await
            .context("failed to send CheckNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
