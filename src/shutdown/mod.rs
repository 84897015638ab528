//! Server-initiated shutdown negotiation
//!
//! The ingestion side can ask a client to shut down, either piggybacked on a
//! delivery response or through `/api/check-shutdown`. The [`ShutdownCoordinator`]
//! is the single place where such a request is handled:
//!
//! ```text
//! Normal → ShutdownPending ─┬─ confirmed → Terminated (exit hook)
//!                           └─ declined  → cancel on server → Normal
//! ```

pub mod confirm;
pub mod control;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{error, info, instrument, warn};

use crate::util::unix_now;

use self::{confirm::Confirmation, control::ControlClient};

const SHUTDOWN_MESSAGE: &str =
    "Server has requested a shutdown. Proceed with shutdown of this monitoring client?";

/// Whatever keeps collecting metrics while a shutdown is being negotiated
pub trait PauseControl: Send + Sync {
    fn pause_monitoring(&self);
    fn resume_monitoring(&self);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShutdownState {
    /// Unix seconds at which the pending request arrived
    pub requested_at: Option<f64>,
    pub client_id: Option<String>,
    pub in_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Another request is already being handled
    AlreadyInProgress,
    /// The exit hook was invoked
    Confirmed,
    /// Monitoring resumed
    Declined,
}

pub type ExitHook = Arc<dyn Fn() + Send + Sync>;

pub struct ShutdownCoordinator {
    state: Mutex<ShutdownState>,
    monitor_handler: Mutex<Option<Weak<dyn PauseControl>>>,
    confirmation: Arc<dyn Confirmation>,
    control: Option<ControlClient>,
    client_id: String,
    exit: ExitHook,
}

impl ShutdownCoordinator {
    pub fn new(
        client_id: impl Into<String>,
        confirmation: Arc<dyn Confirmation>,
        control: Option<ControlClient>,
    ) -> Self {
        Self {
            state: Mutex::new(ShutdownState::default()),
            monitor_handler: Mutex::new(None),
            confirmation,
            control,
            client_id: client_id.into(),
            exit: Arc::new(|| std::process::exit(0)),
        }
    }

    /// Replace the default `process::exit(0)`
    pub fn with_exit_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.exit = Arc::new(hook);
        self
    }

    /// Bind the orchestrator to pause while a request is pending. Only a weak
    /// reference is kept.
    pub fn set_monitor_handler<T: PauseControl + 'static>(&self, handler: &Arc<T>) {
        let handler: Weak<T> = Arc::downgrade(handler);
        let handler: Weak<dyn PauseControl> = handler;
        *self
            .monitor_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub fn state(&self) -> ShutdownState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ShutdownState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn monitor_handler(&self) -> Option<Arc<dyn PauseControl>> {
        self.monitor_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Handle one shutdown directive. Requests arriving while another one is
    /// being handled are ignored.
    #[instrument(skip(self), fields(client = %self.client_id))]
    pub async fn handle_shutdown_request(&self) -> ShutdownOutcome {
        {
            let mut state = self.lock_state();
            if state.in_progress {
                info!("shutdown already in progress");
                return ShutdownOutcome::AlreadyInProgress;
            }
            state.in_progress = true;
            state.requested_at = Some(unix_now());
            state.client_id = Some(self.client_id.clone());
        }

        info!("processing shutdown request");
        let handler = self.monitor_handler();
        match &handler {
            Some(handler) => {
                info!("pausing monitoring");
                handler.pause_monitoring();
            }
            None => warn!("no monitor handler bound, monitoring keeps running"),
        }

        if self.confirm().await {
            info!("operator accepted shutdown, initiating shutdown");
            (self.exit)();
            return ShutdownOutcome::Confirmed;
        }

        info!("operator cancelled shutdown");
        if let Some(control) = &self.control
            && let Err(e) = control.cancel_shutdown(&self.client_id).await
        {
            error!("failed to cancel shutdown: {e:#}");
        }

        if let Some(handler) = handler {
            info!("resuming monitoring");
            handler.resume_monitoring();
        }
        *self.lock_state() = ShutdownState::default();

        ShutdownOutcome::Declined
    }

    /// A prompt that cannot be shown counts as confirmed
    async fn confirm(&self) -> bool {
        let confirmation = self.confirmation.clone();
        let answer =
            tokio::task::spawn_blocking(move || confirmation.confirm(SHUTDOWN_MESSAGE)).await;

        match answer {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(e)) => {
                error!("failed to obtain shutdown confirmation: {e:#}");
                true
            }
            Err(e) => {
                error!("shutdown confirmation panicked: {e}");
                true
            }
        }
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("client_id", &self.client_id)
            .field("state", &self.state())
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}
