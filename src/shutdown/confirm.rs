//! Operator confirmation of a server-requested shutdown

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::config::ConfirmationMode;

/// Blocking yes/no question to whoever operates this process.
///
/// Implementations may block; the coordinator always calls them on the blocking
/// thread pool.
pub trait Confirmation: Send + Sync {
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Asks on the controlling terminal, anything but `y`/`yes` declines
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl Confirmation for TerminalPrompt {
    fn confirm(&self, message: &str) -> Result<bool> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{message} [y/N] ").context("failed to write prompt")?;
        stderr.flush().context("failed to write prompt")?;
        drop(stderr);

        let mut answer = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("failed to read answer from stdin")?;
        if read == 0 {
            bail!("stdin closed before an answer was given");
        }

        let accepted = parse_answer(&answer);
        info!(
            "operator response to shutdown: {}",
            if accepted { "accepted" } else { "cancelled" }
        );
        Ok(accepted)
    }
}

fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Unattended operation: always answers the same
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAnswer(pub bool);

impl Confirmation for FixedAnswer {
    fn confirm(&self, _message: &str) -> Result<bool> {
        Ok(self.0)
    }
}

pub fn from_mode(mode: ConfirmationMode) -> Arc<dyn Confirmation> {
    match mode {
        ConfirmationMode::Prompt => Arc::new(TerminalPrompt),
        ConfirmationMode::Accept => Arc::new(FixedAnswer(true)),
        ConfirmationMode::Decline => Arc::new(FixedAnswer(false)),
    }
}
