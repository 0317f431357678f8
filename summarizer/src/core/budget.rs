//! Shared session budget for blocking oracle and tool calls.

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::error::SessionTimeoutError;

/// Wall-clock deadline for one session (a template completion or an agent run).
#[derive(Debug, Clone, Copy)]
pub struct SessionBudget {
    deadline: Instant,
    total: Duration,
}

impl SessionBudget {
    pub fn new(total: Duration) -> Self {
        Self {
            deadline: Instant::now() + total,
            total,
        }
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Return the remaining time before the deadline.
    ///
    /// Errors with [`SessionTimeoutError`] once nothing is left.
    pub fn remaining(&self) -> Result<Duration> {
        remaining_budget(self.deadline).map_err(|_| {
            SessionTimeoutError {
                secs: self.total.as_secs(),
            }
            .into()
        })
    }
}

/// Return the remaining time budget until the provided deadline.
pub fn remaining_budget(deadline: Instant) -> Result<Duration> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return Err(SessionTimeoutError { secs: 0 }.into());
    }
    Ok(remaining)
}
