//! Cooperative per-request deadline, checked by long-running stages.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self { started: Instant::now(), budget: None }
    }

    pub fn after(budget: Duration) -> Self {
        Self { started: Instant::now(), budget: Some(budget) }
    }

    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::none, Self::after)
    }

    pub fn check(&self) -> Result<()> {
        match self.budget {
            Some(budget) if self.started.elapsed() >= budget => Err(Error::Timeout(budget)),
            _ => Ok(()),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
