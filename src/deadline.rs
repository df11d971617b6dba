use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::ServiceError;

/// Point in time by which a request's external calls must finish.
///
/// A deadline is created once per inbound request and handed to every
/// collaborator (product lookup, persistence, broker publish). Futures run
/// through [`Deadline::run`] are dropped when the deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Remaining time capped by a per-call upper bound.
    pub fn budget(&self, cap: Duration) -> Duration {
        self.remaining().min(cap)
    }

    /// Drives `fut` to completion unless the deadline passes first.
    pub async fn run<F, T>(&self, operation: &str, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        if self.is_expired() {
            return Err(ServiceError::DeadlineExceeded(format!(
                "{} not started: deadline already passed",
                operation
            )));
        }

        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::DeadlineExceeded(operation.to_string())),
        }
    }
}
