//! Low-coverage notification boundary.

use crate::types::Identity;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("notification for {identity} failed: {reason}")]
pub struct NotifyError {
    pub identity: Identity,
    pub reason: String,
}

/// Fire-and-forget delivery of "please provide fresh face data" reminders.
pub trait Notifier: Send + Sync {
    fn notify_low_coverage(&self, identity: &Identity, remaining: usize) -> Result<(), NotifyError>;
}

/// Notifier that only records the reminder in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_low_coverage(&self, identity: &Identity, remaining: usize) -> Result<(), NotifyError> {
        tracing::info!(%identity, remaining, "face data expiring, reminder issued");
        Ok(())
    }
}
