// Cancel-and-reschedule deadlines for the engine's select loop.

use std::time::Duration;

use tokio::time::Instant;

/// A single pending firing, or none.
///
/// Scheduling replaces whatever was pending, so at most one firing of a
/// given kind is ever outstanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn schedule(&mut self, after: Duration) {
        self.0 = Some(Instant::now() + after);
    }

    pub fn cancel(&mut self) {
        self.0 = None;
    }

    pub fn is_pending(self) -> bool {
        self.0.is_some()
    }

    /// Time left until the firing, if one is pending.
    pub fn remaining(self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }
}

/// Resolves when `deadline` is reached; never resolves when none is pending.
pub async fn expired(deadline: Deadline) {
    match deadline.0 {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_pending() {
        let mut deadline = Deadline::default();
        deadline.schedule(Duration::from_secs(30));
        deadline.schedule(Duration::from_secs(10));
        assert_eq!(deadline.remaining(), Some(Duration::from_secs(10)));

        let fired = tokio::time::timeout(Duration::from_secs(11), expired(deadline)).await;
        assert!(fired.is_ok());
        deadline.cancel();
        assert!(!deadline.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_deadline_never_fires() {
        let mut deadline = Deadline::default();
        deadline.schedule(Duration::from_secs(1));
        deadline.cancel();
        let fired = tokio::time::timeout(Duration::from_secs(3600), expired(deadline)).await;
        assert!(fired.is_err());
    }
}
