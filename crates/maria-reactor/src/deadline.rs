//! Deadlines for `TIMEOUT` waits.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::{Instant, Sleep};

/// An optional one-shot timer.
///
/// Armed only when the library includes `TIMEOUT` in a wait. Once it fires it
/// disarms itself, so a stale deadline never leaks into the next wait.
#[derive(Debug, Default)]
pub struct Deadline {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    /// A disarmed deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the deadline to expire `after` from now, replacing any prior one.
    pub fn arm(&mut self, after: Duration) {
        let when = Instant::now() + after;
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(when),
            None => self.sleep = Some(Box::pin(tokio::time::sleep_until(when))),
        }
    }

    /// Drop the timer.
    pub fn disarm(&mut self) {
        self.sleep = None;
    }

    /// Whether a timer is running.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Poll for expiry. A disarmed deadline never expires.
    pub fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let Some(sleep) = self.sleep.as_mut() else {
            return Poll::Pending;
        };
        match sleep.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.sleep = None;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
