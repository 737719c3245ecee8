//! Per-connection socket watcher.

use std::os::fd::{AsRawFd, RawFd};
use std::task::{Context, Poll};

use maria_nonblock::WaitStatus;
use tokio::io::unix::AsyncFd;

use crate::error::{ReactorError, Result};
use crate::readiness::{interest_for, status_from_ready};

/// A borrowed descriptor owned by the native library.
///
/// Dropping it does not close the socket; the library does that itself.
#[derive(Debug, Clone, Copy)]
struct SocketFd(RawFd);

impl AsRawFd for SocketFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Watches one connection's socket on behalf of the state machines.
///
/// A watcher holds at most one registration. [`arm`](Self::arm) replaces the
/// interest of the previous cycle, and [`poll_ready`](Self::poll_ready)
/// delivers a single readiness event per arm cycle.
///
/// Every arm cycle starts from a fresh registration. tokio's readiness is
/// edge-triggered, so a socket that stayed ready after the previous cycle
/// would otherwise never be reported again.
#[derive(Debug, Default)]
pub struct Watcher {
    registration: Option<AsyncFd<SocketFd>>,
    armed: WaitStatus,
}

impl Watcher {
    /// A watcher without a registration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `fd` for the socket conditions in `status`.
    ///
    /// `TIMEOUT` is ignored here (see [`Deadline`](crate::Deadline)). A wait
    /// with no socket condition leaves the watcher armed with nothing, which
    /// never becomes ready.
    pub fn arm(&mut self, fd: Option<RawFd>, status: WaitStatus) -> Result<()> {
        if status.is_empty() {
            return Err(ReactorError::EmptyInterest);
        }
        // Deregister the previous cycle before registering again.
        self.disarm();

        let Some(interest) = interest_for(status) else {
            return Ok(());
        };
        let fd = fd.ok_or(ReactorError::NoSocket)?;
        let registration = AsyncFd::with_interest(SocketFd(fd), interest)
            .map_err(|source| ReactorError::Register { fd, source })?;

        let socket_bits = status.socket_bits();
        tracing::trace!(fd, wait = ?socket_bits, "armed watcher");
        self.registration = Some(registration);
        self.armed = socket_bits;
        Ok(())
    }

    /// Stop watching and drop the registration.
    pub fn disarm(&mut self) {
        if let Some(registration) = self.registration.take() {
            tracing::trace!(fd = registration.get_ref().0, "disarmed watcher");
        }
        self.armed = WaitStatus::empty();
    }

    /// Whether a socket condition is currently armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        !self.armed.is_empty()
    }

    /// The currently armed wait bits.
    #[must_use]
    pub fn armed(&self) -> WaitStatus {
        self.armed
    }

    /// Descriptor of the current registration.
    #[must_use]
    pub fn fd(&self) -> Option<RawFd> {
        self.registration.as_ref().map(|r| r.get_ref().0)
    }

    /// Poll for the armed condition.
    ///
    /// Resolves with the satisfied wait bits and consumes the arm cycle;
    /// polling again before the next [`arm`](Self::arm) stays pending.
    pub fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<WaitStatus>> {
        let armed = self.armed;
        let Some(interest) = interest_for(armed) else {
            return Poll::Pending;
        };
        let Some(registration) = self.registration.as_ref() else {
            return Poll::Ready(Err(ReactorError::NotArmed));
        };

        loop {
            let mut status = WaitStatus::empty();
            let mut fired = false;

            if interest.is_readable() {
                if let Poll::Ready(result) = registration.poll_read_ready(cx) {
                    let mut guard = result.map_err(ReactorError::Poll)?;
                    status |= status_from_ready(guard.ready(), armed);
                    guard.clear_ready();
                    fired = true;
                }
            }
            if interest.is_writable() {
                if let Poll::Ready(result) = registration.poll_write_ready(cx) {
                    let mut guard = result.map_err(ReactorError::Poll)?;
                    status |= status_from_ready(guard.ready(), armed);
                    guard.clear_ready();
                    fired = true;
                }
            }

            if !status.is_empty() {
                self.armed = WaitStatus::empty();
                return Poll::Ready(Ok(status));
            }
            if !fired {
                return Poll::Pending;
            }
            // Readiness fired for a direction that satisfies nothing that was
            // asked for. It has been cleared; poll again to register wakers.
        }
    }
}
