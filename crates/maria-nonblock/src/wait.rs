//! Wait conditions and step results of the non-blocking API.

use bitflags::bitflags;

bitflags! {
    /// Socket conditions a non-blocking call is waiting for.
    ///
    /// The bit values match the MariaDB client library (`MYSQL_WAIT_*`), so a
    /// library binding can pass them through unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WaitStatus: u8 {
        /// Wait until the socket is readable.
        const READ = 0x01;
        /// Wait until the socket is writable.
        const WRITE = 0x02;
        /// Wait for an exceptional condition on the socket.
        const EXCEPT = 0x04;
        /// Wait until the library's timeout value has elapsed.
        const TIMEOUT = 0x08;
    }
}

impl WaitStatus {
    /// Socket-level bits only (everything except `TIMEOUT`).
    #[must_use]
    pub fn socket_bits(self) -> Self {
        self & (Self::READ | Self::WRITE | Self::EXCEPT)
    }

    /// Whether the library asked for a deadline as part of this wait.
    #[must_use]
    pub fn wants_timeout(self) -> bool {
        self.contains(Self::TIMEOUT)
    }
}

/// Outcome of a single `*_start` or `*_cont` call.
///
/// Mirrors [`std::task::Poll`], except that the pending side carries the
/// condition the library is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    /// The call finished.
    Done(T),
    /// The call would block; continue once the condition is satisfied.
    Wait(WaitStatus),
}

impl<T> Step<T> {
    /// Map the finished value, leaving waits untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Self::Done(value) => Step::Done(f(value)),
            Self::Wait(status) => Step::Wait(status),
        }
    }

    /// Whether the call is still waiting.
    #[must_use]
    pub fn is_wait(&self) -> bool {
        matches!(self, Self::Wait(_))
    }

    /// The wait condition, if the call is still waiting.
    #[must_use]
    pub fn wait_status(&self) -> Option<WaitStatus> {
        match self {
            Self::Wait(status) => Some(*status),
            Self::Done(_) => None,
        }
    }
}
