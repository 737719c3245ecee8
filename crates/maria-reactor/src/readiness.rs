//! Translation between tokio readiness and library wait bits.

use maria_nonblock::WaitStatus;
use tokio::io::{Interest, Ready};

/// The tokio interest needed to satisfy a wait.
///
/// `EXCEPT` is observed through read readiness (hang-up and error states are
/// reported there). Returns `None` for waits without a socket condition,
/// such as a pure `TIMEOUT` wait.
#[must_use]
pub fn interest_for(status: WaitStatus) -> Option<Interest> {
    let read = status.intersects(WaitStatus::READ | WaitStatus::EXCEPT);
    let write = status.contains(WaitStatus::WRITE);
    match (read, write) {
        (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    }
}

/// The library wait bits satisfied by a tokio readiness set.
///
/// Only bits that were `requested` are reported. A closed read or write half
/// counts as readiness of that direction, so the library observes the
/// hang-up on its next call.
#[must_use]
pub fn status_from_ready(ready: Ready, requested: WaitStatus) -> WaitStatus {
    let mut status = WaitStatus::empty();
    if requested.contains(WaitStatus::READ) && (ready.is_readable() || ready.is_read_closed()) {
        status |= WaitStatus::READ;
    }
    if requested.contains(WaitStatus::WRITE) && (ready.is_writable() || ready.is_write_closed()) {
        status |= WaitStatus::WRITE;
    }
    if requested.contains(WaitStatus::EXCEPT) && (ready.is_read_closed() || ready.is_write_closed())
    {
        status |= WaitStatus::EXCEPT;
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_interest_for_read_write() {
        assert_eq!(interest_for(WaitStatus::READ), Some(Interest::READABLE));
        assert_eq!(interest_for(WaitStatus::WRITE), Some(Interest::WRITABLE));
        assert_eq!(
            interest_for(WaitStatus::READ | WaitStatus::WRITE),
            Some(Interest::READABLE | Interest::WRITABLE)
        );
        assert_eq!(interest_for(WaitStatus::EXCEPT), Some(Interest::READABLE));
    }

    #[test]
    fn test_interest_for_timeout_only() {
        assert_eq!(interest_for(WaitStatus::TIMEOUT), None);
        assert_eq!(interest_for(WaitStatus::empty()), None);
        assert_eq!(
            interest_for(WaitStatus::READ | WaitStatus::TIMEOUT),
            Some(Interest::READABLE)
        );
    }

    #[test]
    fn test_status_from_ready_filters_to_requested() {
        let ready = Ready::READABLE | Ready::WRITABLE;
        assert_eq!(status_from_ready(ready, WaitStatus::READ), WaitStatus::READ);
        assert_eq!(
            status_from_ready(ready, WaitStatus::READ | WaitStatus::WRITE),
            WaitStatus::READ | WaitStatus::WRITE
        );
        assert_eq!(
            status_from_ready(Ready::WRITABLE, WaitStatus::READ),
            WaitStatus::empty()
        );
    }

    #[test]
    fn test_status_from_ready_hangup() {
        let ready = Ready::READ_CLOSED;
        assert_eq!(
            status_from_ready(ready, WaitStatus::READ | WaitStatus::EXCEPT),
            WaitStatus::READ | WaitStatus::EXCEPT
        );
        assert_eq!(
            status_from_ready(Ready::WRITE_CLOSED, WaitStatus::WRITE),
            WaitStatus::WRITE
        );
    }

    fn any_status() -> impl Strategy<Value = WaitStatus> {
        (0u8..16).prop_map(WaitStatus::from_bits_truncate)
    }

    fn any_ready() -> impl Strategy<Value = Ready> {
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(r, w, rc, wc)| {
            let mut ready = Ready::EMPTY;
            if r {
                ready = ready | Ready::READABLE;
            }
            if w {
                ready = ready | Ready::WRITABLE;
            }
            if rc {
                ready = ready | Ready::READ_CLOSED;
            }
            if wc {
                ready = ready | Ready::WRITE_CLOSED;
            }
            ready
        })
    }

    proptest! {
        #[test]
        fn status_never_reports_unrequested_bits(ready in any_ready(), requested in any_status()) {
            let status = status_from_ready(ready, requested);
            prop_assert!(requested.contains(status));
            prop_assert!(!status.contains(WaitStatus::TIMEOUT));
        }

        #[test]
        fn socket_waits_always_map_to_an_interest(requested in any_status()) {
            let interest = interest_for(requested);
            prop_assert_eq!(interest.is_some(), !requested.socket_bits().is_empty());
        }
    }
}
