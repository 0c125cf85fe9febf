//! Exclusive-access locking, gated by client identity.
//!
//! Two independent [`Locker`]s exist per [`crate::Scpi`] instance: one for
//! `:SYSTem:LOCK` (read access) and, if enabled, one for `:SYSTem:WLOCK`
//! (write access). Each is a small mutex-guarded record rather than a
//! node in the command tree, matching the single-owner state machine of
//! the original's booking calls.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A client's identity, as observed from its TCP peer address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(ip: std::net::IpAddr, port: u16) -> ClientId {
        ClientId(format!("{}:{}", ip, port))
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Booking {
    owner: ClientId,
    since: Instant,
}

struct Inner {
    booking: Option<Booking>,
}

/// A single exclusive-access booking, expiring after an idle timeout.
pub struct Locker {
    inner: Mutex<Inner>,
    timeout: Duration,
}

impl Locker {
    pub fn new(timeout: Duration) -> Locker {
        Locker {
            inner: Mutex::new(Inner { booking: None }),
            timeout,
        }
    }

    fn expire_if_stale(&self, inner: &mut Inner) {
        if let Some(booking) = &inner.booking {
            if booking.since.elapsed() >= self.timeout {
                inner.booking = None;
            }
        }
    }

    /// Books exclusive access for `id`. Succeeds if unbooked, already
    /// booked by `id` (refreshing the idle timer), or the existing
    /// booking has gone stale.
    pub fn request(&self, id: &ClientId) -> bool {
        let mut inner = self.inner.lock();
        self.expire_if_stale(&mut inner);
        match &inner.booking {
            None => {
                inner.booking = Some(Booking {
                    owner: id.clone(),
                    since: Instant::now(),
                });
                true
            }
            Some(booking) if &booking.owner == id => {
                inner.booking = Some(Booking {
                    owner: id.clone(),
                    since: Instant::now(),
                });
                true
            }
            Some(_) => false,
        }
    }

    /// Releases the booking, if `id` holds it. Returns whether it
    /// succeeded: `false` if the booking is held by someone else (a
    /// release by a non-owner is a no-op), and `false` if there was
    /// nothing to release.
    pub fn release(&self, id: &ClientId) -> bool {
        let mut inner = self.inner.lock();
        self.expire_if_stale(&mut inner);
        if inner.booking.as_ref().map(|b| &b.owner) == Some(id) {
            inner.booking = None;
            true
        } else {
            false
        }
    }

    /// Whether `id` is allowed through: either nobody holds the lock, or
    /// `id` itself does.
    pub fn access(&self, id: &ClientId) -> bool {
        let mut inner = self.inner.lock();
        self.expire_if_stale(&mut inner);
        match &inner.booking {
            None => true,
            Some(booking) => &booking.owner == id,
        }
    }

    /// The current owner, if any and not stale.
    pub fn owner(&self) -> Option<ClientId> {
        let mut inner = self.inner.lock();
        self.expire_if_stale(&mut inner);
        inner.booking.as_ref().map(|b| b.owner.clone())
    }

    /// Unconditionally drops the booking, regardless of owner.
    pub fn force_release(&self) {
        let mut inner = self.inner.lock();
        inner.booking = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn id(s: &str) -> ClientId {
        ClientId(s.to_string())
    }

    #[test]
    fn second_client_is_denied_while_booked() {
        let locker = Locker::new(Duration::from_secs(60));
        assert!(locker.request(&id("10.0.0.1:1000")));
        assert!(!locker.request(&id("10.0.0.2:2000")));
        assert!(locker.access(&id("10.0.0.1:1000")));
        assert!(!locker.access(&id("10.0.0.2:2000")));
    }

    #[test]
    fn release_by_non_owner_is_a_no_op_and_fails() {
        let locker = Locker::new(Duration::from_secs(60));
        locker.request(&id("10.0.0.1:1000"));
        assert!(!locker.release(&id("10.0.0.2:2000")));
        assert!(!locker.access(&id("10.0.0.2:2000")));
    }

    #[test]
    fn release_by_owner_succeeds_release_of_unbooked_fails() {
        let locker = Locker::new(Duration::from_secs(60));
        assert!(!locker.release(&id("10.0.0.1:1000")));
        locker.request(&id("10.0.0.1:1000"));
        assert!(locker.release(&id("10.0.0.1:1000")));
    }

    #[test]
    fn booking_expires_after_idle_timeout() {
        let locker = Locker::new(Duration::from_millis(10));
        locker.request(&id("10.0.0.1:1000"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(locker.access(&id("10.0.0.2:2000")));
        assert_eq!(locker.owner(), None);
    }

    #[test]
    fn force_release_drops_any_owner() {
        let locker = Locker::new(Duration::from_secs(60));
        locker.request(&id("10.0.0.1:1000"));
        locker.force_release();
        assert_eq!(locker.owner(), None);
    }
}
