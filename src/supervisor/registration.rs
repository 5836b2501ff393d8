//! One-shot readiness signal for the registration handshake.
//!
//! A START/ENSURE handler subscribes to the event and suspends until the
//! PORT handler for the same identifier signals it with the reported port.
//! Several waiters may share one event (concurrent ENSURE calls).

use std::process::ExitStatus;
use std::time::Duration;

use tokio::sync::watch;

/// Why a registration wait ended without a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("Registration not received within {0:?}")]
    Timeout(Duration),

    /// The record was removed before the adapter registered.
    #[error("Registration abandoned")]
    Abandoned,

    #[error("Adapter exited before registering ({0})")]
    Exited(ExitStatus),
}

/// Single-fire event carrying the registered port.
#[derive(Debug)]
pub struct RegistrationEvent {
    tx: watch::Sender<Option<u16>>,
}

impl Default for RegistrationEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationEvent {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Signal the event. Returns `false` if it had already fired.
    pub fn signal(&self, port: u16) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(port);
            true
        })
    }

    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Obtain a waiter. Waiters created after the signal resolve immediately.
    #[must_use]
    pub fn subscribe(&self) -> RegistrationWaiter {
        RegistrationWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving half of a [`RegistrationEvent`].
#[derive(Debug)]
pub struct RegistrationWaiter {
    rx: watch::Receiver<Option<u16>>,
}

impl RegistrationWaiter {
    /// Wait until the event fires, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] when the deadline passes and
    /// [`WaitError::Abandoned`] when the event is dropped unsignaled.
    pub async fn wait(mut self, timeout: Duration) -> Result<u16, WaitError> {
        let result = tokio::time::timeout(timeout, self.rx.wait_for(Option::is_some)).await;
        match result {
            Ok(Ok(port)) => (*port).ok_or(WaitError::Abandoned),
            Ok(Err(_)) => Err(WaitError::Abandoned),
            Err(_) => Err(WaitError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waiter_resolves_after_signal() {
        let event = RegistrationEvent::new();
        let waiter = event.subscribe();

        let task = tokio::spawn(waiter.wait(Duration::from_secs(1)));
        tokio::task::yield_now().await;
        assert!(event.signal(53217));

        assert_eq!(task.await.unwrap(), Ok(53217));
    }

    #[tokio::test]
    async fn late_waiter_sees_existing_signal() {
        let event = RegistrationEvent::new();
        event.signal(4000);
        assert!(event.is_signaled());
        assert_eq!(event.subscribe().wait(Duration::from_millis(10)).await, Ok(4000));
    }

    #[tokio::test]
    async fn signal_fires_once() {
        let event = RegistrationEvent::new();
        assert!(event.signal(1));
        assert!(!event.signal(2));
        assert_eq!(event.subscribe().wait(Duration::from_millis(10)).await, Ok(1));
    }

    #[tokio::test]
    async fn wait_times_out() {
        let event = RegistrationEvent::new();
        let result = event.subscribe().wait(Duration::from_millis(20)).await;
        assert_eq!(result, Err(WaitError::Timeout(Duration::from_millis(20))));
    }

    #[tokio::test]
    async fn dropped_event_abandons_waiters() {
        let event = RegistrationEvent::new();
        let waiter = event.subscribe();
        drop(event);
        assert_eq!(waiter.wait(Duration::from_secs(1)).await, Err(WaitError::Abandoned));
    }

    #[tokio::test]
    async fn multiple_waiters_share_one_signal() {
        let event = RegistrationEvent::new();
        let a = tokio::spawn(event.subscribe().wait(Duration::from_secs(1)));
        let b = tokio::spawn(event.subscribe().wait(Duration::from_secs(1)));
        tokio::task::yield_now().await;
        event.signal(777);
        assert_eq!(a.await.unwrap(), Ok(777));
        assert_eq!(b.await.unwrap(), Ok(777));
    }
}
