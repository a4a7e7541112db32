//! Online/offline signal injected into the engine.

use tokio::sync::watch;

/// Host-provided connectivity.
///
/// `subscribe` hands out a receiver whose value flips on every transition;
/// the engine starts a cycle whenever it turns `true`.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;

    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Signal the host flips explicitly (and the one tests drive).
#[derive(Debug)]
pub struct ManualConnectivity {
    sender: watch::Sender<bool>,
}

impl ManualConnectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender }
    }

    /// Report a new state. Subscribers only wake on actual transitions.
    pub fn set_online(&self, online: bool) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "Connectivity changed");
        }
    }
}

impl Connectivity for ManualConnectivity {
    fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Fallback when the platform exposes no signal: always try, let failures
/// classify as retryable.
#[derive(Debug)]
pub struct AssumeOnline {
    sender: watch::Sender<bool>,
}

impl Default for AssumeOnline {
    fn default() -> Self {
        let (sender, _) = watch::channel(true);
        Self { sender }
    }
}

impl Connectivity for AssumeOnline {
    fn is_online(&self) -> bool {
        true
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_signal_notifies_on_transition_only() {
        let signal = ManualConnectivity::new(false);
        let mut receiver = signal.subscribe();
        assert!(!signal.is_online());

        signal.set_online(false);
        assert!(!receiver.has_changed().unwrap());

        signal.set_online(true);
        receiver.changed().await.unwrap();
        assert!(*receiver.borrow_and_update());
        assert!(signal.is_online());
    }

    #[test]
    fn assume_online_is_always_online() {
        let signal = AssumeOnline::default();
        assert!(signal.is_online());
        assert!(*signal.subscribe().borrow());
    }
}
