//! # Dispatch Inbox
//!
//! Setters, store listeners and resume tokens may be called from any thread.
//! They never touch the fiber tree; they post a [`Signal`] here and the
//! runtime drains the inbox at its next event boundary.
//!
//! The channel is unbounded: dropping a state update is never acceptable.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::fiber::InstanceId;
use crate::hooks::HookAddr;
use crate::lane::Lane;
use crate::suspend::{ResumeId, ResumeTarget};
use crate::update::Payload;

/// Message posted to a runtime.
#[derive(Debug, Clone)]
pub enum Signal {
    /// A state update for one hook.
    Update {
        /// Target hook.
        addr: HookAddr,
        /// Value or updater.
        payload: Payload,
        /// Explicit lane; `None` picks the lane of the current event.
        lane: Option<Lane>,
    },
    /// An external store consumed by `instance` changed.
    StoreChanged {
        /// Consuming instance.
        instance: InstanceId,
    },
    /// A suspension resolved.
    Resumed {
        /// Resolved token.
        token: ResumeId,
        /// What to retry.
        target: ResumeTarget,
    },
}

/// Sending half of a runtime inbox.
#[derive(Clone)]
pub struct Inbox {
    sender: Sender<Signal>,
}

impl Inbox {
    /// Creates a connected inbox pair.
    #[must_use]
    pub fn channel() -> (Inbox, InboxReceiver) {
        let (sender, receiver) = unbounded();
        (Inbox { sender }, InboxReceiver { receiver })
    }

    /// Posts a signal.
    ///
    /// Returns `false` if the runtime is gone.
    #[inline]
    pub fn send(&self, signal: Signal) -> bool {
        self.sender.send(signal).is_ok()
    }

    /// Posts a state update.
    #[inline]
    pub fn update(&self, addr: HookAddr, payload: Payload, lane: Option<Lane>) -> bool {
        self.send(Signal::Update {
            addr,
            payload,
            lane,
        })
    }

    /// Posts a store change notification.
    #[inline]
    pub fn store_changed(&self, instance: InstanceId) -> bool {
        self.send(Signal::StoreChanged { instance })
    }

    /// Posts a resolved suspension.
    #[inline]
    pub fn resumed(&self, token: ResumeId, target: ResumeTarget) -> bool {
        self.send(Signal::Resumed { token, target })
    }
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("queued", &self.sender.len())
            .finish()
    }
}

/// Receiving half of a runtime inbox. Owned by the runtime.
pub struct InboxReceiver {
    receiver: Receiver<Signal>,
}

impl InboxReceiver {
    /// Takes every queued signal (non-blocking).
    #[must_use]
    pub fn drain(&self) -> Vec<Signal> {
        let mut signals = Vec::with_capacity(self.receiver.len());
        while let Ok(signal) = self.receiver.try_recv() {
            signals.push(signal);
        }
        signals
    }

    /// Number of queued signals.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if any signal is queued.
    #[inline]
    #[must_use]
    pub fn has_signals(&self) -> bool {
        !self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals_drain_in_order() {
        let (inbox, rx) = Inbox::channel();
        let addr = HookAddr::new(InstanceId::new(1), 0);
        assert!(inbox.update(addr, Payload::value(1_u32), None));
        assert!(inbox.store_changed(InstanceId::new(2)));
        assert_eq!(rx.pending_count(), 2);

        let signals = rx.drain();
        assert!(matches!(signals[0], Signal::Update { lane: None, .. }));
        assert!(matches!(signals[1], Signal::StoreChanged { .. }));
        assert!(!rx.has_signals());
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (inbox, rx) = Inbox::channel();
        drop(rx);
        assert!(!inbox.store_changed(InstanceId::new(1)));
    }
}
