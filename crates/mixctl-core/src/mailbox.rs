//! Single-slot, most-recent-value mailbox.
//!
//! A [`Mailbox`] hands the latest snapshot from a producer to one logical
//! consumer without buffering history. Writers never block: [`Mailbox::set`]
//! replaces any unread value, and [`Mailbox::offer`] delivers only when the
//! previous value has already been consumed (the poll scheduler's
//! skip-don't-queue path). [`Mailbox::recv`] waits until a value is
//! available, then takes and clears it atomically.
//!
//! The slot is an explicit `Option` behind a short-lived `parking_lot`
//! mutex, signalled through `tokio::sync::Notify`. The last delivered value
//! is additionally retained for [`Mailbox::peek_last`], so a newly attached
//! consumer (e.g. a WebSocket client) can get immediate state before the
//! next push.
//!
//! One writer and one logical reader per mailbox; multiple writers must be
//! serialized upstream.

use parking_lot::Mutex;
use tokio::sync::Notify;

struct Slot<T> {
    unread: Option<T>,
    last: Option<T>,
}

/// Replace-and-signal cell holding at most one unread value.
pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    notify: Notify,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                unread: None,
                last: None,
            }),
            notify: Notify::new(),
        }
    }

    /// True if a value is waiting to be consumed.
    pub fn is_unread(&self) -> bool {
        self.slot.lock().unread.is_some()
    }

    /// Block until a value is available, then take and clear it.
    pub async fn recv(&self) -> T {
        loop {
            if let Some(value) = self.slot.lock().unread.take() {
                return value;
            }
            self.notify.notified().await;
        }
    }

    /// Take the unread value without waiting, if there is one.
    pub fn try_recv(&self) -> Option<T> {
        self.slot.lock().unread.take()
    }
}

impl<T: Clone> Mailbox<T> {
    /// Store `value`, discarding any unread predecessor, and signal the reader.
    pub fn set(&self, value: T) {
        {
            let mut slot = self.slot.lock();
            slot.last = Some(value.clone());
            slot.unread = Some(value);
        }
        self.notify.notify_one();
    }

    /// Deliver `value` only if the previous value was already consumed.
    ///
    /// Returns whether the value was accepted. A `false` return means the
    /// consumer is still behind; the caller is expected to skip, not wait.
    pub fn offer(&self, value: T) -> bool {
        {
            let mut slot = self.slot.lock();
            if slot.unread.is_some() {
                return false;
            }
            slot.last = Some(value.clone());
            slot.unread = Some(value);
        }
        self.notify.notify_one();
        true
    }

    /// Clone of the most recently delivered value, not consuming it.
    pub fn peek_last(&self) -> Option<T> {
        self.slot.lock().last.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn set_overwrites_unread_value() {
        let mb = Mailbox::new();
        mb.set(1u32);
        mb.set(2u32);
        assert_eq!(mb.recv().await, 2);
        assert!(mb.try_recv().is_none());
    }

    #[tokio::test]
    async fn recv_blocks_until_set() {
        let mb = Arc::new(Mailbox::new());
        // Nothing delivered yet: recv must not complete.
        let pending = tokio::time::timeout(Duration::from_millis(20), mb.recv()).await;
        assert!(pending.is_err());

        let writer = mb.clone();
        let reader = tokio::spawn(async move { mb.recv().await });
        tokio::task::yield_now().await;
        writer.set(7u32);
        assert_eq!(reader.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn second_recv_blocks_without_new_set() {
        let mb = Mailbox::new();
        mb.set(1u32);
        assert_eq!(mb.recv().await, 1);
        let pending = tokio::time::timeout(Duration::from_millis(20), mb.recv()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn offer_skips_while_unread() {
        let mb = Mailbox::new();
        assert!(mb.offer(1u32));
        assert!(!mb.offer(2u32));
        assert_eq!(mb.recv().await, 1);
        assert!(mb.offer(3u32));
        assert_eq!(mb.recv().await, 3);
    }

    #[tokio::test]
    async fn peek_last_survives_consumption() {
        let mb = Mailbox::new();
        assert_eq!(mb.peek_last(), None);
        mb.set("a");
        assert_eq!(mb.recv().await, "a");
        // Consumed, but still visible to late-attaching consumers.
        assert_eq!(mb.peek_last(), Some("a"));
        mb.set("b");
        assert_eq!(mb.peek_last(), Some("b"));
    }
}
