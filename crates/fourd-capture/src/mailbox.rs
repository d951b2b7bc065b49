// crates/fourd-capture/src/mailbox.rs
//
// One-slot "newest wins" mailbox: publish replaces the slot and notifies;
// consume waits when empty and takes-and-clears. Not a queue — dropping
// intermediate values is intentional (spec §5, §9). This is the live-view
// buffer between the camera driver and the live-view encoder, grounded on
// `velocut-media::worker::MediaWorker`'s `frame_req` slot.

use std::sync::{Arc, Condvar, Mutex};

pub struct Mailbox<T> {
    inner: Arc<(Mutex<Option<T>>, Condvar)>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self { inner: Arc::new((Mutex::new(None), Condvar::new())) }
    }

    /// Replace whatever is in the slot and wake one waiter.
    pub fn publish(&self, value: T) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap() = Some(value);
        cvar.notify_one();
    }

    /// Block until a value is published, then take and clear it.
    pub fn take_blocking(&self) -> T {
        let (lock, cvar) = &*self.inner;
        let mut guard = lock.lock().unwrap();
        while guard.is_none() {
            guard = cvar.wait(guard).unwrap();
        }
        guard.take().unwrap()
    }

    /// Take the value without blocking, if one is present.
    pub fn try_take(&self) -> Option<T> {
        let (lock, _cvar) = &*self.inner;
        lock.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn newest_publish_wins_over_stale_values() {
        let mailbox = Mailbox::new();
        mailbox.publish(1);
        mailbox.publish(2);
        mailbox.publish(3);
        assert_eq!(mailbox.take_blocking(), 3);
    }

    #[test]
    fn take_blocking_waits_for_a_publish() {
        let mailbox = Mailbox::new();
        let consumer = mailbox.clone();
        let handle = thread::spawn(move || consumer.take_blocking());

        thread::sleep(Duration::from_millis(20));
        mailbox.publish(42);

        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn try_take_on_empty_slot_returns_none() {
        let mailbox: Mailbox<i32> = Mailbox::new();
        assert_eq!(mailbox.try_take(), None);
    }
}
