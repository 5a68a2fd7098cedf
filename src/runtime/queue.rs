//! The host's event queue.
//!
//! A FIFO of opaque events: thread-safe enqueue, blocking dequeue on the
//! run-loop thread, and an explicit close signal. Closing does not discard
//! events already queued; the consumer drains them before observing
//! [`QueueClosed`].

use crate::types::Event;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Error returned when submitting to or reading from a closed queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event queue is closed")]
pub struct QueueClosed;

#[derive(Debug, Default)]
struct Inner {
    events: VecDeque<Event>,
    closed: bool,
}

/// A thread-safe FIFO of host events.
#[derive(Default)]
pub struct EventQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl EventQueue {
    /// Creates an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues an event.
    pub fn submit(&self, event: Event) -> Result<(), QueueClosed> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(QueueClosed);
        }
        inner.events.push_back(event);
        self.ready.notify_one();
        Ok(())
    }

    /// Dequeues the next event, blocking until one is available.
    ///
    /// Returns [`QueueClosed`] once the queue is closed and drained.
    pub fn next(&self) -> Result<Event, QueueClosed> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(event) = inner.events.pop_front() {
                return Ok(event);
            }
            if inner.closed {
                return Err(QueueClosed);
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Dequeues the next event if one is immediately available.
    #[must_use]
    pub fn try_next(&self) -> Option<Event> {
        self.inner.lock().events.pop_front()
    }

    /// Closes the queue; pending events remain readable.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.ready.notify_all();
    }

    /// Returns true if the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Returns the number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Returns true if no events are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EventQueue")
            .field("len", &inner.events.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct Seq(u32);

    #[test]
    fn events_come_out_in_submission_order() {
        let queue = EventQueue::new();
        queue.submit(Event::new(Seq(1))).unwrap();
        queue.submit(Event::new(Seq(2))).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next().unwrap().get::<Seq>(), Some(&Seq(1)));
        assert_eq!(queue.next().unwrap().get::<Seq>(), Some(&Seq(2)));
        assert!(queue.is_empty());
    }

    #[test]
    fn close_rejects_new_events_but_drains_pending_ones() {
        let queue = EventQueue::new();
        queue.submit(Event::new(Seq(1))).unwrap();
        queue.close();
        assert!(queue.is_closed());
        assert_eq!(queue.submit(Event::new(Seq(2))), Err(QueueClosed));
        assert!(queue.next().is_ok());
        assert!(matches!(queue.next(), Err(QueueClosed)));
    }

    #[test]
    fn try_next_does_not_block_on_an_empty_queue() {
        let queue = EventQueue::new();
        assert!(queue.try_next().is_none());
    }

    #[test]
    fn blocking_dequeue_wakes_on_cross_thread_submit() {
        let queue = Arc::new(EventQueue::new());
        let producer = Arc::clone(&queue);
        let worker = std::thread::spawn(move || {
            producer.submit(Event::new(Seq(7))).unwrap();
        });
        let event = queue.next().unwrap();
        assert_eq!(event.get::<Seq>(), Some(&Seq(7)));
        worker.join().unwrap();
    }

    #[test]
    fn blocking_dequeue_wakes_on_close() {
        let queue = Arc::new(EventQueue::new());
        let closer = Arc::clone(&queue);
        let worker = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            closer.close();
        });
        assert!(matches!(queue.next(), Err(QueueClosed)));
        worker.join().unwrap();
    }
}
