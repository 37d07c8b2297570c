//! Blocking expectation queue
//!
//! TigerStyle: Timed condition-variable waits, never busy polling.

use parking_lot::{Condvar, Mutex};
use probekit_core::message::Envelope;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// FIFO of received envelopes with timed dequeue
///
/// Filled by the receiving test actor, drained by expectation calls.
#[derive(Debug, Default)]
pub struct MessageQueue {
    envelopes: Mutex<VecDeque<Envelope>>,
    available: Condvar,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an envelope and wake one waiter
    pub fn push_back(&self, envelope: Envelope) {
        self.envelopes.lock().push_back(envelope);
        self.available.notify_one();
    }

    /// Put an envelope back so it is the next one received
    pub fn push_front(&self, envelope: Envelope) {
        self.envelopes.lock().push_front(envelope);
        self.available.notify_one();
    }

    /// Take the head without waiting
    pub fn try_pop(&self) -> Option<Envelope> {
        self.envelopes.lock().pop_front()
    }

    /// Take the head, waiting up to `timeout` for one to arrive
    ///
    /// A timeout too large to represent as an instant waits indefinitely.
    pub fn poll(&self, timeout: Duration) -> Option<Envelope> {
        let deadline = Instant::now().checked_add(timeout);
        let mut envelopes = self.envelopes.lock();
        loop {
            if let Some(envelope) = envelopes.pop_front() {
                return Some(envelope);
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut envelopes, deadline).timed_out() {
                        return envelopes.pop_front();
                    }
                }
                None => self.available.wait(&mut envelopes),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.envelopes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.lock().is_empty()
    }
}
