//! Actor mailbox implementation
//!
//! TigerStyle: Explicit FIFO ordering, counters for every transition.

use std::collections::VecDeque;

use probekit_core::message::Envelope;

/// Unbounded FIFO mailbox owned by exactly one actor
///
/// # TigerStyle
/// - FIFO ordering
/// - No silent drops (leftovers are drained into dead letters)
#[derive(Debug, Default)]
pub struct Mailbox {
    /// Pending messages
    queue: VecDeque<Envelope>,
    /// Total messages enqueued
    enqueued_count: u64,
    /// Total messages handed out for processing
    processed_count: u64,
}

impl Mailbox {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message at the tail
    pub fn push(&mut self, envelope: Envelope) {
        self.queue.push_back(envelope);
        self.enqueued_count = self.enqueued_count.wrapping_add(1);
    }

    /// Enqueue a batch at the tail, keeping its order
    pub fn push_all(&mut self, envelopes: impl IntoIterator<Item = Envelope>) {
        for envelope in envelopes {
            self.push(envelope);
        }
    }

    /// Pop the next message from the mailbox
    pub fn pop(&mut self) -> Option<Envelope> {
        let envelope = self.queue.pop_front();
        if envelope.is_some() {
            self.processed_count = self.processed_count.wrapping_add(1);
        }
        envelope
    }

    /// Check if the mailbox is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Get the number of pending messages
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Get total messages enqueued
    pub fn enqueued_count(&self) -> u64 {
        self.enqueued_count
    }

    /// Get total messages processed
    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }

    /// Drain all pending messages
    ///
    /// Used on termination to turn leftovers into dead letters.
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.queue.drain(..).collect()
    }
}
