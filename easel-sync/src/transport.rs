//! Transport seam and offline outbox.
//!
//! The network channel that carries frames between sessions is an
//! external collaborator: anything that accepts `(origin, frame)` pairs
//! and delivers them to every participant in one agreed order. The
//! in-process [`RelayLink`](crate::relay::RelayLink) is the reference
//! implementation.
//!
//! Frames that cannot be handed to the transport (disconnected) wait in
//! an [`Outbox`] and are replayed, in order, on the next flush.

use std::collections::VecDeque;

use easel_core::Origin;
use thiserror::Error;

use crate::protocol::Frame;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Temporarily unable to send; the frame should be queued.
    #[error("Transport disconnected")]
    Disconnected,
    /// The peer refused the frame.
    #[error("Frame rejected by transport: {0}")]
    Rejected(String),
    #[error("Outbox full ({capacity} frames)")]
    OutboxFull { capacity: usize },
}

/// Outbound half of the channel to the relay.
pub trait Transport {
    fn send(&mut self, origin: &Origin, frame: Frame) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, origin: &Origin, frame: Frame) -> Result<(), TransportError> {
        (**self).send(origin, frame)
    }
}

/// Frames produced while the transport was unavailable.
#[derive(Debug)]
pub struct Outbox {
    queue: VecDeque<Frame>,
    max_size: usize,
}

impl Outbox {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Queue a frame. Returns `false` when the outbox is full.
    pub fn enqueue(&mut self, frame: Frame) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back(frame);
        true
    }

    /// Hand queued frames to `transport` in order. Stops at the first
    /// failure and keeps that frame (and everything after it) queued.
    pub fn flush_into(
        &mut self,
        origin: &Origin,
        transport: &mut dyn Transport,
    ) -> Result<usize, TransportError> {
        let mut sent = 0;
        while let Some(frame) = self.queue.pop_front() {
            if let Err(e) = transport.send(origin, frame.clone()) {
                self.queue.push_front(frame);
                return Err(e);
            }
            sent += 1;
        }
        Ok(sent)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn total_bytes(&self) -> usize {
        self.queue.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts `budget` frames, then reports a disconnect.
    struct Flaky {
        budget: usize,
        sent: Vec<Frame>,
    }

    impl Transport for Flaky {
        fn send(&mut self, _origin: &Origin, frame: Frame) -> Result<(), TransportError> {
            if self.budget == 0 {
                return Err(TransportError::Disconnected);
            }
            self.budget -= 1;
            self.sent.push(frame);
            Ok(())
        }
    }

    #[test]
    fn test_outbox_enqueue_and_capacity() {
        let mut outbox = Outbox::new(2);
        assert!(outbox.is_empty());
        assert!(outbox.enqueue(vec![1, 2, 3]));
        assert!(outbox.enqueue(vec![4]));
        assert!(!outbox.enqueue(vec![5]));
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox.total_bytes(), 4);
        assert_eq!(outbox.capacity(), 2);
    }

    #[test]
    fn test_flush_preserves_order() {
        let mut outbox = Outbox::new(10);
        for n in 0..3u8 {
            outbox.enqueue(vec![n]);
        }
        let mut transport = Flaky { budget: 10, sent: Vec::new() };
        let sent = outbox.flush_into(&Origin::from("o"), &mut transport).unwrap();
        assert_eq!(sent, 3);
        assert_eq!(transport.sent, vec![vec![0], vec![1], vec![2]]);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_flush_stops_at_first_failure() {
        let mut outbox = Outbox::new(10);
        for n in 0..4u8 {
            outbox.enqueue(vec![n]);
        }
        let mut transport = Flaky { budget: 2, sent: Vec::new() };
        let result = outbox.flush_into(&Origin::from("o"), &mut transport);
        assert_eq!(result, Err(TransportError::Disconnected));
        assert_eq!(transport.sent, vec![vec![0], vec![1]]);
        assert_eq!(outbox.len(), 2);

        transport.budget = 5;
        assert_eq!(outbox.flush_into(&Origin::from("o"), &mut transport), Ok(2));
        assert_eq!(transport.sent.len(), 4);
    }

    #[test]
    fn test_clear() {
        let mut outbox = Outbox::new(10);
        outbox.enqueue(vec![1]);
        outbox.clear();
        assert!(outbox.is_empty());
    }
}
