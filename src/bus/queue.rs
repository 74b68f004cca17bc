// src/bus/queue.rs — Bounded priority queue, FIFO within a band

use std::collections::VecDeque;

use super::message::{FeedbackMessage, Priority};

#[derive(Debug)]
pub enum PushOutcome {
    Enqueued,
    /// The queue was full; this older, lower-or-equal priority message was evicted.
    Evicted(Box<FeedbackMessage>),
    /// The queue was full of higher-priority messages; the incoming one was dropped.
    Dropped(Box<FeedbackMessage>),
}

#[derive(Debug)]
pub struct PriorityQueue {
    bands: [VecDeque<FeedbackMessage>; 4],
    capacity: usize,
}

impl PriorityQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            bands: Default::default(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.bands.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.iter().all(VecDeque::is_empty)
    }

    pub fn push(&mut self, message: FeedbackMessage) -> PushOutcome {
        if self.len() < self.capacity {
            self.bands[message.priority.band()].push_back(message);
            return PushOutcome::Enqueued;
        }

        // Lowest non-empty band holds the eviction victim (its oldest entry).
        let lowest = self
            .bands
            .iter()
            .position(|b| !b.is_empty())
            .unwrap_or(message.priority.band());

        if lowest > message.priority.band() {
            return PushOutcome::Dropped(Box::new(message));
        }

        let evicted = self.bands[lowest].pop_front();
        self.bands[message.priority.band()].push_back(message);
        match evicted {
            Some(old) => PushOutcome::Evicted(Box::new(old)),
            None => PushOutcome::Enqueued,
        }
    }

    /// Next message: highest band first, oldest within the band.
    pub fn pop(&mut self) -> Option<FeedbackMessage> {
        Priority::DESCENDING
            .iter()
            .find_map(|p| self.bands[p.band()].pop_front())
    }

    pub fn drain_up_to(&mut self, n: usize) -> Vec<FeedbackMessage> {
        let mut out = Vec::with_capacity(n.min(self.len()));
        while out.len() < n {
            match self.pop() {
                Some(m) => out.push(m),
                None => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::{Payload, Target};

    fn msg(priority: Priority, label: &str) -> FeedbackMessage {
        let mut m = FeedbackMessage::new(
            label,
            Target::Broadcast,
            Payload::Error {
                message: label.into(),
            },
        );
        m.priority = priority;
        m
    }

    fn sources(msgs: &[FeedbackMessage]) -> Vec<&str> {
        msgs.iter().map(|m| m.source.as_str()).collect()
    }

    #[test]
    fn test_pop_by_priority_then_fifo() {
        let mut q = PriorityQueue::new(10);
        q.push(msg(Priority::Low, "low"));
        q.push(msg(Priority::Critical, "crit"));
        q.push(msg(Priority::Normal, "n1"));
        q.push(msg(Priority::High, "high"));
        q.push(msg(Priority::Normal, "n2"));
        let out = q.drain_up_to(10);
        assert_eq!(sources(&out), vec!["crit", "high", "n1", "n2", "low"]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_full_queue_evicts_oldest_lowest() {
        let mut q = PriorityQueue::new(3);
        q.push(msg(Priority::Low, "low1"));
        q.push(msg(Priority::Low, "low2"));
        q.push(msg(Priority::High, "high"));
        match q.push(msg(Priority::Normal, "normal")) {
            PushOutcome::Evicted(old) => assert_eq!(old.source, "low1"),
            other => panic!("expected eviction, got {other:?}"),
        }
        assert_eq!(q.len(), 3);
        assert_eq!(sources(&q.drain_up_to(3)), vec!["high", "normal", "low2"]);
    }

    #[test]
    fn test_full_queue_equal_priority_evicts_oldest() {
        let mut q = PriorityQueue::new(2);
        q.push(msg(Priority::Normal, "a"));
        q.push(msg(Priority::Normal, "b"));
        match q.push(msg(Priority::Normal, "c")) {
            PushOutcome::Evicted(old) => assert_eq!(old.source, "a"),
            other => panic!("expected eviction, got {other:?}"),
        }
        assert_eq!(sources(&q.drain_up_to(2)), vec!["b", "c"]);
    }

    #[test]
    fn test_full_queue_of_higher_priority_drops_incoming() {
        let mut q = PriorityQueue::new(2);
        q.push(msg(Priority::High, "h1"));
        q.push(msg(Priority::Critical, "c1"));
        match q.push(msg(Priority::Low, "late")) {
            PushOutcome::Dropped(m) => assert_eq!(m.source, "late"),
            other => panic!("expected drop, got {other:?}"),
        }
        assert_eq!(sources(&q.drain_up_to(5)), vec!["c1", "h1"]);
    }

    #[test]
    fn test_drain_up_to_respects_limit() {
        let mut q = PriorityQueue::new(10);
        for i in 0..5 {
            q.push(msg(Priority::Normal, &format!("m{i}")));
        }
        assert_eq!(q.drain_up_to(2).len(), 2);
        assert_eq!(q.len(), 3);
    }
}
