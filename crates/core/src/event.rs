// Copyright (C) 2024-2025 The Strato Project.
//
// event.rs file belongs to the strato project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! The ordered event queue and the virtual clock driving it.
//!
//! Events are keyed by `(at, priority, seq)` where `seq` is a monotone
//! insertion counter; the key order is total, so dispatch is deterministic.
//! Continuous events are re-armed by the dispatcher via
//! [`VirtualClock::requeue_continuous`] rather than by recursion.

use crate::entity::EntityId;
use crate::error::CoreResult;
use crate::time::{SimTime, TimeBase};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::warn;

/// Event priority; smaller runs first at the same instant.
pub type Priority = i64;

/// Priority of lifecycle transitions, ahead of same-tick user logic.
pub const TRANSITION_PRIORITY: Priority = -1;

/// Priority of the placement scheduler ticks, after all other same-tick work.
pub const SCHEDULER_PRIORITY: Priority = Priority::MAX;

/// Handle to a scheduled event, usable for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventToken(u64);

/// Whether an event fires once or re-arms itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Fires exactly once.
    Instant,
    /// Re-arms at `now + interval` until `until` (inclusive) is passed;
    /// `None` means unbounded.
    Continuous {
        interval: SimTime,
        until: Option<SimTime>,
    },
}

/// A scheduled unit of work carrying an opaque action payload.
#[derive(Debug, Clone)]
pub struct Event<A> {
    /// Virtual instant the event fires at.
    pub at: SimTime,
    /// Dispatch priority at that instant.
    pub priority: Priority,
    /// Entity the event belongs to; terminating the owner cancels the event.
    pub owner: EntityId,
    /// Optional dedup/cancellation tag, scoped to the owner.
    pub tag: Option<u32>,
    /// Instant or continuous.
    pub kind: EventKind,
    /// The payload interpreted by the dispatcher.
    pub action: A,
}

struct HeapEntry<A> {
    at: SimTime,
    priority: Priority,
    seq: u64,
    event: Event<A>,
}

impl<A> HeapEntry<A> {
    fn key(&self) -> (SimTime, Priority, u64) {
        (self.at, self.priority, self.seq)
    }
}

impl<A> PartialEq for HeapEntry<A> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<A> Eq for HeapEntry<A> {}

impl<A> PartialOrd for HeapEntry<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> Ord for HeapEntry<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Priority queue of pending events with cancellation by token, by
/// `(owner, tag)` and by owner.
pub struct EventQueue<A> {
    heap: BinaryHeap<Reverse<HeapEntry<A>>>,
    cancelled: HashSet<u64>,
    by_owner: HashMap<EntityId, Vec<u64>>,
    tagged: HashMap<(EntityId, u32), Vec<(u64, SimTime)>>,
    next_seq: u64,
}

impl<A> Default for EventQueue<A> {
    fn default() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            by_owner: HashMap::new(),
            tagged: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<A> EventQueue<A> {
    /// Enqueue an event and return its cancellation token.
    pub fn push(&mut self, event: Event<A>) -> EventToken {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_owner.entry(event.owner).or_default().push(seq);
        if let Some(tag) = event.tag {
            self.tagged
                .entry((event.owner, tag))
                .or_default()
                .push((seq, event.at));
        }
        self.heap.push(Reverse(HeapEntry {
            at: event.at,
            priority: event.priority,
            seq,
            event,
        }));
        EventToken(seq)
    }

    /// Instant of the earliest live event, discarding cancelled heads.
    pub fn peek_time(&mut self) -> Option<SimTime> {
        loop {
            let (seq, at) = match self.heap.peek() {
                Some(Reverse(entry)) => (entry.seq, entry.at),
                None => return None,
            };
            if !self.cancelled.contains(&seq) {
                return Some(at);
            }
            if let Some(Reverse(entry)) = self.heap.pop() {
                self.forget(&entry);
            }
        }
    }

    /// Pop the earliest live event.
    pub fn pop(&mut self) -> Option<(EventToken, Event<A>)> {
        while let Some(Reverse(entry)) = self.heap.pop() {
            if self.cancelled.contains(&entry.seq) {
                self.forget(&entry);
                continue;
            }
            let seq = entry.seq;
            self.forget(&entry);
            return Some((EventToken(seq), entry.event));
        }
        None
    }

    /// Cancel a single event. Cancelling an already-fired token is a no-op.
    pub fn cancel(&mut self, token: EventToken) {
        self.cancelled.insert(token.0);
    }

    /// Cancel every pending event owned by `owner`.
    pub fn cancel_owner(&mut self, owner: EntityId) {
        if let Some(seqs) = self.by_owner.remove(&owner) {
            for seq in seqs {
                self.cancelled.insert(seq);
            }
        }
    }

    /// Cancel every pending event with the given owner-scoped tag.
    pub fn cancel_tagged(&mut self, owner: EntityId, tag: u32) {
        if let Some(entries) = self.tagged.remove(&(owner, tag)) {
            for (seq, _) in entries {
                self.cancelled.insert(seq);
            }
        }
    }

    /// Earliest pending instant for an owner-scoped tag, used by transition
    /// deduplication.
    pub fn pending_tagged(&self, owner: EntityId, tag: u32) -> Option<SimTime> {
        self.tagged
            .get(&(owner, tag))?
            .iter()
            .filter(|(seq, _)| !self.cancelled.contains(seq))
            .map(|&(_, at)| at)
            .min()
    }

    /// Number of entries still in the heap, cancelled ones included.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when no entries remain.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn forget(&mut self, entry: &HeapEntry<A>) {
        self.cancelled.remove(&entry.seq);
        if let Some(seqs) = self.by_owner.get_mut(&entry.event.owner) {
            seqs.retain(|&s| s != entry.seq);
            if seqs.is_empty() {
                self.by_owner.remove(&entry.event.owner);
            }
        }
        if let Some(tag) = entry.event.tag {
            if let Some(entries) = self.tagged.get_mut(&(entry.event.owner, tag)) {
                entries.retain(|&(s, _)| s != entry.seq);
                if entries.is_empty() {
                    self.tagged.remove(&(entry.event.owner, tag));
                }
            }
        }
    }
}

/// Monotone virtual clock coupled to an event queue.
pub struct VirtualClock<A> {
    base: TimeBase,
    now: SimTime,
    queue: EventQueue<A>,
}

impl<A> VirtualClock<A> {
    /// Create a clock at `t = 0` with an empty queue.
    pub fn new(base: TimeBase) -> Self {
        VirtualClock {
            base,
            now: SimTime::ZERO,
            queue: EventQueue::default(),
        }
    }

    /// Current virtual instant.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// The tick/second conversion in force.
    pub fn base(&self) -> TimeBase {
        self.base
    }

    /// Schedule an event. An instant in the past is clamped to `now` with a
    /// warning; the clock never runs backwards.
    pub fn schedule(&mut self, mut event: Event<A>) -> EventToken {
        if event.at < self.now {
            warn!(
                at = event.at.ticks(),
                now = self.now.ticks(),
                "event scheduled in the past, clamping to now"
            );
            event.at = self.now;
        }
        self.queue.push(event)
    }

    /// Pop the next event due at or before `horizon`, advancing `now` to its
    /// instant. When the queue is exhausted or the next event lies beyond
    /// the horizon, `now` parks at the horizon and `None` is returned; the
    /// queue is left intact so the run can be resumed.
    pub fn next_within(&mut self, horizon: SimTime) -> Option<(EventToken, Event<A>)> {
        match self.queue.peek_time() {
            Some(at) if at <= horizon => {
                let popped = self.queue.pop()?;
                debug_assert!(at >= self.now, "clock would run backwards");
                self.now = at;
                Some(popped)
            }
            _ => {
                if horizon > self.now {
                    self.now = horizon;
                }
                None
            }
        }
    }

    /// Re-arm a continuous event at `now + interval` if its window has not
    /// elapsed. Returns the token of the re-armed instance.
    pub fn requeue_continuous(&mut self, event: &Event<A>) -> Option<EventToken>
    where
        A: Clone,
    {
        let EventKind::Continuous { interval, until } = event.kind else {
            return None;
        };
        let next = self.now.checked_add(interval).ok()?;
        if let Some(until) = until {
            if next > until {
                return None;
            }
        }
        let mut rearmed = event.clone();
        rearmed.at = next;
        Some(self.queue.push(rearmed))
    }

    /// Access the queue for cancellation and dedup queries.
    pub fn queue(&self) -> &EventQueue<A> {
        &self.queue
    }

    /// Mutable queue access.
    pub fn queue_mut(&mut self) -> &mut EventQueue<A> {
        &mut self.queue
    }

    /// Convert seconds to an absolute instant, clamping to `now` when the
    /// value lies in the past.
    pub fn instant_from_seconds(&self, seconds: f64) -> CoreResult<SimTime> {
        let t = self.base.time_from_seconds(seconds)?;
        Ok(t.max(self.now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(at: u64, priority: Priority, owner: u64, action: u32) -> Event<u32> {
        Event {
            at: SimTime::from_ticks(at),
            priority,
            owner: EntityId::from_raw(owner),
            tag: None,
            kind: EventKind::Instant,
            action,
        }
    }

    #[test]
    fn test_time_then_priority_then_insertion() {
        let mut q = EventQueue::default();
        q.push(ev(5, 0, 1, 10));
        q.push(ev(3, 7, 1, 20));
        q.push(ev(3, -1, 1, 30));
        q.push(ev(3, -1, 1, 40));
        let order: Vec<u32> = std::iter::from_fn(|| q.pop().map(|(_, e)| e.action)).collect();
        assert_eq!(order, vec![30, 40, 20, 10]);
    }

    #[test]
    fn test_cancel_token() {
        let mut q = EventQueue::default();
        let tok = q.push(ev(1, 0, 1, 10));
        q.push(ev(2, 0, 1, 20));
        q.cancel(tok);
        assert_eq!(q.pop().map(|(_, e)| e.action), Some(20));
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_cancel_owner() {
        let mut q = EventQueue::default();
        q.push(ev(1, 0, 1, 10));
        q.push(ev(2, 0, 2, 20));
        q.push(ev(3, 0, 1, 30));
        q.cancel_owner(EntityId::from_raw(1));
        let order: Vec<u32> = std::iter::from_fn(|| q.pop().map(|(_, e)| e.action)).collect();
        assert_eq!(order, vec![20]);
    }

    #[test]
    fn test_tag_dedup_lookup() {
        let mut q = EventQueue::default();
        let mut tagged = ev(9, 0, 1, 10);
        tagged.tag = Some(3);
        q.push(tagged);
        assert_eq!(
            q.pending_tagged(EntityId::from_raw(1), 3),
            Some(SimTime::from_ticks(9))
        );
        assert_eq!(q.pending_tagged(EntityId::from_raw(1), 4), None);
        q.cancel_tagged(EntityId::from_raw(1), 3);
        assert_eq!(q.pending_tagged(EntityId::from_raw(1), 3), None);
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_clock_horizon() {
        let mut clock: VirtualClock<u32> = VirtualClock::new(TimeBase::default());
        clock.schedule(ev(5, 0, 1, 10));
        clock.schedule(ev(50, 0, 1, 20));
        let horizon = SimTime::from_ticks(10);
        assert_eq!(clock.next_within(horizon).map(|(_, e)| e.action), Some(10));
        assert_eq!(clock.now(), SimTime::from_ticks(5));
        assert!(clock.next_within(horizon).is_none());
        // The clock parks at the horizon, the late event stays queued.
        assert_eq!(clock.now(), horizon);
        assert_eq!(clock.queue().len(), 1);
        let later = SimTime::from_ticks(100);
        assert_eq!(clock.next_within(later).map(|(_, e)| e.action), Some(20));
    }

    #[test]
    fn test_past_schedule_clamps() {
        let mut clock: VirtualClock<u32> = VirtualClock::new(TimeBase::default());
        clock.schedule(ev(10, 0, 1, 10));
        clock.next_within(SimTime::from_ticks(20));
        clock.schedule(ev(2, 0, 1, 20));
        let (_, e) = clock.next_within(SimTime::from_ticks(20)).unwrap();
        assert_eq!(e.at, SimTime::from_ticks(10));
        assert_eq!(e.action, 20);
    }

    #[test]
    fn test_continuous_requeue() {
        let mut clock: VirtualClock<u32> = VirtualClock::new(TimeBase::default());
        clock.schedule(Event {
            at: SimTime::from_ticks(1),
            priority: 0,
            owner: EntityId::from_raw(1),
            tag: None,
            kind: EventKind::Continuous {
                interval: SimTime::from_ticks(2),
                until: Some(SimTime::from_ticks(5)),
            },
            action: 7u32,
        });
        let horizon = SimTime::from_ticks(100);
        let mut fired = Vec::new();
        while let Some((_, e)) = clock.next_within(horizon) {
            fired.push(e.at.ticks());
            clock.requeue_continuous(&e);
        }
        assert_eq!(fired, vec![1, 3, 5]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn pops_are_key_ordered(
                items in prop::collection::vec((0u64..1000, -5i64..5), 1..200)
            ) {
                let mut q = EventQueue::default();
                for (i, &(at, priority)) in items.iter().enumerate() {
                    q.push(ev(at, priority, 1, i as u32));
                }
                let mut last: Option<(SimTime, Priority)> = None;
                while let Some((_, e)) = q.pop() {
                    if let Some((at, priority)) = last {
                        prop_assert!((e.at, e.priority) >= (at, priority));
                    }
                    last = Some((e.at, e.priority));
                }
            }

            #[test]
            fn clock_is_monotone(
                items in prop::collection::vec(0u64..1000, 1..200)
            ) {
                let mut clock: VirtualClock<u32> = VirtualClock::new(TimeBase::default());
                for (i, &at) in items.iter().enumerate() {
                    clock.schedule(ev(at, 0, 1, i as u32));
                }
                let mut previous = SimTime::ZERO;
                while let Some((_, e)) = clock.next_within(SimTime::from_ticks(2000)) {
                    prop_assert!(e.at >= previous);
                    previous = e.at;
                }
            }
        }
    }
}
