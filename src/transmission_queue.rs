//! Retransmission bookkeeping for segments that are waiting to be
//! acknowledged.
//!
//! The queue mirrors the send window: one entry per sequence number in
//! `[base, base + capacity)`, rotated the same way as a
//! [`SegmentBuffer`](crate::SegmentBuffer). An entry owns the timer that
//! fires when its segment should be sent again.

use crate::{
    seq_space::seq_offset,
    session::{Scheduler, Timer, TimerHandle},
};
use std::time::{Duration, Instant};

/// The retransmission state of one outstanding segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// When the segment was first sent
    pub start_time: Instant,
    /// The pending timer, if any
    pub handle: Option<TimerHandle>,
    /// Delay before each retransmission
    pub timeout: Duration,
    /// How many times the segment has been sent again so far
    pub transmissions: u8,
}

/// What happened when a retransmission timer was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// The segment was sent again and its timer re-armed.
    Rescheduled,
    /// The handler declined to send again. The entry has been dropped.
    Exhausted,
    /// The timer did not belong to a live entry.
    Stale,
}

#[derive(Debug, Clone)]
pub struct TransmissionQueue {
    entries: Vec<Option<Entry>>,
    base: u16,
    current_index: usize,
    in_use: usize,
}

impl TransmissionQueue {
    /// Creates a queue with room for `count` outstanding segments. A count
    /// of zero is raised to one.
    pub fn new(count: u8) -> Self {
        Self {
            entries: vec![None; (count as usize).max(1)],
            base: 0,
            current_index: 0,
            in_use: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use
    }

    pub fn entry(&self, seq: u16) -> Option<&Entry> {
        self.index(seq).and_then(|i| self.entries[i].as_ref())
    }

    /// Moves the queue to start at `base`, cancelling every pending timer.
    pub fn set_base<S: Scheduler + ?Sized>(&mut self, base: u16, scheduler: &mut S) {
        for entry in self.entries.iter_mut() {
            if let Some(Entry {
                handle: Some(handle),
                ..
            }) = entry.take()
            {
                scheduler.cancel(handle);
            }
        }
        self.in_use = 0;
        self.current_index = 0;
        self.base = base;
    }

    /// Slides the queue forward by `by`, cancelling the timers of the
    /// entries that fall off the front.
    pub fn advance_base<S: Scheduler + ?Sized>(&mut self, by: u16, scheduler: &mut S) {
        if by as usize >= self.capacity() {
            self.set_base(self.base.wrapping_add(by), scheduler);
            return;
        }
        for i in 0..by {
            self.remove_entry(self.base.wrapping_add(i), scheduler);
        }
        self.base = self.base.wrapping_add(by);
        self.current_index = (self.current_index + by as usize) % self.capacity();
    }

    /// Starts tracking `seq`, scheduling its first retransmission after
    /// `timeout`. An existing entry for `seq` is replaced. Returns false if
    /// `seq` is outside the queue.
    pub fn add_entry<S: Scheduler + ?Sized>(
        &mut self,
        seq: u16,
        timeout: Duration,
        scheduler: &mut S,
    ) -> bool {
        let Some(i) = self.index(seq) else {
            return false;
        };
        match self.entries[i].take() {
            Some(Entry {
                handle: Some(handle),
                ..
            }) => scheduler.cancel(handle),
            Some(_) => {}
            None => self.in_use += 1,
        }
        let handle = scheduler.schedule(timeout, Timer::Retransmission(seq));
        self.entries[i] = Some(Entry {
            start_time: Instant::now(),
            handle: Some(handle),
            timeout,
            transmissions: 0,
        });
        true
    }

    /// Stops tracking `seq` and cancels its timer.
    pub fn remove_entry<S: Scheduler + ?Sized>(&mut self, seq: u16, scheduler: &mut S) {
        let Some(i) = self.index(seq) else {
            return;
        };
        if let Some(entry) = self.entries[i].take() {
            if let Some(handle) = entry.handle {
                scheduler.cancel(handle);
            }
            self.in_use -= 1;
        }
    }

    /// Delivers the expiry of the retransmission timer `handle` for `seq`.
    ///
    /// `transmit` is given the entry and sends the segment again, returning
    /// whether it did. If it did, the transmission count goes up and the
    /// timer is re-armed; otherwise the entry is dropped.
    pub fn fire<S, F>(
        &mut self,
        seq: u16,
        handle: TimerHandle,
        scheduler: &mut S,
        transmit: F,
    ) -> TimerOutcome
    where
        S: Scheduler + ?Sized,
        F: FnOnce(&Entry, u16, &mut S) -> bool,
    {
        let Some(i) = self.index(seq) else {
            return TimerOutcome::Stale;
        };
        let entry = match &mut self.entries[i] {
            Some(entry) if entry.handle == Some(handle) => entry,
            _ => return TimerOutcome::Stale,
        };
        // The timer has gone off, so there is nothing left to cancel
        entry.handle = None;

        if transmit(entry, seq, scheduler) {
            entry.transmissions = entry.transmissions.saturating_add(1);
            entry.handle = Some(scheduler.schedule(entry.timeout, Timer::Retransmission(seq)));
            TimerOutcome::Rescheduled
        } else {
            self.entries[i] = None;
            self.in_use -= 1;
            TimerOutcome::Exhausted
        }
    }

    fn index(&self, seq: u16) -> Option<usize> {
        let offset = seq_offset(seq, self.base) as usize;
        if offset >= self.capacity() {
            return None;
        }
        Some((self.current_index + offset) % self.capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Default)]
    struct FakeScheduler {
        next: u64,
        pending: BTreeMap<TimerHandle, (Duration, Timer)>,
        sent: Vec<u16>,
    }

    impl Scheduler for FakeScheduler {
        fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerHandle {
            self.next += 1;
            let handle = TimerHandle(self.next);
            self.pending.insert(handle, (delay, timer));
            handle
        }

        fn cancel(&mut self, handle: TimerHandle) {
            self.pending.remove(&handle);
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn handle_of(queue: &TransmissionQueue, seq: u16) -> TimerHandle {
        queue.entry(seq).and_then(|e| e.handle).unwrap()
    }

    #[test]
    fn entries_own_their_timers() {
        let mut scheduler = FakeScheduler::default();
        let mut queue = TransmissionQueue::new(4);
        queue.set_base(10, &mut scheduler);
        assert!(queue.add_entry(10, TIMEOUT, &mut scheduler));
        assert!(queue.add_entry(11, TIMEOUT, &mut scheduler));
        assert!(!queue.add_entry(14, TIMEOUT, &mut scheduler));
        assert_eq!(queue.in_use_count(), 2);
        assert_eq!(scheduler.pending.len(), 2);

        queue.remove_entry(10, &mut scheduler);
        assert_eq!(queue.in_use_count(), 1);
        assert_eq!(scheduler.pending.len(), 1);
        assert!(queue.entry(10).is_none());

        // Re-adding replaces the old timer
        queue.add_entry(11, TIMEOUT, &mut scheduler);
        assert_eq!(queue.in_use_count(), 1);
        assert_eq!(scheduler.pending.len(), 1);
    }

    #[test]
    fn advancing_cancels_acknowledged() {
        let mut scheduler = FakeScheduler::default();
        let mut queue = TransmissionQueue::new(4);
        queue.set_base(u16::MAX, &mut scheduler);
        for seq in [u16::MAX, 0, 1, 2] {
            queue.add_entry(seq, TIMEOUT, &mut scheduler);
        }
        queue.advance_base(2, &mut scheduler);
        assert_eq!(queue.base(), 1);
        assert_eq!(queue.in_use_count(), 2);
        assert_eq!(
            scheduler.pending.values().map(|(_, t)| *t).collect::<Vec<_>>(),
            vec![Timer::Retransmission(1), Timer::Retransmission(2)]
        );

        // The freed entries are reused for later sequence numbers
        assert!(queue.add_entry(4, TIMEOUT, &mut scheduler));

        queue.advance_base(10, &mut scheduler);
        assert_eq!(queue.in_use_count(), 0);
        assert!(scheduler.pending.is_empty());
    }

    #[test]
    fn firing_reschedules_until_declined() {
        let mut scheduler = FakeScheduler::default();
        let mut queue = TransmissionQueue::new(2);
        queue.set_base(5, &mut scheduler);
        queue.add_entry(5, TIMEOUT, &mut scheduler);

        let first = handle_of(&queue, 5);
        scheduler.pending.remove(&first);
        let resend = |entry: &Entry, seq: u16, scheduler: &mut FakeScheduler| {
            if entry.transmissions >= 2 {
                return false;
            }
            scheduler.sent.push(seq);
            true
        };
        assert_eq!(queue.fire(5, first, &mut scheduler, resend), TimerOutcome::Rescheduled);
        assert_eq!(queue.entry(5).unwrap().transmissions, 1);

        // The old handle no longer matches
        assert_eq!(queue.fire(5, first, &mut scheduler, resend), TimerOutcome::Stale);

        let second = handle_of(&queue, 5);
        scheduler.pending.remove(&second);
        assert_eq!(queue.fire(5, second, &mut scheduler, resend), TimerOutcome::Rescheduled);
        let third = handle_of(&queue, 5);
        scheduler.pending.remove(&third);
        assert_eq!(queue.fire(5, third, &mut scheduler, resend), TimerOutcome::Exhausted);

        assert_eq!(scheduler.sent, vec![5, 5]);
        assert!(queue.entry(5).is_none());
        assert_eq!(queue.in_use_count(), 0);
        assert!(scheduler.pending.is_empty());
    }
}
