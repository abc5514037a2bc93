//! A fixed-capacity sliding-window buffer of segments keyed by sequence
//! number.
//!
//! ```text
//!            base                          base + capacity
//!             |                                   |
//!             v                                   v
//!   ... ------[ slot | slot | slot | ... | slot ]------ ...
//!                ^                  ^
//!                in use             in use
//! ```
//!
//! Slots live in a ring. `current_index` is the physical slot that holds
//! `base`, so advancing the window rotates the ring instead of moving data.
//! The in-use slots are also threaded on a doubly linked list kept in
//! sequence order, which makes enumerating them proportional to how many
//! there are rather than to the capacity.

use crate::{seq_space::seq_offset, segment::MAX_HEADER_LENGTH};

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    len: usize,
    in_use: bool,
    prev: Option<usize>,
    next: Option<usize>,
}

/// See the [module documentation](self).
#[derive(Debug, Clone)]
pub struct SegmentBuffer {
    slot_size: usize,
    data: Vec<u8>,
    slots: Vec<Slot>,
    base: u16,
    current_index: usize,
    head: Option<usize>,
    tail: Option<usize>,
    in_use: usize,
}

impl SegmentBuffer {
    /// Creates a buffer of `slot_count` slots of `slot_size` bytes each,
    /// with a base of zero. A zero slot count is raised to one and slots are
    /// never smaller than the largest possible header.
    pub fn new(slot_size: u16, slot_count: u8) -> Self {
        let slot_size = (slot_size as usize).max(MAX_HEADER_LENGTH as usize + 1);
        let slot_count = (slot_count as usize).max(1);
        Self {
            slot_size,
            data: vec![0; slot_size * slot_count],
            slots: vec![Slot::default(); slot_count],
            base: 0,
            current_index: 0,
            head: None,
            tail: None,
            in_use: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// The sequence number held by the first slot of the window.
    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use
    }

    /// Moves the window to start at `base`, discarding every slot.
    pub fn set_base(&mut self, base: u16) {
        for slot in self.slots.iter_mut() {
            *slot = Slot::default();
        }
        self.head = None;
        self.tail = None;
        self.in_use = 0;
        self.current_index = 0;
        self.base = base;
    }

    /// Slides the window forward by `by`, releasing the slots that fall off
    /// the front.
    pub fn advance_base(&mut self, by: u16) {
        if by as usize >= self.capacity() {
            self.set_base(self.base.wrapping_add(by));
            return;
        }
        for i in 0..by {
            self.unmark(self.base.wrapping_add(i));
        }
        self.base = self.base.wrapping_add(by);
        self.current_index = (self.current_index + by as usize) % self.capacity();
    }

    /// Whether `seq` falls inside the current window.
    pub fn has_slot(&self, seq: u16) -> bool {
        (seq_offset(seq, self.base) as usize) < self.capacity()
    }

    pub fn is_in_use(&self, seq: u16) -> bool {
        self.index(seq).map_or(false, |i| self.slots[i].in_use)
    }

    /// The stored bytes of the slot for `seq`, whether or not it is in use.
    pub fn slot(&self, seq: u16) -> Option<&[u8]> {
        let i = self.index(seq)?;
        let start = i * self.slot_size;
        Some(&self.data[start..start + self.slots[i].len])
    }

    /// The whole writable region of the slot for `seq`.
    pub fn slot_mut(&mut self, seq: u16) -> Option<&mut [u8]> {
        let i = self.index(seq)?;
        let start = i * self.slot_size;
        Some(&mut self.data[start..start + self.slot_size])
    }

    /// Marks the slot for `seq` as holding `len` bytes. The length is
    /// clamped to the slot size. Returns false if `seq` is outside the
    /// window.
    pub fn mark_in_use(&mut self, seq: u16, len: usize) -> bool {
        let i = match self.index(seq) {
            Some(i) => i,
            None => return false,
        };
        self.slots[i].len = len.min(self.slot_size);
        if !self.slots[i].in_use {
            self.slots[i].in_use = true;
            self.link(i);
            self.in_use += 1;
        }
        true
    }

    /// Copies `bytes` into the slot for `seq` and marks it in use.
    pub fn store(&mut self, seq: u16, bytes: &[u8]) -> bool {
        let Some(slot) = self.slot_mut(seq) else {
            return false;
        };
        let len = bytes.len().min(slot.len());
        slot[..len].copy_from_slice(&bytes[..len]);
        self.mark_in_use(seq, len)
    }

    /// Releases the slot for `seq`. Does nothing if it is not in use.
    pub fn unmark(&mut self, seq: u16) {
        let Some(i) = self.index(seq) else {
            return;
        };
        if !self.slots[i].in_use {
            return;
        }
        self.unlink(i);
        self.slots[i] = Slot::default();
        self.in_use -= 1;
    }

    /// Sequence numbers of the in-use slots in ascending order, at most
    /// `max` of them.
    pub fn enumerate_in_use(&self, max: usize) -> Vec<u16> {
        self.iter_in_use().take(max).collect()
    }

    pub fn iter_in_use(&self) -> impl Iterator<Item = u16> + '_ {
        std::iter::successors(self.head, move |&i| self.slots[i].next)
            .map(move |i| self.base.wrapping_add(self.offset(i) as u16))
    }

    fn index(&self, seq: u16) -> Option<usize> {
        let offset = seq_offset(seq, self.base) as usize;
        if offset >= self.capacity() {
            return None;
        }
        Some((self.current_index + offset) % self.capacity())
    }

    /// Logical distance of physical slot `i` from the base.
    fn offset(&self, i: usize) -> usize {
        (i + self.capacity() - self.current_index) % self.capacity()
    }

    /// Inserts slot `i` into the in-use list keeping sequence order. Walks
    /// back from the tail, so the common append case is constant time.
    fn link(&mut self, i: usize) {
        let offset = self.offset(i);
        let mut after = self.tail;
        while let Some(candidate) = after {
            if self.offset(candidate) < offset {
                break;
            }
            after = self.slots[candidate].prev;
        }

        let next = match after {
            Some(prev) => self.slots[prev].next,
            None => self.head,
        };
        self.slots[i].prev = after;
        self.slots[i].next = next;
        match after {
            Some(prev) => self.slots[prev].next = Some(i),
            None => self.head = Some(i),
        }
        match next {
            Some(next) => self.slots[next].prev = Some(i),
            None => self.tail = Some(i),
        }
    }

    fn unlink(&mut self, i: usize) {
        let Slot { prev, next, .. } = self.slots[i];
        match prev {
            Some(prev) => self.slots[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next].prev = prev,
            None => self.tail = prev,
        }
    }
}
