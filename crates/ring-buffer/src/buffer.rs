//! Ring Buffer Implementation

use crate::RingBufferError;
use std::collections::VecDeque;

/// A value stamped with its insertion sequence number
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sequenced<T> {
    pub sequence: u64,
    pub value: T,
}

/// Fixed-capacity ring buffer with monotonic insertion sequence numbers.
///
/// Storage is allocated once at construction. Once full, every push evicts the
/// entry with the lowest sequence number, so the buffer never grows past its
/// capacity regardless of stream length.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Entries ordered oldest (front) to newest (back)
    slots: VecDeque<Sequenced<T>>,
    /// Capacity of the buffer
    capacity: usize,
    /// Sequence number assigned to the next insertion
    next_sequence: u64,
}

impl<T> RingBuffer<T> {
    /// Create an empty ring buffer with the given capacity
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        if capacity == 0 {
            return Err(RingBufferError::ZeroCapacity);
        }
        Ok(Self {
            slots: VecDeque::with_capacity(capacity),
            capacity,
            next_sequence: 0,
        })
    }

    /// Create a ring buffer whose every slot already holds `value`.
    ///
    /// Used for memories that must have a fixed length from the first frame
    /// (e.g. boolean histories defaulting to `false`).
    pub fn filled(capacity: usize, value: T) -> Result<Self, RingBufferError>
    where
        T: Clone,
    {
        let mut buffer = Self::new(capacity)?;
        buffer.fill(value);
        Ok(buffer)
    }

    /// Push a value, returning the evicted entry if the buffer was full
    pub fn push(&mut self, value: T) -> Option<Sequenced<T>> {
        let evicted = if self.slots.len() >= self.capacity {
            self.slots.pop_front()
        } else {
            None
        };

        self.slots.push_back(Sequenced {
            sequence: self.next_sequence,
            value,
        });
        self.next_sequence += 1;

        evicted
    }

    /// Get the number of entries currently stored
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sequence number of the oldest stored entry
    pub fn oldest_sequence(&self) -> Option<u64> {
        self.slots.front().map(|s| s.sequence)
    }

    /// Iterate values from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots.iter().map(|s| &s.value)
    }

    /// Iterate sequenced entries from oldest to newest
    pub fn entries(&self) -> impl Iterator<Item = &Sequenced<T>> + '_ {
        self.slots.iter()
    }

    /// Mutable access to the most recently pushed value
    pub fn latest_mut(&mut self) -> Option<&mut T> {
        self.slots.back_mut().map(|s| &mut s.value)
    }

    /// Count stored values matching a predicate
    pub fn count_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        self.slots.iter().filter(|s| predicate(&s.value)).count()
    }

    /// Remove every entry. Sequence numbers keep increasing.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Replace the contents with `capacity` copies of `value`
    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        self.slots.clear();
        for _ in 0..self.capacity {
            self.push(value.clone());
        }
    }
}
