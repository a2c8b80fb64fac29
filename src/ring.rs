//! Interrupt-safe receive buffer.
//!
//! Bytes arrive from the radio one at a time in the UART receive interrupt and
//! are consumed later by the polling loop. [`RingBuffer`] is the plain circular
//! store; [`RxQueue`] wraps it in a `critical_section::Mutex` and splits it into
//! exactly one [`Producer`] (for the interrupt) and one [`Consumer`] (for the
//! driver), which makes the single-producer/single-consumer contract a property
//! of the types rather than a convention.
//!
//! ## Overflow
//!
//! Pushing never fails from the interrupt's point of view. When the buffer is
//! full a byte is lost according to the [`OverflowPolicy`]; the loss is only
//! visible through [`RingBuffer::overruns`].
//!
//! ## Example
//!
//! ```rust
//! use ant_uart::ring::{OverflowPolicy, RxQueue};
//!
//! static RX: RxQueue<16> = RxQueue::new(OverflowPolicy::DropOldest);
//!
//! let (mut producer, mut consumer) = RX.split().unwrap();
//! producer.push(0xa4);
//! assert_eq!(consumer.pop(), Some(0xa4));
//! assert_eq!(consumer.pop(), None);
//! assert!(RX.split().is_none());
//! ```

use core::cell::{Cell, RefCell};
use core::fmt;
use critical_section::Mutex;

/// What to discard when a byte arrives at a full buffer.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum OverflowPolicy {
    /// Overwrite the oldest unread byte; the buffer keeps the newest `N` bytes.
    #[default]
    DropOldest,
    /// Discard the incoming byte; the buffer keeps the oldest `N` bytes.
    DropNewest,
}

/// Fixed-capacity circular byte buffer.
///
/// `head` is the next write position, `tail` the next read position and
/// `count` the number of unread bytes. Both indices wrap modulo `N` and
/// `count` never exceeds `N`.
#[derive(Debug, Clone)]
pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    head: usize,
    tail: usize,
    count: usize,
    policy: OverflowPolicy,
    overruns: u16,
}

impl<const N: usize> RingBuffer<N> {
    /// Creates an empty buffer with the given overflow policy.
    pub const fn new(policy: OverflowPolicy) -> Self {
        Self {
            buf: [0; N],
            head: 0,
            tail: 0,
            count: 0,
            policy,
            overruns: 0,
        }
    }

    /// Stores `byte`, losing one byte per [`OverflowPolicy`] when full.
    pub fn push(&mut self, byte: u8) {
        if N == 0 {
            self.overruns = self.overruns.saturating_add(1);
            return;
        }
        if self.count == N {
            self.overruns = self.overruns.saturating_add(1);
            match self.policy {
                OverflowPolicy::DropNewest => return,
                // head == tail here; the write below lands on the oldest byte
                OverflowPolicy::DropOldest => {
                    self.tail = Self::advance(self.tail);
                    self.count -= 1;
                }
            }
        }
        self.buf[self.head] = byte;
        self.head = Self::advance(self.head);
        self.count += 1;
    }

    /// Removes and returns the oldest byte, or `None` when empty.
    pub fn pop(&mut self) -> Option<u8> {
        if self.count == 0 {
            return None;
        }
        let byte = self.buf[self.tail];
        self.tail = Self::advance(self.tail);
        self.count -= 1;
        Some(byte)
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether there are no unread bytes.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Maximum number of unread bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of bytes lost to overflow since creation (saturating).
    pub fn overruns(&self) -> u16 {
        self.overruns
    }

    /// The active overflow policy.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    fn advance(index: usize) -> usize {
        if index + 1 == N { 0 } else { index + 1 }
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new(OverflowPolicy::default())
    }
}

/// A [`RingBuffer`] shared between an interrupt and the polling loop.
///
/// Usually declared as a `static` and split once during start-up.
pub struct RxQueue<const N: usize> {
    ring: Mutex<RefCell<RingBuffer<N>>>,
    split: Mutex<Cell<bool>>,
}

impl<const N: usize> RxQueue<N> {
    /// Creates an empty, unsplit queue.
    pub const fn new(policy: OverflowPolicy) -> Self {
        Self {
            ring: Mutex::new(RefCell::new(RingBuffer::new(policy))),
            split: Mutex::new(Cell::new(false)),
        }
    }

    /// Hands out the producer and consumer halves.
    ///
    /// Returns `None` on every call after the first, so there can never be a
    /// second writer or a second reader.
    pub fn split(&self) -> Option<(Producer<'_, N>, Consumer<'_, N>)> {
        let first = critical_section::with(|cs| !self.split.borrow(cs).replace(true));
        if first {
            Some((Producer { queue: self }, Consumer { queue: self }))
        } else {
            None
        }
    }

    /// Number of bytes lost to overflow so far.
    pub fn overruns(&self) -> u16 {
        critical_section::with(|cs| self.ring.borrow_ref(cs).overruns())
    }
}

impl<const N: usize> fmt::Debug for RxQueue<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        critical_section::with(|cs| {
            let ring = self.ring.borrow_ref(cs);
            f.debug_struct("RxQueue")
                .field("len", &ring.len())
                .field("capacity", &N)
                .field("overruns", &ring.overruns())
                .field("split", &self.split.borrow(cs).get())
                .finish()
        })
    }
}

/// Write half of an [`RxQueue`]; owned by the byte-arrival interrupt.
#[derive(Debug)]
pub struct Producer<'q, const N: usize> {
    queue: &'q RxQueue<N>,
}

impl<const N: usize> Producer<'_, N> {
    /// Appends a received byte. Never blocks and never fails.
    pub fn push(&mut self, byte: u8) {
        critical_section::with(|cs| self.queue.ring.borrow_ref_mut(cs).push(byte));
    }
}

/// Read half of an [`RxQueue`]; owned by the driver.
#[derive(Debug)]
pub struct Consumer<'q, const N: usize> {
    queue: &'q RxQueue<N>,
}

impl<const N: usize> Consumer<'_, N> {
    /// Takes the oldest received byte, if any.
    pub fn pop(&mut self) -> Option<u8> {
        critical_section::with(|cs| self.queue.ring.borrow_ref_mut(cs).pop())
    }

    /// Number of bytes waiting.
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.queue.ring.borrow_ref(cs).len())
    }

    /// Whether no bytes are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pop_empty_returns_none() {
        let mut ring: RingBuffer<4> = RingBuffer::default();
        assert_eq!(ring.pop(), None);
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 4);
    }

    #[test]
    fn test_wraps_around() {
        let mut ring: RingBuffer<3> = RingBuffer::default();
        for round in 0..5u8 {
            ring.push(round);
            ring.push(round + 100);
            assert_eq!(ring.pop(), Some(round));
            assert_eq!(ring.pop(), Some(round + 100));
        }
        assert!(ring.is_empty());
        assert_eq!(ring.overruns(), 0);
    }

    #[test]
    fn test_drop_oldest_keeps_newest_bytes() {
        let mut ring: RingBuffer<3> = RingBuffer::new(OverflowPolicy::DropOldest);
        for b in 1..=5 {
            ring.push(b);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.overruns(), 2);
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), Some(4));
        assert_eq!(ring.pop(), Some(5));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_drop_newest_keeps_oldest_bytes() {
        let mut ring: RingBuffer<3> = RingBuffer::new(OverflowPolicy::DropNewest);
        for b in 1..=5 {
            ring.push(b);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.overruns(), 2);
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_full_protocol_capacity() {
        let mut ring: RingBuffer<255> = RingBuffer::default();
        for b in 0..255u8 {
            ring.push(b);
        }
        assert_eq!(ring.len(), 255);
        assert_eq!(ring.overruns(), 0);
        assert_eq!(ring.pop(), Some(0));
    }

    #[test]
    fn test_split_only_once() {
        let queue: RxQueue<8> = RxQueue::new(OverflowPolicy::DropOldest);
        let (mut tx, mut rx) = queue.split().expect("first split");
        assert!(queue.split().is_none());

        tx.push(0xa4);
        tx.push(0x01);
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.pop(), Some(0xa4));
        assert_eq!(rx.pop(), Some(0x01));
        assert!(rx.is_empty());
        assert_eq!(queue.overruns(), 0);
    }

    #[test]
    fn test_queue_reports_overruns() {
        let queue: RxQueue<2> = RxQueue::new(OverflowPolicy::DropNewest);
        let (mut tx, mut rx) = queue.split().expect("first split");
        tx.push(1);
        tx.push(2);
        tx.push(3);
        assert_eq!(queue.overruns(), 1);
        assert_eq!(rx.pop(), Some(1));
        assert_eq!(rx.pop(), Some(2));
        assert_eq!(rx.pop(), None);
    }

    proptest! {
        #[test]
        fn prop_fifo_while_within_capacity(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..16)) {
            let mut ring: RingBuffer<32> = RingBuffer::default();
            let mut expected = std::collections::VecDeque::new();
            let mut popped = Vec::new();
            for chunk in chunks {
                for b in chunk {
                    ring.push(b);
                    expected.push_back(b);
                }
                // drain between chunks so count never exceeds capacity
                while let Some(b) = ring.pop() {
                    popped.push(b);
                }
            }
            let expected: Vec<u8> = expected.into_iter().collect();
            prop_assert_eq!(popped, expected);
            prop_assert_eq!(ring.overruns(), 0);
        }
    }
}
