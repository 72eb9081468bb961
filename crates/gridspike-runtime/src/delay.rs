//! Bounded circular delay lines for spike delivery
//!
//! Each synapse schedules spikes into a fixed 32-slot circular bitmap:
//! one slot per simulation step, one pending spike per slot. The ring
//! removes all heap traffic from the per-step hot path; a tick costs a
//! mask, a clear, and an index increment.

/// Width of the delay ring in bytes
pub const BYTES_OF_DELAYQUEUE: u32 = 4;

/// Width of the delay ring in slots (steps)
pub const LENGTH_OF_DELAYQUEUE: u32 = BYTES_OF_DELAYQUEUE * 8;

/// Fixed-capacity circular bit queue scheduling a spike `total_delay`
/// steps into the future
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayQueue {
    /// Configured latency in steps, `0 <= total_delay < len`
    pub total_delay: u32,
    /// Pending-spike bits
    pub bits: u32,
    /// Current head slot, `0 <= head < len`
    pub head: u32,
    /// Ring size in slots
    pub len: u32,
}

impl DelayQueue {
    /// Create a zeroed queue with the given latency.
    ///
    /// # Panics
    /// Panics if the latency does not fit the ring
    /// (`total_delay / 8 + 1` bytes must fit in `BYTES_OF_DELAYQUEUE`).
    pub fn new(total_delay: u32) -> Self {
        let mut queue = Self {
            total_delay: 0,
            bits: 0,
            head: 0,
            len: LENGTH_OF_DELAYQUEUE,
        };
        queue.init(total_delay);
        queue
    }

    /// Reset the queue and (re)configure its latency.
    ///
    /// # Panics
    /// Panics if the latency does not fit the ring.
    pub fn init(&mut self, total_delay: u32) {
        let size = total_delay / 8 + 1;
        assert!(
            size <= BYTES_OF_DELAYQUEUE,
            "delay of {} steps exceeds the {}-slot ring",
            total_delay,
            LENGTH_OF_DELAYQUEUE
        );
        self.total_delay = total_delay;
        self.bits = 0;
        self.head = 0;
        self.len = LENGTH_OF_DELAYQUEUE;
    }

    /// Schedule a spike for delivery `total_delay` ticks from now.
    ///
    /// # Panics
    /// Panics if the target slot already holds a pending spike: the
    /// configured delay cannot exceed the shortest inter-spike
    /// interval that reuses a slot.
    pub fn schedule(&mut self) {
        let mut slot = self.head + self.total_delay;
        if slot >= self.len {
            slot -= self.len;
        }
        assert!(
            self.bits & (1 << slot) == 0,
            "delay slot {} already occupied",
            slot
        );
        self.bits |= 1 << slot;
    }

    /// Consume the head slot and advance the ring by one step.
    /// Returns true if a spike was due this tick.
    pub fn tick(&mut self) -> bool {
        let fired = self.bits & (1 << self.head) != 0;
        self.bits &= !(1 << self.head);
        self.head += 1;
        if self.head >= self.len {
            self.head = 0;
        }
        fired
    }

    /// True when no spike is pending anywhere in the ring
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

impl Default for DelayQueue {
    fn default() -> Self {
        Self::new(0)
    }
}
