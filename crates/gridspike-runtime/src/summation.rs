//! Summation points: per-neuron input accumulators
//!
//! Every synapse adds its post-synaptic response into the summation
//! slot of its destination neuron. The synapse phase runs data-parallel
//! across synapses, and many synapses may target the same neuron, so
//! the slots are atomic f64 cells (bit-cast compare-and-swap over
//! `AtomicU64`). The neuron phase owns the vector exclusively and
//! drains slots without atomics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Real-valued accumulator safe for concurrent addition
#[derive(Debug, Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    /// Create a cell holding `value`
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    /// Read the current value
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Atomically add `delta` to the cell
    pub fn fetch_add(&self, delta: f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Replace the value through exclusive access, returning the old one
    pub fn swap_mut(&mut self, value: f64) -> f64 {
        let old = f64::from_bits(*self.bits.get_mut());
        *self.bits.get_mut() = value.to_bits();
        old
    }
}

/// One summation slot per neuron
#[derive(Debug)]
pub struct SummationPoints {
    slots: Vec<AtomicF64>,
}

impl SummationPoints {
    /// Create `count` zeroed slots
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| AtomicF64::new(0.0)).collect(),
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the vector holds no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Accumulate into a slot; safe to call concurrently from the
    /// synapse phase
    pub fn add(&self, slot: usize, value: f64) {
        self.slots[slot].fetch_add(value);
    }

    /// Read a slot without draining it
    pub fn value(&self, slot: usize) -> f64 {
        self.slots[slot].load()
    }

    /// Drain a slot to zero, returning the accumulated input. Requires
    /// the exclusive access the neuron phase has by construction.
    pub fn take(&mut self, slot: usize) -> f64 {
        self.slots[slot].swap_mut(0.0)
    }

    /// Zero every slot
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.swap_mut(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_add_and_take() {
        let mut points = SummationPoints::new(3);
        points.add(1, 0.5);
        points.add(1, 0.25);
        assert_eq!(points.value(1), 0.75);
        assert_eq!(points.take(1), 0.75);
        assert_eq!(points.value(1), 0.0);
        assert_eq!(points.value(0), 0.0);
    }

    #[test]
    fn test_concurrent_accumulation() {
        let points = Arc::new(SummationPoints::new(1));
        let threads = 4;
        let adds_per_thread = 1000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let points = Arc::clone(&points);
                std::thread::spawn(move || {
                    for _ in 0..adds_per_thread {
                        points.add(0, 1.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Each addend is exactly representable, so the sum is exact
        // regardless of interleaving.
        assert_eq!(points.value(0), (threads * adds_per_thread) as f64);
    }

    #[test]
    fn test_clear() {
        let mut points = SummationPoints::new(2);
        points.add(0, 1.0);
        points.add(1, 2.0);
        points.clear();
        assert_eq!(points.value(0), 0.0);
        assert_eq!(points.value(1), 0.0);
    }
}
