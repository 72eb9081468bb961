//! Identifier primitives and the checkpoint field codec for the
//! GridSpike simulation engine
//!
//! This crate holds the types shared between the engine and its
//! checkpoint collaborators: dense neuron identifiers, the simulation
//! step clock, the missing-spike sentinel, and the text field codec
//! used to stream per-synapse records.

#![deny(missing_docs)]
#![warn(clippy::all)]

use core::fmt;

// Core modules
pub mod checkpoint;
pub mod error;

// Re-export essential types
pub use checkpoint::{FieldReader, FieldWriter};
pub use error::{Result, StorageError};

/// Storage crate version for compatibility checking
pub const STORAGE_VERSION: u32 = 1;

/// Simulation step index (monotonically increasing tick counter)
pub type Step = u64;

/// Sentinel returned by spike-history lookups when the requested
/// offset predates the recorded window
pub const NO_SPIKE: Step = Step::MAX;

/// Dense neuron identifier in `[0, N)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NeuronId(pub u32);

impl NeuronId {
    /// Create a new neuron ID
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Get the ID as a vector index
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Invalid neuron ID constant
    pub const INVALID: Self = Self(u32::MAX);

    /// Check if this is a valid neuron ID
    pub const fn is_valid(&self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Display for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Spike event: a neuron fired at a simulation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spike {
    /// Neuron that fired
    pub neuron_id: NeuronId,
    /// Step at which it fired
    pub step: Step,
}

impl Spike {
    /// Create a new spike event
    pub const fn new(neuron_id: NeuronId, step: Step) -> Self {
        Self { neuron_id, step }
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::*;
    use serde::{Deserialize, Serialize};

    impl Serialize for NeuronId {
        fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            self.0.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for NeuronId {
        fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let id = u32::deserialize(deserializer)?;
            Ok(NeuronId::new(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neuron_id() {
        let id = NeuronId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id.index(), 42);
        assert!(id.is_valid());
        assert_eq!(format!("{}", id), "N42");
    }

    #[test]
    fn test_invalid_id() {
        assert!(!NeuronId::INVALID.is_valid());
    }

    #[test]
    fn test_no_spike_sentinel() {
        // The sentinel must compare greater than every reachable step
        assert!(NO_SPIKE > 1_000_000_000_000);
    }

    #[test]
    fn test_spike() {
        let spike = Spike::new(NeuronId::new(3), 17);
        assert_eq!(spike.neuron_id, NeuronId::new(3));
        assert_eq!(spike.step, 17);
    }
}
