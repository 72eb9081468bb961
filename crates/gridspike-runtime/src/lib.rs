//! Spiking-network simulation engine with STDP synapses
//!
//! This crate provides the core simulation engine for networks of
//! spiking neurons connected by plastic synapses: bounded circular
//! delay lines, per-neuron spike histories, a structure-of-arrays
//! synapse store, the pair-based STDP learning rule with optional
//! Froemke-Dan efficacy modulation, and a two-phase step driver safe
//! for data-parallel synapse advancement.

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export essential types from storage
pub use gridspike_storage::{
    FieldReader, FieldWriter, NeuronId, Result as StorageResult, Spike, Step, StorageError,
    NO_SPIKE,
};

// Core modules
pub mod delay;
pub mod error;
pub mod history;
pub mod neuron;
pub mod simulation;
pub mod stdp;
pub mod summation;
pub mod synapse;

// Re-export essential types
pub use delay::{DelayQueue, BYTES_OF_DELAYQUEUE, LENGTH_OF_DELAYQUEUE};
pub use error::{Result, RuntimeError};
pub use history::{lookback_steps, SpikeHistory};
pub use neuron::{NeuronParams, NeuronPool};
pub use simulation::{
    SimulationParams, SimulationResult, StepDriver, Stimulus, TickContext,
};
pub use stdp::{stdp_learning, StdpParams, StdpSynapses};
pub use summation::{AtomicF64, SummationPoints};
pub use synapse::{SpikingSynapses, SynapseIndexMap, SynapseKind, SynapseModel};

/// Runtime crate version for compatibility checking
pub const RUNTIME_VERSION: u32 = 1;

/// Default simulation time step (0.1 milliseconds, in seconds)
pub const DEFAULT_DT: f64 = 1e-4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_integration() {
        // Test that all components can be imported and basic objects created
        let params = NeuronParams::default();
        assert!(params.tau_m > 0.0);

        let stdp_params = StdpParams::default();
        assert!(stdp_params.a_pos > 0.0);
        assert!(stdp_params.a_neg < 0.0);

        let sim_params = SimulationParams::default();
        assert_eq!(sim_params.dt, DEFAULT_DT);
    }
}
