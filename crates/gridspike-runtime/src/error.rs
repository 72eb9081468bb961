//! Error types for the simulation engine

use gridspike_storage::StorageError;
use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur in the simulation engine
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Invalid engine configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Reason for invalid configuration
        reason: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Neuron index outside the pool
    #[error("Neuron {neuron_id} not found")]
    NeuronNotFound {
        /// Neuron ID that was not found
        neuron_id: u32,
    },

    /// Synapse index outside the store
    #[error("Synapse index {index} out of range (max: {max})")]
    SynapseOutOfRange {
        /// Index that was out of range
        index: usize,
        /// Maximum allowed index
        max: usize,
    },

    /// A destination neuron has no free synapse slot left
    #[error("Neuron {neuron_id} already holds {max_per_neuron} incoming synapses")]
    NoFreeSlot {
        /// Destination neuron
        neuron_id: u32,
        /// Per-neuron synapse capacity
        max_per_neuron: usize,
    },

    /// Checkpoint stream failure attributed to one synapse record
    #[error("Checkpoint error for synapse {synapse}: {source}")]
    Checkpoint {
        /// Index of the synapse record that failed
        synapse: usize,
        /// Underlying codec error
        source: StorageError,
    },

    /// Storage layer error outside any synapse record
    #[error("Storage error: {source}")]
    Storage {
        #[from]
        /// Source storage error
        source: StorageError,
    },
}

impl RuntimeError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// Create a synapse out-of-range error
    pub fn synapse_out_of_range(index: usize, max: usize) -> Self {
        Self::SynapseOutOfRange { index, max }
    }

    /// Attribute a storage error to one synapse record
    pub fn checkpoint(synapse: usize, source: StorageError) -> Self {
        Self::Checkpoint { synapse, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RuntimeError::invalid_config("zero neurons");
        assert!(matches!(err, RuntimeError::InvalidConfiguration { .. }));

        let err = RuntimeError::invalid_parameter("dt", "0", "> 0");
        assert!(matches!(err, RuntimeError::InvalidParameter { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = RuntimeError::synapse_out_of_range(10, 8);
        let msg = format!("{}", err);
        assert!(msg.contains("Synapse index 10"));

        let err = RuntimeError::checkpoint(3, StorageError::missing_field("Wex", 6));
        let msg = format!("{}", err);
        assert!(msg.contains("synapse 3"));
        assert!(msg.contains("Wex"));
    }
}
