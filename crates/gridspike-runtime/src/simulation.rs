//! Step driver and simulation loop
//!
//! Each tick runs two phases with a barrier between them: the neuron
//! phase (stimuli, integration, firing, delay-line scheduling through
//! the notification layer) and the synapse phase (delay-line draining,
//! learning, summation). The driver owns the clock; the step counter
//! and `dt` travel together in an explicit `TickContext` so nothing in
//! the engine reaches for ambient state.

use crate::{
    error::{Result, RuntimeError},
    neuron::NeuronPool,
    synapse::{SynapseIndexMap, SynapseModel},
};
use gridspike_storage::{NeuronId, Spike, Step};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Clock view passed into every advance call: the current step and the
/// seconds-per-step resolution, immutable for the duration of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    /// Current simulation step
    pub step: Step,
    /// Seconds per step
    pub dt: f64,
}

impl TickContext {
    /// Create a tick context
    pub const fn new(step: Step, dt: f64) -> Self {
        Self { step, dt }
    }
}

/// Simulation parameters
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationParams {
    /// Seconds per step
    pub dt: f64,
    /// Total steps to execute
    pub steps: u64,
    /// Seed for the stimulus generator
    pub random_seed: Option<u64>,
    /// Maximum spikes to record (prevents memory issues)
    pub max_recorded_spikes: Option<usize>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            dt: 1e-4,                             // 0.1ms timestep
            steps: 10_000,                        // 1 second
            random_seed: None,
            max_recorded_spikes: Some(1_000_000), // 1M spike limit
        }
    }
}

impl SimulationParams {
    /// Create new simulation parameters with validation
    pub fn new(dt: f64, steps: u64) -> Result<Self> {
        if dt <= 0.0 {
            return Err(RuntimeError::invalid_parameter("dt", dt.to_string(), "> 0.0"));
        }
        if steps == 0 {
            return Err(RuntimeError::invalid_parameter(
                "steps",
                steps.to_string(),
                "> 0",
            ));
        }

        Ok(Self {
            dt,
            steps,
            ..Default::default()
        })
    }

    /// Set the stimulus seed for reproducibility
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Set maximum spike recording limit
    pub fn with_spike_limit(mut self, limit: usize) -> Self {
        self.max_recorded_spikes = Some(limit);
        self
    }

    /// Simulated duration in seconds
    pub fn duration(&self) -> f64 {
        self.steps as f64 * self.dt
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(self.dt, self.steps)?;
        Ok(())
    }
}

/// Input stimulus pattern, in step units
#[derive(Debug, Clone)]
pub enum Stimulus {
    /// Constant current injection
    Constant {
        /// Target neuron
        neuron: NeuronId,
        /// Current amplitude
        amplitude: f64,
        /// First step of the injection
        start_step: Step,
        /// One past the last step of the injection
        end_step: Step,
    },
    /// Poisson-sampled current kicks
    Poisson {
        /// Target neuron
        neuron: NeuronId,
        /// Event rate (Hz)
        rate_hz: f64,
        /// Current amplitude per event
        amplitude: f64,
        /// First step of the injection
        start_step: Step,
        /// One past the last step of the injection
        end_step: Step,
    },
    /// Current kicks at explicit steps
    SpikeTrain {
        /// Target neuron
        neuron: NeuronId,
        /// Current amplitude per kick
        amplitude: f64,
        /// Steps at which to inject
        steps: Vec<Step>,
    },
}

/// Simulation results
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// All recorded spikes
    pub spikes: Vec<Spike>,
    /// Number of steps executed
    pub steps_executed: u64,
    /// Total spike count
    pub total_spikes: usize,
    /// Final weights of the live synapses, as (src, dst, weight)
    pub final_weights: Vec<(NeuronId, NeuronId, f64)>,
}

impl SimulationResult {
    fn new() -> Self {
        Self {
            spikes: Vec::new(),
            steps_executed: 0,
            total_spikes: 0,
            final_weights: Vec::new(),
        }
    }

    /// Spikes recorded for one neuron
    pub fn spikes_for_neuron(&self, neuron_id: NeuronId) -> Vec<&Spike> {
        self.spikes
            .iter()
            .filter(|spike| spike.neuron_id == neuron_id)
            .collect()
    }

    /// Export spikes as (step, neuron) tuples
    pub fn export_spikes(&self) -> Vec<(Step, u32)> {
        self.spikes
            .iter()
            .map(|spike| (spike.step, spike.neuron_id.raw()))
            .collect()
    }
}

/// Step driver: orchestrates neuron and synapse phases per tick and
/// owns the global step counter
#[derive(Debug)]
pub struct StepDriver<S: SynapseModel> {
    params: SimulationParams,
    neurons: NeuronPool,
    synapses: S,
    index: SynapseIndexMap,
    stimuli: Vec<Stimulus>,
    step: Step,
    rng: StdRng,
}

impl<S: SynapseModel> StepDriver<S> {
    /// Create a driver over a neuron pool and a synapse store
    pub fn new(neurons: NeuronPool, synapses: S, params: SimulationParams) -> Result<Self> {
        params.validate()?;

        for i_syn in 0..synapses.capacity() {
            if synapses.in_use(i_syn) {
                for endpoint in [synapses.source(i_syn), synapses.destination(i_syn)] {
                    if endpoint.index() >= neurons.len() {
                        return Err(RuntimeError::invalid_config(format!(
                            "synapse {} references neuron {} outside the pool of {}",
                            i_syn,
                            endpoint,
                            neurons.len()
                        )));
                    }
                }
            }
        }

        let index = SynapseIndexMap::build(&synapses, neurons.len());
        let rng = StdRng::seed_from_u64(params.random_seed.unwrap_or(42));

        Ok(Self {
            params,
            neurons,
            synapses,
            index,
            stimuli: Vec::new(),
            step: 0,
            rng,
        })
    }

    /// Add an input stimulus
    pub fn add_stimulus(&mut self, stimulus: Stimulus) {
        self.stimuli.push(stimulus);
    }

    /// Rebuild the notification index after topology changes
    pub fn rebuild_index(&mut self) {
        self.index = SynapseIndexMap::build(&self.synapses, self.neurons.len());
    }

    /// Clock view for the current tick
    pub fn context(&self) -> TickContext {
        TickContext::new(self.step, self.params.dt)
    }

    /// Current simulation step
    pub fn step(&self) -> Step {
        self.step
    }

    /// Simulation parameters
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// The neuron pool
    pub fn neurons(&self) -> &NeuronPool {
        &self.neurons
    }

    /// Mutable access to the neuron pool
    pub fn neurons_mut(&mut self) -> &mut NeuronPool {
        &mut self.neurons
    }

    /// The synapse store
    pub fn synapses(&self) -> &S {
        &self.synapses
    }

    /// Mutable access to the synapse store
    pub fn synapses_mut(&mut self) -> &mut S {
        &mut self.synapses
    }

    fn apply_stimuli(&mut self) -> Result<()> {
        let step = self.step;
        let dt = self.params.dt;

        for stimulus in &self.stimuli {
            match stimulus {
                Stimulus::Constant {
                    neuron,
                    amplitude,
                    start_step,
                    end_step,
                } => {
                    if step >= *start_step && step < *end_step {
                        self.neurons.inject(*neuron, *amplitude)?;
                    }
                }
                Stimulus::Poisson {
                    neuron,
                    rate_hz,
                    amplitude,
                    start_step,
                    end_step,
                } => {
                    if step >= *start_step && step < *end_step {
                        let spike_prob = rate_hz * dt;
                        if self.rng.gen::<f64>() < spike_prob {
                            self.neurons.inject(*neuron, *amplitude)?;
                        }
                    }
                }
                Stimulus::SpikeTrain {
                    neuron,
                    amplitude,
                    steps,
                } => {
                    if steps.contains(&step) {
                        self.neurons.inject(*neuron, *amplitude)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Execute one tick: neuron phase, synapse phase, clock increment.
    /// Returns this tick's spikes.
    pub fn tick(&mut self) -> Result<Vec<Spike>> {
        let ctx = self.context();

        // Neuron phase: integrate, fire, and schedule deliveries.
        self.apply_stimuli()?;
        let spikes = self.neurons.advance(ctx);
        let back_propagates = self.synapses.allows_back_propagation();
        for spike in &spikes {
            for &i_syn in self.index.outgoing(spike.neuron_id) {
                self.synapses.pre_spike_hit(i_syn);
            }
            if back_propagates {
                for &i_syn in self.index.incoming(spike.neuron_id) {
                    self.synapses.post_spike_hit(i_syn);
                }
            }
        }

        // Synapse phase: histories are frozen, rows advance in any
        // order, summation is atomic.
        self.synapses.advance_all(&self.neurons, ctx);

        self.step += 1;
        Ok(spikes)
    }

    /// Run the configured number of steps
    pub fn run(&mut self) -> Result<SimulationResult> {
        log::info!(
            "starting simulation: {} steps at {}s per step",
            self.params.steps,
            self.params.dt
        );

        let mut result = SimulationResult::new();
        let num_steps = self.params.steps;

        for step in 0..num_steps {
            let spikes = self.tick()?;
            result.spikes.extend(spikes);
            result.steps_executed += 1;

            if let Some(max_spikes) = self.params.max_recorded_spikes {
                if result.spikes.len() >= max_spikes {
                    log::warn!("spike recording limit reached: {}", max_spikes);
                    break;
                }
            }

            if step % (num_steps / 10).max(1) == 0 {
                log::debug!(
                    "simulation progress: {:.1}%",
                    (step as f64 / num_steps as f64) * 100.0
                );
            }
        }

        result.total_spikes = result.spikes.len();
        for i_syn in 0..self.synapses.capacity() {
            if self.synapses.in_use(i_syn) {
                result.final_weights.push((
                    self.synapses.source(i_syn),
                    self.synapses.destination(i_syn),
                    self.synapses.weight(i_syn),
                ));
            }
        }

        log::info!(
            "simulation completed: {} spikes in {} steps",
            result.total_spikes,
            result.steps_executed
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neuron::NeuronParams;
    use crate::stdp::StdpSynapses;
    use crate::synapse::{SpikingSynapses, SynapseKind};

    const DT: f64 = 1e-4;

    fn pool(count: usize) -> NeuronPool {
        NeuronPool::new(count, NeuronParams::default(), 128).unwrap()
    }

    fn fire_at(neuron: u32, steps: Vec<Step>) -> Stimulus {
        // dv = dt/tau * R*I = 0.01 * 200 = 2, over threshold in one step
        Stimulus::SpikeTrain {
            neuron: NeuronId::new(neuron),
            amplitude: 200.0,
            steps,
        }
    }

    #[test]
    fn test_params_default_valid() {
        let params = SimulationParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.duration(), 1.0);
    }

    #[test]
    fn test_params_validation() {
        assert!(SimulationParams::new(0.0, 100).is_err());
        assert!(SimulationParams::new(1e-4, 0).is_err());
        assert!(SimulationParams::new(1e-4, 100).is_ok());
    }

    #[test]
    fn test_driver_rejects_out_of_pool_synapse() {
        let mut store = SpikingSynapses::setup(4, 1);
        store
            .add_synapse(NeuronId::new(2), NeuronId::new(3), DT, SynapseKind::EE)
            .unwrap();
        let err = StepDriver::new(pool(2), store, SimulationParams::new(DT, 10).unwrap())
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_stimulated_neuron_spikes_at_requested_steps() {
        let store = StdpSynapses::setup(2, 1);
        let params = SimulationParams::new(DT, 100).unwrap();
        let mut driver = StepDriver::new(pool(2), store, params).unwrap();
        driver.add_stimulus(fire_at(0, vec![5, 60]));

        let result = driver.run().unwrap();
        assert_eq!(result.steps_executed, 100);
        let spikes = result.spikes_for_neuron(NeuronId::new(0));
        assert_eq!(spikes.len(), 2);
        assert_eq!(spikes[0].step, 5);
        assert_eq!(spikes[1].step, 60);
    }

    #[test]
    fn test_forward_delivery_reaches_destination() {
        let mut store = StdpSynapses::setup(2, 1);
        let i_syn = store
            .add_synapse(NeuronId::new(0), NeuronId::new(1), DT, SynapseKind::EE)
            .unwrap();
        // A visible excitatory kick for the default LIF threshold
        store.base_mut().set_weight(i_syn, 0.3);
        store.params_mut(i_syn).w_max = 1.0;

        let params = SimulationParams::new(DT, 60).unwrap();
        let mut driver = StepDriver::new(pool(2), store, params).unwrap();
        driver.add_stimulus(fire_at(0, vec![5]));
        driver.run().unwrap();

        // 16 delivery steps after the source fired, the destination's
        // membrane has been pushed off rest.
        assert!(
            driver
                .neurons()
                .membrane_potential(NeuronId::new(1))
                .unwrap()
                > 0.0
        );
    }

    #[test]
    fn test_back_propagation_drives_potentiation() {
        let mut store = StdpSynapses::setup(2, 1);
        let i_syn = store
            .add_synapse(NeuronId::new(0), NeuronId::new(1), DT, SynapseKind::EE)
            .unwrap();
        let w0 = store.base().weight(i_syn);
        assert!(w0 > 0.0);

        // Source fires at 10, destination at 80. With the 16-step EE
        // delay the pairing interval is (80 - 10 - 16) * dt = 5.4ms:
        // inside the potentiation window, outside the gap.
        let params = SimulationParams::new(DT, 120).unwrap();
        let mut driver = StepDriver::new(pool(2), store, params).unwrap();
        driver.add_stimulus(fire_at(0, vec![10]));
        driver.add_stimulus(fire_at(1, vec![80]));

        let result = driver.run().unwrap();
        let (_, _, w) = result.final_weights[0];
        assert!(w > w0, "expected potentiation, got {} from {}", w, w0);

        let expected = w0 * (1.0 + 1.01 * (-5.4e-3f64 / 14.8e-3).exp());
        assert!((w - expected).abs() < expected * 1e-9);
    }

    #[test]
    fn test_base_family_takes_no_back_propagation() {
        let mut store = SpikingSynapses::setup(2, 1);
        store
            .add_synapse(NeuronId::new(0), NeuronId::new(1), DT, SynapseKind::EE)
            .unwrap();
        let w0 = store.weight(1);

        let params = SimulationParams::new(DT, 120).unwrap();
        let mut driver = StepDriver::new(pool(2), store, params).unwrap();
        driver.add_stimulus(fire_at(0, vec![10]));
        driver.add_stimulus(fire_at(1, vec![80]));

        let result = driver.run().unwrap();
        let (_, _, w) = result.final_weights[0];
        assert_eq!(w, w0);
    }

    #[test]
    fn test_poisson_runs_are_reproducible_with_seed() {
        let run = |seed: u64| {
            let store = StdpSynapses::setup(2, 1);
            let params = SimulationParams::new(DT, 500).unwrap().with_seed(seed);
            let mut driver = StepDriver::new(pool(2), store, params).unwrap();
            driver.add_stimulus(Stimulus::Poisson {
                neuron: NeuronId::new(0),
                rate_hz: 800.0,
                amplitude: 200.0,
                start_step: 0,
                end_step: 500,
            });
            driver.run().unwrap().export_spikes()
        };

        let a = run(7);
        let b = run(7);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_spike_limit_stops_recording() {
        let store = StdpSynapses::setup(1, 1);
        let params = SimulationParams::new(DT, 10_000)
            .unwrap()
            .with_spike_limit(3);
        let mut driver = StepDriver::new(pool(1), store, params).unwrap();
        driver.add_stimulus(Stimulus::Constant {
            neuron: NeuronId::new(0),
            amplitude: 200.0,
            start_step: 0,
            end_step: 10_000,
        });

        let result = driver.run().unwrap();
        assert!(result.total_spikes >= 3);
        assert!(result.steps_executed < 10_000);
    }
}
