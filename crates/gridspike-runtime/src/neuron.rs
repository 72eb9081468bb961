//! Neuron collaborator: leaky integrate-and-fire pool
//!
//! The synapse engine only requires that neurons expose a spike
//! history and a per-tick fired view; how they decide to fire is their
//! own business. This pool integrates the summation-point input (plus
//! any injected stimulus current) with leaky integrate-and-fire
//! dynamics, which is enough to close the loop for simulations and
//! tests.

use crate::{
    error::{Result, RuntimeError},
    history::SpikeHistory,
    simulation::TickContext,
    summation::SummationPoints,
};
use gridspike_storage::{NeuronId, Spike, Step};

/// Parameters for leaky integrate-and-fire neurons, in SI units
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NeuronParams {
    /// Membrane time constant (s)
    pub tau_m: f64,
    /// Resting potential
    pub v_rest: f64,
    /// Reset potential
    pub v_reset: f64,
    /// Threshold potential
    pub v_thresh: f64,
    /// Refractory period (s)
    pub t_refrac: f64,
    /// Membrane resistance scaling the input current
    pub r_m: f64,
}

impl Default for NeuronParams {
    fn default() -> Self {
        Self {
            tau_m: 10e-3,   // 10ms membrane time constant
            v_rest: 0.0,
            v_reset: 0.0,
            v_thresh: 1.0,
            t_refrac: 2e-3, // 2ms refractory period
            r_m: 1.0,
        }
    }
}

impl NeuronParams {
    /// Create new parameters with validation
    pub fn new(
        tau_m: f64,
        v_rest: f64,
        v_reset: f64,
        v_thresh: f64,
        t_refrac: f64,
        r_m: f64,
    ) -> Result<Self> {
        if tau_m <= 0.0 {
            return Err(RuntimeError::invalid_parameter(
                "tau_m",
                tau_m.to_string(),
                "> 0.0",
            ));
        }
        if v_thresh <= v_rest {
            return Err(RuntimeError::invalid_parameter(
                "v_thresh",
                format!("{} (with v_rest={})", v_thresh, v_rest),
                "> v_rest",
            ));
        }
        if t_refrac < 0.0 {
            return Err(RuntimeError::invalid_parameter(
                "t_refrac",
                t_refrac.to_string(),
                ">= 0.0",
            ));
        }
        if r_m <= 0.0 {
            return Err(RuntimeError::invalid_parameter(
                "r_m",
                r_m.to_string(),
                "> 0.0",
            ));
        }

        Ok(Self {
            tau_m,
            v_rest,
            v_reset,
            v_thresh,
            t_refrac,
            r_m,
        })
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(
            self.tau_m,
            self.v_rest,
            self.v_reset,
            self.v_thresh,
            self.t_refrac,
            self.r_m,
        )?;
        Ok(())
    }
}

/// Pool of `N` integrate-and-fire neurons with spike histories and
/// summation points
#[derive(Debug)]
pub struct NeuronPool {
    params: NeuronParams,
    v: Vec<f64>,
    last_spike: Vec<Option<Step>>,
    injected: Vec<f64>,
    fired: Vec<bool>,
    histories: Vec<SpikeHistory>,
    summation: SummationPoints,
}

impl NeuronPool {
    /// Create a pool of `count` neurons at rest, each with a spike
    /// history ring of `history_capacity` entries
    pub fn new(count: usize, params: NeuronParams, history_capacity: usize) -> Result<Self> {
        params.validate()?;
        if count == 0 {
            return Err(RuntimeError::invalid_config("neuron pool must not be empty"));
        }

        Ok(Self {
            v: vec![params.v_rest; count],
            last_spike: vec![None; count],
            injected: vec![0.0; count],
            fired: vec![false; count],
            histories: (0..count).map(|_| SpikeHistory::new(history_capacity)).collect(),
            summation: SummationPoints::new(count),
            params,
        })
    }

    /// Number of neurons in the pool
    pub fn len(&self) -> usize {
        self.v.len()
    }

    /// True when the pool holds no neurons
    pub fn is_empty(&self) -> bool {
        self.v.is_empty()
    }

    /// Neuron parameters shared by the pool
    pub fn params(&self) -> &NeuronParams {
        &self.params
    }

    /// Shared view of the summation points for the synapse phase
    pub fn summation(&self) -> &SummationPoints {
        &self.summation
    }

    /// Inject external stimulus current, applied on the next advance
    pub fn inject(&mut self, neuron: NeuronId, current: f64) -> Result<()> {
        let slot = self
            .injected
            .get_mut(neuron.index())
            .ok_or(RuntimeError::NeuronNotFound { neuron_id: neuron.raw() })?;
        *slot += current;
        Ok(())
    }

    /// Membrane potential of one neuron
    pub fn membrane_potential(&self, neuron: NeuronId) -> Result<f64> {
        self.v
            .get(neuron.index())
            .copied()
            .ok_or(RuntimeError::NeuronNotFound { neuron_id: neuron.raw() })
    }

    /// Spike history lookup: offset `-1` is the most recent spike of
    /// `neuron`, `-2` the one before; `NO_SPIKE` past the window
    pub fn history_at(&self, neuron: NeuronId, offset: i64) -> Step {
        self.histories[neuron.index()].at(offset)
    }

    /// Whether `neuron` fired during the current tick
    pub fn fired(&self, neuron: NeuronId) -> bool {
        self.fired[neuron.index()]
    }

    /// Append a spike to a neuron's history and mark it fired for this
    /// tick. Called by the pool itself during integration; exposed so
    /// external spike sources can drive the engine.
    pub fn record_spike(&mut self, neuron: NeuronId, step: Step) {
        self.histories[neuron.index()].push(step);
        self.fired[neuron.index()] = true;
    }

    /// Whether a neuron sits inside its refractory window at `step`
    fn is_refractory(&self, index: usize, step: Step, dt: f64) -> bool {
        match self.last_spike[index] {
            Some(last) => ((step - last) as f64) * dt < self.params.t_refrac,
            None => false,
        }
    }

    /// Neuron phase of one tick: drain summation input, integrate,
    /// fire, and append to spike histories. Returns this tick's spikes.
    pub fn advance(&mut self, ctx: TickContext) -> Vec<Spike> {
        let mut spikes = Vec::new();
        let count = self.v.len();

        for index in 0..count {
            self.fired[index] = false;
            let input = self.summation.take(index) + self.injected[index];
            self.injected[index] = 0.0;

            if self.is_refractory(index, ctx.step, ctx.dt) {
                continue;
            }

            // Euler step of dV/dt = (v_rest - v + R*I) / tau_m
            let dv = (self.params.v_rest - self.v[index] + self.params.r_m * input)
                / self.params.tau_m;
            self.v[index] += dv * ctx.dt;

            if self.v[index] >= self.params.v_thresh {
                self.v[index] = self.params.v_reset;
                self.last_spike[index] = Some(ctx.step);
                let id = NeuronId::new(index as u32);
                self.record_spike(id, ctx.step);
                spikes.push(Spike::new(id, ctx.step));
            }
        }

        spikes
    }

    /// Reset every neuron to rest and clear histories and summation
    pub fn reset(&mut self) {
        for index in 0..self.v.len() {
            self.v[index] = self.params.v_rest;
            self.last_spike[index] = None;
            self.injected[index] = 0.0;
            self.fired[index] = false;
            self.histories[index].clear();
        }
        self.summation.clear();
    }
}
