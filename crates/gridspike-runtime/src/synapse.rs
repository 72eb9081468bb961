//! Spiking synapse store: the base synapse family
//!
//! Synapses live in a structure-of-arrays store indexed by a dense
//! synapse id in `[0, N * maxPerNeuron)`, grouped by destination
//! neuron (`iSyn = dst * maxPerNeuron + slot`). The base family
//! delivers spikes through a per-synapse pre-delay ring, integrates a
//! geometrically decaying post-synaptic response, and accumulates it
//! into the destination's summation point. Learning families build on
//! top of it by composition.

use crate::{
    delay::DelayQueue,
    error::{Result, RuntimeError},
    neuron::NeuronPool,
    simulation::TickContext,
    summation::SummationPoints,
};
use gridspike_storage::{FieldReader, FieldWriter, NeuronId, StorageError};
use std::io::{BufRead, Write};

/// Default weight magnitude assigned at creation
pub const DEFAULT_WEIGHT_MAGNITUDE: f64 = 10e-9;

/// Synapse kind, by the excitatory/inhibitory nature of its endpoints
/// (source listed first)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SynapseKind {
    /// Inhibitory → inhibitory
    II,
    /// Inhibitory → excitatory
    IE,
    /// Excitatory → inhibitory
    EI,
    /// Excitatory → excitatory
    EE,
}

impl SynapseKind {
    /// Weight sign of the family: negative for an inhibitory source
    pub fn sign(&self) -> f64 {
        match self {
            Self::II | Self::IE => -1.0,
            Self::EI | Self::EE => 1.0,
        }
    }

    /// True when the source neuron is excitatory
    pub fn is_excitatory(&self) -> bool {
        self.sign() > 0.0
    }

    /// Kind of the synapse connecting two neurons
    pub fn from_neurons(src_excitatory: bool, dst_excitatory: bool) -> Self {
        match (src_excitatory, dst_excitatory) {
            (false, false) => Self::II,
            (false, true) => Self::IE,
            (true, false) => Self::EI,
            (true, true) => Self::EE,
        }
    }

    /// Post-synaptic response time constant and axonal latency, in
    /// seconds, for this kind
    pub fn time_constants(&self) -> (f64, f64) {
        match self {
            Self::II | Self::IE => (6e-3, 0.8e-3),
            Self::EI => (3e-3, 0.8e-3),
            Self::EE => (3e-3, 1.5e-3),
        }
    }

    /// Wire encoding used by the checkpoint record
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::II => 0,
            Self::IE => 1,
            Self::EI => 2,
            Self::EE => 3,
        }
    }
}

impl TryFrom<u8> for SynapseKind {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0 => Ok(Self::II),
            1 => Ok(Self::IE),
            2 => Ok(Self::EI),
            3 => Ok(Self::EE),
            other => Err(other),
        }
    }
}

/// Capability set every synapse family exposes to the step driver and
/// the checkpoint collaborator
pub trait SynapseModel {
    /// Allocate a zeroed store for `neuron_count * max_per_neuron` rows
    fn setup(neuron_count: usize, max_per_neuron: usize) -> Self
    where
        Self: Sized;

    /// Total row capacity (`N * maxPerNeuron`)
    fn capacity(&self) -> usize;

    /// Whether row `i_syn` holds a live synapse
    fn in_use(&self, i_syn: usize) -> bool;

    /// Source neuron of row `i_syn`
    fn source(&self, i_syn: usize) -> NeuronId;

    /// Destination neuron of row `i_syn`
    fn destination(&self, i_syn: usize) -> NeuronId;

    /// Synaptic weight of row `i_syn`
    fn weight(&self, i_syn: usize) -> f64;

    /// Initialize row `i_syn` with the family defaults
    fn create(
        &mut self,
        i_syn: usize,
        src: NeuronId,
        dst: NeuronId,
        dt: f64,
        kind: SynapseKind,
    ) -> Result<()>;

    /// Advance one synapse by one tick
    fn advance(&mut self, i_syn: usize, neurons: &NeuronPool, ctx: TickContext);

    /// Advance every live synapse by one tick
    fn advance_all(&mut self, neurons: &NeuronPool, ctx: TickContext) {
        for i_syn in 0..self.capacity() {
            if self.in_use(i_syn) {
                self.advance(i_syn, neurons, ctx);
            }
        }
    }

    /// Schedule a source-neuron spike for delivery on row `i_syn`
    fn pre_spike_hit(&mut self, i_syn: usize);

    /// Schedule a destination-neuron spike for back-propagation on row
    /// `i_syn`; ignored by families that do not allow it
    fn post_spike_hit(&mut self, i_syn: usize);

    /// Whether destination spikes back-propagate to this family
    fn allows_back_propagation(&self) -> bool;

    /// Append row `i_syn` to a checkpoint stream
    fn write_synapse<W: Write>(
        &self,
        output: &mut FieldWriter<W>,
        i_syn: usize,
    ) -> gridspike_storage::Result<()>;

    /// Restore row `i_syn` from a checkpoint stream
    fn read_synapse<R: BufRead>(
        &mut self,
        input: &mut FieldReader<R>,
        i_syn: usize,
    ) -> gridspike_storage::Result<()>;

    /// Stream every row to a checkpoint sink, attributing failures to
    /// the synapse record they occurred in
    fn write_all<W: Write>(&self, output: W) -> Result<W> {
        let mut writer = FieldWriter::new(output);
        for i_syn in 0..self.capacity() {
            self.write_synapse(&mut writer, i_syn)
                .map_err(|e| RuntimeError::checkpoint(i_syn, e))?;
        }
        Ok(writer.into_inner()?)
    }

    /// Restore every row from a checkpoint source, attributing
    /// failures to the synapse record they occurred in
    fn read_all<R: BufRead>(&mut self, input: R) -> Result<()> {
        let mut reader = FieldReader::new(input);
        for i_syn in 0..self.capacity() {
            self.read_synapse(&mut reader, i_syn)
                .map_err(|e| RuntimeError::checkpoint(i_syn, e))?;
        }
        Ok(())
    }
}

/// Structure-of-arrays store for the base spiking-synapse family
#[derive(Debug, Clone)]
pub struct SpikingSynapses {
    neuron_count: usize,
    max_per_neuron: usize,
    /// Occupied slots per destination neuron
    fill: Vec<usize>,

    pub(crate) src: Vec<NeuronId>,
    pub(crate) dst: Vec<NeuronId>,
    pub(crate) kind: Vec<SynapseKind>,
    pub(crate) in_use: Vec<bool>,
    pub(crate) w: Vec<f64>,
    pub(crate) psr: Vec<f64>,
    pub(crate) decay: Vec<f64>,
    pub(crate) tau: Vec<f64>,
    pub(crate) pre: Vec<DelayQueue>,
    /// Stable handle into the destination's summation vector
    pub(crate) sum_slot: Vec<usize>,
}

impl SpikingSynapses {
    /// Allocate a zeroed store for `neuron_count * max_per_neuron` rows
    pub fn setup(neuron_count: usize, max_per_neuron: usize) -> Self {
        let capacity = neuron_count * max_per_neuron;
        Self {
            neuron_count,
            max_per_neuron,
            fill: vec![0; neuron_count],
            src: vec![NeuronId::INVALID; capacity],
            dst: vec![NeuronId::INVALID; capacity],
            kind: vec![SynapseKind::EE; capacity],
            in_use: vec![false; capacity],
            w: vec![0.0; capacity],
            psr: vec![0.0; capacity],
            decay: vec![0.0; capacity],
            tau: vec![0.0; capacity],
            pre: vec![DelayQueue::default(); capacity],
            sum_slot: vec![0; capacity],
        }
    }

    /// Number of neurons the store was sized for
    pub fn neuron_count(&self) -> usize {
        self.neuron_count
    }

    /// Per-neuron synapse capacity
    pub fn max_per_neuron(&self) -> usize {
        self.max_per_neuron
    }

    /// Create a synapse in the next free slot of its destination
    /// neuron and return its index
    pub fn add_synapse(
        &mut self,
        src: NeuronId,
        dst: NeuronId,
        dt: f64,
        kind: SynapseKind,
    ) -> Result<usize> {
        let filled = self.fill[dst.index()];
        if filled >= self.max_per_neuron {
            return Err(RuntimeError::NoFreeSlot {
                neuron_id: dst.raw(),
                max_per_neuron: self.max_per_neuron,
            });
        }
        let i_syn = dst.index() * self.max_per_neuron + filled;
        self.create_row(i_syn, src, dst, dt, kind)?;
        self.fill[dst.index()] += 1;
        Ok(i_syn)
    }

    fn check_index(&self, i_syn: usize) -> Result<()> {
        let capacity = self.src.len();
        if i_syn >= capacity {
            return Err(RuntimeError::synapse_out_of_range(i_syn, capacity));
        }
        Ok(())
    }

    /// Initialize one row to the family defaults
    pub fn create_row(
        &mut self,
        i_syn: usize,
        src: NeuronId,
        dst: NeuronId,
        dt: f64,
        kind: SynapseKind,
    ) -> Result<()> {
        self.check_index(i_syn)?;
        if dt <= 0.0 {
            return Err(RuntimeError::invalid_parameter("dt", dt.to_string(), "> 0.0"));
        }
        if src.index() >= self.neuron_count {
            return Err(RuntimeError::NeuronNotFound { neuron_id: src.raw() });
        }
        if dst.index() >= self.neuron_count {
            return Err(RuntimeError::NeuronNotFound { neuron_id: dst.raw() });
        }

        let (tau, latency) = kind.time_constants();

        self.src[i_syn] = src;
        self.dst[i_syn] = dst;
        self.kind[i_syn] = kind;
        self.in_use[i_syn] = true;
        self.w[i_syn] = kind.sign() * DEFAULT_WEIGHT_MAGNITUDE;
        self.psr[i_syn] = 0.0;
        self.tau[i_syn] = tau;
        self.sum_slot[i_syn] = dst.index();
        self.update_decay(i_syn, dt);
        self.pre[i_syn].init((latency / dt) as u32 + 1);
        Ok(())
    }

    /// Recompute the per-step decay factor from `tau` and `dt`
    pub fn update_decay(&mut self, i_syn: usize, dt: f64) {
        let tau = self.tau[i_syn];
        assert!(tau > 0.0, "synapse {} has nonpositive tau", i_syn);
        self.decay[i_syn] = (-dt / tau).exp();
    }

    /// Reset time-varying state and recompute decay
    pub fn reset_synapse(&mut self, i_syn: usize, dt: f64) {
        self.psr[i_syn] = 0.0;
        self.update_decay(i_syn, dt);
    }

    /// Synaptic weight of row `i_syn`
    pub fn weight(&self, i_syn: usize) -> f64 {
        self.w[i_syn]
    }

    /// Overwrite the weight of row `i_syn` (topology collaborators own
    /// the growth model)
    pub fn set_weight(&mut self, i_syn: usize, weight: f64) {
        self.w[i_syn] = weight;
    }

    /// Post-synaptic response of row `i_syn`
    pub fn psr(&self, i_syn: usize) -> f64 {
        self.psr[i_syn]
    }

    /// Kind of row `i_syn`
    pub fn kind(&self, i_syn: usize) -> SynapseKind {
        self.kind[i_syn]
    }

    /// Configured pre-delay of row `i_syn`, in steps
    pub fn total_delay(&self, i_syn: usize) -> u32 {
        self.pre[i_syn].total_delay
    }

    /// Add the spike kick to the post-synaptic response
    pub fn change_psr(&mut self, i_syn: usize) {
        self.psr[i_syn] += self.w[i_syn] / self.decay[i_syn];
    }

    /// Reconfigure the pre-delay latency of row `i_syn`, resetting its
    /// pending spikes
    pub fn set_total_delay(&mut self, i_syn: usize, steps: u32) {
        self.pre[i_syn].init(steps);
    }

    /// Render every nonzero-weight row into `out`
    pub fn write_properties(&self, out: &mut impl std::fmt::Write) -> std::fmt::Result {
        for i_syn in 0..self.src.len() {
            if self.in_use[i_syn] && self.w[i_syn] != 0.0 {
                writeln!(
                    out,
                    "synapse[{}] src: {} dst: {} W: {} psr: {} decay: {} tau: {} totalDelay: {}",
                    i_syn,
                    self.src[i_syn],
                    self.dst[i_syn],
                    self.w[i_syn],
                    self.psr[i_syn],
                    self.decay[i_syn],
                    self.tau[i_syn],
                    self.pre[i_syn].total_delay,
                )?;
            }
        }
        Ok(())
    }

    /// Log the nonzero-weight rows at debug level
    pub fn print_properties(&self) {
        let mut dump = String::new();
        if self.write_properties(&mut dump).is_ok() && !dump.is_empty() {
            log::debug!("spiking synapse properties:\n{}", dump);
        }
    }
}

/// Advance one base-family row by one tick: drain the pre-delay line,
/// kick the post-synaptic response on delivery, decay it, and
/// accumulate into the destination's summation point.
pub(crate) fn advance_spiking_row(
    w: f64,
    psr: &mut f64,
    pre: &mut DelayQueue,
    decay: f64,
    sum_slot: usize,
    summation: &SummationPoints,
) {
    if pre.tick() {
        *psr += w / decay;
    }
    *psr *= decay;
    summation.add(sum_slot, *psr);
}

impl SynapseModel for SpikingSynapses {
    fn setup(neuron_count: usize, max_per_neuron: usize) -> Self {
        SpikingSynapses::setup(neuron_count, max_per_neuron)
    }

    fn capacity(&self) -> usize {
        self.src.len()
    }

    fn in_use(&self, i_syn: usize) -> bool {
        self.in_use[i_syn]
    }

    fn source(&self, i_syn: usize) -> NeuronId {
        self.src[i_syn]
    }

    fn destination(&self, i_syn: usize) -> NeuronId {
        self.dst[i_syn]
    }

    fn weight(&self, i_syn: usize) -> f64 {
        self.w[i_syn]
    }

    fn create(
        &mut self,
        i_syn: usize,
        src: NeuronId,
        dst: NeuronId,
        dt: f64,
        kind: SynapseKind,
    ) -> Result<()> {
        self.create_row(i_syn, src, dst, dt, kind)
    }

    fn advance(&mut self, i_syn: usize, neurons: &NeuronPool, _ctx: TickContext) {
        advance_spiking_row(
            self.w[i_syn],
            &mut self.psr[i_syn],
            &mut self.pre[i_syn],
            self.decay[i_syn],
            self.sum_slot[i_syn],
            neurons.summation(),
        );
    }

    fn pre_spike_hit(&mut self, i_syn: usize) {
        self.pre[i_syn].schedule();
    }

    fn post_spike_hit(&mut self, _i_syn: usize) {
        // The base family carries no back-propagation line.
    }

    fn allows_back_propagation(&self) -> bool {
        false
    }

    fn write_synapse<W: Write>(
        &self,
        output: &mut FieldWriter<W>,
        i_syn: usize,
    ) -> gridspike_storage::Result<()> {
        output.field(self.src[i_syn].raw())?;
        output.field(self.dst[i_syn].raw())?;
        output.field(self.w[i_syn])?;
        output.field(self.kind[i_syn].as_u8())?;
        output.field(self.psr[i_syn])?;
        output.field(self.in_use[i_syn] as u8)?;
        output.field(self.decay[i_syn])?;
        output.field(self.tau[i_syn])?;
        output.field(self.pre[i_syn].total_delay)?;
        output.field(self.pre[i_syn].bits)?;
        output.field(self.pre[i_syn].head)?;
        output.field(self.pre[i_syn].len)?;
        Ok(())
    }

    fn read_synapse<R: BufRead>(
        &mut self,
        input: &mut FieldReader<R>,
        i_syn: usize,
    ) -> gridspike_storage::Result<()> {
        self.src[i_syn] = NeuronId::new(input.field("src")?);
        self.dst[i_syn] = NeuronId::new(input.field("dst")?);
        self.w[i_syn] = input.field("W")?;

        let kind_position = input.position();
        let raw_kind: u8 = input.field("type")?;
        self.kind[i_syn] = SynapseKind::try_from(raw_kind)
            .map_err(|v| StorageError::invalid_value("type", kind_position, v.to_string()))?;

        self.psr[i_syn] = input.field("psr")?;
        self.in_use[i_syn] = input.bool_field("inUse")?;
        self.decay[i_syn] = input.field("decay")?;
        self.tau[i_syn] = input.field("tau")?;
        self.pre[i_syn].total_delay = input.field("totalDelay")?;
        self.pre[i_syn].bits = input.field("queue")?;
        self.pre[i_syn].head = input.field("idx")?;
        self.pre[i_syn].len = input.field("length")?;
        self.sum_slot[i_syn] = self.dst[i_syn].index();
        Ok(())
    }
}

/// Outgoing/incoming synapse lists per neuron, rebuilt whenever the
/// topology changes; the driver's notification layer walks these
#[derive(Debug, Default)]
pub struct SynapseIndexMap {
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl SynapseIndexMap {
    /// Build the map from the live rows of a store
    pub fn build<S: SynapseModel>(synapses: &S, neuron_count: usize) -> Self {
        let mut outgoing = vec![Vec::new(); neuron_count];
        let mut incoming = vec![Vec::new(); neuron_count];
        for i_syn in 0..synapses.capacity() {
            if synapses.in_use(i_syn) {
                outgoing[synapses.source(i_syn).index()].push(i_syn);
                incoming[synapses.destination(i_syn).index()].push(i_syn);
            }
        }
        Self { outgoing, incoming }
    }

    /// Synapses whose source is `neuron`
    pub fn outgoing(&self, neuron: NeuronId) -> &[usize] {
        &self.outgoing[neuron.index()]
    }

    /// Synapses whose destination is `neuron`
    pub fn incoming(&self, neuron: NeuronId) -> &[usize] {
        &self.incoming[neuron.index()]
    }
}
