//! STDP synapse family
//!
//! Extends the spiking-synapse store with pair-based spike-timing-
//! dependent plasticity: a second delay line back-propagates
//! destination spikes to the synapse, and every delivered spike pair
//! within the learning window multiplies the weight by a scale derived
//! from the signed pre/post interval. The rule and its default
//! constants follow Froemke and Dan, "Spike-timing-dependent synaptic
//! modification induced by natural spike trains", Nature 416 (2002),
//! with the inter-spike-interval efficacy modulation optional per
//! synapse.

use crate::{
    delay::DelayQueue,
    error::Result,
    neuron::NeuronPool,
    simulation::TickContext,
    summation::SummationPoints,
    synapse::{advance_spiking_row, SpikingSynapses, SynapseKind, SynapseModel},
};
use gridspike_storage::{FieldReader, FieldWriter, NeuronId, NO_SPIKE};
use std::io::{BufRead, Write};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Per-synapse parameters of the STDP rule
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StdpParams {
    /// Potentiation amplitude
    pub a_pos: f64,
    /// Depression amplitude (negative)
    pub a_neg: f64,
    /// Potentiation time constant (s)
    pub tau_pos: f64,
    /// Depression time constant (s)
    pub tau_neg: f64,
    /// Weight-dependence exponent for potentiation
    pub mu_pos: f64,
    /// Weight-dependence exponent for depression
    pub mu_neg: f64,
    /// Maximum weight magnitude and soft-bound reference
    pub w_max: f64,
    /// Dead zone around coincident pairs (s)
    pub stdp_gap: f64,
    /// Pre-side efficacy time constant (s)
    pub tau_s_pre: f64,
    /// Post-side efficacy time constant (s)
    pub tau_s_post: f64,
    /// Enable the Froemke-Dan inter-spike-interval efficacy modulation
    pub use_froemke_dan: bool,
}

impl Default for StdpParams {
    fn default() -> Self {
        // Constants from Froemke and Dan (2002)
        Self {
            a_pos: 1.01,
            a_neg: -0.52,
            tau_pos: 14.8e-3,
            tau_neg: 33.8e-3,
            mu_pos: 0.0,
            mu_neg: 0.0,
            w_max: 5.0265e-7,
            stdp_gap: 2e-3,
            tau_s_pre: 34e-3,
            tau_s_post: 75e-3,
            use_froemke_dan: false,
        }
    }
}

impl StdpParams {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        use crate::error::RuntimeError;
        if self.w_max <= 0.0 {
            return Err(RuntimeError::invalid_parameter(
                "w_max",
                self.w_max.to_string(),
                "> 0.0",
            ));
        }
        for (name, value) in [
            ("tau_pos", self.tau_pos),
            ("tau_neg", self.tau_neg),
            ("tau_s_pre", self.tau_s_pre),
            ("tau_s_post", self.tau_s_post),
        ] {
            if value <= 0.0 {
                return Err(RuntimeError::invalid_parameter(
                    name,
                    value.to_string(),
                    "> 0.0",
                ));
            }
        }
        for (name, value) in [
            ("stdp_gap", self.stdp_gap),
            ("mu_pos", self.mu_pos),
            ("mu_neg", self.mu_neg),
        ] {
            if value < 0.0 {
                return Err(RuntimeError::invalid_parameter(
                    name,
                    value.to_string(),
                    ">= 0.0",
                ));
            }
        }
        Ok(())
    }
}

/// Apply the pair-based weight update for one spike pair.
///
/// `delta` is the signed pre/post interval in seconds (negative when
/// the destination fired first), `epost`/`epre` the Froemke-Dan
/// efficacies (1.0 when disabled). Depression normalizes by the
/// current magnitude fraction `|W|/Wex`, potentiation by the headroom
/// fraction `(Wex - |W|)/Wex`; the asymmetry is the soft bound.
pub fn stdp_learning(
    w: &mut f64,
    kind: SynapseKind,
    params: &StdpParams,
    delta: f64,
    epost: f64,
    epre: f64,
) {
    let dw = if delta < -params.stdp_gap {
        // depression
        (w.abs() / params.w_max).powf(params.mu_neg)
            * params.a_neg
            * (delta / params.tau_neg).exp()
    } else if delta > params.stdp_gap {
        // potentiation
        ((params.w_max - w.abs()).abs() / params.w_max).powf(params.mu_pos)
            * params.a_pos
            * (-delta / params.tau_pos).exp()
    } else {
        return;
    };

    // dw is the fractional strength change; shift by one to get the
    // scaling ratio, floored at zero so a crushed synapse stays dead
    let mut scale = 1.0 + dw * epre * epost;
    if scale < 0.0 {
        scale = 0.0;
    }
    *w *= scale;

    if w.abs() > params.w_max {
        *w = kind.sign() * params.w_max;
    }
}

/// Advance one STDP row by one tick: drain both delay lines, walk the
/// paired spike histories for every delivered spike, then decay the
/// post-synaptic response and accumulate it.
#[allow(clippy::too_many_arguments)]
fn advance_stdp_row(
    w: &mut f64,
    psr: &mut f64,
    pre: &mut DelayQueue,
    post: &mut DelayQueue,
    params: &StdpParams,
    decay: f64,
    kind: SynapseKind,
    src: NeuronId,
    dst: NeuronId,
    sum_slot: usize,
    neurons: &NeuronPool,
    summation: &SummationPoints,
    ctx: TickContext,
) {
    // Inhibitory or dead rows never learn; only the inherited spiking
    // advance runs.
    if *w <= 0.0 {
        advance_spiking_row(*w, psr, pre, decay, sum_slot, summation);
        return;
    }

    let f_pre = pre.tick();
    let f_post = post.tick();

    if f_pre || f_post {
        let total_delay = u64::from(pre.total_delay);

        if f_pre {
            // The source's spike has arrived across the synapse.
            let epre = if params.use_froemke_dan {
                let prior = neurons.history_at(src, -2);
                if prior != NO_SPIKE {
                    1.0 - (-(((ctx.step - prior) as f64) * ctx.dt) / params.tau_s_pre).exp()
                } else {
                    1.0
                }
            } else {
                1.0
            };

            // Pair it against destination spikes, newest first; every
            // entry here fired before the arrival, so the interval is
            // negative and the update is in the depression regime.
            let mut offset = -1i64;
            loop {
                let spike = neurons.history_at(dst, offset);
                if spike == NO_SPIKE {
                    break;
                }
                let delta = -(((ctx.step - spike) as f64) * ctx.dt);
                if delta <= -3.0 * params.tau_neg {
                    break;
                }
                let epost = if params.use_froemke_dan {
                    let prior = neurons.history_at(dst, offset - 1);
                    if prior == NO_SPIKE {
                        break;
                    }
                    1.0 - (-(((spike - prior) as f64) * ctx.dt) / params.tau_s_post).exp()
                } else {
                    1.0
                };
                stdp_learning(w, kind, params, delta, epost, epre);
                offset -= 1;
            }

            *psr += *w / decay;
        }

        if f_post {
            // The destination's spike back-propagated to the synapse.
            let epost = if params.use_froemke_dan {
                let prior = neurons.history_at(dst, -2);
                if prior != NO_SPIKE {
                    1.0 - (-(((ctx.step - prior) as f64) * ctx.dt) / params.tau_s_post).exp()
                } else {
                    1.0
                }
            } else {
                1.0
            };

            // Pair it against source spikes whose transmission has
            // completed. Entries still in flight appear first (newest
            // first, constant delay), so they are skipped, not a stop
            // condition.
            let mut offset = -1i64;
            loop {
                let spike = neurons.history_at(src, offset);
                if spike == NO_SPIKE {
                    break;
                }
                if spike + total_delay > ctx.step {
                    offset -= 1;
                    continue;
                }
                let delta = ((ctx.step - spike - total_delay) as f64) * ctx.dt;
                if delta >= 3.0 * params.tau_pos {
                    break;
                }
                let epre = if params.use_froemke_dan {
                    let prior = neurons.history_at(src, offset - 1);
                    if prior == NO_SPIKE {
                        break;
                    }
                    1.0 - (-(((spike - prior) as f64) * ctx.dt) / params.tau_s_pre).exp()
                } else {
                    1.0
                };
                stdp_learning(w, kind, params, delta, epost, epre);
                offset -= 1;
            }
        }
    }

    *psr *= decay;
    summation.add(sum_slot, *psr);
}

/// Structure-of-arrays store for the STDP synapse family, composed
/// over the base spiking store
#[derive(Debug, Clone)]
pub struct StdpSynapses {
    base: SpikingSynapses,
    /// Back-propagation delay line per synapse
    post: Vec<DelayQueue>,
    /// Learning-rule parameters per synapse
    params: Vec<StdpParams>,
}

impl StdpSynapses {
    /// Allocate a zeroed store for `neuron_count * max_per_neuron` rows
    pub fn setup(neuron_count: usize, max_per_neuron: usize) -> Self {
        let capacity = neuron_count * max_per_neuron;
        Self {
            base: SpikingSynapses::setup(neuron_count, max_per_neuron),
            post: vec![DelayQueue::default(); capacity],
            params: vec![StdpParams::default(); capacity],
        }
    }

    /// The composed base spiking store
    pub fn base(&self) -> &SpikingSynapses {
        &self.base
    }

    /// Mutable access to the composed base spiking store
    pub fn base_mut(&mut self) -> &mut SpikingSynapses {
        &mut self.base
    }

    /// Learning parameters of row `i_syn`
    pub fn params(&self, i_syn: usize) -> &StdpParams {
        &self.params[i_syn]
    }

    /// Mutable learning parameters of row `i_syn`
    pub fn params_mut(&mut self, i_syn: usize) -> &mut StdpParams {
        &mut self.params[i_syn]
    }

    /// Configured back-propagation delay of row `i_syn`, in steps
    pub fn total_delay_post(&self, i_syn: usize) -> u32 {
        self.post[i_syn].total_delay
    }

    /// Reconfigure the back-propagation latency of row `i_syn`,
    /// resetting its pending spikes
    pub fn set_total_delay_post(&mut self, i_syn: usize, steps: u32) {
        self.post[i_syn].init(steps);
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
        let i_syn = self.base.add_synapse(src, dst, dt, kind)?;
        self.init_stdp_row(i_syn);
        Ok(i_syn)
    }

    fn init_stdp_row(&mut self, i_syn: usize) {
        self.post[i_syn].init(0);
        self.params[i_syn] = StdpParams::default();
    }

    /// Render every nonzero-weight row, with its learning parameters,
    /// into `out`
    pub fn write_properties(&self, out: &mut impl std::fmt::Write) -> std::fmt::Result {
        self.base.write_properties(out)?;
        for i_syn in 0..self.capacity() {
            if self.base.in_use[i_syn] && self.base.w[i_syn] != 0.0 {
                let p = &self.params[i_syn];
                writeln!(
                    out,
                    "stdp[{}] totalDelayPost: {} tauspost: {} tauspre: {} taupos: {} tauneg: {} \
                     STDPgap: {} Wex: {} Aneg: {} Apos: {} mupos: {} muneg: {} useFroemkeDanSTDP: {}",
                    i_syn,
                    self.post[i_syn].total_delay,
                    p.tau_s_post,
                    p.tau_s_pre,
                    p.tau_pos,
                    p.tau_neg,
                    p.stdp_gap,
                    p.w_max,
                    p.a_neg,
                    p.a_pos,
                    p.mu_pos,
                    p.mu_neg,
                    p.use_froemke_dan as u8,
                )?;
            }
        }
        Ok(())
    }

    /// Log the nonzero-weight rows at debug level
    pub fn print_properties(&self) {
        let mut dump = String::new();
        if self.write_properties(&mut dump).is_ok() && !dump.is_empty() {
            log::debug!("stdp synapse properties:\n{}", dump);
        }
    }
}

impl SynapseModel for StdpSynapses {
    fn setup(neuron_count: usize, max_per_neuron: usize) -> Self {
        StdpSynapses::setup(neuron_count, max_per_neuron)
    }

    fn capacity(&self) -> usize {
        self.base.capacity()
    }

    fn in_use(&self, i_syn: usize) -> bool {
        self.base.in_use(i_syn)
    }

    fn source(&self, i_syn: usize) -> NeuronId {
        self.base.source(i_syn)
    }

    fn destination(&self, i_syn: usize) -> NeuronId {
        self.base.destination(i_syn)
    }

    fn weight(&self, i_syn: usize) -> f64 {
        self.base.weight(i_syn)
    }

    fn create(
        &mut self,
        i_syn: usize,
        src: NeuronId,
        dst: NeuronId,
        dt: f64,
        kind: SynapseKind,
    ) -> Result<()> {
        self.base.create_row(i_syn, src, dst, dt, kind)?;
        self.init_stdp_row(i_syn);
        Ok(())
    }

    fn advance(&mut self, i_syn: usize, neurons: &NeuronPool, ctx: TickContext) {
        let base = &mut self.base;
        advance_stdp_row(
            &mut base.w[i_syn],
            &mut base.psr[i_syn],
            &mut base.pre[i_syn],
            &mut self.post[i_syn],
            &self.params[i_syn],
            base.decay[i_syn],
            base.kind[i_syn],
            base.src[i_syn],
            base.dst[i_syn],
            base.sum_slot[i_syn],
            neurons,
            neurons.summation(),
            ctx,
        );
    }

    #[cfg(feature = "parallel")]
    fn advance_all(&mut self, neurons: &NeuronPool, ctx: TickContext) {
        let summation = neurons.summation();
        let base = &mut self.base;
        let params = &self.params;
        let in_use = &base.in_use;
        let decay = &base.decay;
        let kind = &base.kind;
        let src = &base.src;
        let dst = &base.dst;
        let sum_slot = &base.sum_slot;

        (
            base.w.par_iter_mut(),
            base.psr.par_iter_mut(),
            base.pre.par_iter_mut(),
            self.post.par_iter_mut(),
        )
            .into_par_iter()
            .enumerate()
            .for_each(|(i_syn, (w, psr, pre, post))| {
                if !in_use[i_syn] {
                    return;
                }
                advance_stdp_row(
                    w,
                    psr,
                    pre,
                    post,
                    &params[i_syn],
                    decay[i_syn],
                    kind[i_syn],
                    src[i_syn],
                    dst[i_syn],
                    sum_slot[i_syn],
                    neurons,
                    summation,
                    ctx,
                );
            });
    }

    fn pre_spike_hit(&mut self, i_syn: usize) {
        self.base.pre_spike_hit(i_syn);
    }

    fn post_spike_hit(&mut self, i_syn: usize) {
        self.post[i_syn].schedule();
    }

    fn allows_back_propagation(&self) -> bool {
        true
    }

    fn write_synapse<W: Write>(
        &self,
        output: &mut FieldWriter<W>,
        i_syn: usize,
    ) -> gridspike_storage::Result<()> {
        self.base.write_synapse(output, i_syn)?;

        let p = &self.params[i_syn];
        output.field(self.post[i_syn].total_delay)?;
        output.field(self.post[i_syn].bits)?;
        output.field(self.post[i_syn].head)?;
        output.field(self.post[i_syn].len)?;
        output.field(p.tau_s_post)?;
        output.field(p.tau_s_pre)?;
        output.field(p.tau_pos)?;
        output.field(p.tau_neg)?;
        output.field(p.stdp_gap)?;
        output.field(p.w_max)?;
        output.field(p.a_neg)?;
        output.field(p.a_pos)?;
        output.field(p.mu_pos)?;
        output.field(p.mu_neg)?;
        output.field(p.use_froemke_dan as u8)?;
        Ok(())
    }

    fn read_synapse<R: BufRead>(
        &mut self,
        input: &mut FieldReader<R>,
        i_syn: usize,
    ) -> gridspike_storage::Result<()> {
        self.base.read_synapse(input, i_syn)?;

        self.post[i_syn].total_delay = input.field("totalDelayPost")?;
        self.post[i_syn].bits = input.field("queuePost")?;
        self.post[i_syn].head = input.field("idxPost")?;
        self.post[i_syn].len = input.field("lengthPost")?;

        let p = &mut self.params[i_syn];
        p.tau_s_post = input.field("tauspost")?;
        p.tau_s_pre = input.field("tauspre")?;
        p.tau_pos = input.field("taupos")?;
        p.tau_neg = input.field("tauneg")?;
        p.stdp_gap = input.field("STDPgap")?;
        p.w_max = input.field("Wex")?;
        p.a_neg = input.field("Aneg")?;
        p.a_pos = input.field("Apos")?;
        p.mu_pos = input.field("mupos")?;
        p.mu_neg = input.field("muneg")?;
        p.use_froemke_dan = input.bool_field("useFroemkeDanSTDP")?;
        Ok(())
    }
}
