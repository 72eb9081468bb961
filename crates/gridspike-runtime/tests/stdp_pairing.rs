//! End-to-end pairing scenarios through the public driver API

use gridspike_runtime::{
    NeuronId, NeuronParams, NeuronPool, RuntimeError, SimulationParams, StdpParams, StdpSynapses,
    StepDriver, Stimulus, SynapseKind, SynapseModel,
};

const DT: f64 = 1e-4;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pool(count: usize) -> NeuronPool {
    NeuronPool::new(count, NeuronParams::default(), 256).unwrap()
}

/// Current strong enough to cross the default threshold in one step
fn fire_at(neuron: u32, steps: Vec<u64>) -> Stimulus {
    Stimulus::SpikeTrain {
        neuron: NeuronId::new(neuron),
        amplitude: 200.0,
        steps,
    }
}

fn scenario_params() -> StdpParams {
    StdpParams {
        tau_pos: 20e-3,
        tau_neg: 20e-3,
        w_max: 5e-7,
        ..StdpParams::default()
    }
}

#[test]
fn depression_when_destination_fires_before_arrival() {
    init_logs();
    let mut store = StdpSynapses::setup(2, 1);
    let i_syn = store
        .add_synapse(NeuronId::new(0), NeuronId::new(1), DT, SynapseKind::EE)
        .unwrap();
    store.base_mut().set_weight(i_syn, 2.5e-7);
    *store.params_mut(i_syn) = scenario_params();

    // Destination fires at 50. The source fires at 84; with the
    // 16-step EE delay its spike arrives at step 100, pairing at
    // delta = -(100 - 50) * dt = -5ms.
    let mut driver = StepDriver::new(pool(2), store, SimulationParams::new(DT, 150).unwrap())
        .unwrap();
    driver.add_stimulus(fire_at(1, vec![50]));
    driver.add_stimulus(fire_at(0, vec![84]));

    let result = driver.run().unwrap();
    let (src, dst, w) = result.final_weights[0];
    assert_eq!((src, dst), (NeuronId::new(0), NeuronId::new(1)));

    let expected = 2.5e-7 * (1.0 + (-0.52) * (-5e-3f64 / 20e-3).exp());
    assert!(
        (w - expected).abs() < expected * 1e-9,
        "weight {} expected {}",
        w,
        expected
    );
}

#[test]
fn potentiation_when_source_leads_destination() {
    let mut store = StdpSynapses::setup(2, 1);
    let i_syn = store
        .add_synapse(NeuronId::new(0), NeuronId::new(1), DT, SynapseKind::EE)
        .unwrap();
    store.base_mut().set_weight(i_syn, 2.5e-7);
    *store.params_mut(i_syn) = scenario_params();

    // Source fires at 34, arriving at 50; destination fires at 100.
    // The back-propagated pairing interval is
    // (100 - 34 - 16) * dt = +5ms.
    let mut driver = StepDriver::new(pool(2), store, SimulationParams::new(DT, 150).unwrap())
        .unwrap();
    driver.add_stimulus(fire_at(0, vec![34]));
    driver.add_stimulus(fire_at(1, vec![100]));

    let result = driver.run().unwrap();
    let (_, _, w) = result.final_weights[0];

    let expected = 2.5e-7 * (1.0 + 1.01 * (-5e-3f64 / 20e-3).exp());
    assert!(
        (w - expected).abs() < expected * 1e-9,
        "weight {} expected {}",
        w,
        expected
    );
}

#[test]
fn quiet_network_leaves_weights_untouched() {
    let mut store = StdpSynapses::setup(3, 2);
    let mut expected = Vec::new();
    for (src, dst) in [(0u32, 1u32), (1, 2), (0, 2)] {
        let i_syn = store
            .add_synapse(NeuronId::new(src), NeuronId::new(dst), DT, SynapseKind::EE)
            .unwrap();
        expected.push(store.base().weight(i_syn));
    }

    let mut driver = StepDriver::new(pool(3), store, SimulationParams::new(DT, 500).unwrap())
        .unwrap();
    let result = driver.run().unwrap();

    assert!(result.spikes.is_empty());
    let weights: Vec<f64> = result.final_weights.iter().map(|&(_, _, w)| w).collect();
    assert_eq!(weights.len(), expected.len());
    for (w, e) in weights.iter().zip(&expected) {
        assert_eq!(w, e);
    }
}

#[test]
fn checkpoint_roundtrips_the_whole_store() {
    let mut store = StdpSynapses::setup(2, 1);
    let a = store
        .add_synapse(NeuronId::new(0), NeuronId::new(0), DT, SynapseKind::IE)
        .unwrap();
    let b = store
        .add_synapse(NeuronId::new(0), NeuronId::new(1), DT, SynapseKind::EE)
        .unwrap();
    store.base_mut().set_weight(b, 3.3e-7);
    store.set_total_delay_post(b, 4);
    store.params_mut(b).use_froemke_dan = true;
    store.pre_spike_hit(b);
    store.post_spike_hit(b);

    let bytes = store.write_all(Vec::new()).unwrap();

    let mut restored = StdpSynapses::setup(2, 1);
    restored.read_all(bytes.as_slice()).unwrap();

    for i_syn in [a, b] {
        assert_eq!(restored.in_use(i_syn), store.in_use(i_syn));
        assert_eq!(restored.source(i_syn), store.source(i_syn));
        assert_eq!(restored.destination(i_syn), store.destination(i_syn));
        assert_eq!(restored.base().weight(i_syn), store.base().weight(i_syn));
        assert_eq!(restored.params(i_syn), store.params(i_syn));
        assert_eq!(restored.total_delay_post(i_syn), store.total_delay_post(i_syn));
    }

    // Writing the restored store reproduces the stream byte for byte.
    let again = restored.write_all(Vec::new()).unwrap();
    assert_eq!(again, bytes);
}

#[test]
fn checkpoint_survives_a_file_roundtrip() {
    use std::fs::File;
    use std::io::{BufReader, Write};

    let mut store = StdpSynapses::setup(2, 2);
    for (src, dst) in [(0u32, 1u32), (1, 0)] {
        let i_syn = store
            .add_synapse(NeuronId::new(src), NeuronId::new(dst), DT, SynapseKind::EE)
            .unwrap();
        store.params_mut(i_syn).mu_pos = 0.5;
    }

    let bytes = store.write_all(Vec::new()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("synapses.ckpt");
    File::create(&path).unwrap().write_all(&bytes).unwrap();

    let mut restored = StdpSynapses::setup(2, 2);
    restored
        .read_all(BufReader::new(File::open(&path).unwrap()))
        .unwrap();

    for i_syn in 0..store.capacity() {
        assert_eq!(restored.in_use(i_syn), store.in_use(i_syn));
        assert_eq!(restored.params(i_syn), store.params(i_syn));
    }
}

#[test]
fn checkpoint_failure_names_the_synapse() {
    let mut store = StdpSynapses::setup(2, 1);
    store
        .add_synapse(NeuronId::new(0), NeuronId::new(0), DT, SynapseKind::EE)
        .unwrap();
    store
        .add_synapse(NeuronId::new(1), NeuronId::new(1), DT, SynapseKind::EE)
        .unwrap();

    let bytes = store.write_all(Vec::new()).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    // Keep record 0 (27 fields) and three fields of record 1.
    let truncated: String = text.lines().take(30).map(|l| format!("{}\n", l)).collect();

    let mut restored = StdpSynapses::setup(2, 1);
    let err = restored.read_all(truncated.as_bytes()).unwrap_err();
    match err {
        RuntimeError::Checkpoint { synapse, source } => {
            assert_eq!(synapse, 1);
            let msg = source.to_string();
            assert!(msg.contains("position 31"), "unexpected source: {}", msg);
        }
        other => panic!("unexpected error: {}", other),
    }
}
