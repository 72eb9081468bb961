//! Property tests for the delay-line and weight-bound invariants

use gridspike_runtime::{stdp_learning, DelayQueue, StdpParams, SynapseKind};
use proptest::prelude::*;

proptest! {
    /// A scheduled spike is consumed by exactly one tick, exactly
    /// `total_delay` steps later, wherever the head happens to be.
    #[test]
    fn delay_line_delivers_exactly_once(delay in 0u32..32, lead in 0usize..100) {
        let mut queue = DelayQueue::new(delay);
        for _ in 0..lead {
            prop_assert!(!queue.tick());
        }

        queue.schedule();
        for _ in 0..delay {
            prop_assert!(!queue.tick());
        }
        prop_assert!(queue.tick());
        for _ in 0..64 {
            prop_assert!(!queue.tick());
        }
        prop_assert!(queue.is_empty());
    }

    /// The weight magnitude never escapes the `[0, Wex]` envelope, no
    /// matter what pairing intervals arrive.
    #[test]
    fn weight_magnitude_stays_bounded(
        w0 in 0.0f64..5.0265e-7,
        deltas in prop::collection::vec(-0.1f64..0.1, 0..40),
    ) {
        let params = StdpParams::default();
        let mut w = w0;
        for delta in deltas {
            stdp_learning(&mut w, SynapseKind::EE, &params, delta, 1.0, 1.0);
            prop_assert!(w >= 0.0);
            prop_assert!(w <= params.w_max);
        }
    }

    /// A silenced synapse stays silenced: once the weight is zero, no
    /// pairing sequence revives it.
    #[test]
    fn zero_weight_is_absorbing(
        deltas in prop::collection::vec(-0.1f64..0.1, 0..40),
        mu in 0.0f64..2.0,
    ) {
        let params = StdpParams {
            mu_pos: mu,
            mu_neg: mu,
            ..StdpParams::default()
        };
        let mut w = 0.0;
        for delta in deltas {
            stdp_learning(&mut w, SynapseKind::EE, &params, delta, 1.0, 1.0);
            prop_assert_eq!(w, 0.0);
        }
    }
}
