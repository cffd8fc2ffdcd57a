use crate::comp::sigmoid;
use crate::netz::bitmap::{bitmap_from_bytes, Bitmap, BASE_CIRCLE};
use crate::netz::data::NetzwerkData;
use crate::sim::config::{Fp, NetzpConfig, INPUT_COUNT};
use crate::sim::top::NetzpTop;
use crate::unit_tests::fixtures::{forward_reference, network, neuron, run_top};

fn lone_pixel_bitmap() -> Bitmap {
    let mut bitmap = [false; INPUT_COUNT];
    bitmap[0] = true;
    bitmap
}

/// Three layers with distinct weights per neuron: 3 -> 2 -> 2.
fn three_layer_network() -> NetzwerkData {
    let spread = |scale: Fp| -> Vec<Fp> {
        (0..INPUT_COUNT)
            .map(|i| scale * (1.0 - (i as Fp) * 0.03))
            .collect()
    };
    network(vec![
        neuron(0, 0, spread(0.5)),
        neuron(0, 1, spread(-0.25)),
        neuron(0, 2, spread(0.125)),
        neuron(1, 0, vec![1.0, -0.5, 0.25]),
        neuron(1, 1, vec![-0.75, 0.5, 1.5]),
        neuron(2, 0, vec![2.0, -1.0]),
        neuron(2, 1, vec![-0.5, 0.5]),
    ])
}

#[test]
fn single_neuron_with_zero_weights_scores_one_half() {
    let netz = network(vec![neuron(0, 0, vec![0.0; INPUT_COUNT])]);
    let outputs = run_top(1, &bitmap_from_bytes(&BASE_CIRCLE), &netz);
    assert_eq!(outputs.len(), 1);
    assert!((outputs[0] - 0.5).abs() < 1e-6, "{}", outputs[0]);
}

#[test]
fn two_layer_sigma_chain_matches_the_closed_form() {
    // Layer 0 settles at sigma(2) and sigma(-2); layer 1 sums them with
    // unit weights, so the final score is sigma(1.0).
    let mut strong = vec![0.0; INPUT_COUNT];
    strong[0] = 2.0;
    let mut weak = vec![0.0; INPUT_COUNT];
    weak[0] = -2.0;

    let netz = network(vec![
        neuron(0, 0, strong),
        neuron(0, 1, weak),
        neuron(1, 0, vec![1.0, 1.0]),
    ]);
    let outputs = run_top(2, &lone_pixel_bitmap(), &netz);

    assert_eq!(outputs.len(), 1);
    let expected = sigmoid(sigmoid(2.0) + sigmoid(-2.0));
    assert!((outputs[0] - 0.731_058).abs() < 1e-5, "{}", outputs[0]);
    assert!((outputs[0] - expected).abs() < 1e-6);
}

#[test]
fn multilayer_network_matches_the_software_reference() {
    let netz = three_layer_network();
    let bitmap = bitmap_from_bytes(&BASE_CIRCLE);

    let outputs = run_top(2, &bitmap, &netz);
    let reference = forward_reference(&bitmap, &netz);

    // The last layer has two neurons, so the output block does too.
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs.len(), reference.len());
    for (got, want) in outputs.iter().zip(&reference) {
        assert!((got - want).abs() < 1e-5, "{got} vs {want}");
    }
}

#[test]
fn core_count_does_not_change_the_results() {
    let netz = three_layer_network();
    let bitmap = bitmap_from_bytes(&BASE_CIRCLE);

    let serial = run_top(1, &bitmap, &netz);
    let parallel = run_top(4, &bitmap, &netz);
    // Same arithmetic in the same per-neuron order: bit-identical.
    assert_eq!(serial, parallel);
}

#[test]
fn empty_network_produces_an_empty_output_block() {
    let outputs = run_top(2, &bitmap_from_bytes(&BASE_CIRCLE), &network(Vec::new()));
    assert!(outputs.is_empty());
}

#[test]
fn reset_mid_inference_recovers_cleanly() {
    let netz = three_layer_network();
    let bitmap = bitmap_from_bytes(&BASE_CIRCLE);
    let config = NetzpConfig {
        core_count: 2,
        timeout: 100_000,
        ..NetzpConfig::default()
    };
    let mut top = NetzpTop::new(&config);

    let expected = top.run_inference(&bitmap, &netz).expect("undisturbed run");
    assert!(top.cdu.read().expect("lock poisoned").is_finished());

    // Second run, interrupted mid-dispatch.
    top.reset();
    top.load(&bitmap, &netz);
    let finished_writing = top.finished_writing.clone();
    top.run_until_high(&finished_writing, "problem writeback")
        .expect("writeback");
    top.start.write(true);
    top.sched.run(40);
    assert!(!top.finished.read(), "dispatch should still be in flight");

    top.reset();
    assert!(!top.finished.read());
    {
        let cdu = top.cdu.read().expect("lock poisoned");
        assert!(!cdu.is_finished());
        assert!(cdu.committed_outputs().is_empty());
    }

    let again = top.run_inference(&bitmap, &netz).expect("rerun after reset");
    assert_eq!(again, expected);
}
