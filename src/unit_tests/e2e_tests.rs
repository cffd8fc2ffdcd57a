use crate::netz::bitmap::{argmax, bitmap_from_bytes, BASE_CIRCLE, BASE_SQUARE, BASE_TRIANGLE};
use crate::netz::data::{decode_fp_le, NetzwerkData};
use crate::netz::dump::{format_network_dump, parse_network_dump};
use crate::sim::config::{
    NetzpConfig, INPUT_COUNT, IO_OUTPUTS_BASE_ADDR, NETZ_DATA_OFFSET, INPUTS_OFFSET,
};
use crate::sim::top::NetzpTop;
use crate::ui::{make_config, NetzpArgs};
use crate::unit_tests::fixtures::{network, neuron, run_top};

/// One layer of three template-matching neurons: weight 1/|template| on
/// the template's pixels, a penalty elsewhere. Correlation with the
/// matching base bitmap wins.
fn template_network() -> NetzwerkData {
    let templates = [BASE_CIRCLE, BASE_SQUARE, BASE_TRIANGLE];
    let neurons = templates
        .iter()
        .enumerate()
        .map(|(index, template)| {
            let set = template.iter().filter(|&&pixel| pixel != 0).count() as f32;
            let weights = template
                .iter()
                .map(|&pixel| if pixel != 0 { 1.0 / set } else { -0.25 })
                .collect();
            neuron(0, index as u8, weights)
        })
        .collect();
    network(neurons)
}

#[test]
fn classifies_each_canonical_bitmap() {
    let netz = template_network();

    // Through the textual dump format, like the CLI does.
    let parsed = parse_network_dump(&format_network_dump(&netz)).expect("dump round trip");
    assert_eq!(parsed, netz);

    for (expected, base) in [BASE_CIRCLE, BASE_SQUARE, BASE_TRIANGLE].iter().enumerate() {
        let outputs = run_top(3, &bitmap_from_bytes(base), &parsed);
        assert_eq!(outputs.len(), 3);
        assert_eq!(
            argmax(&outputs),
            Some(expected),
            "bitmap {expected} misclassified: {outputs:?}"
        );
    }
}

#[test]
fn memory_holds_the_whole_problem_and_answer() {
    let netz = template_network();
    let bitmap = bitmap_from_bytes(&BASE_CIRCLE);
    let config = NetzpConfig {
        core_count: 2,
        timeout: 100_000,
        ..NetzpConfig::default()
    };
    let mut top = NetzpTop::new(&config);
    let outputs = top.run_inference(&bitmap, &netz).expect("inference");

    let mem = top.mem.read().expect("lock poisoned");

    let pixel_bytes: Vec<u8> = bitmap.iter().map(|&pixel| pixel as u8).collect();
    assert_eq!(mem.peek_span(INPUTS_OFFSET, INPUT_COUNT), pixel_bytes);

    let netz_bytes = netz.serialize();
    assert_eq!(
        mem.peek_span(NETZ_DATA_OFFSET, netz_bytes.len()),
        netz_bytes
    );

    assert_eq!(mem.peek_span(IO_OUTPUTS_BASE_ADDR, 1), vec![outputs.len() as u8]);
    let committed = decode_fp_le(&mem.peek_span(IO_OUTPUTS_BASE_ADDR + 1, 4 * outputs.len()));
    assert_eq!(committed, outputs);
}

#[test]
fn stall_detection_reports_the_phase() {
    // A cycle cap far below what the problem writeback needs.
    let config = NetzpConfig {
        core_count: 2,
        timeout: 10,
        ..NetzpConfig::default()
    };
    let mut top = NetzpTop::new(&config);
    let err = top
        .run_inference(&bitmap_from_bytes(&BASE_CIRCLE), &template_network())
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("problem writeback"), "{message}");
    assert!(message.contains("memory head"), "{message}");
}

#[test]
fn missing_input_file_fails_without_panicking() {
    let args = NetzpArgs {
        input_path: "/nonexistent/bitmap.txt".into(),
        network_path: "/nonexistent/weights.txt".into(),
        config_path: None,
        cores: None,
        timeout: None,
    };
    assert!(crate::ui::run(&args).is_err());
}

#[test]
fn cli_overrides_beat_the_defaults() {
    let args = NetzpArgs {
        input_path: "in".into(),
        network_path: "net".into(),
        config_path: None,
        cores: Some(2),
        timeout: Some(1234),
    };
    let config = make_config(&args).expect("config");
    assert_eq!(config.core_count, 2);
    assert_eq!(config.timeout, 1234);
}
