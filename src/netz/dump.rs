//! Textual weight-dump format.
//!
//! ```text
//! >49        input count
//! @0/0       opens the weight list of neuron 0 in layer 0
//! #0.125     appends a weight to the open neuron
//! ```
//!
//! Blank lines are ignored. The parser enforces everything the dispatch
//! unit assumes by construction: exactly one `>` line before any neuron,
//! grouped ascending layers starting at 0, dense neuron ids per layer, and
//! weight counts matching the previous layer's size (the input count for
//! layer 0).

use anyhow::{bail, Context, Result};

use crate::netz::data::{NetzwerkData, NeuronData};
use crate::sim::config::MAX_NEURONS;

pub fn parse_network_dump(text: &str) -> Result<NetzwerkData> {
    let mut input_count: Option<usize> = None;
    let mut neurons: Vec<NeuronData> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let lineno = index + 1;

        match line.as_bytes()[0] {
            b'>' => {
                if input_count.is_some() {
                    bail!("line {lineno}: duplicate '>' input count");
                }
                let count: usize = line[1..]
                    .trim()
                    .parse()
                    .with_context(|| format!("line {lineno}: bad input count"))?;
                if count == 0 {
                    bail!("line {lineno}: input count must be positive");
                }
                input_count = Some(count);
            }
            b'@' => {
                if input_count.is_none() {
                    bail!("line {lineno}: neuron before the '>' input count");
                }
                let (layer, neuron) = line[1..]
                    .split_once('/')
                    .with_context(|| format!("line {lineno}: expected '@layer/neuron'"))?;
                let layer: u8 = layer
                    .trim()
                    .parse()
                    .with_context(|| format!("line {lineno}: bad layer index"))?;
                let neuron: u8 = neuron
                    .trim()
                    .parse()
                    .with_context(|| format!("line {lineno}: bad neuron index"))?;

                check_order(&neurons, layer, neuron)
                    .with_context(|| format!("line {lineno}: bad neuron order"))?;
                if neurons.len() >= MAX_NEURONS {
                    bail!("line {lineno}: more than {MAX_NEURONS} neurons");
                }
                neurons.push(NeuronData {
                    layer,
                    neuron,
                    weights_count: 0,
                    weights: Vec::new(),
                });
            }
            b'#' => {
                let open = neurons
                    .last_mut()
                    .with_context(|| format!("line {lineno}: weight before any '@' neuron"))?;
                let weight: f32 = line[1..]
                    .trim()
                    .parse()
                    .with_context(|| format!("line {lineno}: bad weight"))?;
                if open.weights.len() >= u8::MAX as usize {
                    bail!("line {lineno}: more than {} weights in one neuron", u8::MAX);
                }
                open.weights.push(weight);
            }
            _ => bail!("line {lineno}: unrecognized directive {line:?}"),
        }
    }

    let input_count = input_count.context("weight dump has no '>' input count line")?;
    finish(neurons, input_count)
}

/// Layers must be grouped and ascend from 0 without gaps; neuron ids must
/// count up from 0 within each layer.
fn check_order(neurons: &[NeuronData], layer: u8, neuron: u8) -> Result<()> {
    match neurons.last() {
        None => {
            if layer != 0 || neuron != 0 {
                bail!("first neuron must be @0/0, got @{layer}/{neuron}");
            }
        }
        Some(prev) if layer == prev.layer => {
            if neuron != prev.neuron + 1 {
                bail!(
                    "expected @{}/{} after @{}/{}, got @{layer}/{neuron}",
                    prev.layer,
                    prev.neuron + 1,
                    prev.layer,
                    prev.neuron
                );
            }
        }
        Some(prev) if layer == prev.layer + 1 => {
            if neuron != 0 {
                bail!("layer {layer} must start at neuron 0, got @{layer}/{neuron}");
            }
        }
        Some(prev) => bail!(
            "layer {layer} after layer {} (layers must be grouped and ascending)",
            prev.layer
        ),
    }
    Ok(())
}

fn finish(mut neurons: Vec<NeuronData>, input_count: usize) -> Result<NetzwerkData> {
    let mut layer_sizes: Vec<usize> = Vec::new();
    for neuron in &neurons {
        if neuron.layer as usize >= layer_sizes.len() {
            layer_sizes.push(0);
        }
        layer_sizes[neuron.layer as usize] += 1;
    }

    for neuron in &mut neurons {
        let expected = match neuron.layer {
            0 => input_count,
            l => layer_sizes[l as usize - 1],
        };
        if neuron.weights.len() != expected {
            bail!(
                "neuron @{}/{} has {} weights, expected {}",
                neuron.layer,
                neuron.neuron,
                neuron.weights.len(),
                expected
            );
        }
        neuron.weights_count = neuron.weights.len() as u8;
    }

    Ok(NetzwerkData {
        neurons_count: neurons.len() as u8,
        neurons,
    })
}

/// Inverse of `parse_network_dump`. The input count is recovered from the
/// first layer's weight count.
pub fn format_network_dump(netz: &NetzwerkData) -> String {
    let input_count = netz
        .neurons
        .first()
        .map(|n| n.weights_count as usize)
        .unwrap_or(0);

    let mut out = format!(">{input_count}\n");
    for neuron in &netz.neurons {
        out.push_str(&format!("@{}/{}\n", neuron.layer, neuron.neuron));
        for weight in &neuron.weights {
            out.push_str(&format!("#{weight}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_LAYER: &str = "\
>2
@0/0
#1.0
#-1.0

@0/1
#0.5
#0.5
@1/0
#1.0
#1.0
";

    #[test]
    fn parses_a_two_layer_dump() {
        let netz = parse_network_dump(TWO_LAYER).unwrap();
        assert_eq!(netz.neurons_count, 3);
        assert_eq!(netz.neurons[0].weights, vec![1.0, -1.0]);
        assert_eq!(netz.neurons[2].layer, 1);
        assert_eq!(netz.neurons[2].weights_count, 2);
    }

    #[test]
    fn missing_input_count_is_an_error() {
        let err = parse_network_dump("@0/0\n#1.0\n").unwrap_err();
        assert!(format!("{err:#}").contains("'>'"), "{err:#}");
    }

    #[test]
    fn ungrouped_layers_are_an_error() {
        let dump = ">1\n@0/0\n#1.0\n@1/0\n#1.0\n@0/1\n#1.0\n";
        assert!(parse_network_dump(dump).is_err());
    }

    #[test]
    fn weight_count_mismatch_is_an_error() {
        let dump = ">3\n@0/0\n#1.0\n";
        assert!(parse_network_dump(dump).is_err());
    }

    #[test]
    fn format_then_parse_is_identity() {
        let netz = parse_network_dump(TWO_LAYER).unwrap();
        let reparsed = parse_network_dump(&format_network_dump(&netz)).unwrap();
        assert_eq!(reparsed, netz);
    }
}
