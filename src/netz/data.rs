//! In-memory and wire form of the network descriptor.
//!
//! The serialised layout is what lands in accelerator memory: values are
//! little-endian, records are tightly packed, and the stream order of the
//! neurons is their evaluation order. All neurons of layer L appear before
//! any neuron of layer L+1; the dispatch unit detects layer boundaries
//! purely from that ordering.

use crate::sim::config::Fp;

/// One neuron record: 3 header bytes then `weights_count` packed `f32`s.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NeuronData {
    pub layer: u8,
    pub neuron: u8,
    pub weights_count: u8,
    pub weights: Vec<Fp>,
}

impl NeuronData {
    /// Byte length of the fixed header (layer, neuron, weights_count).
    pub const STATIC_SIZE: usize = 3;

    pub fn size_in_bytes(&self) -> usize {
        Self::STATIC_SIZE + std::mem::size_of::<Fp>() * self.weights_count as usize
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.size_in_bytes());
        bytes.push(self.layer);
        bytes.push(self.neuron);
        bytes.push(self.weights_count);
        for weight in &self.weights {
            bytes.extend_from_slice(&weight.to_le_bytes());
        }
        bytes
    }

    /// Rebuild a record from the front of `bytes`. The slice must hold at
    /// least `size_in_bytes()` of it; anything shorter is a framing bug.
    pub fn deserialize(bytes: &[u8]) -> Self {
        let mut data = NeuronData {
            layer: bytes[0],
            neuron: bytes[1],
            weights_count: bytes[2],
            weights: Vec::new(),
        };
        let end = data.size_in_bytes();
        data.weights = decode_fp_le(&bytes[Self::STATIC_SIZE..end]);
        data
    }
}

/// The whole network: a count byte then `neurons_count` packed records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetzwerkData {
    pub neurons_count: u8,
    pub neurons: Vec<NeuronData>,
}

impl NetzwerkData {
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = vec![self.neurons_count];
        for neuron in &self.neurons {
            bytes.extend_from_slice(&neuron.serialize());
        }
        bytes
    }

    pub fn deserialize(bytes: &[u8]) -> Self {
        let neurons_count = bytes[0];
        let mut neurons = Vec::with_capacity(neurons_count as usize);
        let mut offset = 1;
        for _ in 0..neurons_count {
            let neuron = NeuronData::deserialize(&bytes[offset..]);
            offset += neuron.size_in_bytes();
            neurons.push(neuron);
        }
        Self {
            neurons_count,
            neurons,
        }
    }
}

/// Decode a packed little-endian `f32` span. `bytes.len()` must be a
/// multiple of four.
pub fn decode_fp_le(bytes: &[u8]) -> Vec<Fp> {
    bytes
        .chunks_exact(std::mem::size_of::<Fp>())
        .map(|chunk| Fp::from_le_bytes(chunk.try_into().expect("chunk is 4 bytes")))
        .collect()
}
