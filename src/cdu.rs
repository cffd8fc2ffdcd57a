//! Central Dispatch Unit.
//!
//! Walks the serialised network in memory layer by layer: fetches the 49
//! input pixels, then each neuron's header and weights, parks fetched
//! neurons on a small pending stack and scatters them to whichever cores
//! can take work. A change of layer in the header stream is the layer
//! barrier: the unit drains every outstanding output of the current layer
//! before the first neuron of the next one is assigned, then feeds the
//! collected outputs back as the next layer's inputs. The final layer's
//! outputs are written back as the output block.
//!
//! Cores hold their last output across cycles, so the unit keeps two bits
//! per core: `cold` (nothing assigned since the last barrier, or output
//! already consumed) and `done` (a rising edge of `ready` observed since
//! the last assignment). An output is committed only on `done && !cold`;
//! the level of `ready` alone still shows the previous assignment for one
//! cycle after a new one is written.

use std::sync::{Arc, RwLock};

use log::debug;
use smallvec::SmallVec;

use crate::base::{DataVector, Scheduler, Signal, SignalId};
use crate::comp::{ComputCore, ComputCorePorts, ComputationData};
use crate::mem::{read_span_requests, replies_to_bytes, write_span_requests, MemReply, MemRequest};
use crate::netz::data::{decode_fp_le, NeuronData};
use crate::sim::config::{
    Fp, CDU_MASTER_ID, INPUTS_OFFSET, INPUT_COUNT, IO_OUTPUTS_BASE_ADDR, MAX_NEURONS,
    NETZ_DATA_OFFSET,
};

pub struct CduPorts {
    pub rst: Signal<bool>,
    pub start: Signal<bool>,
    pub finished: Signal<bool>,
    pub mem_requests: Signal<DataVector<MemRequest>>,
    pub mem_replies: Signal<DataVector<MemReply>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CduState {
    Idle,
    FetchInputs,
    FetchNeuronCount,
    FetchHeader,
    LayerBarrier,
    FetchWeights,
    StackDrain,
    FinalDrain,
    CommitOutputs,
}

pub struct CentralDispatchUnit {
    ports: CduPorts,
    core_count: usize,

    core_inputs: Vec<Signal<ComputationData>>,
    core_outputs: Vec<Signal<ComputationData>>,
    core_ready: Vec<Signal<bool>>,

    core_cold: Vec<bool>,
    core_done: Vec<bool>,
    core_ready_seen: Vec<bool>,

    state: CduState,
    has_mem_reply: bool,
    finished_latch: bool,

    neuron_count: u8,
    current_neuron: u8,
    current_layer: u8,
    current_offset: u16,
    /// Header fetched and waiting for its barrier or its weights.
    pending_header: Option<NeuronData>,

    inputs: [Fp; MAX_NEURONS],
    outputs: [Fp; MAX_NEURONS],
    outputs_ready: [bool; MAX_NEURONS],
    inputs_size: usize,
    outputs_size: usize,

    /// Fetched neurons awaiting a core, capacity `core_count`.
    neurons: SmallVec<[NeuronData; 8]>,
}

impl CentralDispatchUnit {
    pub fn instantiate(
        sched: &mut Scheduler,
        core_count: usize,
        ports: CduPorts,
    ) -> Arc<RwLock<Self>> {
        assert!(core_count > 0, "need at least one computation core");

        let mut core_inputs = Vec::with_capacity(core_count);
        let mut core_outputs = Vec::with_capacity(core_count);
        let mut core_ready = Vec::with_capacity(core_count);
        for index in 0..core_count {
            let name = format!("cdu.core{index}");
            let input = sched.signal::<ComputationData>(&format!("{name}.input"));
            let output = sched.signal::<ComputationData>(&format!("{name}.output"));
            let ready = sched.signal::<bool>(&format!("{name}.ready"));
            ComputCore::instantiate(
                sched,
                &name,
                ComputCorePorts {
                    rst: ports.rst.clone(),
                    input_data: input.clone(),
                    output_data: output.clone(),
                    ready: ready.clone(),
                },
            );
            core_inputs.push(input);
            core_outputs.push(output);
            core_ready.push(ready);
        }

        let ready_sensitivity: Vec<SignalId> = core_ready.iter().map(|sig| sig.id()).collect();
        let reply_sensitivity = [ports.mem_replies.id()];

        let me = Arc::new(RwLock::new(CentralDispatchUnit {
            ports,
            core_count,
            core_inputs,
            core_outputs,
            core_ready,
            core_cold: vec![true; core_count],
            core_done: vec![false; core_count],
            core_ready_seen: vec![false; core_count],
            state: CduState::Idle,
            has_mem_reply: false,
            finished_latch: false,
            neuron_count: 0,
            current_neuron: 0,
            current_layer: 0,
            current_offset: 0,
            pending_header: None,
            inputs: [0.0; MAX_NEURONS],
            outputs: [0.0; MAX_NEURONS],
            outputs_ready: [false; MAX_NEURONS],
            inputs_size: 0,
            outputs_size: 0,
            neurons: SmallVec::new(),
        }));

        let cdu = Arc::clone(&me);
        sched.method("cdu.at_core_ready", &ready_sensitivity, move || {
            cdu.write().expect("lock poisoned").at_core_ready()
        });
        let cdu = Arc::clone(&me);
        sched.method("cdu.at_mem_reply", &reply_sensitivity, move || {
            cdu.write().expect("lock poisoned").has_mem_reply = true
        });
        let cdu = Arc::clone(&me);
        sched.thread("cdu.main", move || {
            cdu.write().expect("lock poisoned").resume()
        });

        me
    }

    /// Outputs committed so far for the layer in flight (testbench
    /// introspection).
    pub fn committed_outputs(&self) -> Vec<Fp> {
        self.outputs[..self.outputs_size].to_vec()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_latch
    }

    /// Latch rising edges of every `ready` line. The level is a held
    /// register in the core; only an edge since the last assignment means
    /// a fresh output.
    fn at_core_ready(&mut self) {
        for index in 0..self.core_count {
            let level = self.core_ready[index].read();
            if level && !self.core_ready_seen[index] {
                self.core_done[index] = true;
            }
            self.core_ready_seen[index] = level;
        }
    }

    fn resume(&mut self) {
        if self.ports.rst.read() {
            self.reset_state();
            return;
        }

        match self.state {
            CduState::Idle => {
                if self.ports.start.read() && !self.finished_latch {
                    self.begin_inference();
                }
            }
            CduState::FetchInputs => {
                if let Some(bytes) = self.take_reply() {
                    for (slot, byte) in self.inputs.iter_mut().zip(&bytes) {
                        *slot = *byte as Fp;
                    }
                    self.inputs_size = INPUT_COUNT;
                    self.submit(read_span_requests(NETZ_DATA_OFFSET, 1, CDU_MASTER_ID));
                    self.state = CduState::FetchNeuronCount;
                }
            }
            CduState::FetchNeuronCount => {
                if let Some(bytes) = self.take_reply() {
                    self.neuron_count = bytes[0];
                    self.current_neuron = 0;
                    self.current_layer = 0;
                    self.current_offset = NETZ_DATA_OFFSET + 1;
                    debug!("cdu: network of {} neurons", self.neuron_count);
                    if self.neuron_count == 0 {
                        self.commit_outputs();
                    } else {
                        self.fetch_header();
                    }
                }
            }
            CduState::FetchHeader => {
                if let Some(bytes) = self.take_reply() {
                    let header = NeuronData {
                        layer: bytes[0],
                        neuron: bytes[1],
                        weights_count: bytes[2],
                        weights: Vec::new(),
                    };
                    if header.layer != self.current_layer {
                        debug!(
                            "cdu: layer barrier {} -> {}",
                            self.current_layer, header.layer
                        );
                        self.pending_header = Some(header);
                        self.state = CduState::LayerBarrier;
                    } else {
                        self.fetch_weights(header);
                    }
                }
            }
            CduState::LayerBarrier => {
                self.check_all_core_outputs();
                self.assign_neurons();
                if self.layer_complete() {
                    let count = self.outputs_size;
                    self.inputs[..count].copy_from_slice(&self.outputs[..count]);
                    self.inputs_size = count;
                    self.reset_layer();
                    let header = self.pending_header.take().expect("barrier without a header");
                    self.current_layer = header.layer;
                    self.fetch_weights(header);
                }
            }
            CduState::FetchWeights => {
                if let Some(bytes) = self.take_reply() {
                    let mut neuron = self
                        .pending_header
                        .take()
                        .expect("weights reply without a header");
                    neuron.weights = decode_fp_le(&bytes);
                    self.complete_neuron(neuron);
                }
            }
            CduState::StackDrain => {
                self.check_all_core_outputs();
                self.assign_neurons();
                if self.neurons.is_empty() {
                    self.next_fetch();
                }
            }
            CduState::FinalDrain => {
                self.check_all_core_outputs();
                self.assign_neurons();
                if self.layer_complete() {
                    self.commit_outputs();
                }
            }
            CduState::CommitOutputs => {
                if self.take_reply().is_some() {
                    debug!("cdu: finished, {} outputs committed", self.outputs_size);
                    self.finished_latch = true;
                    self.ports.finished.write(true);
                    self.state = CduState::Idle;
                }
            }
        }
    }

    fn begin_inference(&mut self) {
        self.reset_inference_state();
        debug!("cdu: inference started");
        self.submit(read_span_requests(INPUTS_OFFSET, INPUT_COUNT, CDU_MASTER_ID));
        self.state = CduState::FetchInputs;
    }

    fn fetch_header(&mut self) {
        self.submit(read_span_requests(
            self.current_offset,
            NeuronData::STATIC_SIZE,
            CDU_MASTER_ID,
        ));
        self.state = CduState::FetchHeader;
    }

    fn fetch_weights(&mut self, header: NeuronData) {
        if header.weights_count == 0 {
            self.complete_neuron(header);
            return;
        }
        let span = std::mem::size_of::<Fp>() * header.weights_count as usize;
        self.submit(read_span_requests(
            self.current_offset + NeuronData::STATIC_SIZE as u16,
            span,
            CDU_MASTER_ID,
        ));
        self.pending_header = Some(header);
        self.state = CduState::FetchWeights;
    }

    /// A fully fetched neuron joins the pending stack and claims its
    /// output slot.
    fn complete_neuron(&mut self, neuron: NeuronData) {
        assert!(
            self.neurons.len() < self.core_count,
            "pending neuron stack overflow"
        );
        self.current_offset += neuron.size_in_bytes() as u16;
        self.current_neuron += 1;
        self.outputs_size += 1;
        self.neurons.push(neuron);

        if self.neurons.len() == self.core_count {
            self.state = CduState::StackDrain;
        } else {
            self.next_fetch();
        }
    }

    fn next_fetch(&mut self) {
        if self.current_neuron < self.neuron_count {
            self.fetch_header();
        } else {
            self.state = CduState::FinalDrain;
        }
    }

    fn layer_complete(&self) -> bool {
        self.outputs_ready[..self.outputs_size].iter().all(|&r| r)
    }

    /// Commit every fresh core output into its neuron's slot.
    fn check_all_core_outputs(&mut self) {
        for index in 0..self.core_count {
            if self.core_done[index] && !self.core_cold[index] {
                let output = self.core_outputs[index].read();
                let slot = output.data.neuron as usize;
                if !self.outputs_ready[slot] {
                    debug!(
                        "cdu: core {} produced output {} for neuron {}/{}",
                        index, output.output, output.data.layer, output.data.neuron
                    );
                    self.outputs[slot] = output.output;
                    self.outputs_ready[slot] = true;
                }
                self.core_cold[index] = true;
            }
        }
    }

    /// Hand pending neurons to every core that can take one.
    fn assign_neurons(&mut self) {
        for index in 0..self.core_count {
            if self.neurons.is_empty() {
                break;
            }
            if self.core_cold[index] || self.core_done[index] {
                let neuron = self.neurons.pop().expect("stack checked non-empty");
                debug!(
                    "cdu: neuron {}/{} -> core {}",
                    neuron.layer, neuron.neuron, index
                );
                let work = ComputationData {
                    inputs: self.inputs[..self.inputs_size].to_vec(),
                    data: neuron,
                    output: 0.0,
                };
                self.core_inputs[index].write(work);
                self.core_cold[index] = false;
                self.core_done[index] = false;
            }
        }
    }

    fn commit_outputs(&mut self) {
        let mut bytes = Vec::with_capacity(1 + std::mem::size_of::<Fp>() * self.outputs_size);
        bytes.push(self.outputs_size as u8);
        for output in &self.outputs[..self.outputs_size] {
            bytes.extend_from_slice(&output.to_le_bytes());
        }
        self.submit(write_span_requests(
            IO_OUTPUTS_BASE_ADDR,
            &bytes,
            CDU_MASTER_ID,
        ));
        self.state = CduState::CommitOutputs;
    }

    fn submit(&mut self, requests: Vec<MemRequest>) {
        self.has_mem_reply = false;
        self.ports.mem_requests.write(DataVector::from(requests));
    }

    fn take_reply(&mut self) -> Option<Vec<u8>> {
        if !self.has_mem_reply {
            return None;
        }
        self.has_mem_reply = false;
        let replies = self.ports.mem_replies.read();
        Some(replies_to_bytes(&replies.data))
    }

    /// Between layers: forget the finished layer's bookkeeping, chill
    /// every core.
    fn reset_layer(&mut self) {
        self.outputs = [0.0; MAX_NEURONS];
        self.outputs_ready = [false; MAX_NEURONS];
        self.outputs_size = 0;
        self.core_cold.fill(true);
        self.core_done.fill(false);
        self.neurons.clear();
    }

    fn reset_inference_state(&mut self) {
        self.inputs = [0.0; MAX_NEURONS];
        self.inputs_size = 0;
        self.reset_layer();
        self.neuron_count = 0;
        self.current_neuron = 0;
        self.current_layer = 0;
        self.current_offset = 0;
        self.pending_header = None;
        self.has_mem_reply = false;
    }

    fn reset_state(&mut self) {
        self.reset_inference_state();
        self.state = CduState::Idle;
        self.finished_latch = false;
        self.ports.finished.write(false);
        // Empty the request bundle so a rerun of the same problem is a
        // fresh change event for the adapter.
        self.ports.mem_requests.write(DataVector::new());
    }
}
