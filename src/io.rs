//! Host-side in/out controller.
//!
//! Moves the problem into accelerator memory before an inference (49
//! pixel bytes, then the serialised network) and reads the output block
//! back once the dispatch unit signals completion on `got_output`.

use std::sync::{Arc, RwLock};

use log::debug;

use crate::base::{DataVector, Scheduler, Signal, SignalId};
use crate::mem::{read_span_requests, replies_to_bytes, write_span_requests, MemReply, MemRequest};
use crate::netz::data::{decode_fp_le, NetzwerkData};
use crate::sim::config::{
    Fp, INPUTS_OFFSET, INPUT_COUNT, IOC_MASTER_ID, IO_OUTPUTS_BASE_ADDR, NETZ_DATA_OFFSET,
};

pub struct InOutPorts {
    pub rst: Signal<bool>,
    // User side.
    pub data_inputs: Vec<Signal<bool>>,
    pub netz_data: Signal<NetzwerkData>,
    pub got_output: Signal<bool>,
    pub finished_writing: Signal<bool>,
    pub finished_reading: Signal<bool>,
    pub outputs: Signal<DataVector<Fp>>,
    // Adapter side.
    pub requests: Signal<DataVector<MemRequest>>,
    pub replies: Signal<DataVector<MemReply>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum IocState {
    Idle,
    WriteInputs,
    WriteNetz,
    WaitOutput,
    ReadCount,
    ReadValues,
}

pub struct InOutController {
    ports: InOutPorts,
    input_data_changed: bool,
    netz_data_changed: bool,
    new_reply: bool,
    /// Serialised network batch staged while the pixel batch is in flight.
    netz_requests: Vec<MemRequest>,
    state: IocState,
}

impl InOutController {
    pub fn instantiate(sched: &mut Scheduler, ports: InOutPorts) -> Arc<RwLock<Self>> {
        assert_eq!(ports.data_inputs.len(), INPUT_COUNT);

        let pixel_sensitivity: Vec<SignalId> =
            ports.data_inputs.iter().map(|sig| sig.id()).collect();
        let netz_sensitivity = [ports.netz_data.id()];
        let reply_sensitivity = [ports.replies.id()];

        let me = Arc::new(RwLock::new(InOutController {
            ports,
            input_data_changed: false,
            netz_data_changed: false,
            new_reply: false,
            netz_requests: Vec::new(),
            state: IocState::Idle,
        }));

        let ioc = Arc::clone(&me);
        sched.method("ioc.at_data_input_change", &pixel_sensitivity, move || {
            ioc.write().expect("lock poisoned").input_data_changed = true
        });
        let ioc = Arc::clone(&me);
        sched.method("ioc.at_netz_data_change", &netz_sensitivity, move || {
            ioc.write().expect("lock poisoned").netz_data_changed = true
        });
        let ioc = Arc::clone(&me);
        sched.method("ioc.at_reply", &reply_sensitivity, move || {
            ioc.write().expect("lock poisoned").new_reply = true
        });
        let ioc = Arc::clone(&me);
        sched.thread("ioc.main", move || {
            ioc.write().expect("lock poisoned").resume()
        });

        me
    }

    fn resume(&mut self) {
        if self.ports.rst.read() {
            self.input_data_changed = false;
            self.netz_data_changed = false;
            self.new_reply = false;
            self.netz_requests.clear();
            self.state = IocState::Idle;
            self.ports.finished_writing.write(false);
            self.ports.finished_reading.write(false);
            self.ports.requests.write(DataVector::new());
            return;
        }

        match self.state {
            IocState::Idle => {
                if !self.input_data_changed && !self.netz_data_changed {
                    return;
                }
                self.ports.finished_writing.write(false);
                self.ports.finished_reading.write(false);

                let mut input_requests = Vec::new();
                if self.input_data_changed {
                    self.input_data_changed = false;
                    debug!("ioc: input data updated");
                    let pixel_bytes: Vec<u8> = self
                        .ports
                        .data_inputs
                        .iter()
                        .map(|pixel| pixel.read() as u8)
                        .collect();
                    input_requests = write_span_requests(INPUTS_OFFSET, &pixel_bytes, IOC_MASTER_ID);
                }
                if self.netz_data_changed {
                    self.netz_data_changed = false;
                    debug!("ioc: netz data updated");
                    self.netz_requests = write_span_requests(
                        NETZ_DATA_OFFSET,
                        &self.ports.netz_data.read().serialize(),
                        IOC_MASTER_ID,
                    );
                }

                if !input_requests.is_empty() {
                    self.submit(input_requests);
                    self.state = IocState::WriteInputs;
                } else if !self.netz_requests.is_empty() {
                    let netz_requests = std::mem::take(&mut self.netz_requests);
                    self.submit(netz_requests);
                    self.state = IocState::WriteNetz;
                }
            }
            IocState::WriteInputs => {
                if self.take_reply().is_some() {
                    if self.netz_requests.is_empty() {
                        self.finish_writing();
                    } else {
                        let netz_requests = std::mem::take(&mut self.netz_requests);
                        self.submit(netz_requests);
                        self.state = IocState::WriteNetz;
                    }
                }
            }
            IocState::WriteNetz => {
                if self.take_reply().is_some() {
                    self.finish_writing();
                }
            }
            IocState::WaitOutput => {
                if self.ports.got_output.read() {
                    self.submit(read_span_requests(IO_OUTPUTS_BASE_ADDR, 1, IOC_MASTER_ID));
                    self.state = IocState::ReadCount;
                }
            }
            IocState::ReadCount => {
                if let Some(replies) = self.take_reply() {
                    let count = replies_to_bytes(&replies.data)[0] as usize;
                    if count == 0 {
                        self.finish_reading(Vec::new());
                    } else {
                        self.submit(read_span_requests(
                            IO_OUTPUTS_BASE_ADDR + 1,
                            std::mem::size_of::<Fp>() * count,
                            IOC_MASTER_ID,
                        ));
                        self.state = IocState::ReadValues;
                    }
                }
            }
            IocState::ReadValues => {
                if let Some(replies) = self.take_reply() {
                    let outputs = decode_fp_le(&replies_to_bytes(&replies.data));
                    self.finish_reading(outputs);
                }
            }
        }
    }

    fn finish_writing(&mut self) {
        debug!("ioc: problem written to memory");
        self.ports.finished_writing.write(true);
        self.state = IocState::WaitOutput;
    }

    fn finish_reading(&mut self, outputs: Vec<Fp>) {
        debug!("ioc: read {} outputs back", outputs.len());
        self.ports.outputs.write(DataVector::from(outputs));
        self.ports.finished_reading.write(true);
        self.state = IocState::Idle;
    }

    fn submit(&mut self, requests: Vec<MemRequest>) {
        self.new_reply = false;
        self.ports.requests.write(DataVector::from(requests));
    }

    fn take_reply(&mut self) -> Option<DataVector<MemReply>> {
        if !self.new_reply {
            return None;
        }
        self.new_reply = false;
        Some(self.ports.replies.read())
    }
}
