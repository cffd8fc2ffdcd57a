//! Testbench fixtures: the memory slave alone, the arbiter with raw
//! master signals, and the full fabric with one batch adapter per master.

use std::sync::{Arc, RwLock};

use crate::base::{DataVector, Scheduler, Signal};
use crate::comp::sigmoid;
use crate::mem::{
    MasterPorts, Mem, MemController, MemControllerPorts, MemIo, MemIoPorts, MemPorts, MemReply,
    MemRequest,
};
use crate::netz::bitmap::Bitmap;
use crate::netz::data::{NetzwerkData, NeuronData};
use crate::sim::config::{Fp, NetzpConfig, MEM_MAX_CONNECTIONS};
use crate::sim::top::NetzpTop;

pub fn neuron(layer: u8, id: u8, weights: Vec<Fp>) -> NeuronData {
    NeuronData {
        layer,
        neuron: id,
        weights_count: weights.len() as u8,
        weights,
    }
}

pub fn network(neurons: Vec<NeuronData>) -> NetzwerkData {
    NetzwerkData {
        neurons_count: neurons.len() as u8,
        neurons,
    }
}

/// Software forward pass over the same accumulation order the cores use;
/// the ground truth for end-to-end checks.
pub fn forward_reference(bitmap: &Bitmap, netz: &NetzwerkData) -> Vec<Fp> {
    let mut inputs: Vec<Fp> = bitmap.iter().map(|&pixel| pixel as u8 as Fp).collect();
    let mut layer = 0u8;
    loop {
        let neurons: Vec<&NeuronData> = netz.neurons.iter().filter(|n| n.layer == layer).collect();
        if neurons.is_empty() {
            break;
        }
        let mut outputs = vec![0.0; neurons.len()];
        for n in &neurons {
            let mut product = 0.0;
            for i in 0..n.weights_count as usize {
                product += n.weights[i] * inputs[i];
            }
            outputs[n.neuron as usize] = sigmoid(product);
        }
        inputs = outputs;
        layer += 1;
    }
    inputs
}

pub fn run_top(core_count: usize, bitmap: &Bitmap, netz: &NetzwerkData) -> Vec<Fp> {
    let config = NetzpConfig {
        core_count,
        timeout: 100_000,
        ..NetzpConfig::default()
    };
    let mut top = NetzpTop::new(&config);
    top.run_inference(bitmap, netz)
        .expect("inference should finish")
}

/// The memory slave with testbench-driven port signals.
pub struct MemFixture {
    pub sched: Scheduler,
    pub rst: Signal<bool>,
    pub data_wr: Signal<u8>,
    pub addr: Signal<u16>,
    pub w_en: Signal<bool>,
    pub r_en: Signal<bool>,
    pub ack_in: Signal<bool>,
    pub ack_out: Signal<bool>,
    pub data_rd: Signal<u8>,
    pub mem: Arc<RwLock<Mem>>,
}

impl MemFixture {
    pub fn new(memsize: usize) -> Self {
        let mut sched = Scheduler::new();
        let rst = sched.signal::<bool>("rst");
        let data_wr = sched.signal::<u8>("data_wr");
        let addr = sched.signal::<u16>("addr");
        let w_en = sched.signal::<bool>("w_en");
        let r_en = sched.signal::<bool>("r_en");
        let ack_in = sched.signal::<bool>("ack_in");
        let ack_out = sched.signal::<bool>("ack_out");
        let data_rd = sched.signal::<u8>("data_rd");

        let mem = Mem::instantiate_with_size(
            &mut sched,
            MemPorts {
                rst: rst.clone(),
                data_wr: data_wr.clone(),
                addr: addr.clone(),
                w_en: w_en.clone(),
                r_en: r_en.clone(),
                ack_in: ack_in.clone(),
                ack_out: ack_out.clone(),
                data_rd: data_rd.clone(),
            },
            memsize,
        );

        MemFixture {
            sched,
            rst,
            data_wr,
            addr,
            w_en,
            r_en,
            ack_in,
            ack_out,
            data_rd,
            mem,
        }
    }

    fn wait_ack(&mut self) {
        for _ in 0..8 {
            if self.ack_out.read() {
                return;
            }
            self.sched.tick();
        }
        panic!("memory did not acknowledge");
    }

    fn close_handshake(&mut self) {
        self.ack_in.write(true);
        self.sched.run(2);
        self.ack_in.write(false);
        self.sched.run(2);
    }

    pub fn write_byte(&mut self, addr: u16, byte: u8) {
        self.addr.write(addr);
        self.data_wr.write(byte);
        self.w_en.write(true);
        self.wait_ack();
        self.w_en.write(false);
        self.close_handshake();
    }

    pub fn read_byte(&mut self, addr: u16) -> u8 {
        self.addr.write(addr);
        self.r_en.write(true);
        self.wait_ack();
        let byte = self.data_rd.read();
        self.r_en.write(false);
        self.close_handshake();
        byte
    }
}

/// Controller plus memory, the testbench playing the masters on the raw
/// bus-side signals.
pub struct ArbiterFixture {
    pub sched: Scheduler,
    pub rst: Signal<bool>,
    pub access_request: Vec<Signal<bool>>,
    pub access_granted: Vec<Signal<bool>>,
    pub request_in: Vec<Signal<MemRequest>>,
    pub reply_out: Vec<Signal<MemReply>>,
    pub mem: Arc<RwLock<Mem>>,
}

impl ArbiterFixture {
    pub fn new() -> Self {
        let mut sched = Scheduler::new();
        let rst = sched.signal::<bool>("rst");

        let mem_data_wr = sched.signal::<u8>("mem.data_wr");
        let mem_addr = sched.signal::<u16>("mem.addr");
        let mem_w_en = sched.signal::<bool>("mem.w_en");
        let mem_r_en = sched.signal::<bool>("mem.r_en");
        let mem_ack_in = sched.signal::<bool>("mem.ack_in");
        let mem_ack_out = sched.signal::<bool>("mem.ack_out");
        let mem_data_rd = sched.signal::<u8>("mem.data_rd");

        let mem = Mem::instantiate(
            &mut sched,
            MemPorts {
                rst: rst.clone(),
                data_wr: mem_data_wr.clone(),
                addr: mem_addr.clone(),
                w_en: mem_w_en.clone(),
                r_en: mem_r_en.clone(),
                ack_in: mem_ack_in.clone(),
                ack_out: mem_ack_out.clone(),
                data_rd: mem_data_rd.clone(),
            },
        );

        let mut access_request = Vec::new();
        let mut access_granted = Vec::new();
        let mut request_in = Vec::new();
        let mut reply_out = Vec::new();
        let mut masters = Vec::new();
        for index in 0..MEM_MAX_CONNECTIONS {
            let req = sched.signal::<bool>(&format!("m{index}.access_request"));
            let grant = sched.signal::<bool>(&format!("m{index}.access_granted"));
            let request = sched.signal::<MemRequest>(&format!("m{index}.request"));
            let reply = sched.signal::<MemReply>(&format!("m{index}.reply"));
            masters.push(MasterPorts {
                access_request: req.clone(),
                access_granted: grant.clone(),
                request_in: request.clone(),
                reply_out: reply.clone(),
            });
            access_request.push(req);
            access_granted.push(grant);
            request_in.push(request);
            reply_out.push(reply);
        }

        MemController::instantiate(
            &mut sched,
            MemControllerPorts {
                rst: rst.clone(),
                masters,
                data_wr: mem_data_wr,
                addr: mem_addr,
                w_en: mem_w_en,
                r_en: mem_r_en,
                ack_in: mem_ack_out,
                ack_out: mem_ack_in,
                data_rd: mem_data_rd,
            },
        );

        ArbiterFixture {
            sched,
            rst,
            access_request,
            access_granted,
            request_in,
            reply_out,
            mem,
        }
    }

    /// Like an adapter would: request the bus, wait for the grant,
    /// present one beat, wait for its reply.
    pub fn beat(&mut self, master: usize, request: MemRequest) -> MemReply {
        let previous = self.reply_out[master].read();
        self.access_request[master].write(true);
        for _ in 0..16 {
            if self.access_granted[master].read() {
                break;
            }
            self.sched.tick();
        }
        assert!(self.access_granted[master].read(), "no grant for master {master}");

        self.request_in[master].write(request);
        for _ in 0..16 {
            self.sched.tick();
            let reply = self.reply_out[master].read();
            if reply != previous {
                return reply;
            }
        }
        panic!("no reply for master {master}");
    }

    pub fn release(&mut self, master: usize) {
        self.access_request[master].write(false);
        self.sched.run(2);
    }
}

/// The full fabric: memory, controller, and one batch adapter per master
/// driven through host-side bundle signals.
pub struct FabricFixture {
    pub sched: Scheduler,
    pub rst: Signal<bool>,
    pub host_requests: Vec<Signal<DataVector<MemRequest>>>,
    pub host_replies: Vec<Signal<DataVector<MemReply>>>,
    pub mem: Arc<RwLock<Mem>>,
}

impl FabricFixture {
    /// Master id carried by requests of master `index`.
    pub fn master_id(index: usize) -> u8 {
        index as u8 + 1
    }

    pub fn new() -> Self {
        let mut sched = Scheduler::new();
        let rst = sched.signal::<bool>("rst");

        let mem_data_wr = sched.signal::<u8>("mem.data_wr");
        let mem_addr = sched.signal::<u16>("mem.addr");
        let mem_w_en = sched.signal::<bool>("mem.w_en");
        let mem_r_en = sched.signal::<bool>("mem.r_en");
        let mem_ack_in = sched.signal::<bool>("mem.ack_in");
        let mem_ack_out = sched.signal::<bool>("mem.ack_out");
        let mem_data_rd = sched.signal::<u8>("mem.data_rd");

        let mem = Mem::instantiate(
            &mut sched,
            MemPorts {
                rst: rst.clone(),
                data_wr: mem_data_wr.clone(),
                addr: mem_addr.clone(),
                w_en: mem_w_en.clone(),
                r_en: mem_r_en.clone(),
                ack_in: mem_ack_in.clone(),
                ack_out: mem_ack_out.clone(),
                data_rd: mem_data_rd.clone(),
            },
        );

        let mut masters = Vec::new();
        let mut bus_sides = Vec::new();
        for index in 0..MEM_MAX_CONNECTIONS {
            let req = sched.signal::<bool>(&format!("m{index}.access_request"));
            let grant = sched.signal::<bool>(&format!("m{index}.access_granted"));
            let request = sched.signal::<MemRequest>(&format!("m{index}.request"));
            let reply = sched.signal::<MemReply>(&format!("m{index}.reply"));
            masters.push(MasterPorts {
                access_request: req.clone(),
                access_granted: grant.clone(),
                request_in: request.clone(),
                reply_out: reply.clone(),
            });
            bus_sides.push((req, grant, request, reply));
        }

        MemController::instantiate(
            &mut sched,
            MemControllerPorts {
                rst: rst.clone(),
                masters,
                data_wr: mem_data_wr,
                addr: mem_addr,
                w_en: mem_w_en,
                r_en: mem_r_en,
                ack_in: mem_ack_out,
                ack_out: mem_ack_in,
                data_rd: mem_data_rd,
            },
        );

        let mut host_requests = Vec::new();
        let mut host_replies = Vec::new();
        for (index, (req, grant, request, reply)) in bus_sides.into_iter().enumerate() {
            let requests_in = sched.signal::<DataVector<MemRequest>>(&format!("host{index}.requests"));
            let replies_out = sched.signal::<DataVector<MemReply>>(&format!("host{index}.replies"));
            MemIo::instantiate(
                &mut sched,
                Self::master_id(index),
                MemIoPorts {
                    rst: rst.clone(),
                    requests_in: requests_in.clone(),
                    replies_out: replies_out.clone(),
                    access_request: req,
                    access_granted: grant,
                    request_out: request,
                    reply_in: reply,
                },
            );
            host_requests.push(requests_in);
            host_replies.push(replies_out);
        }

        FabricFixture {
            sched,
            rst,
            host_requests,
            host_replies,
            mem,
        }
    }

    pub fn submit(&mut self, master: usize, batch: Vec<MemRequest>) -> DataVector<MemReply> {
        self.host_requests[master].write(DataVector::from(batch));
        self.host_replies[master].read()
    }

    /// Tick until master's reply bundle moves past `previous`.
    pub fn wait_bundle(
        &mut self,
        master: usize,
        previous: &DataVector<MemReply>,
        cap: u64,
    ) -> DataVector<MemReply> {
        for _ in 0..cap {
            self.sched.tick();
            let bundle = self.host_replies[master].read();
            if bundle != *previous {
                return bundle;
            }
        }
        panic!("no reply bundle for master {master} within {cap} cycles");
    }
}
