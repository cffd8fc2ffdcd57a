//! Round-robin memory controller.
//!
//! N master ports fan in to the single Mem port. A hidden counter walks
//! the ports; a master requesting while the counter points at it is
//! granted and the counter holds, otherwise the grant drops and the
//! counter advances. Only the granted master's request is forwarded, so
//! the Mem port serialises everything. Every continuously-requesting
//! master is granted within N cycles of the previous grant.

use std::sync::{Arc, RwLock};

use log::trace;

use crate::base::{Scheduler, Signal, SignalId};
use crate::mem::{MemOp, MemReply, MemRequest, MemStatus};

/// Bus-side port set of one master.
pub struct MasterPorts {
    pub access_request: Signal<bool>,
    pub access_granted: Signal<bool>,
    pub request_in: Signal<MemRequest>,
    pub reply_out: Signal<MemReply>,
}

pub struct MemControllerPorts {
    pub rst: Signal<bool>,
    pub masters: Vec<MasterPorts>,
    // Mem side. `ack_in` is the memory's ack_out, `ack_out` closes its
    // handshake.
    pub data_wr: Signal<u8>,
    pub addr: Signal<u16>,
    pub w_en: Signal<bool>,
    pub r_en: Signal<bool>,
    pub ack_in: Signal<bool>,
    pub ack_out: Signal<bool>,
    pub data_rd: Signal<u8>,
}

pub struct MemController {
    ports: MemControllerPorts,
    current_access: Signal<u8>,

    // Staged members committed by the edge method.
    granted_next: Vec<bool>,
    counter_next: u8,
    request: MemRequest,
    reply_next: MemReply,
    addr_next: u16,
    data_wr_next: u8,
    w_en_next: bool,
    r_en_next: bool,
    ack_out_next: bool,
}

impl MemController {
    pub fn instantiate(sched: &mut Scheduler, ports: MemControllerPorts) -> Arc<RwLock<Self>> {
        let connections = ports.masters.len();
        let current_access = sched.signal::<u8>("bus.current_access");

        let request_sensitivity: Vec<SignalId> = ports
            .masters
            .iter()
            .map(|master| master.request_in.id())
            .chain([current_access.id()])
            .collect();
        let counter_sensitivity: Vec<SignalId> = ports
            .masters
            .iter()
            .map(|master| master.access_request.id())
            .chain([current_access.id()])
            .collect();
        let ack_sensitivity = [ports.ack_in.id()];

        let me = Arc::new(RwLock::new(MemController {
            ports,
            current_access,
            granted_next: vec![false; connections],
            counter_next: 0,
            request: MemRequest::default(),
            reply_next: MemReply::default(),
            addr_next: 0,
            data_wr_next: 0,
            w_en_next: false,
            r_en_next: false,
            ack_out_next: false,
        }));

        let c = Arc::clone(&me);
        sched.method_on_edge("bus.at_clk", move || {
            c.write().expect("lock poisoned").at_clk()
        });
        let c = Arc::clone(&me);
        sched.method("bus.at_request", &request_sensitivity, move || {
            c.write().expect("lock poisoned").at_request()
        });
        let c = Arc::clone(&me);
        sched.method("bus.at_ack", &ack_sensitivity, move || {
            c.write().expect("lock poisoned").at_ack()
        });
        let c = Arc::clone(&me);
        sched.method("bus.at_counter", &counter_sensitivity, move || {
            c.write().expect("lock poisoned").at_counter()
        });

        me
    }

    fn at_clk(&mut self) {
        if self.ports.rst.read() {
            for master in &self.ports.masters {
                master.access_granted.write(false);
                master.reply_out.write(MemReply::default());
            }
            self.ports.data_wr.write(0);
            self.ports.addr.write(0);
            self.ports.w_en.write(false);
            self.ports.r_en.write(false);
            self.ports.ack_out.write(false);
            self.current_access.write(0);

            self.granted_next.fill(false);
            self.counter_next = 0;
            self.request = MemRequest::default();
            self.reply_next = MemReply::default();
            self.addr_next = 0;
            self.data_wr_next = 0;
            self.w_en_next = false;
            self.r_en_next = false;
            self.ack_out_next = false;
        } else {
            for (master, &granted) in self.ports.masters.iter().zip(&self.granted_next) {
                master.access_granted.write(granted);
            }
            let current = self.current_access.read() as usize;
            self.ports.masters[current].reply_out.write(self.reply_next);

            self.ports.data_wr.write(self.data_wr_next);
            self.ports.addr.write(self.addr_next);
            self.ports.w_en.write(self.w_en_next);
            self.ports.r_en.write(self.r_en_next);
            self.ports.ack_out.write(self.ack_out_next);

            self.current_access.write(self.counter_next);
        }
    }

    /// Decode the granted master's request into the staged Mem drive.
    fn at_request(&mut self) {
        self.addr_next = 0;
        self.w_en_next = false;
        self.r_en_next = false;
        self.data_wr_next = 0;

        let current = self.current_access.read() as usize;
        if !self.ports.masters[current].access_granted.read() {
            return;
        }

        let request = self.ports.masters[current].request_in.read();
        trace!("bus: master {} request {:?}", current, request);
        match request.op_type {
            MemOp::Read => {
                self.addr_next = request.addr;
                self.r_en_next = true;
            }
            MemOp::Write => {
                self.addr_next = request.addr;
                self.w_en_next = true;
                self.data_wr_next = request.data_wr;
            }
            MemOp::None => {}
        }
        self.request = request;
    }

    /// Compose the reply when the memory acknowledges a beat. Write
    /// replies echo the written byte so callers can compare reply data
    /// against what they sent.
    fn at_ack(&mut self) {
        if self.ports.ack_in.read() {
            self.reply_next = MemReply {
                master_id: self.request.master_id,
                op_type: self.request.op_type,
                status: MemStatus::Ok,
                addr: self.request.addr,
                data: match self.request.op_type {
                    MemOp::Read => self.ports.data_rd.read(),
                    MemOp::Write => self.request.data_wr,
                    MemOp::None => 0,
                },
            };
            self.ack_out_next = true;
        } else {
            self.ack_out_next = false;
        }
    }

    /// Grant-and-hold or advance.
    fn at_counter(&mut self) {
        let current = self.current_access.read() as usize;
        if self.ports.masters[current].access_request.read() {
            self.granted_next[current] = true;
            self.counter_next = current as u8;
        } else {
            self.granted_next[current] = false;
            self.counter_next = ((current + 1) % self.ports.masters.len()) as u8;
        }
    }
}
