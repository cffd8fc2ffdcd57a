//! The memory fabric: the single-port byte memory, the arbitrating
//! controller and the per-master batch adapter, plus the request/reply
//! wire types they exchange.

pub mod controller;
pub mod memio;

use std::sync::{Arc, RwLock};

use crate::base::{Scheduler, Signal};
use crate::sim::config::MEMSIZE;

pub use controller::{MasterPorts, MemController, MemControllerPorts};
pub use memio::{MemIo, MemIoPorts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemOp {
    Read,
    Write,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemStatus {
    Ok,
    Error,
    #[default]
    None,
}

/// One beat from a master to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MemRequest {
    pub master_id: u8,
    pub op_type: MemOp,
    pub addr: u16,
    pub data_wr: u8,
}

/// One beat back from the bus. `addr` always equals the originating
/// request's address so a master can reassemble its reply stream; write
/// replies echo the written byte in `data`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MemReply {
    pub master_id: u8,
    pub op_type: MemOp,
    pub status: MemStatus,
    pub addr: u16,
    pub data: u8,
}

/// Read requests covering `len` consecutive bytes from `offset`.
pub fn read_span_requests(offset: u16, len: usize, master_id: u8) -> Vec<MemRequest> {
    (0..len)
        .map(|i| MemRequest {
            master_id,
            op_type: MemOp::Read,
            addr: offset + i as u16,
            data_wr: 0,
        })
        .collect()
}

/// Write requests placing `bytes` at consecutive addresses from `offset`.
pub fn write_span_requests(offset: u16, bytes: &[u8], master_id: u8) -> Vec<MemRequest> {
    bytes
        .iter()
        .enumerate()
        .map(|(i, &byte)| MemRequest {
            master_id,
            op_type: MemOp::Write,
            addr: offset + i as u16,
            data_wr: byte,
        })
        .collect()
}

/// The data bytes of a reply stream, in stream order.
pub fn replies_to_bytes(replies: &[MemReply]) -> Vec<u8> {
    replies.iter().map(|reply| reply.data).collect()
}

pub struct MemPorts {
    pub rst: Signal<bool>,
    pub data_wr: Signal<u8>,
    pub addr: Signal<u16>,
    pub w_en: Signal<bool>,
    pub r_en: Signal<bool>,
    /// Ack from the caller closing the handshake.
    pub ack_in: Signal<bool>,
    pub ack_out: Signal<bool>,
    pub data_rd: Signal<u8>,
}

/// Single-ported byte memory. A read or write is accepted on the edge
/// after its address and enable settle, acknowledged with `ack_out`, and
/// the handshake closes when the caller raises `ack_in`. Reads win over
/// simultaneous writes. An out-of-range address with an enable high
/// aborts the simulation.
pub struct Mem {
    cells: Vec<u8>,
    data_rd_next: u8,
    ack_next: bool,
    ports: MemPorts,
}

impl Mem {
    pub fn instantiate(sched: &mut Scheduler, ports: MemPorts) -> Arc<RwLock<Mem>> {
        Self::instantiate_with_size(sched, ports, MEMSIZE)
    }

    pub fn instantiate_with_size(
        sched: &mut Scheduler,
        ports: MemPorts,
        memsize: usize,
    ) -> Arc<RwLock<Mem>> {
        let access_sensitivity = [
            ports.data_wr.id(),
            ports.addr.id(),
            ports.w_en.id(),
            ports.r_en.id(),
        ];
        let ack_sensitivity = [ports.ack_in.id()];

        let me = Arc::new(RwLock::new(Mem {
            cells: vec![0; memsize],
            data_rd_next: 0,
            ack_next: false,
            ports,
        }));

        let m = Arc::clone(&me);
        sched.method_on_edge("mem.at_clk", move || {
            m.write().expect("lock poisoned").at_clk()
        });
        let m = Arc::clone(&me);
        sched.method("mem.mem_access", &access_sensitivity, move || {
            m.write().expect("lock poisoned").mem_access()
        });
        let m = Arc::clone(&me);
        sched.method("mem.at_ack", &ack_sensitivity, move || {
            m.write().expect("lock poisoned").at_ack()
        });

        me
    }

    fn at_clk(&mut self) {
        if self.ports.rst.read() {
            self.cells.fill(0);
            self.ports.ack_out.write(false);
            self.ports.data_rd.write(0);
        } else {
            if self.ports.r_en.read() {
                self.ports.data_rd.write(self.data_rd_next);
            }
            self.ports.ack_out.write(self.ack_next);
        }
    }

    fn mem_access(&mut self) {
        self.data_rd_next = 0;
        self.ack_next = false;

        let addr = self.ports.addr.read() as usize;
        let r_en = self.ports.r_en.read();
        let w_en = self.ports.w_en.read();

        if (r_en || w_en) && addr >= self.cells.len() {
            panic!(
                "memory access out of range: addr {:#06x}, memsize {:#06x}",
                addr,
                self.cells.len()
            );
        }

        if r_en {
            self.data_rd_next = self.cells[addr];
            self.ack_next = true;
        } else if w_en {
            self.cells[addr] = self.ports.data_wr.read();
            self.ack_next = true;
        }
    }

    fn at_ack(&mut self) {
        if self.ports.ack_in.read() {
            self.ack_next = false;
        }
    }

    /// Direct backdoor view, for testbenches and stall diagnostics.
    pub fn peek_span(&self, addr: u16, len: usize) -> Vec<u8> {
        self.cells[addr as usize..addr as usize + len].to_vec()
    }

    /// Hex dump of a span, 32 bytes per row in groups of two.
    pub fn dump_span(&self, addr: u16, len: usize) -> String {
        let mut out = String::new();
        for (row_index, row) in self.cells[addr as usize..addr as usize + len]
            .chunks(32)
            .enumerate()
        {
            out.push_str(&format!("{:#06x}: ", addr as usize + row_index * 32));
            for (column, byte) in row.iter().enumerate() {
                if column % 2 == 0 && column != 0 {
                    out.push(' ');
                }
                out.push_str(&format!("{byte:02x}"));
            }
            out.push('\n');
        }
        out
    }
}
