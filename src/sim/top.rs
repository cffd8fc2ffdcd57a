//! Top-level elaboration and the host-side run flow.
//!
//! `NetzpTop` builds the whole accelerator — memory, controller, one
//! adapter per master, the in/out controller and the dispatch unit with
//! its cores — wires every signal, and drives an inference from the
//! outside: reset, load, wait for the writeback, pulse `start`, wait for
//! the dispatch unit, collect the outputs. Every wait is bounded by the
//! configured cycle cap; blowing it reports the stalled phase and the
//! head of memory.

use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use log::info;

use crate::base::{DataVector, Scheduler, Signal};
use crate::cdu::{CduPorts, CentralDispatchUnit};
use crate::io::{InOutController, InOutPorts};
use crate::mem::{
    MasterPorts, Mem, MemController, MemControllerPorts, MemIo, MemIoPorts, MemPorts, MemReply,
    MemRequest,
};
use crate::netz::bitmap::Bitmap;
use crate::netz::data::NetzwerkData;
use crate::sim::config::{
    Fp, CDU_MASTER_ID, INPUT_COUNT, IOC_MASTER_ID, MEM_MAX_CONNECTIONS, NetzpConfig,
};

pub struct NetzpTop {
    pub sched: Scheduler,
    config: NetzpConfig,

    pub rst: Signal<bool>,
    pub start: Signal<bool>,
    pub finished: Signal<bool>,
    pub pixels: Vec<Signal<bool>>,
    pub netz_data: Signal<NetzwerkData>,
    pub finished_writing: Signal<bool>,
    pub finished_reading: Signal<bool>,
    pub outputs: Signal<DataVector<Fp>>,

    pub mem: Arc<RwLock<Mem>>,
    pub cdu: Arc<RwLock<CentralDispatchUnit>>,
}

impl NetzpTop {
    pub fn new(config: &NetzpConfig) -> Self {
        let mut sched = Scheduler::new();

        let rst = sched.signal::<bool>("rst");
        let start = sched.signal::<bool>("start");

        // Mem and its port signals.
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

        // One master port set per bus connection: 0 = in/out controller,
        // 1 = dispatch unit.
        let mut masters = Vec::with_capacity(MEM_MAX_CONNECTIONS);
        let mut bus_sides = Vec::with_capacity(MEM_MAX_CONNECTIONS);
        for index in 0..MEM_MAX_CONNECTIONS {
            let access_request = sched.signal::<bool>(&format!("bus.m{index}.access_request"));
            let access_granted = sched.signal::<bool>(&format!("bus.m{index}.access_granted"));
            let request_in = sched.signal::<MemRequest>(&format!("bus.m{index}.request"));
            let reply_out = sched.signal::<MemReply>(&format!("bus.m{index}.reply"));
            masters.push(MasterPorts {
                access_request: access_request.clone(),
                access_granted: access_granted.clone(),
                request_in: request_in.clone(),
                reply_out: reply_out.clone(),
            });
            bus_sides.push((access_request, access_granted, request_in, reply_out));
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

        // Batch adapters, one per master.
        let ioc_requests = sched.signal::<DataVector<MemRequest>>("ioc.requests");
        let ioc_replies = sched.signal::<DataVector<MemReply>>("ioc.replies");
        let cdu_requests = sched.signal::<DataVector<MemRequest>>("cdu.requests");
        let cdu_replies = sched.signal::<DataVector<MemReply>>("cdu.replies");

        for (master_id, host_requests, host_replies) in [
            (IOC_MASTER_ID, &ioc_requests, &ioc_replies),
            (CDU_MASTER_ID, &cdu_requests, &cdu_replies),
        ] {
            let index = (master_id - 1) as usize;
            let (access_request, access_granted, request_in, reply_out) = &bus_sides[index];
            MemIo::instantiate(
                &mut sched,
                master_id,
                MemIoPorts {
                    rst: rst.clone(),
                    requests_in: host_requests.clone(),
                    replies_out: host_replies.clone(),
                    access_request: access_request.clone(),
                    access_granted: access_granted.clone(),
                    request_out: request_in.clone(),
                    reply_in: reply_out.clone(),
                },
            );
        }

        // User-side signals and the in/out controller.
        let pixels: Vec<Signal<bool>> = (0..INPUT_COUNT)
            .map(|index| sched.signal::<bool>(&format!("ioc.pixel{index}")))
            .collect();
        let netz_data = sched.signal::<NetzwerkData>("ioc.netz_data");
        let finished_writing = sched.signal::<bool>("ioc.finished_writing");
        let finished_reading = sched.signal::<bool>("ioc.finished_reading");
        let outputs = sched.signal::<DataVector<Fp>>("ioc.outputs");
        let finished = sched.signal::<bool>("cdu.finished");

        InOutController::instantiate(
            &mut sched,
            InOutPorts {
                rst: rst.clone(),
                data_inputs: pixels.clone(),
                netz_data: netz_data.clone(),
                got_output: finished.clone(),
                finished_writing: finished_writing.clone(),
                finished_reading: finished_reading.clone(),
                outputs: outputs.clone(),
                requests: ioc_requests,
                replies: ioc_replies,
            },
        );

        let cdu = CentralDispatchUnit::instantiate(
            &mut sched,
            config.core_count,
            CduPorts {
                rst: rst.clone(),
                start: start.clone(),
                finished: finished.clone(),
                mem_requests: cdu_requests,
                mem_replies: cdu_replies,
            },
        );

        info!(
            "netzp top elaborated: {} cores, timeout {} cycles",
            config.core_count, config.timeout
        );

        NetzpTop {
            sched,
            config: config.clone(),
            rst,
            start,
            finished,
            pixels,
            netz_data,
            finished_writing,
            finished_reading,
            outputs,
            mem,
            cdu,
        }
    }

    /// Pulse reset. User-side signals are zeroed while reset is high so
    /// that reloading the very same problem afterwards still registers as
    /// a change.
    pub fn reset(&mut self) {
        self.rst.write(true);
        self.start.write(false);
        for pixel in &self.pixels {
            pixel.write(false);
        }
        self.netz_data.write(NetzwerkData::default());
        self.sched.run(3);
        self.rst.write(false);
        self.sched.run(1);
    }

    pub fn load(&mut self, bitmap: &Bitmap, netz: &NetzwerkData) {
        for (signal, &pixel) in self.pixels.iter().zip(bitmap.iter()) {
            signal.write(pixel);
        }
        self.netz_data.write(netz.clone());
    }

    /// Tick until `signal` reads high, bounded by the configured cycle
    /// cap.
    pub fn run_until_high(&mut self, signal: &Signal<bool>, phase: &str) -> Result<()> {
        let start_cycle = self.sched.cycle();
        while !signal.read() {
            if self.sched.cycle() - start_cycle > self.config.timeout {
                let dump = self.mem.read().expect("lock poisoned").dump_span(0, 128);
                bail!(
                    "{} did not finish within {} cycles (cycle {}); memory head:\n{}",
                    phase,
                    self.config.timeout,
                    self.sched.cycle(),
                    dump
                );
            }
            self.sched.tick();
        }
        Ok(())
    }

    /// One full inference: reset, load, write back, dispatch, read back.
    pub fn run_inference(&mut self, bitmap: &Bitmap, netz: &NetzwerkData) -> Result<Vec<Fp>> {
        self.reset();
        self.load(bitmap, netz);

        let finished_writing = self.finished_writing.clone();
        self.run_until_high(&finished_writing, "problem writeback")?;

        self.start.write(true);
        let finished = self.finished.clone();
        self.run_until_high(&finished, "dispatch")?;
        self.start.write(false);

        let finished_reading = self.finished_reading.clone();
        self.run_until_high(&finished_reading, "output readback")?;

        Ok(self.outputs.read().data)
    }
}
