//! Per-master adapter between a batch-submitting host and the
//! one-beat-per-cycle bus.
//!
//! The host drops a whole `DataVector<MemRequest>` on its bundle signal;
//! the adapter walks it through the bus a beat at a time and hands back a
//! single `DataVector<MemReply>` once every beat is served. Replies
//! surface in request order.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use log::debug;

use crate::base::{DataVector, Scheduler, Signal};
use crate::mem::{MemReply, MemRequest};

pub struct MemIoPorts {
    pub rst: Signal<bool>,
    // Host side.
    pub requests_in: Signal<DataVector<MemRequest>>,
    pub replies_out: Signal<DataVector<MemReply>>,
    // Bus side.
    pub access_request: Signal<bool>,
    pub access_granted: Signal<bool>,
    pub request_out: Signal<MemRequest>,
    pub reply_in: Signal<MemReply>,
}

pub struct MemIo {
    master_id: u8,
    ports: MemIoPorts,
    requests_fifo: VecDeque<MemRequest>,
    replies_fifo: Vec<MemReply>,
    new_request: bool,
    new_reply: bool,
}

impl MemIo {
    pub fn instantiate(sched: &mut Scheduler, master_id: u8, ports: MemIoPorts) -> Arc<RwLock<Self>> {
        let request_sensitivity = [ports.requests_in.id()];
        let reply_sensitivity = [ports.reply_in.id()];

        let me = Arc::new(RwLock::new(MemIo {
            master_id,
            ports,
            requests_fifo: VecDeque::new(),
            replies_fifo: Vec::new(),
            new_request: false,
            new_reply: false,
        }));

        let io = Arc::clone(&me);
        sched.method(
            &format!("memio{master_id}.at_host_request"),
            &request_sensitivity,
            move || io.write().expect("lock poisoned").new_request = true,
        );
        let io = Arc::clone(&me);
        sched.method(
            &format!("memio{master_id}.at_bus_reply"),
            &reply_sensitivity,
            move || io.write().expect("lock poisoned").new_reply = true,
        );
        let io = Arc::clone(&me);
        sched.thread(&format!("memio{master_id}.main"), move || {
            io.write().expect("lock poisoned").resume()
        });

        me
    }

    fn resume(&mut self) {
        if self.ports.rst.read() {
            self.requests_fifo.clear();
            self.replies_fifo.clear();
            self.new_request = false;
            self.new_reply = false;
            self.ports.access_request.write(false);
            // Both held values go back to defaults: re-presenting the
            // same beat or republishing the same bundle after reset must
            // still be a change event.
            self.ports.request_out.write(MemRequest::default());
            self.ports.replies_out.write(DataVector::new());
            return;
        }

        if self.new_request {
            self.new_request = false;
            let bundle = self.ports.requests_in.read();
            if !bundle.is_empty() {
                debug!(
                    "memio{}: accepted batch of {} requests",
                    self.master_id,
                    bundle.len()
                );
                self.requests_fifo.extend(bundle.data);
                self.ports.access_request.write(true);
            }
        }

        if self.new_reply {
            self.new_reply = false;
            let reply = self.ports.reply_in.read();
            // The controller drives its last reply onto whichever master
            // the counter points at; only our own beats count.
            if reply.master_id == self.master_id && !self.requests_fifo.is_empty() {
                self.replies_fifo.push(reply);
                self.requests_fifo.pop_front();
            }
        }

        if let Some(front) = self.requests_fifo.front() {
            if self.ports.access_granted.read() {
                self.ports.request_out.write(*front);
            }
        } else if !self.replies_fifo.is_empty() {
            debug!(
                "memio{}: batch served, {} replies",
                self.master_id,
                self.replies_fifo.len()
            );
            let replies = std::mem::take(&mut self.replies_fifo);
            self.ports.replies_out.write(DataVector::from(replies));
            self.ports.access_request.write(false);
        }
    }
}
