// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Job submission.
//!
//! One gatekeeper between a built descriptor and the hardware: check the
//! congestion state, stamp the flow context, map the frame-list pair, pick
//! the submitter-local queue, and enqueue with a bounded retry budget.

use log::{debug, warn};

use crate::engine::EngineCore;
use crate::error::QsaError;
use crate::frame::Fd;
use crate::pool::DescHandle;
use crate::queue::EnqueueBusy;

/// Proof that a job was handed to hardware; the outcome arrives strictly
/// later through the stored continuation.
#[derive(Debug)]
#[must_use = "completion arrives via the continuation; poll the engine"]
pub struct Pending;

/// Queue-full retry budget per submission, as a multiple of the queue count.
const RETRY_FACTOR: usize = 2;

/// Submit a built descriptor under the flow at `flow_bus`.
///
/// On failure the descriptor comes back to the caller for unwinding, with
/// the frame-list mapping (if any was made) already released:
/// - congested hardware drops the request untouched (`Busy`);
/// - a queue that stays full past the retry budget is `EnqueueFailed`.
pub fn submit_job(
    core: &EngineCore,
    flow_bus: u64,
    mut desc: DescHandle,
) -> Result<Pending, (DescHandle, QsaError)> {
    if core.backend.congestion().is_congested() {
        debug!("submission dropped: hardware congested");
        return Err((desc, QsaError::Busy));
    }

    desc.in_entry_mut().set_flc(flow_bus);
    let fd_bus = match desc.map_fd_pair(core.mapper.as_ref()) {
        Ok(bus) => bus,
        Err(e) => return Err((desc, e)),
    };

    let mut fd = Fd::new();
    fd.set_addr(fd_bus);
    fd.set_len(desc.in_entry().len);
    fd.set_format_list();
    fd.set_flc(flow_bus);

    let queue_id = current_cpu() % core.num_queues;
    let budget = RETRY_FACTOR * core.num_queues;

    // The descriptor leaves Rust ownership here; the response path adopts it
    // back via the bus address in the echoed frame descriptor.
    let ptr = desc.into_raw();
    let mut attempts = 0;
    loop {
        match core.backend.enqueue(queue_id, &fd) {
            Ok(()) => return Ok(Pending),
            Err(EnqueueBusy) => {
                attempts += 1;
                if attempts >= budget {
                    warn!("queue {queue_id} full after {attempts} attempts, dropping job");
                    let mut desc = unsafe { core.pool.adopt_raw(ptr) };
                    desc.unmap_fd_pair(core.mapper.as_ref());
                    return Err((desc, QsaError::EnqueueFailed));
                }
                std::hint::spin_loop();
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn current_cpu() -> usize {
    let cpu = unsafe { libc::sched_getcpu() };
    if cpu < 0 { 0 } else { cpu as usize }
}

#[cfg(not(target_os = "linux"))]
fn current_cpu() -> usize {
    0
}
