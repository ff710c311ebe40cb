// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Response-side poll engine.
//!
//! All teardown is centralized here: every completed job, successful or not,
//! goes through the same sequence of adopt descriptor, release every bus
//! mapping, return the block to the pool, decode the status word once, and
//! only then run the caller's continuation. Responses carry no ordering
//! guarantee; each one is matched to its request through the bus address
//! echoed in the frame descriptor.

use log::{error, warn};

use crate::edesc;
use crate::engine::EngineCore;
use crate::error::{decode_status, QsaError};
use crate::frame::Fd;
use crate::queue::DqStore;

/// Transient-busy pull retries before giving up on this poll invocation.
const PULL_RETRIES: usize = 100;

/// Drain up to `budget` completed jobs from `queue_id`'s response queue.
///
/// Returns the number of jobs cleaned. When the queue is drained under
/// budget the dequeue notification is rearmed so the external scheduler
/// wakes this queue again.
pub fn poll(core: &EngineCore, queue_id: usize, budget: usize) -> usize {
    let mut store = DqStore::new();
    let mut cleaned = 0;

    while cleaned < budget {
        store.clear();
        if !pull_with_retry(core, queue_id, &mut store) {
            return cleaned;
        }

        let mut batch = 0;
        let mut saw_last = false;
        while !saw_last {
            match store.next() {
                // Store drained mid-batch: hardware is still writing, pull
                // again.
                None => break,
                Some((entry, is_last)) => {
                    saw_last = is_last;
                    let Some(e) = entry else { continue };
                    process_response(core, &e.fd);
                    batch += 1;
                }
            }
        }
        cleaned += batch;

        if batch == 0 && saw_last {
            // Queue empty; hand wakeups back to the notification source.
            if let Err(e) = core.backend.rearm_notification(queue_id) {
                error!("queue {queue_id}: notification rearm failed: {e}");
            }
            return cleaned;
        }
    }
    cleaned
}

fn pull_with_retry(core: &EngineCore, queue_id: usize, store: &mut DqStore) -> bool {
    let mut tries = 0;
    loop {
        match core.backend.pull(queue_id, store) {
            Ok(()) => return true,
            Err(QsaError::Busy) => {
                tries += 1;
                if tries >= PULL_RETRIES {
                    warn!("queue {queue_id}: pull still busy after {tries} tries");
                    return false;
                }
                std::hint::spin_loop();
            }
            Err(e) => {
                error!("queue {queue_id}: pull failed: {e}");
                return false;
            }
        }
    }
}

/// Tear down one completed job and deliver its outcome.
fn process_response(core: &EngineCore, fd: &Fd) {
    let virt = core.mapper.bus_to_virt(fd.addr);
    let ptr = unsafe { edesc::from_fd_pair_virt(virt) };
    let mut desc = unsafe { core.pool.adopt_raw(ptr) };

    let status = fd.status;
    desc.unmap_fd_pair(core.mapper.as_ref());
    desc.unmap_all(core.mapper.as_ref());

    let result = decode_status(status);
    if let Err(e) = &result {
        warn!("job completed with error: {e}");
    }

    let continuation = desc.take_continuation();
    // The block is back in the pool before user code runs.
    drop(desc);
    if let Some(cont) = continuation {
        cont(result);
    }
}
