// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Hardware queue collaborator interface.
//!
//! The crate never touches queue registers itself; a [`QueueBackend`]
//! implementation owns the transport. Responses arrive in batches through a
//! [`DqStore`], token by token: an empty token that is not marked last means
//! the hardware is still writing the batch and the consumer must keep
//! polling.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{QsaError, QsaResult};
use crate::frame::Fd;

/// Response batch capacity.
pub const STORE_SIZE: usize = 16;

/// Transient queue-full indication on enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueBusy;

/// One dequeued response.
#[derive(Debug, Clone, Copy)]
pub struct DqEntry {
    /// Frame descriptor echoed by hardware; `addr` identifies the request,
    /// `status` carries the job outcome.
    pub fd: Fd,
}

/// One pull token: an entry, or an in-progress marker when `entry` is `None`
/// and `is_last` is unset.
#[derive(Debug, Clone, Copy)]
pub struct DqToken {
    pub entry: Option<DqEntry>,
    pub is_last: bool,
}

/// Fixed-capacity response batch, refilled by [`QueueBackend::pull`] and
/// drained by the completion engine.
pub struct DqStore {
    tokens: [DqToken; STORE_SIZE],
    len: usize,
    pos: usize,
}

impl DqStore {
    pub fn new() -> Self {
        Self {
            tokens: [DqToken { entry: None, is_last: false }; STORE_SIZE],
            len: 0,
            pos: 0,
        }
    }

    /// Discard any unconsumed tokens before a refill.
    pub fn clear(&mut self) {
        self.len = 0;
        self.pos = 0;
    }

    /// Backend side: append one token. Returns `false` when full.
    pub fn push(&mut self, token: DqToken) -> bool {
        if self.len == STORE_SIZE {
            return false;
        }
        self.tokens[self.len] = token;
        self.len += 1;
        true
    }

    /// Consumer side: yield the next `(entry, is_last)` token.
    pub fn next(&mut self) -> Option<(Option<DqEntry>, bool)> {
        if self.pos == self.len {
            return None;
        }
        let t = self.tokens[self.pos];
        self.pos += 1;
        Some((t.entry, t.is_last))
    }
}

impl Default for DqStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue transport owned by the platform integration.
pub trait QueueBackend: Send + Sync {
    /// Number of independent submission/response queue pairs.
    fn num_queues(&self) -> usize;

    /// Push one frame descriptor onto a submission queue.
    fn enqueue(&self, queue_id: usize, fd: &Fd) -> Result<(), EnqueueBusy>;

    /// Pull a response batch for `queue_id` into `store`.
    ///
    /// `Err(Busy)` is transient and retried by the completion engine.
    fn pull(&self, queue_id: usize, store: &mut DqStore) -> QsaResult<()>;

    /// Re-enable the dequeue-available notification after a drained poll.
    fn rearm_notification(&self, queue_id: usize) -> QsaResult<()>;

    /// Congestion state region for this device, written by the transport and
    /// read before every submission.
    fn congestion(&self) -> &CongestionState;
}

/// Congestion enter/exit thresholds; entering strictly above exiting gives
/// the hysteresis band.
#[derive(Debug, Clone, Copy)]
pub struct CongestionThresholds {
    pub enter: usize,
    pub exit: usize,
}

impl CongestionThresholds {
    pub fn new(enter: usize, exit: usize) -> QsaResult<Self> {
        if enter <= exit {
            return Err(QsaError::InvalidArgument(format!(
                "congestion enter threshold {enter} must exceed exit threshold {exit}"
            )));
        }
        Ok(Self { enter, exit })
    }
}

const CONGESTED_BIT: u32 = 1;

/// Congestion state word, written by the backend and read on every
/// submission.
pub struct CongestionState {
    word: AtomicU32,
}

impl CongestionState {
    pub fn new() -> Self {
        Self { word: AtomicU32::new(0) }
    }

    /// Submission-path check. Acquire pairs with the backend's Release store.
    #[inline]
    pub fn is_congested(&self) -> bool {
        self.word.load(Ordering::Acquire) & CONGESTED_BIT != 0
    }

    /// Backend side: flip the congested bit.
    pub fn set_congested(&self, congested: bool) {
        if congested {
            self.word.fetch_or(CONGESTED_BIT, Ordering::Release);
        } else {
            self.word.fetch_and(!CONGESTED_BIT, Ordering::Release);
        }
    }
}

impl Default for CongestionState {
    fn default() -> Self {
        Self::new()
    }
}
