// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Fixed-capacity request-descriptor cache.
//!
//! Descriptors are allocated once at pool creation; the hot path only moves
//! blocks between the free list and callers. While a job is in flight the
//! descriptor leaves Rust ownership entirely ([`DescHandle::into_raw`]): the
//! hardware response carries its bus address, and the completion path adopts
//! it back ([`DescPool::adopt_raw`]). No two in-flight jobs ever share a
//! block.

use std::sync::{Arc, Mutex};

use crate::edesc::RequestDescriptor;
use crate::error::{QsaError, QsaResult};

/// Shared free-list of request descriptors.
pub struct DescPool {
    free: Mutex<Vec<Box<RequestDescriptor>>>,
    capacity: usize,
}

impl DescPool {
    /// Allocate `capacity` descriptors up front.
    pub fn new(capacity: usize) -> Arc<Self> {
        let mut free = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            free.push(Box::new(RequestDescriptor::new()));
        }
        Arc::new(Self { free: Mutex::new(free), capacity })
    }

    /// Total number of blocks the pool owns.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocks currently available.
    pub fn available(&self) -> usize {
        self.free.lock().unwrap().len()
    }

    /// Take a descriptor off the free list.
    ///
    /// Never allocates; an empty pool is [`QsaError::ResourceExhausted`].
    pub fn acquire(self: &Arc<Self>) -> QsaResult<DescHandle> {
        let mut free = self.free.lock().unwrap();
        match free.pop() {
            Some(desc) => Ok(DescHandle { desc: Some(desc), pool: Arc::clone(self) }),
            None => Err(QsaError::ResourceExhausted("descriptor pool empty")),
        }
    }

    /// Re-adopt a descriptor previously released to hardware flight.
    ///
    /// # Safety
    /// `ptr` must come from [`DescHandle::into_raw`] and must not have been
    /// adopted already.
    pub unsafe fn adopt_raw(self: &Arc<Self>, ptr: *mut RequestDescriptor) -> DescHandle {
        DescHandle { desc: Some(Box::from_raw(ptr)), pool: Arc::clone(self) }
    }

    fn release(&self, mut desc: Box<RequestDescriptor>) {
        desc.reset();
        self.free.lock().unwrap().push(desc);
    }
}

impl std::fmt::Debug for DescPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescPool")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}

/// Exclusive loan of one pool block. Dropping returns it to the pool.
pub struct DescHandle {
    desc: Option<Box<RequestDescriptor>>,
    pool: Arc<DescPool>,
}

impl DescHandle {
    /// Release the descriptor into hardware flight.
    ///
    /// Ownership now rests with the device; the pointer round-trips through
    /// the response's bus address and [`DescPool::adopt_raw`].
    pub fn into_raw(mut self) -> *mut RequestDescriptor {
        let desc = self.desc.take().unwrap();
        Box::into_raw(desc)
    }
}

impl std::ops::Deref for DescHandle {
    type Target = RequestDescriptor;
    fn deref(&self) -> &RequestDescriptor {
        self.desc.as_ref().unwrap()
    }
}

impl std::ops::DerefMut for DescHandle {
    fn deref_mut(&mut self) -> &mut RequestDescriptor {
        self.desc.as_mut().unwrap()
    }
}

impl Drop for DescHandle {
    fn drop(&mut self) {
        if let Some(desc) = self.desc.take() {
            self.pool.release(desc);
        }
    }
}

impl std::fmt::Debug for DescHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescHandle").field("live", &self.desc.is_some()).finish()
    }
}
