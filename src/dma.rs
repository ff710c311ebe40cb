// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! DMA resource management and bus-address translation.
//!
//! Hardware only understands bus addresses; the driver core works on virtual
//! addresses. [`DmaMapper`] is the translation service between the two and is
//! injected everywhere a mapping is made, so the core logic runs unmodified
//! against real IOMMU plumbing or the software mapper used in tests.
//!
//! Directionality rules are encoded here and nowhere else:
//! source buffers map `ToDevice`, destination buffers `FromDevice`, and a
//! buffer serving as both maps once as `Bidirectional`.
//!
//! Teardown is idempotent per resource: every mapping handle lives in an
//! `Option` and is `take`n on unmap, so a second teardown pass is a no-op and
//! resources that were never mapped are skipped.

use crate::error::{QsaError, QsaResult};

/// Transfer direction of a DMA mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDirection {
    /// Device reads the buffer (job source).
    ToDevice,
    /// Device writes the buffer (job destination).
    FromDevice,
    /// Device reads and writes the buffer (aliased source/destination).
    Bidirectional,
}

/// Bus-address translation service.
///
/// Implementations must be usable concurrently from the submission and
/// completion paths.
pub trait DmaMapper: Send + Sync {
    /// Map `len` bytes at virtual address `virt` for device access.
    ///
    /// Returns the bus address the device must use.
    fn map(&self, virt: u64, len: usize, dir: DmaDirection) -> QsaResult<u64>;

    /// Release a mapping previously returned by [`DmaMapper::map`].
    fn unmap(&self, bus: u64, len: usize, dir: DmaDirection);

    /// Translate a bus address from a hardware response back into the
    /// process's virtual address space.
    fn bus_to_virt(&self, bus: u64) -> u64;
}

/// One segment of a caller-provided scattered buffer, in virtual space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoSeg {
    /// Virtual address of the segment start.
    pub addr: u64,
    /// Segment length in bytes.
    pub len: usize,
}

impl IoSeg {
    /// Describe a slice as one segment.
    #[inline]
    pub fn from_slice(s: &[u8]) -> Self {
        Self { addr: s.as_ptr() as u64, len: s.len() }
    }

    /// Describe a mutable slice as one segment.
    #[inline]
    pub fn from_mut_slice(s: &mut [u8]) -> Self {
        Self { addr: s.as_mut_ptr() as u64, len: s.len() }
    }
}

/// Number of leading segments needed to cover `len` bytes.
///
/// Fails with [`QsaError::ShortBuffer`] when the list is too short.
pub fn seg_count_for_len(segs: &[IoSeg], len: usize) -> QsaResult<usize> {
    if len == 0 {
        return Ok(0);
    }
    let mut covered = 0usize;
    for (i, seg) in segs.iter().enumerate() {
        covered += seg.len;
        if covered >= len {
            return Ok(i + 1);
        }
    }
    Err(QsaError::ShortBuffer { needed: len, got: covered })
}

/// Advance a segment list by `offset` bytes, splitting the boundary segment.
///
/// Used by the TLS-record shape to skip the record header in the destination.
pub fn ffwd_segs(segs: &[IoSeg], offset: usize) -> QsaResult<Vec<IoSeg>> {
    let mut skip = offset;
    let mut out = Vec::new();
    for seg in segs {
        if skip >= seg.len {
            skip -= seg.len;
            continue;
        }
        if out.is_empty() {
            out.push(IoSeg { addr: seg.addr + skip as u64, len: seg.len - skip });
            skip = 0;
        } else {
            out.push(*seg);
        }
    }
    if out.is_empty() && offset > 0 {
        let total: usize = segs.iter().map(|s| s.len).sum();
        return Err(QsaError::ShortBuffer { needed: offset + 1, got: total });
    }
    Ok(out)
}

/// A single completed mapping.
#[derive(Debug, Clone, Copy)]
pub struct MappedSeg {
    pub bus: u64,
    pub len: usize,
    pub dir: DmaDirection,
}

/// A mapped scatter list: one bus mapping per segment, shared direction.
#[derive(Debug)]
pub struct SgMapping {
    pub segs: Vec<MappedSeg>,
    pub dir: DmaDirection,
}

impl SgMapping {
    /// Number of mapped segments.
    #[inline]
    pub fn count(&self) -> usize {
        self.segs.len()
    }

    /// Bus address of the first segment.
    #[inline]
    pub fn first_bus(&self) -> u64 {
        self.segs[0].bus
    }
}

/// Map one buffer for device access.
pub fn map_single(
    mapper: &dyn DmaMapper,
    virt: u64,
    len: usize,
    dir: DmaDirection,
) -> QsaResult<MappedSeg> {
    let bus = mapper.map(virt, len, dir)?;
    Ok(MappedSeg { bus, len, dir })
}

/// Map the first `count` segments of a scatter list.
///
/// On a mid-list failure every segment mapped so far is released before the
/// error is returned.
pub fn map_segments(
    mapper: &dyn DmaMapper,
    segs: &[IoSeg],
    count: usize,
    dir: DmaDirection,
) -> QsaResult<SgMapping> {
    let mut mapped = Vec::with_capacity(count);
    for seg in &segs[..count] {
        match mapper.map(seg.addr, seg.len, dir) {
            Ok(bus) => mapped.push(MappedSeg { bus, len: seg.len, dir }),
            Err(e) => {
                for m in &mapped {
                    mapper.unmap(m.bus, m.len, m.dir);
                }
                return Err(e);
            }
        }
    }
    Ok(SgMapping { segs: mapped, dir })
}

/// Release one mapping, if present. Idempotent.
pub fn unmap_seg(mapper: &dyn DmaMapper, slot: &mut Option<MappedSeg>) {
    if let Some(m) = slot.take() {
        mapper.unmap(m.bus, m.len, m.dir);
    }
}

/// Release a mapped scatter list, if present. Idempotent.
pub fn unmap_sg(mapper: &dyn DmaMapper, slot: &mut Option<SgMapping>) {
    if let Some(sg) = slot.take() {
        for m in &sg.segs {
            mapper.unmap(m.bus, m.len, m.dir);
        }
    }
}
