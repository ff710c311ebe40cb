// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Hardware-visible frame structures.
//!
//! Three layers of indirection reach the accelerator:
//!
//! - [`SgEntry`]: one scatter/gather table entry (bus address + length).
//! - [`FlEntry`]: one frame-list entry; a pair of these (input at index 1,
//!   output at index 0, hardware convention) describes a whole job.
//! - [`Fd`]: the frame descriptor actually pushed onto a hardware queue. It
//!   references the bus-mapped frame-list pair and carries the flow-context
//!   address; on the response path hardware fills its status word.
//!
//! All structures match the hardware layout; sizes are checked at compile
//! time.

use bitflags::bitflags;

bitflags! {
    /// Frame-list / frame-descriptor format and control bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u32 {
        /// Entry references a scatter/gather table rather than one buffer.
        const SG_FORMAT = 1 << 0;
        /// Entry references a frame-list pair (outer descriptor only).
        const LIST_FORMAT = 1 << 1;
        /// Last entry of a table or list.
        const FINAL = 1 << 2;
    }
}

/// 16-byte scatter/gather table entry.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct SgEntry {
    /// Bus address of the segment.
    pub addr: u64,
    /// Segment length in bytes.
    pub len: u32,
    /// Control bits; only `FINAL` is meaningful in a table.
    pub flags: u32,
}

impl SgEntry {
    /// Create an entry for one mapped segment.
    #[inline]
    pub const fn new(addr: u64, len: u32) -> Self {
        Self { addr, len, flags: 0 }
    }

    /// Mark this entry as the last one of the table.
    #[inline]
    pub fn set_final(&mut self, last: bool) {
        if last {
            self.flags |= FrameFlags::FINAL.bits();
        } else {
            self.flags &= !FrameFlags::FINAL.bits();
        }
    }

    /// Whether this entry closes the table.
    #[inline]
    pub fn is_final(&self) -> bool {
        self.flags & FrameFlags::FINAL.bits() != 0
    }
}

/// 32-byte frame-list entry.
///
/// Two of these, bus-mapped back to back, describe a job: index 1 is the
/// input side, index 0 the output side.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct FlEntry {
    /// Bus address of a single buffer or of a scatter/gather table.
    pub addr: u64,
    /// Total data length covered by this side of the job.
    pub len: u32,
    /// Format and FINAL bits.
    pub flags: u32,
    /// Flow-context (flow descriptor) bus address, input entry only.
    pub flc: u64,
    reserved: u64,
}

impl FlEntry {
    /// Create a zeroed entry.
    #[inline]
    pub const fn new() -> Self {
        Self { addr: 0, len: 0, flags: 0, flc: 0, reserved: 0 }
    }

    #[inline]
    pub fn set_addr(&mut self, addr: u64) {
        self.addr = addr;
    }

    #[inline]
    pub fn set_len(&mut self, len: u32) {
        self.len = len;
    }

    /// Select single-buffer format (clears the table bit).
    #[inline]
    pub fn set_format_single(&mut self) {
        self.flags &= !FrameFlags::SG_FORMAT.bits();
    }

    /// Select scatter/gather table format.
    #[inline]
    pub fn set_format_sg(&mut self) {
        self.flags |= FrameFlags::SG_FORMAT.bits();
    }

    #[inline]
    pub fn is_sg(&self) -> bool {
        self.flags & FrameFlags::SG_FORMAT.bits() != 0
    }

    #[inline]
    pub fn set_final(&mut self, last: bool) {
        if last {
            self.flags |= FrameFlags::FINAL.bits();
        } else {
            self.flags &= !FrameFlags::FINAL.bits();
        }
    }

    /// Attach the flow-context address this job executes under.
    #[inline]
    pub fn set_flc(&mut self, flc: u64) {
        self.flc = flc;
    }

    /// Reset to the zeroed state for descriptor reuse.
    #[inline]
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

/// Index of the output frame-list entry.
pub const FL_OUT: usize = 0;
/// Index of the input frame-list entry.
pub const FL_IN: usize = 1;

/// Frame descriptor enqueued to (and returned by) a hardware queue.
///
/// The submission path fills `addr` with the bus address of the frame-list
/// pair; the response path carries the same address back, which is how a
/// completion is matched to its originating request. Hardware writes the
/// job status into `status`.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Fd {
    /// Bus address of the frame-list pair.
    pub addr: u64,
    /// Input length announced to hardware.
    pub len: u32,
    /// Format bits; jobs always use `LIST_FORMAT`.
    pub flags: u32,
    /// Flow-context bus address.
    pub flc: u64,
    /// Completion status word (response path only).
    pub status: u32,
    reserved: u32,
}

impl Fd {
    /// Create a zeroed frame descriptor.
    #[inline]
    pub const fn new() -> Self {
        Self { addr: 0, len: 0, flags: 0, flc: 0, status: 0, reserved: 0 }
    }

    #[inline]
    pub fn set_addr(&mut self, addr: u64) {
        self.addr = addr;
    }

    #[inline]
    pub fn set_len(&mut self, len: u32) {
        self.len = len;
    }

    #[inline]
    pub fn set_format_list(&mut self) {
        self.flags |= FrameFlags::LIST_FORMAT.bits();
    }

    #[inline]
    pub fn is_list(&self) -> bool {
        self.flags & FrameFlags::LIST_FORMAT.bits() != 0
    }

    #[inline]
    pub fn set_flc(&mut self, flc: u64) {
        self.flc = flc;
    }
}

// Compile-time size checks against the hardware layout.
const _: () = assert!(std::mem::size_of::<SgEntry>() == 16);
const _: () = assert!(std::mem::size_of::<FlEntry>() == 32);
const _: () = assert!(std::mem::size_of::<Fd>() == 32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(std::mem::size_of::<SgEntry>(), 16);
        assert_eq!(std::mem::size_of::<FlEntry>(), 32);
        assert_eq!(std::mem::size_of::<Fd>(), 32);
    }

    #[test]
    fn test_sg_final_bit() {
        let mut sg = SgEntry::new(0x1000, 64);
        assert!(!sg.is_final());
        sg.set_final(true);
        assert!(sg.is_final());
        sg.set_final(false);
        assert!(!sg.is_final());
    }

    #[test]
    fn test_fl_format_bits() {
        let mut fle = FlEntry::new();
        assert!(!fle.is_sg());
        fle.set_format_sg();
        assert!(fle.is_sg());
        fle.set_format_single();
        assert!(!fle.is_sg());

        // Format bits must not disturb FINAL.
        fle.set_final(true);
        fle.set_format_sg();
        assert!(fle.flags & FrameFlags::FINAL.bits() != 0);
    }

    #[test]
    fn test_fd_list_format() {
        let mut fd = Fd::new();
        assert!(!fd.is_list());
        fd.set_format_list();
        assert!(fd.is_list());
        fd.set_addr(0xdead_0000);
        fd.set_len(128);
        assert_eq!(fd.addr, 0xdead_0000);
        assert_eq!(fd.len, 128);
    }
}
