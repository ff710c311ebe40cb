// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Request descriptor construction.
//!
//! A [`RequestDescriptor`] aggregates everything one job needs while in
//! flight: the frame-list pair handed to hardware, the scatter/gather table,
//! the individually mapped associated-data length word, every bus-mapping
//! handle, and the caller's completion continuation.
//!
//! All job shapes share one build scaffold ([`build_job`]) parameterized by
//! [`Shape`]; the shape selects span arithmetic, table layout, and the
//! direction of the IV mapping. Any failure mid-build rolls back exactly the
//! mappings made so far and leaves the descriptor reusable.

use crate::dma::{
    ffwd_segs, map_segments, map_single, seg_count_for_len, unmap_seg, unmap_sg, DmaDirection,
    DmaMapper, IoSeg, MappedSeg, SgMapping,
};
use crate::error::{QsaError, QsaResult};
use crate::flow::OpKind;
use crate::frame::{FlEntry, SgEntry, FL_IN, FL_OUT};

/// Nominal pool block size; the descriptor must fit one block.
pub const CACHE_BLOCK_SIZE: usize = 768;
/// Scatter/gather table ceiling for AEAD and TLS-record jobs.
pub const MAX_AEAD_SG: usize = 16;
/// Scatter/gather table ceiling for plain block-cipher jobs.
pub const MAX_CIPHER_SG: usize = 18;

const SG_ENTRY_BYTES: usize = std::mem::size_of::<SgEntry>();
const FD_PAIR_BYTES: usize = 2 * std::mem::size_of::<FlEntry>();

/// Completion continuation. Receives the decoded job outcome exactly once.
pub type Continuation = Box<dyn FnOnce(QsaResult<()>) + Send>;

/// Job shape selecting the build arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Authenticated encryption: assoc data + payload, tag appended/verified.
    Aead,
    /// Plain block cipher with caller-provided IV.
    BlockCipher,
    /// Block cipher where hardware generates the IV and emits it before the
    /// ciphertext.
    BlockCipherGivIv,
    /// TLS record: like AEAD but the encrypt side pads the tag to the next
    /// cipher-block boundary and the destination skips the record header.
    TlsRecord,
}

/// Caller-visible geometry of one job.
#[derive(Debug, Clone, Copy)]
pub struct JobRequest<'a> {
    /// Source scatter list.
    pub src: &'a [IoSeg],
    /// Destination scatter list; `None` aliases the source.
    pub dst: Option<&'a [IoSeg]>,
    /// IV buffer (address + IV size).
    pub iv: IoSeg,
    /// Associated-data length (AEAD/TLS shapes).
    pub assoclen: usize,
    /// Payload length.
    pub cryptlen: usize,
    /// Authentication tag length (AEAD/TLS shapes).
    pub authsize: usize,
    /// Cipher block size (TLS padding arithmetic).
    pub blocksize: usize,
}

/// Bytes of padding a TLS record adds so tag + padding reach the next
/// cipher-block boundary. Always at least one byte.
#[inline]
pub fn tls_pad_len(cryptlen: usize, authsize: usize, blocksize: usize) -> usize {
    blocksize - ((cryptlen + authsize) % blocksize)
}

/// Everything one in-flight job owns.
///
/// The frame-list pair is the first field of the `#[repr(C)]` layout, so the
/// bus address carried by the hardware response translates directly back to
/// the descriptor.
#[repr(C)]
pub struct RequestDescriptor {
    fd_flt: [FlEntry; 2],
    sg_table: [SgEntry; MAX_CIPHER_SG],
    assoclen_word: u32,
    _hw_pad: u32,
    fd_flt_map: Option<MappedSeg>,
    src_map: Option<SgMapping>,
    dst_map: Option<SgMapping>,
    iv_map: Option<MappedSeg>,
    assoc_map: Option<MappedSeg>,
    table_map: Option<MappedSeg>,
    sg_count: usize,
    op: Option<OpKind>,
    continuation: Option<Continuation>,
}

// One descriptor per pool block.
const _: () = assert!(std::mem::size_of::<RequestDescriptor>() <= CACHE_BLOCK_SIZE);

impl RequestDescriptor {
    /// Create a zeroed descriptor.
    pub fn new() -> Self {
        Self {
            fd_flt: [FlEntry::new(); 2],
            sg_table: [SgEntry::new(0, 0); MAX_CIPHER_SG],
            assoclen_word: 0,
            _hw_pad: 0,
            fd_flt_map: None,
            src_map: None,
            dst_map: None,
            iv_map: None,
            assoc_map: None,
            table_map: None,
            sg_count: 0,
            op: None,
            continuation: None,
        }
    }

    /// Virtual address of the frame-list pair.
    #[inline]
    pub fn fd_pair_virt(&self) -> u64 {
        self.fd_flt.as_ptr() as u64
    }

    /// Input frame-list entry.
    #[inline]
    pub fn in_entry(&self) -> &FlEntry {
        &self.fd_flt[FL_IN]
    }

    /// Input frame-list entry, mutable.
    #[inline]
    pub fn in_entry_mut(&mut self) -> &mut FlEntry {
        &mut self.fd_flt[FL_IN]
    }

    /// Output frame-list entry.
    #[inline]
    pub fn out_entry(&self) -> &FlEntry {
        &self.fd_flt[FL_OUT]
    }

    /// Output frame-list entry, mutable.
    #[inline]
    pub fn out_entry_mut(&mut self) -> &mut FlEntry {
        &mut self.fd_flt[FL_OUT]
    }

    /// Scatter/gather table entries currently in use.
    #[inline]
    pub fn table_entries(&self) -> usize {
        self.sg_count
    }

    /// Scatter/gather table contents (test inspection).
    #[inline]
    pub fn table(&self) -> &[SgEntry] {
        &self.sg_table[..self.sg_count]
    }

    /// Map the frame-list pair for enqueue. Hardware reads it on the request
    /// path and echoes its address on the response path.
    pub fn map_fd_pair(&mut self, mapper: &dyn DmaMapper) -> QsaResult<u64> {
        let m = map_single(
            mapper,
            self.fd_pair_virt(),
            FD_PAIR_BYTES,
            DmaDirection::Bidirectional,
        )?;
        let bus = m.bus;
        self.fd_flt_map = Some(m);
        Ok(bus)
    }

    /// Release the frame-list pair mapping. Idempotent.
    pub fn unmap_fd_pair(&mut self, mapper: &dyn DmaMapper) {
        unmap_seg(mapper, &mut self.fd_flt_map);
    }

    /// Release every mapping this descriptor holds. Idempotent: each handle
    /// lives in an `Option` and is taken on release, so the error unwind and
    /// the completion teardown can both call this safely.
    pub fn unmap_all(&mut self, mapper: &dyn DmaMapper) {
        unmap_seg(mapper, &mut self.table_map);
        unmap_seg(mapper, &mut self.assoc_map);
        unmap_seg(mapper, &mut self.iv_map);
        unmap_sg(mapper, &mut self.src_map);
        unmap_sg(mapper, &mut self.dst_map);
        unmap_seg(mapper, &mut self.fd_flt_map);
    }

    /// Reset hardware-visible state for reuse. Mappings must already have
    /// been released.
    pub fn reset(&mut self) {
        debug_assert!(self.fd_flt_map.is_none() && self.table_map.is_none());
        self.fd_flt[FL_OUT].clear();
        self.fd_flt[FL_IN].clear();
        self.sg_count = 0;
        self.assoclen_word = 0;
        self.op = None;
        self.continuation = None;
    }

    /// Attach the completion continuation and the operation kind.
    pub fn arm(&mut self, op: OpKind, cont: Continuation) {
        self.op = Some(op);
        self.continuation = Some(cont);
    }

    /// Operation kind this descriptor was built for.
    #[inline]
    pub fn op(&self) -> Option<OpKind> {
        self.op
    }

    /// Take the continuation for invocation. Returns `None` on a second call.
    #[inline]
    pub fn take_continuation(&mut self) -> Option<Continuation> {
        self.continuation.take()
    }
}

impl Default for RequestDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("sg_count", &self.sg_count)
            .field("op", &self.op)
            .field("mapped", &self.fd_flt_map.is_some())
            .finish()
    }
}

/// Recover the descriptor from the virtual address of its frame-list pair.
///
/// # Safety
/// `virt` must be an address previously produced by
/// [`RequestDescriptor::fd_pair_virt`] on a descriptor that is still in
/// flight (owned by hardware, not by the pool).
pub unsafe fn from_fd_pair_virt(virt: u64) -> *mut RequestDescriptor {
    virt as *mut RequestDescriptor
}

/// Advance a mapped scatter list by `skip` bytes at bus level.
fn ffwd_mapped(segs: &[MappedSeg], skip: usize) -> Vec<(u64, usize)> {
    let mut skip = skip;
    let mut out = Vec::new();
    for m in segs {
        if skip >= m.len {
            skip -= m.len;
            continue;
        }
        out.push((m.bus + skip as u64, m.len - skip));
        skip = 0;
    }
    out
}

struct SpanPlan {
    src_span: usize,
    dst_span: usize,
    in_len: usize,
    out_len: usize,
    max_sg: usize,
}

fn plan_spans(shape: Shape, op: OpKind, req: &JobRequest<'_>, aliased: bool) -> SpanPlan {
    let encrypt = matches!(op, OpKind::Encrypt | OpKind::GivEncrypt);
    let ivsize = req.iv.len;
    match shape {
        Shape::Aead => {
            let base = req.assoclen + req.cryptlen;
            let dst_span = if encrypt { base + req.authsize } else { base - req.authsize };
            let src_span = if aliased {
                // Aliased buffers must cover the larger of the two spans.
                if encrypt { base + req.authsize } else { base }
            } else {
                base
            };
            SpanPlan {
                src_span,
                dst_span,
                in_len: 4 + ivsize + base,
                out_len: dst_span,
                max_sg: MAX_AEAD_SG,
            }
        }
        Shape::BlockCipher => SpanPlan {
            src_span: req.cryptlen,
            dst_span: req.cryptlen,
            in_len: ivsize + req.cryptlen,
            out_len: req.cryptlen,
            max_sg: MAX_CIPHER_SG,
        },
        Shape::BlockCipherGivIv => SpanPlan {
            src_span: req.cryptlen,
            dst_span: req.cryptlen,
            in_len: req.cryptlen,
            out_len: ivsize + req.cryptlen,
            max_sg: MAX_CIPHER_SG,
        },
        Shape::TlsRecord => {
            let pad = tls_pad_len(req.cryptlen, req.authsize, req.blocksize);
            let dst_span = if encrypt {
                req.cryptlen + req.authsize + pad
            } else {
                req.cryptlen
            };
            let src_span = if aliased {
                req.assoclen + req.cryptlen + if encrypt { req.authsize + pad } else { 0 }
            } else {
                req.assoclen + req.cryptlen
            };
            SpanPlan {
                src_span,
                dst_span,
                in_len: req.iv.len + req.assoclen + req.cryptlen,
                out_len: dst_span,
                max_sg: MAX_AEAD_SG,
            }
        }
    }
}

/// Build one job into `desc`.
///
/// Maps every referenced buffer, lays out the scatter/gather table when the
/// geometry needs one, and fills the frame-list pair. On error every mapping
/// made so far is released and the descriptor is left reusable; on success
/// all buffers stay mapped until completion teardown.
pub fn build_job(
    desc: &mut RequestDescriptor,
    mapper: &dyn DmaMapper,
    shape: Shape,
    op: OpKind,
    req: &JobRequest<'_>,
) -> QsaResult<()> {
    if matches!(shape, Shape::Aead | Shape::TlsRecord) && req.authsize == 0 {
        return Err(QsaError::InvalidArgument("authsize must be non-zero".into()));
    }
    if shape == Shape::TlsRecord && req.blocksize == 0 {
        return Err(QsaError::InvalidArgument("blocksize must be non-zero".into()));
    }

    let aliased = req.dst.is_none();
    let plan = plan_spans(shape, op, req, aliased);
    if plan.src_span == 0 {
        return Err(QsaError::InvalidArgument("empty job".into()));
    }
    let ivsize = req.iv.len;

    // Unwind every mapping made so far if any later step fails.
    let mut guard = scopeguard::guard(desc, |d| d.unmap_all(mapper));
    let d: &mut RequestDescriptor = &mut **guard;

    // Source (and destination) buffer mappings. Aliased destination means a
    // single bidirectional mapping of the source list.
    if aliased {
        let n = seg_count_for_len(req.src, plan.src_span)?;
        d.src_map = Some(map_segments(mapper, req.src, n, DmaDirection::Bidirectional)?);
    } else {
        let n_src = seg_count_for_len(req.src, plan.src_span)?;
        d.src_map = Some(map_segments(mapper, req.src, n_src, DmaDirection::ToDevice)?);
        let dst = req.dst.unwrap();
        if shape == Shape::TlsRecord {
            // The destination starts past the record header.
            let fwd = ffwd_segs(dst, req.assoclen)?;
            let n_dst = seg_count_for_len(&fwd, plan.dst_span)?;
            d.dst_map = Some(map_segments(mapper, &fwd, n_dst, DmaDirection::FromDevice)?);
        } else {
            let n_dst = seg_count_for_len(dst, plan.dst_span)?;
            d.dst_map = Some(map_segments(mapper, dst, n_dst, DmaDirection::FromDevice)?);
        }
    }

    // IV: device input, except GivIv where hardware writes the generated IV.
    if ivsize != 0 {
        let dir = if shape == Shape::BlockCipherGivIv {
            DmaDirection::FromDevice
        } else {
            DmaDirection::ToDevice
        };
        d.iv_map = Some(map_single(mapper, req.iv.addr, ivsize, dir)?);
    }

    // Associated-data length word, mapped individually (AEAD only).
    if shape == Shape::Aead {
        d.assoclen_word = req.assoclen as u32;
        let addr = std::ptr::addr_of!(d.assoclen_word) as u64;
        d.assoc_map = Some(map_single(mapper, addr, 4, DmaDirection::ToDevice)?);
    }

    let src_n = d.src_map.as_ref().map_or(0, SgMapping::count);
    let dst_n = d.dst_map.as_ref().map_or(0, SgMapping::count);

    // Contiguity fast paths skip the table entirely.
    match shape {
        Shape::BlockCipher => {
            let iv_bus = d.iv_map.as_ref().map(|m| m.bus);
            let src_bus = d.src_map.as_ref().unwrap().first_bus();
            let in_contig = src_n == 1
                && iv_bus.is_some_and(|b| b + ivsize as u64 == src_bus);
            let out_single = if aliased { src_n == 1 } else { dst_n == 1 };
            if in_contig && out_single {
                let out_bus = if aliased {
                    src_bus
                } else {
                    d.dst_map.as_ref().unwrap().first_bus()
                };
                fill_fl_single(&mut d.fd_flt[FL_IN], iv_bus.unwrap(), plan.in_len, true);
                fill_fl_single(&mut d.fd_flt[FL_OUT], out_bus, plan.out_len, false);
                d.op = Some(op);
                let _ = scopeguard::ScopeGuard::into_inner(guard);
                return Ok(());
            }
        }
        Shape::BlockCipherGivIv => {
            let iv_bus = d.iv_map.as_ref().map(|m| m.bus);
            let out_first = if aliased {
                d.src_map.as_ref().unwrap().first_bus()
            } else if dst_n > 0 {
                d.dst_map.as_ref().unwrap().first_bus()
            } else {
                0
            };
            let out_single = if aliased { src_n == 1 } else { dst_n == 1 };
            let out_contig =
                out_single && iv_bus.is_some_and(|b| b + ivsize as u64 == out_first);
            if src_n == 1 && out_contig {
                let src_bus = d.src_map.as_ref().unwrap().first_bus();
                fill_fl_single(&mut d.fd_flt[FL_IN], src_bus, plan.in_len, true);
                fill_fl_single(&mut d.fd_flt[FL_OUT], iv_bus.unwrap(), plan.out_len, false);
                d.op = Some(op);
                let _ = scopeguard::ScopeGuard::into_inner(guard);
                return Ok(());
            }
        }
        _ => {}
    }

    // Entry budget for the general table path, checked before anything
    // hardware-visible is written.
    let has_assoc = shape == Shape::Aead;
    let input_iv = ivsize != 0 && shape != Shape::BlockCipherGivIv;
    let in_entries = usize::from(has_assoc) + usize::from(input_iv) + src_n;
    let out_extra = out_table_entries(shape, aliased, src_n, dst_n, ivsize, d, req);
    let total = in_entries + out_extra;
    if total > plan.max_sg {
        return Err(QsaError::TooManySegments { needed: total, max: plan.max_sg });
    }

    // Input region: {assoclen word, IV, source segments}, final on the last.
    let mut idx = 0;
    if has_assoc {
        d.sg_table[idx] = SgEntry::new(d.assoc_map.as_ref().unwrap().bus, 4);
        idx += 1;
    }
    if input_iv {
        d.sg_table[idx] = SgEntry::new(d.iv_map.as_ref().unwrap().bus, ivsize as u32);
        idx += 1;
    }
    for m in &d.src_map.as_ref().unwrap().segs {
        d.sg_table[idx] = SgEntry::new(m.bus, m.len as u32);
        idx += 1;
    }
    d.sg_table[idx - 1].set_final(true);
    let out_start = idx;

    // Output region, appended when the output cannot reuse the input region
    // or a single buffer.
    enum OutRef {
        Single(u64),
        TableAt(usize),
    }
    let out_ref;
    match shape {
        Shape::BlockCipherGivIv => {
            // Output is always {IV slot, destination segments}.
            d.sg_table[idx] =
                SgEntry::new(d.iv_map.as_ref().unwrap().bus, ivsize as u32);
            idx += 1;
            let segs: Vec<(u64, usize)> = if aliased {
                d.src_map.as_ref().unwrap().segs.iter().map(|m| (m.bus, m.len)).collect()
            } else {
                d.dst_map.as_ref().unwrap().segs.iter().map(|m| (m.bus, m.len)).collect()
            };
            for (bus, len) in segs {
                d.sg_table[idx] = SgEntry::new(bus, len as u32);
                idx += 1;
            }
            d.sg_table[idx - 1].set_final(true);
            out_ref = OutRef::TableAt(out_start);
        }
        Shape::TlsRecord if aliased => {
            // Point past the record header within the aliased mapping.
            let fwd = ffwd_mapped(&d.src_map.as_ref().unwrap().segs, req.assoclen);
            if fwd.is_empty() {
                return Err(QsaError::ShortBuffer {
                    needed: req.assoclen + 1,
                    got: req.assoclen,
                });
            }
            if fwd.len() == 1 {
                out_ref = OutRef::Single(fwd[0].0);
            } else {
                for (bus, len) in &fwd {
                    d.sg_table[idx] = SgEntry::new(*bus, *len as u32);
                    idx += 1;
                }
                d.sg_table[idx - 1].set_final(true);
                out_ref = OutRef::TableAt(out_start);
            }
        }
        _ if aliased => {
            if src_n == 1 {
                out_ref = OutRef::Single(d.src_map.as_ref().unwrap().first_bus());
            } else {
                // Reuse the input region's source entries.
                out_ref = OutRef::TableAt(usize::from(has_assoc) + usize::from(input_iv));
            }
        }
        _ => {
            if dst_n == 1 {
                out_ref = OutRef::Single(d.dst_map.as_ref().unwrap().first_bus());
            } else {
                for i in 0..dst_n {
                    let m = d.dst_map.as_ref().unwrap().segs[i];
                    d.sg_table[idx] = SgEntry::new(m.bus, m.len as u32);
                    idx += 1;
                }
                d.sg_table[idx - 1].set_final(true);
                out_ref = OutRef::TableAt(out_start);
            }
        }
    }
    d.sg_count = idx;

    // Map the table itself, then fill the frame-list pair.
    let table_virt = d.sg_table.as_ptr() as u64;
    d.table_map = Some(map_single(
        mapper,
        table_virt,
        idx * SG_ENTRY_BYTES,
        DmaDirection::ToDevice,
    )?);
    let table_bus = d.table_map.as_ref().unwrap().bus;

    fill_fl_sg(&mut d.fd_flt[FL_IN], table_bus, plan.in_len, true);
    match out_ref {
        OutRef::Single(bus) => fill_fl_single(&mut d.fd_flt[FL_OUT], bus, plan.out_len, false),
        OutRef::TableAt(entry) => fill_fl_sg(
            &mut d.fd_flt[FL_OUT],
            table_bus + (entry * SG_ENTRY_BYTES) as u64,
            plan.out_len,
            false,
        ),
    }

    d.op = Some(op);
    let _ = scopeguard::ScopeGuard::into_inner(guard);
    Ok(())
}

/// Build a one-shot transfer job: one contiguous input buffer, one
/// contiguous output buffer, no scatter/gather table. Used for key-derivation
/// jobs where the flow program does all the work.
pub fn build_transfer_job(
    desc: &mut RequestDescriptor,
    mapper: &dyn DmaMapper,
    src: IoSeg,
    dst: IoSeg,
) -> QsaResult<()> {
    if src.len == 0 || dst.len == 0 {
        return Err(QsaError::InvalidArgument("empty transfer job".into()));
    }
    let mut guard = scopeguard::guard(desc, |d| d.unmap_all(mapper));
    let d: &mut RequestDescriptor = &mut **guard;
    d.src_map = Some(map_segments(mapper, &[src], 1, DmaDirection::ToDevice)?);
    d.dst_map = Some(map_segments(mapper, &[dst], 1, DmaDirection::FromDevice)?);
    let src_bus = d.src_map.as_ref().unwrap().first_bus();
    let dst_bus = d.dst_map.as_ref().unwrap().first_bus();
    fill_fl_single(&mut d.fd_flt[FL_IN], src_bus, src.len, true);
    fill_fl_single(&mut d.fd_flt[FL_OUT], dst_bus, dst.len, false);
    let _ = scopeguard::ScopeGuard::into_inner(guard);
    Ok(())
}

/// Output-region entry count for the ceiling check.
fn out_table_entries(
    shape: Shape,
    aliased: bool,
    src_n: usize,
    dst_n: usize,
    ivsize: usize,
    d: &RequestDescriptor,
    req: &JobRequest<'_>,
) -> usize {
    match shape {
        Shape::BlockCipherGivIv => {
            let _ = ivsize;
            1 + if aliased { src_n } else { dst_n }
        }
        Shape::TlsRecord if aliased => {
            let fwd = ffwd_mapped(&d.src_map.as_ref().unwrap().segs, req.assoclen);
            if fwd.len() <= 1 { 0 } else { fwd.len() }
        }
        _ if aliased => 0,
        _ => {
            if dst_n <= 1 { 0 } else { dst_n }
        }
    }
}

fn fill_fl_single(fle: &mut FlEntry, bus: u64, len: usize, is_final: bool) {
    fle.clear();
    fle.set_addr(bus);
    fle.set_len(len as u32);
    fle.set_format_single();
    fle.set_final(is_final);
}

fn fill_fl_sg(fle: &mut FlEntry, bus: u64, len: usize, is_final: bool) {
    fle.clear();
    fle.set_addr(bus);
    fle.set_len(len as u32);
    fle.set_format_sg();
    fle.set_final(is_final);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::SoftMapper;

    fn req<'a>(
        src: &'a [IoSeg],
        dst: Option<&'a [IoSeg]>,
        iv: &'a [u8],
        assoclen: usize,
        cryptlen: usize,
        authsize: usize,
    ) -> JobRequest<'a> {
        JobRequest {
            src,
            dst,
            iv: IoSeg::from_slice(iv),
            assoclen,
            cryptlen,
            authsize,
            blocksize: 16,
        }
    }

    #[test]
    fn test_aead_aliased_table_layout() {
        // The concrete scenario: 13-byte assoc header, 4-segment aliased
        // buffer. Table must be {len word, IV, 4 src entries} = 6 entries.
        let mapper = SoftMapper::new();
        let buf = vec![0u8; 13 + 64 + 20];
        let iv = [0u8; 16];
        let segs = [
            IoSeg { addr: buf.as_ptr() as u64, len: 13 },
            IoSeg { addr: buf.as_ptr() as u64 + 13, len: 30 },
            IoSeg { addr: buf.as_ptr() as u64 + 43, len: 30 },
            IoSeg { addr: buf.as_ptr() as u64 + 73, len: 24 },
        ];
        let r = req(&segs, None, &iv, 13, 64, 20);
        let mut desc = RequestDescriptor::new();
        build_job(&mut desc, &mapper, Shape::Aead, OpKind::Encrypt, &r).unwrap();

        assert_eq!(desc.table_entries(), 6);
        let t = desc.table();
        assert_eq!(t[0].len, 4);
        assert_eq!(t[1].len, 16);
        assert!(t[5].is_final());
        // Input announces {len word, IV, assoc, payload}.
        assert_eq!(desc.in_entry().len, (4 + 16 + 13 + 64) as u32);
        assert!(desc.in_entry().is_sg());
        // Aliased multi-segment output points into the source region.
        assert!(desc.out_entry().is_sg());
        assert_eq!(desc.out_entry().len, (13 + 64 + 20) as u32);

        desc.unmap_all(&mapper);
        assert_eq!(mapper.active_mappings(), 0);
    }

    #[test]
    fn test_aead_decrypt_strips_tag() {
        let mapper = SoftMapper::new();
        let buf = vec![0u8; 128];
        let iv = [0u8; 16];
        let segs = [IoSeg::from_slice(&buf)];
        let r = req(&segs, None, &iv, 8, 64, 20);
        let mut desc = RequestDescriptor::new();
        build_job(&mut desc, &mapper, Shape::Aead, OpKind::Decrypt, &r).unwrap();
        assert_eq!(desc.out_entry().len, (8 + 64 - 20) as u32);
        desc.unmap_all(&mapper);
    }

    #[test]
    fn test_cipher_fast_path_skips_table() {
        // IV immediately followed by the payload in one buffer maps to
        // bus-contiguous addresses under the software mapper.
        let mapper = SoftMapper::new();
        let buf = vec![0u8; 16 + 64];
        let segs = [IoSeg { addr: buf.as_ptr() as u64 + 16, len: 64 }];
        let r = JobRequest {
            src: &segs,
            dst: None,
            iv: IoSeg { addr: buf.as_ptr() as u64, len: 16 },
            assoclen: 0,
            cryptlen: 64,
            authsize: 0,
            blocksize: 16,
        };
        let mut desc = RequestDescriptor::new();
        build_job(&mut desc, &mapper, Shape::BlockCipher, OpKind::Encrypt, &r).unwrap();
        assert_eq!(desc.table_entries(), 0);
        assert!(!desc.in_entry().is_sg());
        assert_eq!(desc.in_entry().len, (16 + 64) as u32);
        assert_eq!(desc.out_entry().len, 64);
        desc.unmap_all(&mapper);
        assert_eq!(mapper.active_mappings(), 0);
    }

    #[test]
    fn test_cipher_scattered_builds_table() {
        let mapper = SoftMapper::new();
        let a = vec![0u8; 32];
        let b = vec![0u8; 32];
        let iv = [0u8; 16];
        let segs = [IoSeg::from_slice(&a), IoSeg::from_slice(&b)];
        let r = req(&segs, None, &iv, 0, 64, 0);
        let mut desc = RequestDescriptor::new();
        build_job(&mut desc, &mapper, Shape::BlockCipher, OpKind::Decrypt, &r).unwrap();
        // {IV, 2 src entries}, aliased output reuses the source region.
        assert_eq!(desc.table_entries(), 3);
        assert!(desc.out_entry().is_sg());
        desc.unmap_all(&mapper);
        assert_eq!(mapper.active_mappings(), 0);
    }

    #[test]
    fn test_giv_output_carries_iv() {
        let mapper = SoftMapper::new();
        let src = vec![0u8; 64];
        let a = vec![0u8; 32];
        let b = vec![0u8; 32];
        let iv = [0u8; 16];
        let src_segs = [IoSeg::from_slice(&src)];
        let dst_segs = [IoSeg::from_slice(&a), IoSeg::from_slice(&b)];
        let r = req(&src_segs, Some(&dst_segs), &iv, 0, 64, 0);
        let mut desc = RequestDescriptor::new();
        build_job(&mut desc, &mapper, Shape::BlockCipherGivIv, OpKind::GivEncrypt, &r)
            .unwrap();
        // Input: 1 src entry. Output: {IV slot, 2 dst entries}.
        assert_eq!(desc.table_entries(), 4);
        assert_eq!(desc.in_entry().len, 64);
        assert_eq!(desc.out_entry().len, (16 + 64) as u32);
        desc.unmap_all(&mapper);
        assert_eq!(mapper.active_mappings(), 0);
    }

    #[test]
    fn test_tls_padding_arithmetic() {
        assert_eq!(tls_pad_len(32, 20, 16), 12);
        // Block-aligned sum still pads a full block.
        assert_eq!(tls_pad_len(28, 20, 16), 16);
    }

    #[test]
    fn test_ceiling_boundary() {
        let mapper = SoftMapper::new();
        let iv = [0u8; 16];
        let buf = vec![0u8; 4096];
        // 14 source segments + len word + IV = 16 entries, exactly at the
        // AEAD ceiling.
        let mk = |n: usize| -> Vec<IoSeg> {
            (0..n)
                .map(|i| IoSeg { addr: buf.as_ptr() as u64 + (i * 16) as u64, len: 16 })
                .collect()
        };
        let segs = mk(14);
        let r = req(&segs, None, &iv, 16, 14 * 16 - 16 - 20, 20);
        let mut desc = RequestDescriptor::new();
        build_job(&mut desc, &mapper, Shape::Aead, OpKind::Encrypt, &r).unwrap();
        assert_eq!(desc.table_entries(), MAX_AEAD_SG);
        desc.unmap_all(&mapper);

        // One more segment breaks the ceiling before anything is finalized.
        let segs = mk(15);
        let r = req(&segs, None, &iv, 16, 15 * 16 - 16 - 20, 20);
        let mut desc = RequestDescriptor::new();
        let err = build_job(&mut desc, &mapper, Shape::Aead, OpKind::Encrypt, &r);
        assert!(matches!(
            err,
            Err(QsaError::TooManySegments { needed: 17, max: MAX_AEAD_SG })
        ));
        assert_eq!(mapper.active_mappings(), 0);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let mapper = SoftMapper::new();
        let buf = vec![0u8; 32];
        let iv = [0u8; 16];
        let segs = [IoSeg::from_slice(&buf)];
        let r = req(&segs, None, &iv, 13, 64, 20);
        let mut desc = RequestDescriptor::new();
        let err = build_job(&mut desc, &mapper, Shape::Aead, OpKind::Encrypt, &r);
        assert!(matches!(err, Err(QsaError::ShortBuffer { .. })));
        assert_eq!(mapper.active_mappings(), 0);
    }

    #[test]
    fn test_mapping_failure_rolls_back() {
        let mapper = SoftMapper::new();
        let a = vec![0u8; 32];
        let b = vec![0u8; 32];
        let iv = [0u8; 16];
        let segs = [IoSeg::from_slice(&a), IoSeg::from_slice(&b)];
        let r = req(&segs, None, &iv, 4, 48, 8);

        // Fail at every successive mapping call; the balance must hold at
        // each injection point.
        for fail_at in 1..8 {
            mapper.fail_after(fail_at);
            let mut desc = RequestDescriptor::new();
            let res = build_job(&mut desc, &mapper, Shape::Aead, OpKind::Encrypt, &r);
            if res.is_err() {
                assert_eq!(mapper.active_mappings(), 0, "fail_at={fail_at}");
            } else {
                desc.unmap_all(&mapper);
                assert_eq!(mapper.active_mappings(), 0);
            }
            mapper.fail_after(usize::MAX);
        }
    }

    #[test]
    fn test_unmap_all_idempotent() {
        let mapper = SoftMapper::new();
        let buf = vec![0u8; 96];
        let iv = [0u8; 16];
        let segs = [IoSeg::from_slice(&buf)];
        let r = req(&segs, None, &iv, 8, 48, 16);
        let mut desc = RequestDescriptor::new();
        build_job(&mut desc, &mapper, Shape::Aead, OpKind::Encrypt, &r).unwrap();
        desc.unmap_all(&mapper);
        let calls = mapper.unmap_calls();
        desc.unmap_all(&mapper);
        assert_eq!(mapper.unmap_calls(), calls);
        assert_eq!(mapper.active_mappings(), 0);
    }
}
