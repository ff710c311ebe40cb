// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Flow descriptors: precompiled hardware programs bound to key material.
//!
//! A flow descriptor is an opaque byte program the accelerator executes for
//! one operation kind (encrypt, decrypt, IV-generating encrypt). The program
//! encoding itself is supplied by an external generator ([`FlowProgramGen`]);
//! this module owns the instruction buffer, its bus mapping, and the
//! inline-versus-by-reference key placement query.

use crate::dma::{map_single, unmap_seg, DmaDirection, DmaMapper, MappedSeg};
use crate::error::{QsaError, QsaResult};

/// Instruction buffer ceiling, in 32-bit words.
pub const MAX_FLOW_WORDS: usize = 64;
/// Instruction buffer ceiling, in bytes.
pub const MAX_FLOW_BYTES: usize = MAX_FLOW_WORDS * 4;
/// Fixed per-program job/IO overhead, in words.
pub const JOB_IO_WORDS: usize = 18;
/// Size of a by-reference key pointer inside a program, in bytes.
pub const KEY_PTR_BYTES: usize = 8;

/// Operation kind, indexing a session's flow array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum OpKind {
    /// Forward transform.
    Encrypt = 0,
    /// Reverse transform.
    Decrypt = 1,
    /// Forward transform with hardware-generated IV.
    GivEncrypt = 2,
}

/// Number of per-session flow slots.
pub const NUM_OP: usize = 3;

impl OpKind {
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Encrypt => "ENCRYPT",
            Self::Decrypt => "DECRYPT",
            Self::GivEncrypt => "GIV_ENCRYPT",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Block cipher selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlg {
    Aes,
    TripleDes,
}

impl CipherAlg {
    /// Cipher block size in bytes.
    #[inline]
    pub const fn block_size(self) -> usize {
        match self {
            Self::Aes => 16,
            Self::TripleDes => 8,
        }
    }

    /// Validate a raw key length for this cipher.
    pub fn check_key_len(self, len: usize) -> QsaResult<()> {
        let ok = match self {
            Self::Aes => matches!(len, 16 | 24 | 32),
            Self::TripleDes => len == 24,
        };
        if ok {
            Ok(())
        } else {
            Err(QsaError::BadKeyLength { got: len })
        }
    }
}

/// Authentication algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAlg {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl AuthAlg {
    /// Digest size in bytes; the upper bound for the authentication tag.
    #[inline]
    pub const fn digest_size(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Length of the hardware-derived split authentication key.
    #[inline]
    pub const fn split_key_len(self) -> usize {
        2 * self.digest_size()
    }

    /// Split-key length padded to the 16-byte key-storage granule.
    #[inline]
    pub const fn split_key_pad_len(self) -> usize {
        (self.split_key_len() + 15) & !15
    }
}

/// Which transform family a session implements, and therefore which flow
/// slots it populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    /// Generic AEAD: cipher + keyed authentication.
    Authenc { cipher: CipherAlg, auth: AuthAlg },
    /// Plain block cipher; also carries an IV-generating encrypt flow.
    BlockCipher { cipher: CipherAlg },
    /// TLS-record AEAD variant with block-aligned padding on encrypt.
    Tls { cipher: CipherAlg, auth: AuthAlg },
}

impl CipherSuite {
    #[inline]
    pub fn cipher(&self) -> CipherAlg {
        match *self {
            Self::Authenc { cipher, .. }
            | Self::BlockCipher { cipher }
            | Self::Tls { cipher, .. } => cipher,
        }
    }

    #[inline]
    pub fn auth(&self) -> Option<AuthAlg> {
        match *self {
            Self::Authenc { auth, .. } | Self::Tls { auth, .. } => Some(auth),
            Self::BlockCipher { .. } => None,
        }
    }

    /// Operation kinds this suite compiles flows for.
    pub fn op_kinds(&self) -> &'static [OpKind] {
        match self {
            Self::BlockCipher { .. } => {
                &[OpKind::Encrypt, OpKind::Decrypt, OpKind::GivEncrypt]
            }
            _ => &[OpKind::Encrypt, OpKind::Decrypt],
        }
    }

    /// Program family tag handed to the generator.
    pub fn program_shape(&self) -> ProgramShape {
        match self {
            Self::Authenc { .. } => ProgramShape::Aead,
            Self::BlockCipher { .. } => ProgramShape::BlockCipher,
            Self::Tls { .. } => ProgramShape::Tls,
        }
    }
}

/// Program family understood by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramShape {
    Aead,
    BlockCipher,
    Tls,
}

/// Base program length (excluding keys and job/IO overhead), in words.
pub fn base_words(shape: ProgramShape, op: OpKind) -> usize {
    match (shape, op) {
        (ProgramShape::Aead, OpKind::GivEncrypt) => 20,
        (ProgramShape::Aead, _) => 16,
        (ProgramShape::BlockCipher, OpKind::GivEncrypt) => 15,
        (ProgramShape::BlockCipher, _) => 12,
        (ProgramShape::Tls, _) => 18,
    }
}

/// Key placement for one key half inside a flow program.
#[derive(Debug, Clone, Copy)]
pub struct KeyPlacement<'a> {
    /// Key length in bytes (padded length for split keys).
    pub len: usize,
    /// Key bytes, embedded when `inline` is set.
    pub virt: &'a [u8],
    /// Bus address of the key bytes, referenced when `inline` is unset.
    pub bus: u64,
    /// Inline-versus-by-reference decision from [`inline_fit`].
    pub inline: bool,
}

/// External collaborator producing hardware-executable program bytes.
pub trait FlowProgramGen: Send + Sync {
    /// Build the program for one (shape, operation) pair.
    ///
    /// `auth` is present for AEAD/TLS shapes only. The returned length is
    /// used for the ceiling check and the bus-mapping size.
    fn build_flow_program(
        &self,
        shape: ProgramShape,
        op: OpKind,
        cipher: KeyPlacement<'_>,
        auth: Option<KeyPlacement<'_>>,
        ivsize: usize,
        authsize: usize,
        blocksize: usize,
    ) -> Vec<u8>;

    /// Build the one-shot program deriving a split authentication key.
    fn build_split_key_program(&self, auth: AuthAlg, key_in_len: usize) -> Vec<u8>;
}

/// Decide inline placement independently per key, front to back.
///
/// `base_words` covers the shape program plus job/IO overhead. A key is
/// embedded when it fits the remaining byte budget while reserving pointer
/// space for every key after it; otherwise it costs one pointer. Running out
/// of budget entirely is a hard error.
pub fn inline_fit(base_words: usize, key_lens: &[usize]) -> QsaResult<Vec<bool>> {
    let mut rem = MAX_FLOW_BYTES as isize - (base_words * 4) as isize;
    let mut mask = vec![false; key_lens.len()];
    for (i, &len) in key_lens.iter().enumerate() {
        if rem <= 0 {
            break;
        }
        let tail_ptrs = (key_lens.len() - i - 1) * KEY_PTR_BYTES;
        if rem - (len + tail_ptrs) as isize >= 0 {
            rem -= len as isize;
            mask[i] = true;
        } else {
            rem -= KEY_PTR_BYTES as isize;
        }
    }
    if rem < 0 {
        let words = base_words + key_lens.iter().sum::<usize>() / 4;
        return Err(QsaError::DescriptorTooLarge { words, max: MAX_FLOW_WORDS });
    }
    Ok(mask)
}

/// One compiled, bus-mappable flow program.
///
/// The instruction buffer is boxed so its address stays stable for the
/// lifetime of the mapping. A flow is never handed to hardware unmapped, and
/// never remapped while referenced by in-flight work.
pub struct FlowDesc {
    prog: Box<[u8; MAX_FLOW_BYTES]>,
    len: usize,
    mapping: Option<MappedSeg>,
}

impl FlowDesc {
    /// Wrap generated program bytes, enforcing the instruction-buffer ceiling.
    pub fn from_program(bytes: &[u8]) -> QsaResult<Self> {
        if bytes.len() > MAX_FLOW_BYTES {
            return Err(QsaError::DescriptorTooLarge {
                words: bytes.len().div_ceil(4),
                max: MAX_FLOW_WORDS,
            });
        }
        let mut prog = Box::new([0u8; MAX_FLOW_BYTES]);
        prog[..bytes.len()].copy_from_slice(bytes);
        Ok(Self { prog, len: bytes.len(), mapping: None })
    }

    /// Program bytes.
    #[inline]
    pub fn program(&self) -> &[u8] {
        &self.prog[..self.len]
    }

    /// Program length in 32-bit words, rounded up.
    #[inline]
    pub fn words(&self) -> usize {
        self.len.div_ceil(4)
    }

    /// Map the program for device reads. Must precede any use.
    pub fn map(&mut self, mapper: &dyn DmaMapper) -> QsaResult<()> {
        let m = map_single(
            mapper,
            self.prog.as_ptr() as u64,
            self.len,
            DmaDirection::ToDevice,
        )?;
        self.mapping = Some(m);
        Ok(())
    }

    /// Bus address of the mapped program.
    #[inline]
    pub fn bus(&self) -> Option<u64> {
        self.mapping.as_ref().map(|m| m.bus)
    }

    /// Release the bus mapping. Idempotent.
    pub fn unmap(&mut self, mapper: &dyn DmaMapper) {
        unmap_seg(mapper, &mut self.mapping);
    }
}

impl std::fmt::Debug for FlowDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowDesc")
            .field("len", &self.len)
            .field("mapped", &self.mapping.is_some())
            .finish()
    }
}
