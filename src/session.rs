// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Per-transform session state.
//!
//! A session owns the key blob, its bus mapping, the tag length, and one
//! compiled flow descriptor per operation kind. Installing a key on an
//! authenticated suite first runs the split-key derivation round trip on the
//! device, then rebuilds every flow against the new key placement.
//!
//! Key rotation is not synchronized against in-flight jobs; callers must
//! quiesce a session before rekeying it.

use std::sync::{Arc, Mutex};

use log::debug;

use crate::dma::{map_single, unmap_seg, DmaDirection, IoSeg, MappedSeg};
use crate::edesc::build_transfer_job;
use crate::engine::EngineCore;
use crate::error::{QsaError, QsaResult};
use crate::flow::{
    base_words, inline_fit, AuthAlg, CipherSuite, FlowDesc, KeyPlacement, OpKind, JOB_IO_WORDS,
    NUM_OP,
};
use crate::submit::submit_job;

/// Largest padded split key (128) + largest cipher key (32) + nonce (4).
pub const MAX_KEY_BYTES: usize = 128 + 32 + 4;
/// Largest salt/nonce carried after the encryption key.
pub const MAX_NONCE_BYTES: usize = 4;

/// Poll iterations granted to the split-key round trip before giving up.
const SPLIT_KEY_SPIN_LIMIT: usize = 100_000;

/// Key material handed to [`Session::install_key`].
#[derive(Debug, Clone, Copy)]
pub struct KeyMaterial<'a> {
    /// Raw encryption key.
    pub cipher_key: &'a [u8],
    /// Raw authentication key; required for authenticated suites.
    pub auth_key: Option<&'a [u8]>,
    /// Optional salt appended after the encryption key.
    pub nonce: Option<&'a [u8]>,
}

/// One configured transform.
pub struct Session {
    core: Arc<EngineCore>,
    suite: CipherSuite,
    ivsize: usize,
    key_blob: Box<[u8; MAX_KEY_BYTES]>,
    split_len: usize,
    enc_key_len: usize,
    nonce_len: usize,
    key_map: Option<MappedSeg>,
    authsize: usize,
    have_key: bool,
    flows: [Option<FlowDesc>; NUM_OP],
}

impl Session {
    pub(crate) fn new(core: Arc<EngineCore>, suite: CipherSuite, ivsize: usize) -> Self {
        let authsize = suite.auth().map_or(0, AuthAlg::digest_size);
        Self {
            core,
            suite,
            ivsize,
            key_blob: Box::new([0u8; MAX_KEY_BYTES]),
            split_len: 0,
            enc_key_len: 0,
            nonce_len: 0,
            key_map: None,
            // Full digest by default; TLS and truncated-tag users override.
            authsize,
            have_key: false,
            flows: [None, None, None],
        }
    }

    #[inline]
    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    #[inline]
    pub fn iv_size(&self) -> usize {
        self.ivsize
    }

    /// Current authentication-tag length; 0 for plain cipher suites.
    #[inline]
    pub fn tag_length(&self) -> usize {
        self.authsize
    }

    /// Bus address of the flow program for `op`, once a key is installed.
    pub(crate) fn flow_bus(&self, op: OpKind) -> Option<u64> {
        self.flows[op.index()].as_ref().and_then(FlowDesc::bus)
    }

    /// Install key material and compile the session's flows.
    ///
    /// Authenticated suites derive the split authentication key on the
    /// device first, blocking the calling thread while driving the
    /// completion path.
    pub fn install_key(&mut self, key: &KeyMaterial<'_>) -> QsaResult<()> {
        self.suite.cipher().check_key_len(key.cipher_key.len())?;
        let nonce_len = key.nonce.map_or(0, <[u8]>::len);
        if nonce_len > MAX_NONCE_BYTES {
            return Err(QsaError::BadKeyLength { got: nonce_len });
        }

        // The previous key (if any) is gone from this point on.
        self.have_key = false;
        unmap_seg(self.core.mapper.as_ref(), &mut self.key_map);

        let split_len = match self.suite.auth() {
            Some(auth) => {
                let raw = key.auth_key.ok_or(QsaError::BadKeyLength { got: 0 })?;
                if raw.is_empty() {
                    return Err(QsaError::BadKeyLength { got: 0 });
                }
                self.derive_split_key(auth, raw)?;
                auth.split_key_pad_len()
            }
            None => 0,
        };

        let enc_len = key.cipher_key.len();
        self.key_blob[split_len..split_len + enc_len].copy_from_slice(key.cipher_key);
        if let Some(nonce) = key.nonce {
            self.key_blob[split_len + enc_len..split_len + enc_len + nonce_len]
                .copy_from_slice(nonce);
        }
        self.split_len = split_len;
        self.enc_key_len = enc_len;
        self.nonce_len = nonce_len;

        let total = split_len + enc_len + nonce_len;
        self.key_map = Some(map_single(
            self.core.mapper.as_ref(),
            self.key_blob.as_ptr() as u64,
            total,
            DmaDirection::ToDevice,
        )?);
        self.have_key = true;
        debug!("key installed: split={split_len} enc={enc_len} nonce={nonce_len}");
        self.rebuild_flows()
    }

    /// Change the authentication-tag length and recompile the flows.
    pub fn set_tag_length(&mut self, n: usize) -> QsaResult<()> {
        let auth = self.suite.auth().ok_or_else(|| {
            QsaError::InvalidArgument("suite carries no authentication tag".into())
        })?;
        if n == 0 || n > auth.digest_size() {
            return Err(QsaError::InvalidArgument(format!(
                "tag length {n} out of range for digest size {}",
                auth.digest_size()
            )));
        }
        self.authsize = n;
        self.rebuild_flows()
    }

    /// Recompile every flow of the suite against the current key and tag
    /// length. A failure leaves the previously installed flows valid.
    fn rebuild_flows(&mut self) -> QsaResult<()> {
        if !self.have_key {
            return Ok(());
        }
        if self.suite.auth().is_some() && self.authsize == 0 {
            return Ok(());
        }
        let shape = self.suite.program_shape();
        let blocksize = self.suite.cipher().block_size();
        let key_bus = self.key_map.as_ref().unwrap().bus;
        let cipher_len = self.enc_key_len + self.nonce_len;
        let split_len = self.split_len;

        for &op in self.suite.op_kinds() {
            let base = base_words(shape, op) + JOB_IO_WORDS;
            let bytes = {
                let (cipher_inline, auth_inline) = if split_len > 0 {
                    let mask = inline_fit(base, &[split_len, cipher_len])?;
                    (mask[1], mask[0])
                } else {
                    let mask = inline_fit(base, &[cipher_len])?;
                    (mask[0], false)
                };
                let cipher = KeyPlacement {
                    len: cipher_len,
                    virt: &self.key_blob[split_len..split_len + cipher_len],
                    bus: key_bus + split_len as u64,
                    inline: cipher_inline,
                };
                let auth = (split_len > 0).then(|| KeyPlacement {
                    len: split_len,
                    virt: &self.key_blob[..split_len],
                    bus: key_bus,
                    inline: auth_inline,
                });
                self.core.flowgen.build_flow_program(
                    shape,
                    op,
                    cipher,
                    auth,
                    self.ivsize,
                    self.authsize,
                    blocksize,
                )
            };
            let mut flow = FlowDesc::from_program(&bytes)?;
            // Map before swap: a mapping failure must leave the old flow in
            // service.
            flow.map(self.core.mapper.as_ref())?;
            if let Some(mut old) = self.flows[op.index()].replace(flow) {
                old.unmap(self.core.mapper.as_ref());
            }
        }
        Ok(())
    }

    /// Run the device-side split-key derivation, writing the padded split
    /// key into the front of the key blob.
    fn derive_split_key(&mut self, auth: AuthAlg, raw: &[u8]) -> QsaResult<()> {
        let prog = self.core.flowgen.build_split_key_program(auth, raw.len());
        let mut flow = FlowDesc::from_program(&prog)?;
        flow.map(self.core.mapper.as_ref())?;
        let flow_bus = flow.bus().unwrap();

        let result = self.run_split_key_job(flow_bus, auth, raw);
        flow.unmap(self.core.mapper.as_ref());
        result
    }

    fn run_split_key_job(&mut self, flow_bus: u64, auth: AuthAlg, raw: &[u8]) -> QsaResult<()> {
        let mut desc = self.core.pool.acquire()?;
        let dst = IoSeg {
            addr: self.key_blob.as_ptr() as u64,
            len: auth.split_key_pad_len(),
        };
        build_transfer_job(
            &mut desc,
            self.core.mapper.as_ref(),
            IoSeg::from_slice(raw),
            dst,
        )?;

        let done: Arc<Mutex<Option<QsaResult<()>>>> = Arc::new(Mutex::new(None));
        let signal = Arc::clone(&done);
        desc.arm(
            OpKind::Encrypt,
            Box::new(move |res| {
                *signal.lock().unwrap() = Some(res);
            }),
        );

        if let Err((mut desc, e)) = submit_job(&self.core, flow_bus, desc) {
            desc.unmap_all(self.core.mapper.as_ref());
            let _ = desc.take_continuation();
            return Err(e);
        }

        // Block until the completion path delivers the result.
        let mut iters = 0;
        loop {
            if let Some(res) = done.lock().unwrap().take() {
                return res;
            }
            for q in 0..self.core.num_queues {
                self.core.poll(q, 16);
            }
            iters += 1;
            if iters > SPLIT_KEY_SPIN_LIMIT {
                return Err(QsaError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "split-key job did not complete",
                )));
            }
            std::hint::spin_loop();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mapper = self.core.mapper.as_ref();
        for flow in self.flows.iter_mut().flatten() {
            flow.unmap(mapper);
        }
        unmap_seg(mapper, &mut self.key_map);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("suite", &self.suite)
            .field("ivsize", &self.ivsize)
            .field("authsize", &self.authsize)
            .field("have_key", &self.have_key)
            .finish()
    }
}
