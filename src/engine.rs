// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Engine facade.
//!
//! [`QsaEngine`] wires the injected collaborators together: the queue
//! transport, the bus-address translation service, the flow-program
//! generator, and the descriptor pool. Sessions are created from it, and
//! every operation follows the same path: build the shape descriptor, arm
//! the continuation, submit; the result arrives when the external scheduler
//! drives [`QsaEngine::poll`].

use std::sync::Arc;

use log::debug;

use crate::completion;
use crate::dma::{DmaMapper, IoSeg};
use crate::edesc::{build_job, JobRequest, Shape};
use crate::error::{QsaError, QsaResult};
use crate::flow::{CipherSuite, FlowProgramGen, OpKind};
use crate::pool::DescPool;
use crate::queue::QueueBackend;
use crate::session::Session;
use crate::submit::{submit_job, Pending};

/// Completion continuation passed to every operation.
pub type OpContinuation = Box<dyn FnOnce(QsaResult<()>) + Send>;

/// Engine construction parameters.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Cap on the number of queue pairs used; `None` takes the backend's
    /// full count.
    pub num_queues: Option<usize>,
}

/// Shared engine state referenced by sessions and in-flight jobs.
pub struct EngineCore {
    pub(crate) backend: Arc<dyn QueueBackend>,
    pub(crate) mapper: Arc<dyn DmaMapper>,
    pub(crate) flowgen: Arc<dyn FlowProgramGen>,
    pub(crate) pool: Arc<DescPool>,
    pub(crate) num_queues: usize,
}

impl EngineCore {
    /// Drive the completion path for one queue.
    pub(crate) fn poll(&self, queue_id: usize, budget: usize) -> usize {
        completion::poll(self, queue_id, budget)
    }
}

/// Geometry of one crypto operation.
#[derive(Debug, Clone, Copy)]
pub struct CryptoRequest<'a> {
    /// Source scatter list.
    pub src: &'a [IoSeg],
    /// Destination scatter list; `None` processes in place.
    pub dst: Option<&'a [IoSeg]>,
    /// IV buffer; written back by IV-generating encrypt.
    pub iv: IoSeg,
    /// Associated-data length (AEAD/TLS operations, 0 otherwise).
    pub assoclen: usize,
    /// Payload length; for decrypt operations this includes the tag.
    pub cryptlen: usize,
}

/// Driver-core facade.
pub struct QsaEngine {
    core: Arc<EngineCore>,
}

impl QsaEngine {
    /// Wire an engine from its collaborators.
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn QueueBackend>,
        mapper: Arc<dyn DmaMapper>,
        flowgen: Arc<dyn FlowProgramGen>,
        pool: Arc<DescPool>,
    ) -> QsaResult<Self> {
        let backend_queues = backend.num_queues();
        let num_queues = match config.num_queues {
            Some(n) => n.min(backend_queues),
            None => backend_queues,
        };
        if num_queues == 0 {
            return Err(QsaError::InvalidArgument("no usable queues".into()));
        }
        debug!("engine up with {num_queues} queue pair(s), pool of {}", pool.capacity());
        Ok(Self {
            core: Arc::new(EngineCore { backend, mapper, flowgen, pool, num_queues }),
        })
    }

    /// Number of queue pairs in use.
    #[inline]
    pub fn num_queues(&self) -> usize {
        self.core.num_queues
    }

    /// Create a session for one transform.
    pub fn session(&self, suite: CipherSuite, ivsize: usize) -> Session {
        Session::new(Arc::clone(&self.core), suite, ivsize)
    }

    /// Drain up to `budget` completions from `queue_id`.
    pub fn poll(&self, queue_id: usize, budget: usize) -> usize {
        self.core.poll(queue_id, budget)
    }

    pub fn aead_encrypt(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
        cont: OpContinuation,
    ) -> QsaResult<Pending> {
        self.do_op(session, Shape::Aead, OpKind::Encrypt, req, cont)
    }

    pub fn aead_decrypt(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
        cont: OpContinuation,
    ) -> QsaResult<Pending> {
        self.do_op(session, Shape::Aead, OpKind::Decrypt, req, cont)
    }

    pub fn cipher_encrypt(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
        cont: OpContinuation,
    ) -> QsaResult<Pending> {
        self.do_op(session, Shape::BlockCipher, OpKind::Encrypt, req, cont)
    }

    pub fn cipher_decrypt(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
        cont: OpContinuation,
    ) -> QsaResult<Pending> {
        self.do_op(session, Shape::BlockCipher, OpKind::Decrypt, req, cont)
    }

    /// Encrypt with a hardware-generated IV; the IV lands in `req.iv` and is
    /// also emitted ahead of the ciphertext.
    pub fn cipher_giv_encrypt(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
        cont: OpContinuation,
    ) -> QsaResult<Pending> {
        self.do_op(session, Shape::BlockCipherGivIv, OpKind::GivEncrypt, req, cont)
    }

    pub fn tls_encrypt(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
        cont: OpContinuation,
    ) -> QsaResult<Pending> {
        self.do_op(session, Shape::TlsRecord, OpKind::Encrypt, req, cont)
    }

    pub fn tls_decrypt(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
        cont: OpContinuation,
    ) -> QsaResult<Pending> {
        self.do_op(session, Shape::TlsRecord, OpKind::Decrypt, req, cont)
    }

    fn do_op(
        &self,
        session: &Session,
        shape: Shape,
        op: OpKind,
        req: &CryptoRequest<'_>,
        cont: OpContinuation,
    ) -> QsaResult<Pending> {
        check_shape(session.suite(), shape)?;
        let flow_bus = session
            .flow_bus(op)
            .ok_or(QsaError::InvalidArgument("session has no key installed".into()))?;

        let mut desc = self.core.pool.acquire()?;
        let jr = JobRequest {
            src: req.src,
            dst: req.dst,
            iv: req.iv,
            assoclen: req.assoclen,
            cryptlen: req.cryptlen,
            authsize: session.tag_length(),
            blocksize: session.suite().cipher().block_size(),
        };
        // A build failure has already rolled its mappings back; dropping the
        // handle returns the block to the pool.
        build_job(&mut desc, self.core.mapper.as_ref(), shape, op, &jr)?;
        desc.arm(op, cont);

        match submit_job(&self.core, flow_bus, desc) {
            Ok(p) => Ok(p),
            Err((mut desc, e)) => {
                // Same teardown the completion path would run, minus the
                // continuation: the caller gets the error synchronously.
                desc.unmap_all(self.core.mapper.as_ref());
                let _ = desc.take_continuation();
                Err(e)
            }
        }
    }
}

fn check_shape(suite: CipherSuite, shape: Shape) -> QsaResult<()> {
    let ok = matches!(
        (suite, shape),
        (CipherSuite::Authenc { .. }, Shape::Aead)
            | (CipherSuite::BlockCipher { .. }, Shape::BlockCipher)
            | (CipherSuite::BlockCipher { .. }, Shape::BlockCipherGivIv)
            | (CipherSuite::Tls { .. }, Shape::TlsRecord)
    );
    if ok {
        Ok(())
    } else {
        Err(QsaError::InvalidArgument(format!(
            "operation shape {shape:?} does not match session suite"
        )))
    }
}
