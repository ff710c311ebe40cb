// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! # QSA (Queue-based Security Accelerator) Rust Driver Core
//!
//! Driver core for queue-based symmetric-crypto offload engines: request
//! descriptor construction, DMA buffer lifecycle, flow (shared-context)
//! management, and the submission/completion engine. The hardware-facing
//! pieces are collaborator traits, so the same core runs against a real
//! queue transport or the bundled software emulation.
//!
//! ## Supported Operations
//!
//! - AEAD encrypt/decrypt (cipher + keyed authentication)
//! - Block-cipher encrypt/decrypt, plus IV-generating encrypt
//! - TLS-record encrypt/decrypt (block-aligned padding, header skip)
//! - Device-side split-key derivation for authentication keys
//!
//! ## Architecture
//!
//! | Collaborator | Trait | Provided by |
//! |--------------|-------------------|----------------------------|
//! | Queue pairs | [`QueueBackend`] | platform transport |
//! | Address translation | [`DmaMapper`] | IOMMU plumbing |
//! | Flow programs | [`FlowProgramGen`] | instruction-set layer |
//!
//! All three have software stand-ins in [`soft`] ([`SoftBackend`],
//! [`SoftMapper`], [`SoftFlowGen`]) that execute jobs in-process by walking
//! the real frame structures.
//!
//! Operations are asynchronous: each returns once the job is on a queue, and
//! the caller's continuation fires when [`QsaEngine::poll`] drains the
//! response. With the `async` feature, future-returning wrappers are
//! available on [`QsaEngine`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use qsa_rust::{
//!     CipherAlg, CipherSuite, CryptoRequest, DescPool, EngineConfig, IoSeg,
//!     KeyMaterial, QsaEngine, SoftBackend, SoftFlowGen, SoftMapper,
//! };
//!
//! fn main() -> Result<(), qsa_rust::QsaError> {
//!     let mapper = Arc::new(SoftMapper::new());
//!     let backend = Arc::new(SoftBackend::new(Arc::clone(&mapper), 1));
//!     let engine = QsaEngine::new(
//!         EngineConfig::default(),
//!         backend,
//!         mapper,
//!         Arc::new(SoftFlowGen::new()),
//!         DescPool::new(64),
//!     )?;
//!
//!     let mut session =
//!         engine.session(CipherSuite::BlockCipher { cipher: CipherAlg::Aes }, 16);
//!     session.install_key(&KeyMaterial {
//!         cipher_key: &[0u8; 32],
//!         auth_key: None,
//!         nonce: None,
//!     })?;
//!
//!     let mut buf = [0u8; 64];
//!     let iv = [0u8; 16];
//!     let segs = [IoSeg::from_mut_slice(&mut buf)];
//!     let _ = engine.cipher_encrypt(
//!         &session,
//!         &CryptoRequest {
//!             src: &segs,
//!             dst: None,
//!             iv: IoSeg::from_slice(&iv),
//!             assoclen: 0,
//!             cryptlen: 64,
//!         },
//!         Box::new(|res| println!("done: {res:?}")),
//!     )?;
//!     engine.poll(0, 16);
//!     Ok(())
//! }
//! ```

// Module declarations
#[cfg(feature = "async")]
pub mod aio;
pub mod completion;
pub mod dma;
pub mod edesc;
pub mod engine;
pub mod error;
pub mod flow;
pub mod frame;
pub mod pool;
pub mod queue;
pub mod session;
pub mod soft;
pub mod submit;

// Re-exports for convenient access
pub use dma::{DmaDirection, DmaMapper, IoSeg};
pub use edesc::{Shape, MAX_AEAD_SG, MAX_CIPHER_SG};
pub use engine::{CryptoRequest, EngineConfig, OpContinuation, QsaEngine};
pub use error::{QsaError, QsaResult};
pub use flow::{AuthAlg, CipherAlg, CipherSuite, FlowProgramGen, OpKind};
pub use pool::{DescHandle, DescPool};
pub use queue::{CongestionThresholds, QueueBackend};
pub use session::{KeyMaterial, Session};
pub use soft::{SoftBackend, SoftFlowGen, SoftMapper};
pub use submit::Pending;
