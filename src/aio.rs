// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Async facade over the callback API (feature `async`).
//!
//! Each wrapper submits through the callback surface with a continuation
//! that resolves a `tokio` oneshot channel. Something must still drive
//! [`QsaEngine::poll`], typically a dedicated task or the platform's
//! notification handler.

use tokio::sync::oneshot;

use crate::engine::{CryptoRequest, OpContinuation, QsaEngine};
use crate::error::{QsaError, QsaResult};
use crate::session::Session;
use crate::submit::Pending;

async fn op_async<F>(submit: F) -> QsaResult<()>
where
    F: FnOnce(OpContinuation) -> QsaResult<Pending>,
{
    let (tx, rx) = oneshot::channel();
    let _pending = submit(Box::new(move |res| {
        let _ = tx.send(res);
    }))?;
    rx.await.map_err(|_| {
        QsaError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "completion channel closed",
        ))
    })?
}

impl QsaEngine {
    pub async fn aead_encrypt_async(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
    ) -> QsaResult<()> {
        op_async(|cont| self.aead_encrypt(session, req, cont)).await
    }

    pub async fn aead_decrypt_async(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
    ) -> QsaResult<()> {
        op_async(|cont| self.aead_decrypt(session, req, cont)).await
    }

    pub async fn cipher_encrypt_async(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
    ) -> QsaResult<()> {
        op_async(|cont| self.cipher_encrypt(session, req, cont)).await
    }

    pub async fn cipher_decrypt_async(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
    ) -> QsaResult<()> {
        op_async(|cont| self.cipher_decrypt(session, req, cont)).await
    }

    pub async fn cipher_giv_encrypt_async(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
    ) -> QsaResult<()> {
        op_async(|cont| self.cipher_giv_encrypt(session, req, cont)).await
    }

    pub async fn tls_encrypt_async(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
    ) -> QsaResult<()> {
        op_async(|cont| self.tls_encrypt(session, req, cont)).await
    }

    pub async fn tls_decrypt_async(
        &self,
        session: &Session,
        req: &CryptoRequest<'_>,
    ) -> QsaResult<()> {
        op_async(|cont| self.tls_decrypt(session, req, cont)).await
    }
}
