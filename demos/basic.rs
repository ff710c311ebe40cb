// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Basic example demonstrating QSA usage against the software-emulated
//! accelerator stack.
//!
//! Run with: `cargo run --example basic`

use std::sync::mpsc;
use std::sync::Arc;

use qsa_rust::{
    AuthAlg, CipherAlg, CipherSuite, CryptoRequest, DescPool, EngineConfig, IoSeg,
    KeyMaterial, QsaEngine, QsaError, QsaResult, SoftBackend, SoftFlowGen, SoftMapper,
};

fn main() {
    println!("QSA Basic Example");
    println!("=================\n");

    // Wire up the software-emulated device: mapper, queue backend, flow
    // program generator, and descriptor pool.
    println!("Bringing up the software-emulated engine...");
    let mapper = Arc::new(SoftMapper::new());
    let backend = Arc::new(SoftBackend::new(Arc::clone(&mapper), 2));
    let engine = match QsaEngine::new(
        EngineConfig::default(),
        Arc::clone(&backend) as Arc<dyn qsa_rust::QueueBackend>,
        Arc::clone(&mapper) as Arc<dyn qsa_rust::DmaMapper>,
        Arc::new(SoftFlowGen::new()),
        DescPool::new(16),
    ) {
        Ok(engine) => engine,
        Err(e) => {
            println!("  Failed to bring up the engine: {}", e);
            return;
        }
    };
    println!("  Queue pairs: {}", engine.num_queues());
    println!();

    // Block cipher round trip
    println!("Block-cipher encrypt/decrypt...");
    let mut cipher = engine.session(CipherSuite::BlockCipher { cipher: CipherAlg::Aes }, 16);
    if let Err(e) = cipher.install_key(&KeyMaterial {
        cipher_key: &[0x42; 16],
        auth_key: None,
        nonce: None,
    }) {
        println!("  Key install failed: {}", e);
        return;
    }

    let plaintext = *b"the quick brown fox jumps over the lazy dog, in sixty-four bytes";
    let mut data = plaintext;
    let iv = [0x11u8; 16];

    let segs = [IoSeg::from_mut_slice(&mut data)];
    let req = CryptoRequest {
        src: &segs,
        dst: None,
        iv: IoSeg::from_slice(&iv),
        assoclen: 0,
        cryptlen: 64,
    };
    match run_op(&engine, |cont| engine.cipher_encrypt(&cipher, &req, cont)) {
        Ok(()) => println!("  Encrypted 64 bytes in place: {:02x?}...", &data[..8]),
        Err(e) => {
            println!("  Encrypt failed: {}", e);
            return;
        }
    }

    let segs = [IoSeg::from_mut_slice(&mut data)];
    let req = CryptoRequest {
        src: &segs,
        dst: None,
        iv: IoSeg::from_slice(&iv),
        assoclen: 0,
        cryptlen: 64,
    };
    match run_op(&engine, |cont| engine.cipher_decrypt(&cipher, &req, cont)) {
        Ok(()) => println!("  Decrypted, plaintext recovered: {}", data == plaintext),
        Err(e) => println!("  Decrypt failed: {}", e),
    }
    println!();

    // Authenticated encryption with tag verification
    println!("AEAD encrypt, then decrypt with a corrupted tag...");
    let mut aead = engine.session(
        CipherSuite::Authenc { cipher: CipherAlg::Aes, auth: AuthAlg::Sha256 },
        16,
    );
    if let Err(e) = aead.install_key(&KeyMaterial {
        cipher_key: &[0x24; 32],
        auth_key: Some(b"example-authentication-key"),
        nonce: None,
    }) {
        println!("  Key install failed: {}", e);
        return;
    }
    let tag = aead.tag_length();
    println!("  Authentication tag: {} bytes", tag);

    // Layout: 13 bytes of associated data, 32 bytes of payload, then the tag.
    let mut record = vec![0x55u8; 13 + 32 + tag];
    let iv = [0x22u8; 16];
    let segs = [IoSeg::from_mut_slice(&mut record)];
    let req = CryptoRequest {
        src: &segs,
        dst: None,
        iv: IoSeg::from_slice(&iv),
        assoclen: 13,
        cryptlen: 32,
    };
    match run_op(&engine, |cont| engine.aead_encrypt(&aead, &req, cont)) {
        Ok(()) => println!("  Sealed 32-byte payload"),
        Err(e) => {
            println!("  Seal failed: {}", e);
            return;
        }
    }

    record[13 + 32] ^= 0x01;
    let segs = [IoSeg::from_mut_slice(&mut record)];
    let req = CryptoRequest {
        src: &segs,
        dst: None,
        iv: IoSeg::from_slice(&iv),
        assoclen: 13,
        cryptlen: 32 + tag,
    };
    match run_op(&engine, |cont| engine.aead_decrypt(&aead, &req, cont)) {
        Ok(()) => println!("  Unexpected success on a corrupted record!"),
        Err(QsaError::IntegrityCheckFailed) => {
            println!("  Tampering detected: {}", QsaError::IntegrityCheckFailed)
        }
        Err(e) => println!("  Open failed: {}", e),
    }
    println!();

    drop(cipher);
    drop(aead);
    println!("Outstanding bus mappings after teardown: {}", mapper.active_mappings());
    println!("Done!");
}

/// Submit one operation and poll every queue until its completion lands.
fn run_op<F>(engine: &QsaEngine, submit: F) -> QsaResult<()>
where
    F: FnOnce(qsa_rust::OpContinuation) -> QsaResult<qsa_rust::Pending>,
{
    let (tx, rx) = mpsc::channel();
    let _pending = submit(Box::new(move |res| {
        let _ = tx.send(res);
    }))?;
    for queue_id in 0..engine.num_queues() {
        engine.poll(queue_id, 64);
    }
    rx.recv().expect("completion delivered")
}
