// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Benchmarks of the descriptor build path and the full submit/poll round
//! trip, running against the software emulation backend.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use qsa_rust::{
    AuthAlg, CipherAlg, CipherSuite, CryptoRequest, DescPool, EngineConfig, IoSeg,
    KeyMaterial, QsaEngine, Session, SoftBackend, SoftFlowGen, SoftMapper,
};

fn engine() -> QsaEngine {
    let mapper = Arc::new(SoftMapper::new());
    let backend = Arc::new(SoftBackend::new(Arc::clone(&mapper), 1));
    QsaEngine::new(
        EngineConfig::default(),
        backend,
        mapper,
        Arc::new(SoftFlowGen::new()),
        DescPool::new(64),
    )
    .unwrap()
}

fn cipher_session(engine: &QsaEngine) -> Session {
    let mut s = engine.session(CipherSuite::BlockCipher { cipher: CipherAlg::Aes }, 16);
    s.install_key(&KeyMaterial {
        cipher_key: &[0x5a; 32],
        auth_key: None,
        nonce: None,
    })
    .unwrap();
    s
}

fn aead_session(engine: &QsaEngine) -> Session {
    let mut s = engine.session(
        CipherSuite::Authenc { cipher: CipherAlg::Aes, auth: AuthAlg::Sha256 },
        16,
    );
    s.install_key(&KeyMaterial {
        cipher_key: &[0x5a; 32],
        auth_key: Some(&[0x3c; 20]),
        nonce: None,
    })
    .unwrap();
    s
}

/// One in-place block-cipher job, submitted and polled to completion.
fn bench_cipher_round_trip(c: &mut Criterion) {
    let sizes: Vec<usize> = vec![
        256,        // small record
        4 * 1024,   // page
        64 * 1024,  // bulk
        256 * 1024, // large bulk
    ];

    let engine = engine();
    let session = cipher_session(&engine);
    let iv = [0x11u8; 16];

    let mut group = c.benchmark_group("cipher_round_trip");
    for size in sizes {
        let mut buf = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let segs = [IoSeg::from_mut_slice(&mut buf)];
                let _ = engine
                    .cipher_encrypt(
                        &session,
                        &CryptoRequest {
                            src: &segs,
                            dst: None,
                            iv: IoSeg::from_slice(&iv),
                            assoclen: 0,
                            cryptlen: size,
                        },
                        Box::new(|res| {
                            res.unwrap();
                        }),
                    )
                    .unwrap();
                engine.poll(0, 16);
            });
        });
    }
    group.finish();
}

/// One in-place AEAD job with a 13-byte associated-data header.
fn bench_aead_round_trip(c: &mut Criterion) {
    let sizes: Vec<usize> = vec![256, 4 * 1024, 64 * 1024];

    let engine = engine();
    let session = aead_session(&engine);
    let tag = session.tag_length();
    let iv = [0x22u8; 16];
    let assoclen = 13;

    let mut group = c.benchmark_group("aead_round_trip");
    for size in sizes {
        let mut buf = vec![0u8; assoclen + size + tag];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let segs = [IoSeg::from_mut_slice(&mut buf)];
                let _ = engine
                    .aead_encrypt(
                        &session,
                        &CryptoRequest {
                            src: &segs,
                            dst: None,
                            iv: IoSeg::from_slice(&iv),
                            assoclen,
                            cryptlen: size,
                        },
                        Box::new(|res| {
                            res.unwrap();
                        }),
                    )
                    .unwrap();
                engine.poll(0, 16);
            });
        });
    }
    group.finish();
}

/// Scatter-list growth: same payload split across more segments exercises
/// the table build instead of the contiguity fast path.
fn bench_scattered_build(c: &mut Criterion) {
    let seg_counts: Vec<usize> = vec![1, 2, 4, 8];
    let total = 64 * 1024;

    let engine = engine();
    let session = cipher_session(&engine);
    let iv = [0x33u8; 16];

    let mut group = c.benchmark_group("scattered_submit");
    for n in seg_counts {
        let mut bufs: Vec<Vec<u8>> = (0..n).map(|_| vec![0u8; total / n]).collect();
        group.throughput(Throughput::Bytes(total as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let segs: Vec<IoSeg> =
                    bufs.iter_mut().map(|s| IoSeg::from_mut_slice(s)).collect();
                let _ = engine
                    .cipher_encrypt(
                        &session,
                        &CryptoRequest {
                            src: &segs,
                            dst: None,
                            iv: IoSeg::from_slice(&iv),
                            assoclen: 0,
                            cryptlen: total,
                        },
                        Box::new(|res| {
                            res.unwrap();
                        }),
                    )
                    .unwrap();
                engine.poll(0, 16);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_cipher_round_trip,
    bench_aead_round_trip,
    bench_scattered_build
);
criterion_main!(benches);
