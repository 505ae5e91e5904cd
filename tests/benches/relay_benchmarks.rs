//! # Mailbox Relay Benchmarks
//!
//! | Path | Operation |
//! |------|-----------|
//! | shared-types | Fingerprint derivation |
//! | mr-02 Mailbox Store | Append, fetch page |
//! | mr-03 Replication | Full catch-up of one mailbox between two nodes |
//! | test cipher | Encrypt + decrypt one message |

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use mr_01_registry::RegistryApi;
use mr_02_mailbox_store::MailboxStoreApi;
use mr_tests::support::{Cluster, EciesCipher, KeyPair};
use shared_types::{fingerprint, MessageCipher, OwnerToken, PublicKey};

// ============================================================================
// Fingerprints
// ============================================================================

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    for size in [33usize, 65, 1024] {
        let key = PublicKey::new(vec![0x42; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("sha256", size), &key, |b, key| {
            b.iter(|| black_box(fingerprint(key)))
        });
    }
    group.finish();
}

// ============================================================================
// Mailbox Store
// ============================================================================

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("mr-02-mailbox-store");
    let fp = match fingerprint(&PublicKey::new(b"bench-key".to_vec())) {
        Ok(fp) => fp,
        Err(e) => panic!("fingerprint: {}", e),
    };

    group.bench_function("append_1k", |b| {
        let cluster = Cluster::new(1);
        let node = cluster.node(0);
        let token = OwnerToken::new(b"bench-owner".to_vec());
        let _ = node.registry.register(
            "bench".parse().unwrap_or_else(|e| panic!("pseudonym: {}", e)),
            PublicKey::new(b"bench-key".to_vec()),
            &token,
        );
        let ciphertext = vec![0u8; 1024];
        b.iter(|| {
            // Stay under the mailbox cap.
            if node.store.count(&fp) >= 9_000 {
                let _ = node.store.delete_all(&fp, &token);
            }
            black_box(node.store.append(&fp, Vec::new(), ciphertext.clone()))
        })
    });

    for page in [10usize, 50, 256] {
        let cluster = Cluster::new(1);
        let store = &cluster.node(0).store;
        for i in 0..1_000u32 {
            let _ = store.append(&fp, Vec::new(), i.to_be_bytes().to_vec());
        }
        group.throughput(Throughput::Elements(page as u64));
        group.bench_with_input(BenchmarkId::new("fetch_page", page), &page, |b, &page| {
            b.iter(|| black_box(store.fetch(&fp, 500, page)))
        });
    }
    group.finish();
}

// ============================================================================
// Replication
// ============================================================================

fn bench_catch_up(c: &mut Criterion) {
    let mut group = c.benchmark_group("mr-03-replication");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => panic!("runtime: {}", e),
    };
    let fp = match fingerprint(&PublicKey::new(b"bench-key".to_vec())) {
        Ok(fp) => fp,
        Err(e) => panic!("fingerprint: {}", e),
    };

    for size in [100usize, 1_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("catch_up", size), &size, |b, &size| {
            b.iter_with_setup(
                || {
                    let cluster = Cluster::new(2);
                    for i in 0..size {
                        let _ = cluster
                            .node(0)
                            .store
                            .append(&fp, Vec::new(), (i as u32).to_be_bytes().to_vec());
                    }
                    cluster
                },
                |cluster| {
                    runtime.block_on(cluster.rounds(1 + size / 256));
                    black_box(cluster.node(1).store.count(&fp))
                },
            )
        });
    }
    group.finish();
}

// ============================================================================
// Test cipher
// ============================================================================

fn bench_cipher(c: &mut Criterion) {
    let mut group = c.benchmark_group("ecies");
    let tj = KeyPair::generate();
    let message = b"Hello. You here?";

    group.bench_function("encrypt", |b| {
        b.iter(|| black_box(EciesCipher.encrypt(tj.public(), message)))
    });
    let sealed = match EciesCipher.encrypt(tj.public(), message) {
        Ok(sealed) => sealed,
        Err(e) => panic!("encrypt: {}", e),
    };
    group.bench_function("decrypt", |b| {
        b.iter(|| black_box(EciesCipher.decrypt(tj.secret(), &sealed)))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_fingerprint,
    bench_store,
    bench_catch_up,
    bench_cipher
);
criterion_main!(benches);
