//! Latency benchmarks for Parley.
//!
//! These benchmarks measure a message's trip through two running sessions:
//! decoded from the sender's connection, routed, and written to the
//! recipient's connection.

use criterion::{criterion_group, criterion_main, Criterion};
use parley_core::{Router, Session};
use parley_protocol::InboundMessage;
use parley_transport::memory::{self, MemoryPeer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};

fn spawn_session(rt: &Runtime, router: &Arc<Router>, name: &str) -> MemoryPeer {
    let (conn, mut incoming, peer) = memory::pair();
    let session = Session::connect(Arc::clone(router), name, Arc::new(conn)).unwrap();
    rt.spawn(async move {
        session.run(&mut incoming).await;
    });
    peer
}

/// Benchmark direct message latency between two sessions.
fn bench_direct_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("direct_latency");
    let rt = Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let router = Arc::new(Router::new());
    let alice = spawn_session(&rt, &router, "alice");
    let mut bob = spawn_session(&rt, &router, "bob");

    group.bench_function("json", |b| {
        let message = InboundMessage::direct("bob", "ping");
        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = Instant::now();
                for _ in 0..iters {
                    alice.send(&message).unwrap();
                    bob.recv().await.unwrap();
                }
                start.elapsed()
            })
        });
    });

    group.finish();
}

/// Benchmark room message latency until every other member has it.
fn bench_room_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("room_latency");
    let rt = Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    for size in [2usize, 10] {
        let router = Arc::new(Router::new());
        let mut peers: Vec<MemoryPeer> = (0..size)
            .map(|i| spawn_session(&rt, &router, &format!("member-{}", i)))
            .collect();

        rt.block_on(async {
            for peer in &peers {
                peer.send(&InboundMessage::join("bench")).unwrap();
            }
            while router.rooms().members("bench").map_or(0, |m| m.len()) < size {
                tokio::task::yield_now().await;
            }
            // Let the last join notices land before draining them.
            tokio::time::sleep(Duration::from_millis(50)).await;
        });
        for peer in &mut peers {
            peer.drain();
        }

        let message = InboundMessage::room("bench", "ping");
        group.bench_function(format!("{}_members", size), |b| {
            b.iter_custom(|iters| {
                rt.block_on(async {
                    let start = Instant::now();
                    for _ in 0..iters {
                        peers[0].send(&message).unwrap();
                        for peer in &mut peers[1..] {
                            peer.recv().await.unwrap();
                        }
                    }
                    start.elapsed()
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_direct_latency, bench_room_latency);
criterion_main!(benches);
