//! Book and matching benchmarks (Criterion).
//!
//! Run: `cargo bench` or `cargo bench --bench matching`.

use bourse::sim::{FlowAction, FlowConfig, FlowGenerator};
use bourse::{match_once, AccountLedger, Book, OrderId, Side, Trader, TraderRegistry};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

/// Logged-in traders backed by loopback sockets, built once per benchmark.
fn loopback_traders(n: usize) -> (Vec<Arc<Trader>>, Vec<TcpStream>) {
    let ledger = AccountLedger::new();
    let registry = TraderRegistry::new();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let mut traders = Vec::with_capacity(n);
    let mut peers = Vec::with_capacity(n);
    for i in 0..n {
        let peer = TcpStream::connect(addr).unwrap();
        let (conn, _) = listener.accept().unwrap();
        traders.push(registry.login(conn, &format!("t{}", i), &ledger).unwrap());
        peers.push(peer);
    }
    (traders, peers)
}

/// Post actions only, as (trader index, side, quantity, price).
fn posts_from_flow(seed: u64, n: usize) -> Vec<(usize, Side, u32, u32)> {
    let mut generator = FlowGenerator::new(FlowConfig {
        seed,
        funding_ratio: 0.0,
        cancel_ratio: 0.0,
        ..Default::default()
    });
    let mut posts = Vec::with_capacity(n);
    while posts.len() < n {
        if let FlowAction::Post { trader, side, quantity, price } = generator.next_action() {
            posts.push((trader, side, quantity, price));
        }
    }
    posts
}

fn bench_post_and_match(c: &mut Criterion) {
    const N: usize = 1000;
    let (traders, _peers) = loopback_traders(5);
    let posts = posts_from_flow(42, N);

    let mut group = c.benchmark_group("matching");
    group.throughput(Throughput::Elements(N as u64));
    group.bench_function("post_and_match_1000", |b| {
        b.iter_batched(
            || (Book::new(), posts.clone()),
            |(mut book, posts)| {
                for (trader, side, quantity, price) in posts {
                    book.add_order(side, Arc::clone(&traders[trader]), quantity, price);
                    while match_once(&mut book).is_some() {}
                }
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_cancel(c: &mut Criterion) {
    const RESTING: usize = 500;
    const CANCELS: usize = 100;
    let (traders, _peers) = loopback_traders(5);
    let posts = posts_from_flow(123, RESTING);

    let mut group = c.benchmark_group("matching");
    group.throughput(Throughput::Elements(CANCELS as u64));
    group.bench_function("cancel_100_of_500_resting", |b| {
        b.iter_batched(
            || {
                // All buys so nothing crosses and the book stays populated.
                let mut book = Book::new();
                let mut ids: Vec<OrderId> = Vec::with_capacity(RESTING);
                for (trader, _, quantity, price) in &posts {
                    ids.push(book.add_order(
                        Side::Buy,
                        Arc::clone(&traders[*trader]),
                        *quantity,
                        *price,
                    ));
                }
                (book, ids)
            },
            |(mut book, ids)| {
                for id in &ids[..CANCELS] {
                    book.remove_order(*id);
                }
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_best_quote_scan(c: &mut Criterion) {
    const RESTING: usize = 500;
    let (traders, _peers) = loopback_traders(5);
    let posts = posts_from_flow(7, RESTING);
    let mut book = Book::new();
    for (trader, _, quantity, price) in &posts {
        book.add_order(Side::Buy, Arc::clone(&traders[*trader]), *quantity, *price);
    }

    let mut group = c.benchmark_group("matching");
    group.bench_function("best_bid_scan_500", |b| {
        b.iter(|| std::hint::black_box(book.best_bid()))
    });
    group.finish();
}

criterion_group!(benches, bench_post_and_match, bench_cancel, bench_best_quote_scan);
criterion_main!(benches);
