//! Query-path micro-benchmarks: the arcs a scheduler asks for every block.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use weft::mini_notation::pattern;
use weft::{Pattern, QueryContext, Rational};

fn bench_queries(c: &mut Criterion) {
    let ctx = QueryContext::new();

    let dense = pattern("[bd sn]*4 [hh hh hh]*2 cp(5,8)");
    c.bench_function("query_dense_cycle", |b| {
        b.iter(|| {
            black_box(dense.query_arc(Rational::ZERO, Rational::ONE, &ctx));
        })
    });

    let layered = Pattern::stack(vec![
        pattern("bd*4").euclid(3, 8, 0),
        pattern("hh*8").degrade_by(0.3).seed(1),
        pattern("<c d e f>").fast(Rational::int(2)),
    ]);
    c.bench_function("query_layered_16_cycles", |b| {
        b.iter(|| {
            black_box(layered.query_arc(Rational::ZERO, Rational::int(16), &ctx));
        })
    });

    let sliced = pattern("a b c d e f g h").shuffle(8).seed(2);
    c.bench_function("query_shuffled_block", |b| {
        b.iter(|| {
            black_box(sliced.query_arc(
                Rational::new(0, 1),
                Rational::new(1, 4),
                &ctx,
            ));
        })
    });
}

criterion_group!(benches, bench_queries);
criterion_main!(benches);
