//! Benchmarks for bar replay through the reclaim engine.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use reclaim_levels::prelude::*;

/// Generate bars oscillating around the support ladder
fn generate_bars(n: usize) -> Vec<BarEvent> {
  let t0 = Utc.with_ymd_and_hms(2025, 3, 10, 13, 30, 0).unwrap();
  let mut bars = Vec::with_capacity(n);
  let mut price = 6870.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 25.0 - 2.0; // Deterministic "random"
    price = (price + change).clamp(6830.0, 6890.0);
    bars.push(BarEvent::new(price, price + 1.0, t0 + Duration::seconds(i as i64 * 15), 0.25));
  }

  bars
}

fn engine(hold: u32) -> ReclaimStateMachine {
  EngineBuilder::new()
    .supports([6866.0, 6859.0, 6855.0, 6848.0, 6840.0])
    .held_above_seconds(hold)
    .build()
    .unwrap()
}

fn bench_replay(c: &mut Criterion) {
  let bars = generate_bars(10_000);
  // long hold so the session rarely goes terminal
  let template = engine(3600);

  c.bench_function("replay_10000_bars", |b| {
    b.iter(|| {
      let mut machine = template.fresh();
      let _ = black_box(machine.replay(black_box(&bars)));
    })
  });
}

fn bench_on_bar(c: &mut Criterion) {
  let bars = generate_bars(1000);
  let template = engine(3600);

  let mut group = c.benchmark_group("on_bar");
  for size in [100usize, 1000] {
    group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
      b.iter(|| {
        let mut machine = template.fresh();
        for bar in &bars[..size] {
          black_box(machine.on_bar(bar));
        }
      })
    });
  }
  group.finish();
}

fn bench_parallel(c: &mut Criterion) {
  let symbols = ["ES", "MES", "NQ", "MNQ", "RTY", "YM", "CL", "GC"];
  let bars: Vec<Vec<BarEvent>> = symbols.iter().map(|_| generate_bars(5000)).collect();
  let template = engine(270);

  c.bench_function("replay_parallel_8x5000", |b| {
    b.iter(|| {
      let instruments: Vec<(&str, &[BarEvent])> =
        symbols.iter().copied().zip(bars.iter().map(Vec::as_slice)).collect();
      black_box(replay_parallel(&template, instruments))
    })
  });
}

criterion_group!(benches, bench_replay, bench_on_bar, bench_parallel);
criterion_main!(benches);
