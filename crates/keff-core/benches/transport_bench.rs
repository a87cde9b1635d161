// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Transport Benchmark
// © 1998–2026 Miroslav Šotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

use criterion::{criterion_group, criterion_main, Criterion};
use keff_core::bank::Bank;
use keff_core::decomposition::CartesianTopology;
use keff_core::geometry::Geometry;
use keff_core::material::Material;
use keff_core::particle::Particle;
use keff_core::random::{RandomStreams, Stream};
use keff_core::run_local;
use keff_core::tally::Tally;
use keff_core::transport::transport;
use keff_types::config::SimulationConfig;
use std::hint::black_box;

fn bench_config() -> SimulationConfig {
    let mut cfg = SimulationConfig::default();
    cfg.run.particles = 2_000;
    cfg.run.batches = 2;
    cfg.run.active = 1;
    cfg.geometry.cube = [40.0; 3];
    cfg
}

fn bench_histories(c: &mut Criterion) {
    let mut group = c.benchmark_group("histories");
    let cfg = bench_config();
    let topo = CartesianTopology::new([1, 1, 1], 1).expect("topology");
    let geometry = Geometry::new(&cfg, &topo, 0);

    group.bench_function("1000_histories_reflect", |b| {
        b.iter_batched(
            || {
                let mut rng = RandomStreams::new(cfg.run.seed);
                let material = Material::from_params(&cfg.material, &mut rng).expect("material");
                let tally = Tally::new(&geometry, cfg.output.bins, cfg.run.particles);
                (rng, material, tally, Bank::new(2_000).expect("bank"))
            },
            |(mut rng, material, mut tally, mut fission)| {
                tally.active = true;
                for history in 0..1_000u64 {
                    rng.select(Stream::Init);
                    let mut p = Particle::sample_source(&geometry, &mut rng).expect("sample");
                    rng.seek(Stream::Track, history);
                    p.seed = rng.state(Stream::Track);
                    transport(&mut p, &geometry, &material, 2.5, &mut tally, &mut fission, &mut rng)
                        .expect("transport should succeed");
                }
                black_box(fission.len());
            },
            criterion::BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_eigenvalue(c: &mut Criterion) {
    let mut group = c.benchmark_group("eigenvalue");
    group.sample_size(10);

    for (name, grid) in [("1_rank", [1, 1, 1]), ("2x2x1_ranks", [2, 2, 1])] {
        let mut cfg = bench_config();
        cfg.geometry.grid = grid;
        let ranks = grid.iter().product();
        group.bench_function(name, |b| {
            b.iter(|| {
                let summary = run_local(&cfg, ranks, ()).expect("run should succeed");
                black_box(summary.mean);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_histories, bench_eigenvalue);
criterion_main!(benches);
