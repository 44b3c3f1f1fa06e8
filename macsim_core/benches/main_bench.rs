//! Benchmarks the medium's per-tick query hot path: `observe`/`arriving_now` are
//! called once per node per tick by the driver (§4.6 step 4), so their cost scales
//! directly with wall-clock per simulated tick. Restructured from the teacher's
//! `main_bench.rs` (which benchmarked `run_simulation` end to end against a
//! `sim_file.sim` fixture) into a microbenchmark over a synthetic topology, since
//! this crate has no scenario-file fixture to load and no full-run persistence to
//! exercise — the medium query is the part worth isolating.

use std::{hint::black_box, time::Duration};

use criterion::{criterion_group, criterion_main, Criterion};
use macsim_core::{
    medium::{Medium, Transmission},
    message::{AppMsg, Destination, Msg},
    topology::{NodeGeometry, Topology},
    units::{Position, Tick},
};

const NODE_COUNT: usize = 50;

fn line_topology(node_count: usize) -> Topology {
    let nodes = (0..node_count)
        .map(|i| NodeGeometry {
            pos: Position::new(0.0, i as f64 * 2.0),
            radius: 0.0,
            transceive_range: 6.0,
        })
        .collect();
    Topology::new(nodes)
}

fn populated_medium(node_count: usize) -> Medium {
    let mut medium = Medium::new();
    for src in 0..node_count {
        let dst = (src + 1) % node_count;
        medium.add(Transmission {
            start_tick: Tick::new(0),
            msg: Msg::Data {
                seq: src as u64,
                src,
                dst,
                length: Tick::new(5),
                payload: AppMsg::new(Destination::Node(dst), "bench", Tick::new(5)),
            },
        });
    }
    medium
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let topology = line_topology(NODE_COUNT);
    let medium = populated_medium(NODE_COUNT);

    let mut group = c.benchmark_group("medium");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("observe all nodes, one tick", |b| {
        b.iter(|| {
            for receiver in 0..NODE_COUNT {
                black_box(medium.observe(receiver, Tick::new(3), &topology));
            }
        })
    });

    group.bench_function("arriving_now all nodes, one tick", |b| {
        b.iter(|| {
            for receiver in 0..NODE_COUNT {
                black_box(medium.arriving_now(receiver, Tick::new(3), &topology));
            }
        })
    });

    group.bench_function("are_neighbors, cold cache", |b| {
        b.iter_batched(
            || line_topology(NODE_COUNT),
            |topology| {
                for receiver in 0..NODE_COUNT {
                    black_box(topology.neighbors_of(receiver).count());
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
