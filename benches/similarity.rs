use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use graphrag_rs::extraction::dedup::cluster_entities;
use graphrag_rs::utils::{cosine_similarity, normalize_l2};
use graphrag_rs::Entity;

/// Deterministic pseudo-random unit vector.
fn vector(seed: u64, dim: usize) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    let v: Vec<f32> = (0..dim)
        .map(|_| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            ((state >> 33) as f32 / u32::MAX as f32) - 0.25
        })
        .collect();
    normalize_l2(&v)
}

fn cosine_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("cosine_similarity");
    for dim in [256, 1536, 3072] {
        let a = vector(1, dim);
        let b = vector(2, dim);
        group.bench_with_input(BenchmarkId::from_parameter(dim), &dim, |bench, _| {
            bench.iter(|| cosine_similarity(black_box(&a), black_box(&b)))
        });
    }
    group.finish();
}

fn dedup_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster_entities");
    for n in [10_usize, 50] {
        let entities: Vec<Entity> = (0..n)
            .map(|i| Entity::new(format!("e{i}"), format!("Entity {i}"), "Thing"))
            .collect();
        // Every third entity repeats its predecessor's vector so clusters form.
        let embeddings: Vec<Vec<f32>> = (0..n)
            .map(|i| vector(if i % 3 == 2 { i as u64 - 1 } else { i as u64 }, 1536))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bench, _| {
            bench.iter(|| cluster_entities(black_box(entities.clone()), black_box(&embeddings), 0.9))
        });
    }
    group.finish();
}

criterion_group!(benches, cosine_benchmarks, dedup_benchmarks);
criterion_main!(benches);
