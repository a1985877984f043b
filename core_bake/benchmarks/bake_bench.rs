use bevy::math::UVec2;
use core_bake::{
    bake, grow_fields, BakeConfig, BakeInputs, Connectivity, GrowthBarriers, GrowthInput,
    RasterGrid, Seed, SeedSource, UniformCost,
};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_seeds(grid: RasterGrid, count: usize, rng: &mut ChaCha8Rng) -> Vec<Seed> {
    let mut taken = vec![false; grid.len()];
    let mut seeds = Vec::with_capacity(count);
    while seeds.len() < count {
        let coord = UVec2::new(rng.gen_range(0..grid.width), rng.gen_range(0..grid.height));
        let idx = grid.index(coord);
        if taken[idx] {
            continue;
        }
        taken[idx] = true;
        seeds.push(Seed {
            coord,
            field: seeds.len() as u32,
        });
    }
    seeds
}

/// Meandering north-to-south river per band of columns, mouth on the last row.
fn random_rivers(grid: RasterGrid, count: u32, rng: &mut ChaCha8Rng) -> (Vec<bool>, Vec<UVec2>) {
    let mut mask = vec![false; grid.len()];
    let mut mouths = Vec::new();
    let band = (grid.width / count.max(1)).max(1);
    for river in 0..count {
        let mut x = river * band + band / 2;
        for y in 0..grid.height {
            mask[grid.index(UVec2::new(x % grid.width, y))] = true;
            if y + 1 < grid.height {
                let step: i32 = rng.gen_range(-1..=1);
                x = (x as i32 + step).rem_euclid(grid.width as i32) as u32;
            }
        }
        mouths.push(UVec2::new(x % grid.width, grid.height - 1));
    }
    (mask, mouths)
}

fn bench_field_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_growth");

    for width in [64u32, 128, 256] {
        let grid = RasterGrid::new(width, width / 2);
        let regions = vec![0u32; grid.len()];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let seeds = random_seeds(grid, (width / 4) as usize, &mut rng);
        group.bench_with_input(BenchmarkId::new("width", width), &width, |b, _| {
            b.iter(|| {
                let input = GrowthInput::new(grid, &regions);
                grow_fields(
                    &input,
                    &seeds,
                    GrowthBarriers::REGION,
                    Connectivity::Eight,
                    &UniformCost,
                )
                .expect("growth")
            })
        });
    }

    group.finish();
}

fn bench_full_bake(c: &mut Criterion) {
    let mut group = c.benchmark_group("bake");
    group.sample_size(10);
    let config = BakeConfig::builtin();

    for width in [64u32, 128] {
        group.bench_with_input(BenchmarkId::new("width", width), &width, |b, &width| {
            b.iter_batched(
                || {
                    let grid = RasterGrid::new(width, width / 2);
                    let mut rng = ChaCha8Rng::seed_from_u64(11);
                    let seeds = random_seeds(grid, (width / 4) as usize, &mut rng);
                    let (rivers, mouths) = random_rivers(grid, 3, &mut rng);
                    BakeInputs::uniform(grid, SeedSource::List(seeds))
                        .with_primary_rivers(rivers, mouths)
                },
                |inputs| bake(&inputs, &config).expect("bake"),
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(bake_benches, bench_field_growth, bench_full_bake);
criterion_main!(bake_benches);
