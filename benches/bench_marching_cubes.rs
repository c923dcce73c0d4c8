use fusion3d::{MarchingCubes, VolumeConfig, VoxelGrid};
use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::Vector3;

fn extract_benchmark(c: &mut Criterion) {
    let config = VolumeConfig::new([128, 128, 128], 0.004, 0.02);
    let center = Vector3::new(0.01, -0.02, 0.005);
    let grid = VoxelGrid::from_sdf(&config, |point| (point - center).norm() - 0.2).unwrap();

    let extractor = MarchingCubes::default();
    c.bench_function("Marching cubes", |b| {
        b.iter(|| extractor.extract(&grid).unwrap());
    });
}

criterion_group!(benches, extract_benchmark);
criterion_main!(benches);
