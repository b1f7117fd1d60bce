/// Benchmark suite for the draw pipeline
/// Full draw calls plus the setup and blend stages in isolation.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec4;
use tile_raster::rendering::{Rasterizer, TriangleLanes};
use tile_raster::{
    BlendState, ColorLanes, CullMode, GraphicsContext, Mask16, ParallelScheduler, RasterState,
    SchedulerConfig, SequentialScheduler, SolidColorShader, SpanMesh, Texture, TextureFormat,
    Viewport, FUNCTION_COUNTERS,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

/// Grid of small quads covering the screen, two triangles each.
fn grid_mesh(cells_x: u32, cells_y: u32) -> (Vec<Vec4>, Vec<u32>) {
    let mut positions = Vec::new();
    let mut indices = Vec::new();
    for j in 0..=cells_y {
        for i in 0..=cells_x {
            let x = i as f32 / cells_x as f32 * 2.0 - 1.0;
            let y = j as f32 / cells_y as f32 * 2.0 - 1.0;
            positions.push(Vec4::new(x, y, 0.5, 1.0));
        }
    }
    let stride = cells_x + 1;
    for j in 0..cells_y {
        for i in 0..cells_x {
            let a = j * stride + i;
            let (b, c, d) = (a + 1, a + stride + 1, a + stride);
            indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
    }
    (positions, indices)
}

fn bench_draw_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("draw_grid");
    group.sample_size(20);

    for cells in [8u32, 64, 256] {
        let (positions, indices) = grid_mesh(cells, cells);
        let mesh = SpanMesh::new(&positions, &indices);
        let shader = SolidColorShader::new(Vec4::new(0.2, 0.6, 0.9, 1.0));
        let mut target = Texture::new(WIDTH, HEIGHT, TextureFormat::R8G8B8A8Unorm);

        let viewport = Viewport::from_size(WIDTH, HEIGHT);
        let ctx = GraphicsContext::new(ParallelScheduler::global(), viewport);
        group.bench_with_input(BenchmarkId::new("parallel", cells), &cells, |b, _| {
            b.iter(|| black_box(ctx.draw(&mut target, &mesh, &shader)));
        });

        let ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(WIDTH, HEIGHT));
        group.bench_with_input(BenchmarkId::new("sequential", cells), &cells, |b, _| {
            b.iter(|| black_box(ctx.draw(&mut target, &mesh, &shader)));
        });
    }
    group.finish();

    FUNCTION_COUNTERS.snapshot().log_report();
}

fn bench_worker_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_scaling");
    group.sample_size(20);

    let (positions, indices) = grid_mesh(128, 128);
    let mesh = SpanMesh::new(&positions, &indices);
    let shader = SolidColorShader::new(Vec4::splat(0.01));
    let mut target = Texture::new(WIDTH, HEIGHT, TextureFormat::R32G32B32A32Float);

    for workers in [1usize, 2, 4, 8] {
        let scheduler = match ParallelScheduler::new(SchedulerConfig {
            worker_threads: Some(workers),
            min_parallel_load: None,
        }) {
            Ok(scheduler) => scheduler,
            Err(err) => {
                eprintln!("skipping {} workers: {}", workers, err);
                continue;
            }
        };
        let mut ctx = GraphicsContext::new(scheduler, Viewport::from_size(WIDTH, HEIGHT));
        ctx.blend_state = BlendState::ADDITIVE;
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| black_box(ctx.draw(&mut target, &mesh, &shader)));
        });
    }
    group.finish();
}

fn bench_triangle_setup(c: &mut Criterion) {
    let rasterizer = Rasterizer::new(
        Viewport::from_size(WIDTH, HEIGHT),
        tile_raster::rendering::PixelRect::from_origin_size(0, 0, WIDTH, HEIGHT),
    );
    let (positions, indices) = grid_mesh(4, 2);
    let triangles: Vec<[Vec4; 3]> = indices
        .chunks_exact(3)
        .map(|t| [positions[t[0] as usize], positions[t[1] as usize], positions[t[2] as usize]])
        .collect();
    let lanes = TriangleLanes::from_triangles(0, &triangles);
    let state = RasterState {
        cull_mode: CullMode::None,
        ..RasterState::default()
    };

    c.bench_function("triangle_setup_16_lanes", |b| {
        b.iter(|| black_box(rasterizer.setup(black_box(&lanes), &state)));
    });
}

fn bench_blend(c: &mut Criterion) {
    let src = ColorLanes::splat(Vec4::new(1.0, 0.5, 0.25, 0.5));
    let dst = ColorLanes::splat(Vec4::new(0.0, 0.25, 1.0, 1.0));

    let mut group = c.benchmark_group("blend");
    for (name, state) in [
        ("opaque", BlendState::OPAQUE),
        ("alpha", BlendState::ALPHA),
        ("additive", BlendState::ADDITIVE),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| black_box(state.apply(black_box(&src), Mask16::ALL, || dst)));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_draw_grid,
    bench_worker_scaling,
    bench_triangle_setup,
    bench_blend
);
criterion_main!(benches);
