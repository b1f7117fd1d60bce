/// End-to-end draw calls: mesh -> setup -> binning -> shading -> blending.
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec4;
use tile_raster::*;

const CLEAR: Vec4 = Vec4::new(0.0, 0.0, 1.0, 1.0);

fn full_screen_quad() -> (Vec<Vec4>, Vec<u32>) {
    let positions = vec![
        Vec4::new(-1.0, -1.0, 0.5, 1.0),
        Vec4::new(1.0, -1.0, 0.5, 1.0),
        Vec4::new(1.0, 1.0, 0.5, 1.0),
        Vec4::new(-1.0, 1.0, 0.5, 1.0),
    ];
    (positions, vec![0, 1, 2, 0, 2, 3])
}

/// Clip-space position of pixel coordinate `(x, y)` on a `size × size` target.
fn pixel_to_clip(x: f32, y: f32, size: f32) -> Vec4 {
    Vec4::new(x / size * 2.0 - 1.0, 1.0 - y / size * 2.0, 0.5, 1.0)
}

/// Bytes of pixel `(x, y)` in a row-major RGBA8 readback.
fn rgba8_at(bytes: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]
}

/// Shades white and counts how many quad-quads it was asked to shade.
#[derive(Default)]
struct CountingShader {
    calls: AtomicUsize,
}

impl<M: MeshData + ?Sized> PixelShader<M> for CountingShader {
    fn shade(&self, _input: &PixelInput<'_>, _mesh: &M) -> PixelOutput {
        self.calls.fetch_add(1, Ordering::Relaxed);
        PixelOutput::from_color(ColorLanes::splat(Vec4::ONE))
    }
}

fn count_pixels(target: &Texture, pred: impl Fn(Vec4) -> bool) -> usize {
    let mut count = 0;
    for y in 0..target.height() {
        for x in 0..target.width() {
            if pred(target.load(x, y)) {
                count += 1;
            }
        }
    }
    count
}

/// Deterministic pseudo-random triangle soup, mixed winding and sizes.
fn triangle_soup(count: usize) -> (Vec<Vec4>, Vec<u32>) {
    let mut state = 0x2545_f491u32;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state >> 8) as f32 / (1u32 << 24) as f32
    };

    let mut positions = Vec::with_capacity(count * 3);
    for _ in 0..count {
        let cx = next() * 2.4 - 1.2;
        let cy = next() * 2.4 - 1.2;
        let extent = 0.05 + next() * 0.4;
        for _ in 0..3 {
            positions.push(Vec4::new(
                cx + (next() - 0.5) * extent,
                cy + (next() - 0.5) * extent,
                next(),
                1.0,
            ));
        }
    }
    let indices = (0..(count * 3) as u32).collect();
    (positions, indices)
}

#[test]
fn single_triangle_writes_its_pixels() {
    // Lower-left half of a 16x16 target
    let positions = [
        pixel_to_clip(0.0, 0.0, 16.0),
        pixel_to_clip(0.0, 16.0, 16.0),
        pixel_to_clip(16.0, 16.0, 16.0),
    ];
    let indices = [0, 1, 2];
    let mesh = SpanMesh::new(&positions, &indices);

    let mut target = Texture::new(16, 16, TextureFormat::R32G32B32A32Float);
    target.clear(CLEAR);
    let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(16, 16));
    ctx.raster_state.cull_mode = CullMode::None;

    let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
    let stats = ctx.draw(&mut target, &mesh, &SolidColorShader::new(red)).unwrap();

    let drawn = count_pixels(&target, |c| c == red);
    assert_eq!(stats.triangles_rasterized, 1);
    assert_eq!(stats.pixels_written, drawn as u64);
    // Diagonal pixel centres lie on the edge; the top-left rule takes one side
    assert!(drawn == 120 || drawn == 136, "drawn = {}", drawn);
    assert_eq!(target.load(0, 15), red);
    assert_eq!(target.load(15, 0), CLEAR);
}

#[test]
fn back_faces_are_culled_by_default() {
    let positions = [
        Vec4::new(-0.5, -0.5, 0.5, 1.0),
        Vec4::new(0.0, 0.5, 0.5, 1.0),
        Vec4::new(0.5, -0.5, 0.5, 1.0),
    ];
    let indices = [0, 1, 2];
    let mesh = SpanMesh::new(&positions, &indices);
    let shader = SolidColorShader::new(Vec4::ONE);
    let mut target = Texture::new(32, 32, TextureFormat::R8G8B8A8Unorm);

    let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(32, 32));
    let stats = ctx.draw(&mut target, &mesh, &shader).unwrap();
    assert_eq!(stats.triangles_culled, 1);
    assert_eq!(stats.pixels_written, 0);
    assert!(target.to_rgba8().iter().all(|&b| b == 0));

    ctx.raster_state.front_counter_clockwise = false;
    let stats = ctx.draw(&mut target, &mesh, &shader).unwrap();
    assert_eq!(stats.triangles_rasterized, 1);
    assert!(stats.pixels_written > 0);
}

#[test]
fn degenerate_and_invisible_triangles_are_counted() {
    let positions = [
        // Collinear
        Vec4::new(-0.5, -0.5, 0.5, 1.0),
        Vec4::new(0.0, 0.0, 0.5, 1.0),
        Vec4::new(0.5, 0.5, 0.5, 1.0),
        // Entirely right of the clip volume
        Vec4::new(2.0, -0.5, 0.5, 1.0),
        Vec4::new(3.0, -0.5, 0.5, 1.0),
        Vec4::new(2.5, 0.5, 0.5, 1.0),
        // Behind the eye
        Vec4::new(-0.5, -0.5, 0.5, -1.0),
        Vec4::new(0.5, -0.5, 0.5, -1.0),
        Vec4::new(0.0, 0.5, 0.5, -1.0),
    ];
    let indices: Vec<u32> = (0..9).collect();
    let mesh = SpanMesh::new(&positions, &indices);
    let mut target = Texture::new(16, 16, TextureFormat::R8G8B8A8Unorm);
    let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(16, 16));
    ctx.raster_state.cull_mode = CullMode::None;

    let stats = ctx
        .draw(&mut target, &mesh, &SolidColorShader::new(Vec4::ONE))
        .unwrap();
    assert_eq!(stats.triangles_submitted, 3);
    assert_eq!(stats.triangles_degenerate, 1);
    assert_eq!(stats.triangles_culled, 2);
    assert_eq!(stats.triangles_rasterized, 0);
    assert!(target.to_rgba8().iter().all(|&b| b == 0));
}

#[test]
fn additive_blending_accumulates() {
    let (positions, indices) = full_screen_quad();
    let mesh = SpanMesh::new(&positions, &indices);
    let mut target = Texture::new(24, 10, TextureFormat::R32G32B32A32Float);
    let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(24, 10));
    ctx.blend_state = BlendState::ADDITIVE;

    let shader = SolidColorShader::new(Vec4::splat(0.25));
    ctx.draw(&mut target, &mesh, &shader).unwrap();
    ctx.draw(&mut target, &mesh, &shader).unwrap();

    assert_eq!(count_pixels(&target, |c| c == Vec4::splat(0.5)), 24 * 10);
}

#[test]
fn alpha_blending_mixes_with_destination() {
    let (positions, indices) = full_screen_quad();
    let mesh = SpanMesh::new(&positions, &indices);
    let mut target = Texture::new(8, 8, TextureFormat::R32G32B32A32Float);
    target.clear(CLEAR);
    let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(8, 8));
    ctx.blend_state = BlendState::ALPHA;

    ctx.draw(
        &mut target,
        &mesh,
        &SolidColorShader::new(Vec4::new(1.0, 0.0, 0.0, 0.5)),
    )
    .unwrap();
    assert_eq!(target.load(3, 3), Vec4::new(0.5, 0.0, 0.5, 1.0));
}

#[test]
fn write_mask_limits_channels() {
    let (positions, indices) = full_screen_quad();
    let mesh = SpanMesh::new(&positions, &indices);
    let mut target = Texture::new(8, 8, TextureFormat::R8G8B8A8Unorm);
    target.clear(CLEAR);
    let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(8, 8));
    ctx.blend_state.write_mask = ColorWriteMask::R | ColorWriteMask::A;

    ctx.draw(&mut target, &mesh, &SolidColorShader::new(Vec4::new(1.0, 1.0, 0.0, 0.0)))
        .unwrap();
    let bytes = target.to_rgba8();
    assert!(bytes.chunks_exact(4).all(|px| px == [255, 0, 255, 0]));

    ctx.blend_state.write_mask = ColorWriteMask::empty();
    let stats = ctx
        .draw(&mut target, &mesh, &SolidColorShader::new(Vec4::ONE))
        .unwrap();
    assert_eq!(stats.pixels_written, 0);
    assert_eq!(target.to_rgba8(), bytes);
}

#[test]
fn vertex_colors_are_interpolated() {
    let positions = [
        pixel_to_clip(0.0, 32.0, 32.0),
        pixel_to_clip(32.0, 32.0, 32.0),
        pixel_to_clip(0.0, 0.0, 32.0),
    ];
    let colors = [
        Vec4::new(1.0, 0.0, 0.0, 1.0),
        Vec4::new(0.0, 1.0, 0.0, 1.0),
        Vec4::new(0.0, 0.0, 1.0, 1.0),
    ];
    let indices = [0, 1, 2];
    let mesh = SpanMesh::new(&positions, &indices).with_colors(&colors);
    let mut target = Texture::new(32, 32, TextureFormat::R32G32B32A32Float);
    let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(32, 32));
    ctx.raster_state.cull_mode = CullMode::None;

    ctx.draw(&mut target, &mesh, &VertexColorShader).unwrap();

    let near_red = target.load(0, 31);
    assert!(near_red.x > 0.9, "{:?}", near_red);
    let near_green = target.load(30, 31);
    assert!(near_green.y > 0.9, "{:?}", near_green);
    let near_blue = target.load(0, 1);
    assert!(near_blue.z > 0.9, "{:?}", near_blue);

    for (x, y) in [(5, 20), (8, 12), (2, 28)] {
        let c = target.load(x, y);
        assert!((c.x + c.y + c.z - 1.0).abs() < 1e-4, "{:?} at {},{}", c, x, y);
        assert!((c.w - 1.0).abs() < 1e-5);
    }
}

#[test]
fn uncolored_mesh_shades_white() {
    let (positions, indices) = full_screen_quad();
    let mesh = SpanMesh::new(&positions, &indices);
    let mut target = Texture::new(5, 7, TextureFormat::R8G8B8A8Unorm);
    let ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(5, 7));
    ctx.draw(&mut target, &mesh, &VertexColorShader).unwrap();
    assert!(target.to_rgba8().iter().all(|&b| b == 255));
}

#[test]
fn viewport_offset_moves_output() {
    let (positions, indices) = full_screen_quad();
    let mesh = SpanMesh::new(&positions, &indices);
    let mut target = Texture::new(32, 32, TextureFormat::R8G8B8A8Unorm);
    let ctx = GraphicsContext::new(SequentialScheduler, Viewport::new(8.0, 4.0, 10.0, 6.0));

    let stats = ctx
        .draw(&mut target, &mesh, &SolidColorShader::new(Vec4::ONE))
        .unwrap();
    assert_eq!(stats.pixels_written, 60);
    assert_eq!(target.load(8, 4), Vec4::ONE);
    assert_eq!(target.load(17, 9), Vec4::ONE);
    assert_eq!(target.load(18, 9), Vec4::ZERO);
    assert_eq!(target.load(7, 4), Vec4::ZERO);
}

#[test_log::test]
fn invalid_draws_leave_target_untouched() {
    let (positions, _) = full_screen_quad();
    let bad_indices = [0, 1, 9];
    let mesh = SpanMesh::new(&positions, &bad_indices);
    let mut target = Texture::new(8, 8, TextureFormat::R8G8B8A8Unorm);
    let shader = SolidColorShader::new(Vec4::ONE);

    let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(8, 8));
    assert_eq!(
        ctx.draw(&mut target, &mesh, &shader),
        Err(DrawError::IndexOutOfRange {
            index: 9,
            vertex_count: 4
        })
    );

    let good = [0, 1, 2];
    let mesh = SpanMesh::new(&positions, &good);
    ctx.viewport = Viewport::new(0.0, 0.0, 0.0, 8.0);
    assert!(matches!(
        ctx.draw(&mut target, &mesh, &shader),
        Err(DrawError::DegenerateViewport { .. })
    ));

    ctx.viewport = Viewport::from_size(8, 8).with_depth_range(1.0, 0.0);
    assert!(matches!(
        ctx.draw(&mut target, &mesh, &shader),
        Err(DrawError::InvalidDepthRange { .. })
    ));

    assert!(target.to_rgba8().iter().all(|&b| b == 0));
}

#[test_log::test]
fn output_is_independent_of_worker_count() {
    let (positions, indices) = triangle_soup(700);
    let mesh = SpanMesh::new(&positions, &indices);
    let shader = SolidColorShader::new(Vec4::new(0.02, 0.03, 0.05, 0.1));

    let render = |scheduler: ParallelScheduler| {
        let mut target = Texture::new(96, 64, TextureFormat::R32G32B32A32Float);
        let mut ctx = GraphicsContext::new(scheduler, Viewport::from_size(96, 64));
        ctx.raster_state.cull_mode = CullMode::None;
        ctx.blend_state = BlendState::ADDITIVE;
        let stats = ctx.draw(&mut target, &mesh, &shader).unwrap();
        (target.to_rgba8(), stats)
    };

    let single = ParallelScheduler::new(SchedulerConfig {
        worker_threads: Some(1),
        min_parallel_load: Some(1),
    })
    .unwrap();
    let many = ParallelScheduler::new(SchedulerConfig {
        worker_threads: Some(4),
        min_parallel_load: Some(1),
    })
    .unwrap();

    let (one_bytes, one_stats) = render(single);
    let (many_bytes, many_stats) = render(many);
    assert_eq!(one_stats, many_stats);
    assert!(one_bytes == many_bytes, "outputs differ between worker counts");
    assert!(one_stats.pixels_written > 0);

    let mut target = Texture::new(96, 64, TextureFormat::R32G32B32A32Float);
    let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(96, 64));
    ctx.raster_state.cull_mode = CullMode::None;
    ctx.blend_state = BlendState::ADDITIVE;
    ctx.draw(&mut target, &mesh, &shader).unwrap();
    assert!(target.to_rgba8() == one_bytes);
}

#[test]
fn stats_balance_across_clusters() {
    let (positions, indices) = triangle_soup(1500);
    let mesh = SpanMesh::new(&positions, &indices);
    assert_eq!(mesh.num_clusters(), 2);

    let mut target = Texture::new(64, 64, TextureFormat::R8G8B8A8Unorm);
    let ctx = GraphicsContext::new(ParallelScheduler::global(), Viewport::from_size(64, 64));
    let stats = ctx
        .draw(&mut target, &mesh, &SolidColorShader::new(Vec4::ONE))
        .unwrap();

    assert_eq!(stats.triangles_submitted, 1500);
    assert_eq!(
        stats.triangles_submitted,
        stats.triangles_culled + stats.triangles_degenerate + stats.triangles_rasterized
    );
    assert!(stats.triangles_culled > 0);
    assert!(stats.triangles_rasterized > 0);
    assert!(stats.pixels_written <= stats.quad_quads_shaded * LANES as u64);
}

#[test]
fn opaque_triangle_stores_exact_unorm_bytes() {
    let positions = [
        pixel_to_clip(2.0, 14.0, 16.0),
        pixel_to_clip(14.0, 14.0, 16.0),
        pixel_to_clip(8.0, 2.0, 16.0),
    ];
    let indices = [0, 1, 2];
    let mesh = SpanMesh::new(&positions, &indices);
    let mut target = Texture::new(16, 16, TextureFormat::R8G8B8A8Unorm);
    target.clear(Vec4::ZERO);
    let ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(16, 16));
    assert_eq!(ctx.blend_state, BlendState::OPAQUE);

    let stats = ctx
        .draw(&mut target, &mesh, &SolidColorShader::new(Vec4::new(1.0, 0.0, 0.0, 1.0)))
        .unwrap();
    assert_eq!(stats.triangles_rasterized, 1);

    let bytes = target.to_rgba8();
    assert_eq!(rgba8_at(&bytes, 16, 8, 8), [255, 0, 0, 255]);
    assert_eq!(rgba8_at(&bytes, 16, 0, 0), [0, 0, 0, 0]);
    assert_eq!(rgba8_at(&bytes, 16, 15, 15), [0, 0, 0, 0]);
}

#[test]
fn overlapping_triangles_in_one_draw_add_up() {
    let positions = [
        // Lower-left half
        pixel_to_clip(0.0, 0.0, 16.0),
        pixel_to_clip(0.0, 16.0, 16.0),
        pixel_to_clip(16.0, 16.0, 16.0),
        // Lower-right half
        pixel_to_clip(0.0, 16.0, 16.0),
        pixel_to_clip(16.0, 16.0, 16.0),
        pixel_to_clip(16.0, 0.0, 16.0),
    ];
    let indices: Vec<u32> = (0..6).collect();
    let mesh = SpanMesh::new(&positions, &indices);
    let mut target = Texture::new(16, 16, TextureFormat::R8G8B8A8Unorm);
    target.clear(Vec4::ZERO);
    let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(16, 16));
    ctx.raster_state.cull_mode = CullMode::None;
    ctx.blend_state = BlendState::ADDITIVE;

    let stats = ctx
        .draw(&mut target, &mesh, &SolidColorShader::new(Vec4::new(0.5, 0.0, 0.0, 0.5)))
        .unwrap();
    assert_eq!(stats.triangles_rasterized, 2);

    let bytes = target.to_rgba8();
    // Covered by both
    assert_eq!(rgba8_at(&bytes, 16, 8, 14), [255, 0, 0, 255]);
    // Covered by one
    assert_eq!(rgba8_at(&bytes, 16, 1, 8), [128, 0, 0, 128]);
    assert_eq!(rgba8_at(&bytes, 16, 14, 8), [128, 0, 0, 128]);
    // Covered by neither
    assert_eq!(rgba8_at(&bytes, 16, 8, 1), [0, 0, 0, 0]);
}

#[test]
fn coincident_vertices_never_reach_the_shader() {
    let positions = [Vec4::new(0.25, 0.25, 0.5, 1.0); 3];
    let indices = [0, 1, 2];
    let mesh = SpanMesh::new(&positions, &indices);
    let mut target = Texture::new(16, 16, TextureFormat::R8G8B8A8Unorm);
    let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(16, 16));
    ctx.raster_state.cull_mode = CullMode::None;

    let shader = CountingShader::default();
    let stats = ctx.draw(&mut target, &mesh, &shader).unwrap();
    assert_eq!(shader.calls.load(Ordering::Relaxed), 0);
    assert_eq!(stats.triangles_submitted, 1);
    assert_eq!(stats.triangles_degenerate, 1);
    assert_eq!(stats.triangles_rasterized, 0);
    assert_eq!(stats.pixels_written, 0);
    assert!(target.to_rgba8().iter().all(|&b| b == 0));
}
