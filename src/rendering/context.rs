/// Render state and the draw entry point
///
/// Draw pipeline:
/// 1. Validate state, target and mesh; nothing is scheduled on error
/// 2. Set up triangle lane groups in parallel, one result slot per group
/// 3. Bin surviving triangles into pixel tasks, in primitive order
/// 4. Shade and blend the tiles of each task in parallel
///
/// Tasks run one after another and the tiles of one task never share a
/// pixel, so the output does not depend on the worker count.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use super::blend::BlendState;
use super::interpolation::InterpolationContext;
use super::rasterizer::{
    RasterState, Rasterizer, TriangleData, TriangleEdges, TriangleSetup, Viewport,
};
use super::shader::{PixelInput, PixelShader};
use super::texture::{Texture, TextureWriter};
use super::tile::{PixelRect, TileCoord, TileRange};
use crate::error::{DrawError, DrawResult};
use crate::jobs::{ChunkPool, Collector, JobScheduler, ParallelScheduler};
use crate::mesh::MeshData;
use crate::{count_add, count_call, perf_scope};

/// Pixel-space scissor rectangle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_rect(&self) -> PixelRect {
        if self.is_empty() {
            return PixelRect::EMPTY;
        }
        let x = self.x.min(i32::MAX as u32) as i32;
        let y = self.y.min(i32::MAX as u32) as i32;
        PixelRect::from_origin_size(x, y, self.width, self.height)
    }
}

/// Depth and stencil configuration. Testing is not implemented; enabling
/// any of it makes `draw` fail.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub stencil_test: bool,
}

impl DepthStencilState {
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.depth_test || self.depth_write || self.stencil_test
    }
}

/// Work done by one draw call.
///
/// `triangles_submitted == triangles_culled + triangles_degenerate + triangles_rasterized`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub triangles_submitted: usize,
    pub triangles_culled: usize,
    pub triangles_degenerate: usize,
    pub triangles_rasterized: usize,
    pub tiles_processed: u64,
    pub quad_quads_shaded: u64,
    pub pixels_written: u64,
}

/// One surviving triangle, binned to the tiles its bounds overlap.
#[derive(Copy, Clone, Debug)]
pub struct PixelTask {
    pub triangle: TriangleData,
    pub edges: TriangleEdges,
    pub tiles: TileRange,
}

/// Render state plus the scheduler that runs draw calls.
pub struct GraphicsContext<S = ParallelScheduler> {
    scheduler: S,
    pub viewport: Viewport,
    pub scissor: Option<ScissorRect>,
    pub raster_state: RasterState,
    pub blend_state: BlendState,
    pub depth_stencil_state: DepthStencilState,
    task_pool: ChunkPool<PixelTask>,
}

impl<S: JobScheduler> GraphicsContext<S> {
    pub fn new(scheduler: S, viewport: Viewport) -> Self {
        Self {
            scheduler,
            viewport,
            scissor: None,
            raster_state: RasterState::default(),
            blend_state: BlendState::default(),
            depth_stencil_state: DepthStencilState::default(),
            task_pool: ChunkPool::new(),
        }
    }

    #[inline]
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Check every draw precondition without touching the target.
    pub fn validate<M: MeshData + ?Sized>(&self, target: &Texture, mesh: &M) -> DrawResult<()> {
        if self.depth_stencil_state.is_enabled() {
            return Err(DrawError::Unimplemented("depth/stencil testing"));
        }
        if !target.format().is_color() {
            return Err(DrawError::UnsupportedTarget(target.format()));
        }
        self.viewport.validate()?;
        if self.scissor.is_some_and(|s| s.is_empty()) {
            return Err(DrawError::EmptyScissor);
        }
        mesh.validate()
    }

    /// Pixels a draw may write: target ∩ scissor (the viewport is applied
    /// by the rasterizer).
    fn clip_rect(&self, target: &Texture) -> PixelRect {
        let full = PixelRect::from_origin_size(0, 0, target.width(), target.height());
        match self.scissor {
            Some(scissor) => full.intersect(&scissor.pixel_rect()),
            None => full,
        }
    }

    /// Rasterize, shade and blend every triangle of `mesh` into `target`.
    pub fn draw<M, P>(&self, target: &mut Texture, mesh: &M, shader: &P) -> DrawResult<DrawStats>
    where
        M: MeshData + ?Sized,
        P: PixelShader<M>,
    {
        self.validate(target, mesh)?;
        count_call!(crate::perf::FUNCTION_COUNTERS.draw_calls);

        let rasterizer = Rasterizer::new(self.viewport, self.clip_rect(target));
        let setups = self.setup_triangles(&rasterizer, mesh);

        let mut stats = DrawStats::default();
        let mut tasks = Collector::new(&self.task_pool);
        {
            perf_scope!("draw.bin");
            for setup in setups.iter().filter_map(OnceLock::get) {
                stats.triangles_culled += setup.culled.count() as usize;
                stats.triangles_degenerate += setup.degenerate.count() as usize;
                for lane in setup.active.iter() {
                    let edges = *setup.lane(lane);
                    if let Some(tiles) = edges.tiles() {
                        stats.tiles_processed += tiles.tile_count() as u64;
                        tasks.push(PixelTask {
                            triangle: *setup.triangle(lane),
                            edges,
                            tiles,
                        });
                    }
                }
            }
        }
        stats.triangles_rasterized = tasks.len();
        stats.triangles_submitted =
            stats.triangles_culled + stats.triangles_degenerate + stats.triangles_rasterized;

        let format = target.format();
        let writer = target
            .writer()
            .map_err(|_| DrawError::UnsupportedTarget(format))?;
        let counters = TileCounters::default();
        {
            perf_scope!("draw.shade");
            for task in tasks.iter() {
                let job = TileJob {
                    task,
                    mesh,
                    shader,
                    blend: &self.blend_state,
                    writer,
                    counters: &counters,
                };
                self.scheduler
                    .dispatch(task.tiles.width(), task.tiles.height(), &job, |job, dx, dy| {
                        job.run(job.task.tiles.tile(dx, dy))
                    });
            }
            self.scheduler.wait_for_completion();
        }
        tasks.dispose();

        stats.quad_quads_shaded = counters.quad_quads.load(Ordering::Relaxed);
        stats.pixels_written = counters.pixels.load(Ordering::Relaxed);

        count_add!(crate::perf::FUNCTION_COUNTERS.triangles_submitted, stats.triangles_submitted);
        count_add!(crate::perf::FUNCTION_COUNTERS.triangles_culled, stats.triangles_culled);
        count_add!(crate::perf::FUNCTION_COUNTERS.triangles_degenerate, stats.triangles_degenerate);
        count_add!(crate::perf::FUNCTION_COUNTERS.pixel_tasks, stats.triangles_rasterized);
        count_add!(crate::perf::FUNCTION_COUNTERS.tiles_visited, stats.tiles_processed);
        count_add!(crate::perf::FUNCTION_COUNTERS.quad_quads_shaded, stats.quad_quads_shaded);
        count_add!(crate::perf::FUNCTION_COUNTERS.pixels_written, stats.pixels_written);
        count_add!(
            crate::perf::FUNCTION_COUNTERS.destination_fetches,
            counters.destination_fetches.load(Ordering::Relaxed)
        );

        log::debug!(
            "draw: {} triangles ({} culled, {} degenerate, {} rasterized), \
             {} tiles, {} quad-quads, {} pixels",
            stats.triangles_submitted,
            stats.triangles_culled,
            stats.triangles_degenerate,
            stats.triangles_rasterized,
            stats.tiles_processed,
            stats.quad_quads_shaded,
            stats.pixels_written
        );
        Ok(stats)
    }

    /// One slot per lane group, filled in parallel.
    fn setup_triangles<M: MeshData + ?Sized>(
        &self,
        rasterizer: &Rasterizer,
        mesh: &M,
    ) -> Vec<OnceLock<TriangleSetup>> {
        perf_scope!("draw.setup");
        let groups: Vec<(usize, usize)> = (0..mesh.num_clusters())
            .flat_map(|cluster| (0..mesh.num_steps(cluster)).map(move |step| (cluster, step)))
            .collect();
        let slots: Vec<OnceLock<TriangleSetup>> = groups.iter().map(|_| OnceLock::new()).collect();

        let job = SetupJob {
            mesh,
            rasterizer,
            state: &self.raster_state,
            groups: &groups,
            slots: &slots,
        };
        self.scheduler.dispatch_1d(groups.len(), &job, |job, index| {
            let (cluster, step) = job.groups[index];
            let triangles = job.mesh.load(cluster, step);
            let filled = job.slots[index].set(job.rasterizer.setup(&triangles, job.state));
            debug_assert!(filled.is_ok(), "lane group {} set up twice", index);
        });
        self.scheduler.wait_for_completion();
        slots
    }
}

struct SetupJob<'a, M: ?Sized> {
    mesh: &'a M,
    rasterizer: &'a Rasterizer,
    state: &'a RasterState,
    groups: &'a [(usize, usize)],
    slots: &'a [OnceLock<TriangleSetup>],
}

#[derive(Default)]
struct TileCounters {
    quad_quads: AtomicU64,
    pixels: AtomicU64,
    destination_fetches: AtomicU64,
}

struct TileJob<'a, M: ?Sized, P> {
    task: &'a PixelTask,
    mesh: &'a M,
    shader: &'a P,
    blend: &'a BlendState,
    writer: TextureWriter<'a>,
    counters: &'a TileCounters,
}

impl<M, P> TileJob<'_, M, P>
where
    M: MeshData + ?Sized,
    P: PixelShader<M>,
{
    fn run(&self, tile: TileCoord) {
        let task = self.task;
        let clip_w = task.triangle.clip.map(|v| v.w);
        let (mut quad_quads, mut pixels, mut fetches) = (0u64, 0u64, 0u64);

        Rasterizer::rasterize_triangle_tile(&task.edges, tile, |fragment| {
            let interpolation = InterpolationContext::new(fragment.barycentric, clip_w);
            let input = PixelInput {
                interpolation: &interpolation,
                mask: fragment.coverage,
                triangle: &task.triangle,
                xs: fragment.xs,
                ys: fragment.ys,
            };
            let output = self.shader.shade(&input, self.mesh);

            let (color, written) = self.blend.apply(&output.color, fragment.coverage, || {
                fetches += 1;
                // Safety: this tile is owned by the current work item
                unsafe { self.writer.quad_quad_load_morton(fragment.morton_index) }
            });
            if written.any() {
                // Safety: as above
                unsafe {
                    self.writer
                        .quad_quad_store_masked(fragment.morton_index, &color, written)
                };
            }
            quad_quads += 1;
            pixels += u64::from(written.count());
        });

        self.counters.quad_quads.fetch_add(quad_quads, Ordering::Relaxed);
        self.counters.pixels.fetch_add(pixels, Ordering::Relaxed);
        self.counters
            .destination_fetches
            .fetch_add(fetches, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::SequentialScheduler;
    use crate::mesh::SpanMesh;
    use crate::rendering::shader::SolidColorShader;
    use crate::rendering::texture::TextureFormat;
    use glam::Vec4;

    fn quad_mesh() -> (Vec<Vec4>, Vec<u32>) {
        let positions = vec![
            Vec4::new(-1.0, -1.0, 0.5, 1.0),
            Vec4::new(1.0, -1.0, 0.5, 1.0),
            Vec4::new(1.0, 1.0, 0.5, 1.0),
            Vec4::new(-1.0, 1.0, 0.5, 1.0),
        ];
        (positions, vec![0, 1, 2, 0, 2, 3])
    }

    #[test]
    fn full_screen_quad_writes_every_pixel_once() {
        let (positions, indices) = quad_mesh();
        let mesh = SpanMesh::new(&positions, &indices);
        let mut target = Texture::new(20, 12, TextureFormat::R8G8B8A8Unorm);
        let ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(20, 12));

        let stats = ctx
            .draw(&mut target, &mesh, &SolidColorShader::new(Vec4::ONE))
            .unwrap();
        assert_eq!(stats.triangles_submitted, 2);
        assert_eq!(stats.triangles_rasterized, 2);
        assert_eq!(stats.pixels_written, 20 * 12);
        assert!(target.to_rgba8().iter().all(|&b| b == 255));
    }

    #[test]
    fn scissor_limits_writes() {
        let (positions, indices) = quad_mesh();
        let mesh = SpanMesh::new(&positions, &indices);
        let mut target = Texture::new(16, 16, TextureFormat::R32G32B32A32Float);
        let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(16, 16));
        ctx.scissor = Some(ScissorRect::new(2, 3, 4, 5));

        let stats = ctx
            .draw(&mut target, &mesh, &SolidColorShader::new(Vec4::ONE))
            .unwrap();
        assert_eq!(stats.pixels_written, 20);
        assert_eq!(target.load(2, 3), Vec4::ONE);
        assert_eq!(target.load(5, 7), Vec4::ONE);
        assert_eq!(target.load(6, 7), Vec4::ZERO);
        assert_eq!(target.load(1, 3), Vec4::ZERO);
    }

    #[test]
    fn rejected_state_leaves_target_untouched() {
        let (positions, indices) = quad_mesh();
        let mesh = SpanMesh::new(&positions, &indices);
        let mut target = Texture::new(8, 8, TextureFormat::R8G8B8A8Unorm);
        let shader = SolidColorShader::new(Vec4::ONE);

        let mut ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(8, 8));
        ctx.depth_stencil_state.depth_test = true;
        assert_eq!(
            ctx.draw(&mut target, &mesh, &shader),
            Err(DrawError::Unimplemented("depth/stencil testing"))
        );

        ctx.depth_stencil_state = DepthStencilState::default();
        ctx.scissor = Some(ScissorRect::new(0, 0, 0, 4));
        assert_eq!(ctx.draw(&mut target, &mesh, &shader), Err(DrawError::EmptyScissor));

        let mut depth = Texture::new(8, 8, TextureFormat::D32FloatS8Uint);
        ctx.scissor = None;
        assert_eq!(
            ctx.draw(&mut depth, &mesh, &shader),
            Err(DrawError::UnsupportedTarget(TextureFormat::D32FloatS8Uint))
        );

        assert!(target.to_rgba8().iter().all(|&b| b == 0));
    }

    #[test]
    fn every_lane_group_is_set_up_exactly_once() {
        use crate::jobs::SchedulerConfig;
        use crate::lanes::LANES;
        use crate::mesh::CLUSTER_SIZE;

        let positions = [
            Vec4::new(-0.5, -0.5, 0.5, 1.0),
            Vec4::new(0.5, -0.5, 0.5, 1.0),
            Vec4::new(0.0, 0.5, 0.5, 1.0),
        ];
        let indices: Vec<u32> = (0..(CLUSTER_SIZE + 20) * 3).map(|i| (i % 3) as u32).collect();
        let mesh = SpanMesh::new(&positions, &indices);
        let scheduler = ParallelScheduler::new(SchedulerConfig {
            worker_threads: Some(4),
            min_parallel_load: Some(1),
        })
        .unwrap();
        let ctx = GraphicsContext::new(scheduler, Viewport::from_size(16, 16));
        let rasterizer = Rasterizer::new(ctx.viewport, PixelRect::from_origin_size(0, 0, 16, 16));

        let slots = ctx.setup_triangles(&rasterizer, &mesh);
        assert_eq!(slots.len(), CLUSTER_SIZE / LANES + 2);
        let rasterized: u32 = slots
            .iter()
            .map(|slot| slot.get().expect("slot left empty").active.count())
            .sum();
        assert_eq!(rasterized as usize, CLUSTER_SIZE + 20);
    }

    #[test]
    fn empty_mesh_draws_nothing() {
        let positions: [Vec4; 0] = [];
        let mesh = SpanMesh::new(&positions, &[]);
        let mut target = Texture::new(4, 4, TextureFormat::R8G8B8A8Unorm);
        let ctx = GraphicsContext::new(SequentialScheduler, Viewport::from_size(4, 4));
        let stats = ctx
            .draw(&mut target, &mesh, &SolidColorShader::new(Vec4::ONE))
            .unwrap();
        assert_eq!(stats, DrawStats::default());
    }
}
