/// Triangle setup and tile rasterization for 16-lane triangle groups
/// Setup runs once per lane group; tile evaluation runs once per
/// (triangle, tile) pair and walks the quad-quads inside the clamped bounds
use glam::{Vec2, Vec3, Vec4};

use super::morton::{self, QUAD_QUAD_X, QUAD_QUAD_Y};
use super::tile::{PixelRect, TileCoord, TileRange};
use crate::error::{DrawError, DrawResult};
use crate::lanes::{F32x16, Mask16, U32x16, LANES};

/// Triangles whose signed double area is at most this are dropped as degenerate.
pub const DEGENERATE_AREA_EPSILON: f32 = 1e-6;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

/// Fixed-function rasterizer configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RasterState {
    pub cull_mode: CullMode,
    /// Counter-clockwise triangles (in NDC, y up) are front-facing
    pub front_counter_clockwise: bool,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_counter_clockwise: true,
        }
    }
}

/// Maps NDC to pixels and NDC depth to `[min_depth, max_depth]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Viewport covering a whole `width × height` target.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn with_depth_range(mut self, min_depth: f32, max_depth: f32) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }

    pub fn validate(&self) -> DrawResult<()> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.width <= 0.0 || self.height <= 0.0 {
            return Err(DrawError::DegenerateViewport {
                width: self.width,
                height: self.height,
            });
        }
        let depth_finite = self.min_depth.is_finite() && self.max_depth.is_finite();
        if !depth_finite || self.min_depth > self.max_depth {
            return Err(DrawError::InvalidDepthRange {
                min: self.min_depth,
                max: self.max_depth,
            });
        }
        Ok(())
    }

    /// Pixels whose centres lie inside the viewport.
    pub fn pixel_rect(&self) -> PixelRect {
        PixelRect::covering_centres(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// NDC (y up) to screen space (y down).
    #[inline]
    pub fn ndc_to_screen(&self, ndc: Vec3) -> Vec3 {
        Vec3::new(
            self.x + (ndc.x + 1.0) * 0.5 * self.width,
            self.y + (1.0 - ndc.y) * 0.5 * self.height,
            self.min_depth + ndc.z * (self.max_depth - self.min_depth),
        )
    }
}

/// One clip-space position per lane.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PositionLanes {
    pub x: F32x16,
    pub y: F32x16,
    pub z: F32x16,
    pub w: F32x16,
}

impl PositionLanes {
    #[inline]
    pub fn lane(&self, lane: usize) -> Vec4 {
        Vec4::new(self.x.lane(lane), self.y.lane(lane), self.z.lane(lane), self.w.lane(lane))
    }

    #[inline]
    pub fn set_lane(&mut self, lane: usize, position: Vec4) {
        self.x.0[lane] = position.x;
        self.y.0[lane] = position.y;
        self.z.0[lane] = position.z;
        self.w.0[lane] = position.w;
    }
}

/// Up to 16 clip-space triangles, one per lane.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TriangleLanes {
    pub vertices: [PositionLanes; 3],
    pub primitive: U32x16,
    pub active: Mask16,
}

impl TriangleLanes {
    /// Pack `triangles` into consecutive lanes, numbering primitives from
    /// `first_primitive`.
    ///
    /// # Panics
    /// If more than 16 triangles are given.
    pub fn from_triangles(first_primitive: u32, triangles: &[[Vec4; 3]]) -> Self {
        assert!(triangles.len() <= LANES, "at most {} triangles per lane group", LANES);
        let mut lanes = Self::default();
        for (lane, triangle) in triangles.iter().enumerate() {
            lanes.set_lane(lane, first_primitive + lane as u32, *triangle);
        }
        lanes
    }

    /// Fill and activate one lane.
    #[inline]
    pub fn set_lane(&mut self, lane: usize, primitive: u32, positions: [Vec4; 3]) {
        for (vertex, position) in self.vertices.iter_mut().zip(positions) {
            vertex.set_lane(lane, position);
        }
        self.primitive.0[lane] = primitive;
        self.active.set(lane, true);
    }

    #[inline]
    pub fn clip_positions(&self, lane: usize) -> [Vec4; 3] {
        [
            self.vertices[0].lane(lane),
            self.vertices[1].lane(lane),
            self.vertices[2].lane(lane),
        ]
    }
}

/// Positions of one surviving triangle, handed to pixel shaders.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TriangleData {
    pub clip: [Vec4; 3],
    /// Screen x, y and viewport-mapped depth
    pub screen: [Vec3; 3],
    pub primitive: u32,
}

/// Per-triangle edge setup consumed by tile rasterization.
///
/// Edge `i` is the edge opposite vertex `i`: v1→v2, v2→v0, v0→v1.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TriangleEdges {
    pub screen: [Vec3; 3],
    /// `1 / edge(v0, v1, v2)`; signed
    pub inv_area: f32,
    /// +1 for positive area, -1 otherwise
    pub sign: f32,
    pub top_left: [bool; 3],
    /// Covered pixel bounds, already clamped to the clip rectangle
    pub bounds: PixelRect,
}

impl TriangleEdges {
    #[inline]
    pub fn tiles(&self) -> Option<TileRange> {
        TileRange::covering(&self.bounds)
    }
}

/// Result of setting up one lane group.
#[derive(Clone, Debug)]
pub struct TriangleSetup {
    /// Lanes that survived every rejection test
    pub active: Mask16,
    /// Lanes rejected by visibility, face culling or empty bounds
    pub culled: Mask16,
    /// Lanes rejected for non-finite or near-zero area
    pub degenerate: Mask16,
    triangles: [TriangleData; LANES],
    edges: [TriangleEdges; LANES],
}

impl TriangleSetup {
    fn empty() -> Self {
        Self {
            active: Mask16::NONE,
            culled: Mask16::NONE,
            degenerate: Mask16::NONE,
            triangles: [TriangleData::default(); LANES],
            edges: [TriangleEdges::default(); LANES],
        }
    }

    #[inline]
    pub fn all_skipped(&self) -> bool {
        self.active.none()
    }

    #[inline]
    pub fn lane(&self, lane: usize) -> &TriangleEdges {
        &self.edges[lane]
    }

    #[inline]
    pub fn triangle(&self, lane: usize) -> &TriangleData {
        &self.triangles[lane]
    }
}

/// One evaluated 4×4 block of a triangle.
#[derive(Copy, Clone, Debug)]
pub struct QuadQuadFragment {
    /// Block origin in pixels (multiples of 4)
    pub x: u32,
    pub y: u32,
    pub morton_index: u32,
    pub coverage: Mask16,
    pub xs: U32x16,
    pub ys: U32x16,
    /// Screen-space barycentrics, `edge * inverse_area`
    pub barycentric: [F32x16; 3],
    pub depth: F32x16,
}

/// Edge function `(p - a) × (b - a)`; positive when `p` lies to the
/// counter-clockwise side of a→b in NDC orientation.
///
/// The endpoints are always evaluated in lexicographic (x, then y) order and
/// the result negated when swapped, so `edge(a, b, p) == -edge(b, a, p)`
/// holds bit for bit and two triangles sharing an edge never both claim or
/// both miss a pixel on it.
#[inline(always)]
pub fn edge_function(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    if precedes(b, a) {
        -edge_raw(b, a, p)
    } else {
        edge_raw(a, b, p)
    }
}

/// Lane form of [`edge_function`] for one edge against 16 points; identical rounding.
#[inline(always)]
pub fn edge_function_lanes(a: Vec2, b: Vec2, px: F32x16, py: F32x16) -> F32x16 {
    let (a, b, swapped) = if precedes(b, a) { (b, a, true) } else { (a, b, false) };
    let dx = F32x16::splat(b.x - a.x);
    let dy = F32x16::splat(b.y - a.y);
    let e = (px - F32x16::splat(a.x)).mul_sub(dy, (py - F32x16::splat(a.y)) * dx);
    if swapped {
        -e
    } else {
        e
    }
}

/// Lane form of [`edge_function`] with a different edge in every lane.
#[inline(always)]
pub fn edge_function_wide(a: [F32x16; 2], b: [F32x16; 2], p: [F32x16; 2]) -> F32x16 {
    let swapped = b[0].simd_lt(a[0]) | (b[0].simd_eq(a[0]) & b[1].simd_lt(a[1]));
    let [ax, ay] = [0, 1].map(|k| F32x16::select(swapped, b[k], a[k]));
    let [bx, by] = [0, 1].map(|k| F32x16::select(swapped, a[k], b[k]));
    let e = (p[0] - ax).mul_sub(by - ay, (p[1] - ay) * (bx - ax));
    F32x16::select(swapped, -e, e)
}

#[inline(always)]
fn precedes(a: Vec2, b: Vec2) -> bool {
    a.x < b.x || (a.x == b.x && a.y < b.y)
}

#[inline(always)]
fn edge_raw(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (p.x - a.x).mul_add(b.y - a.y, -((p.y - a.y) * (b.x - a.x)))
}

/// Top-left fill rule for edge a→b of triangles wound by `sign` (±1 per lane).
#[inline]
fn top_left_lanes(a: &[F32x16; 3], b: &[F32x16; 3], sign: F32x16) -> Mask16 {
    let dx = (b[0] - a[0]) * sign;
    let dy = (b[1] - a[1]) * sign;
    dy.simd_gt(F32x16::ZERO) | (dy.simd_eq(F32x16::ZERO) & dx.simd_lt(F32x16::ZERO))
}

/// Setup and tile evaluation bound to a viewport and clip rectangle.
#[derive(Copy, Clone, Debug)]
pub struct Rasterizer {
    viewport: Viewport,
    clip: PixelRect,
}

impl Rasterizer {
    /// `clip` is intersected with the viewport's pixel rectangle.
    pub fn new(viewport: Viewport, clip: PixelRect) -> Self {
        Self {
            viewport,
            clip: clip.intersect(&viewport.pixel_rect()),
        }
    }

    #[inline]
    pub fn clip_rect(&self) -> PixelRect {
        self.clip
    }

    /// Project, reject and cull one lane group.
    pub fn setup(&self, triangles: &TriangleLanes, state: &RasterState) -> TriangleSetup {
        let mut setup = TriangleSetup::empty();
        if triangles.active.none() {
            return setup;
        }

        let [p0, p1, p2] = &triangles.vertices;
        let zero = F32x16::ZERO;

        // Every vertex inside the homogeneous clip volume. Written as "no
        // vertex outside" so NaN coordinates fall through to the degenerate test.
        let mut outside = Mask16::NONE;
        for p in [p0, p1, p2] {
            let neg_w = -p.w;
            outside = outside
                | p.w.simd_le(zero)
                | p.x.simd_lt(neg_w)
                | p.x.simd_gt(p.w)
                | p.y.simd_lt(neg_w)
                | p.y.simd_gt(p.w)
                | p.z.simd_lt(zero)
                | p.z.simd_gt(p.w);
        }
        let visible = triangles.active & !outside;

        // Perspective divide and viewport transform
        let vp = &self.viewport;
        let screen = [p0, p1, p2].map(|p| {
            let inv_w = p.w.recip();
            let half_w = F32x16::splat(0.5 * vp.width);
            let half_h = F32x16::splat(0.5 * vp.height);
            let sx = (p.x * inv_w + F32x16::ONE).mul_add(half_w, F32x16::splat(vp.x));
            let sy = (F32x16::ONE - p.y * inv_w).mul_add(half_h, F32x16::splat(vp.y));
            let depth = (p.z * inv_w).mul_add(
                F32x16::splat(vp.max_depth - vp.min_depth),
                F32x16::splat(vp.min_depth),
            );
            [sx, sy, depth]
        });
        let [s0, s1, s2] = &screen;

        let area = edge_function_wide([s0[0], s0[1]], [s1[0], s1[1]], [s2[0], s2[1]]);
        let finite = screen
            .iter()
            .flatten()
            .fold(area.is_finite(), |mask, v| mask & v.is_finite());
        let well_formed = finite & area.abs().simd_gt(F32x16::splat(DEGENERATE_AREA_EPSILON));
        let candidates = visible & well_formed;

        let ccw = area.simd_gt(zero);
        let front = if state.front_counter_clockwise { ccw } else { !ccw };
        let faced_away = candidates
            & match state.cull_mode {
                CullMode::None => Mask16::NONE,
                CullMode::Front => front,
                CullMode::Back => !front,
            };

        // Pixel-centre bounds clamped to the clip rectangle
        let half = F32x16::splat(0.5);
        let clip = &self.clip;
        let min_x = (s0[0].min(s1[0]).min(s2[0]) - half)
            .ceil()
            .max(F32x16::splat(clip.min_x as f32));
        let min_y = (s0[1].min(s1[1]).min(s2[1]) - half)
            .ceil()
            .max(F32x16::splat(clip.min_y as f32));
        let max_x = (s0[0].max(s1[0]).max(s2[0]) - half)
            .floor()
            .min(F32x16::splat(clip.max_x as f32));
        let max_y = (s0[1].max(s1[1]).max(s2[1]) - half)
            .floor()
            .min(F32x16::splat(clip.max_y as f32));
        let has_pixels = min_x.simd_le(max_x) & min_y.simd_le(max_y);
        let kept = candidates & !faced_away;

        setup.active = kept & has_pixels;
        setup.culled = (triangles.active & !visible) | faced_away | (kept & !has_pixels);
        setup.degenerate = visible & !well_formed;

        let sign = F32x16::select(ccw, F32x16::ONE, -F32x16::ONE);
        let top_left = [(s1, s2), (s2, s0), (s0, s1)].map(|(a, b)| top_left_lanes(a, b, sign));

        for lane in setup.active.iter() {
            let s = screen.map(|v| Vec3::new(v[0].lane(lane), v[1].lane(lane), v[2].lane(lane)));
            setup.edges[lane] = TriangleEdges {
                screen: s,
                inv_area: area.lane(lane).recip(),
                sign: sign.lane(lane),
                top_left: top_left.map(|mask| mask.test(lane)),
                bounds: PixelRect::new(
                    min_x.lane(lane) as i32,
                    min_y.lane(lane) as i32,
                    max_x.lane(lane) as i32,
                    max_y.lane(lane) as i32,
                ),
            };
            setup.triangles[lane] = TriangleData {
                clip: triangles.clip_positions(lane),
                screen: s,
                primitive: triangles.primitive.lane(lane),
            };
        }

        setup
    }

    /// Rasterize every active lane of `setup` that overlaps `tile`, passing
    /// the lane index along with each fragment.
    pub fn rasterize_tile(
        setup: &TriangleSetup,
        tile: TileCoord,
        mut visit: impl FnMut(usize, &QuadQuadFragment),
    ) {
        for lane in setup.active.iter() {
            let edges = setup.lane(lane);
            if edges.tiles().is_some_and(|range| range.contains(tile)) {
                Self::rasterize_triangle_tile(edges, tile, |fragment| visit(lane, fragment));
            }
        }
    }

    /// Walk the quad-quads of one triangle inside one tile. Empty blocks
    /// are skipped.
    pub fn rasterize_triangle_tile(
        edges: &TriangleEdges,
        tile: TileCoord,
        mut visit: impl FnMut(&QuadQuadFragment),
    ) {
        let rect = edges.bounds.intersect(&tile.pixel_rect());
        if rect.is_empty() {
            return;
        }

        let [v0, v1, v2] = edges.screen.map(|v| v.truncate());
        let sign = F32x16::splat(edges.sign);
        let inv_area = F32x16::splat(edges.inv_area);
        let [z0, z1, z2] = edges.screen.map(|v| F32x16::splat(v.z));
        let half = F32x16::splat(0.5);

        for (qx, qy) in rect.quad_quads() {
            let xs = U32x16::splat(qx) + U32x16(QUAD_QUAD_X);
            let ys = U32x16::splat(qy) + U32x16(QUAD_QUAD_Y);
            let px = xs.to_f32() + half;
            let py = ys.to_f32() + half;

            let weights = [
                edge_function_lanes(v1, v2, px, py),
                edge_function_lanes(v2, v0, px, py),
                edge_function_lanes(v0, v1, px, py),
            ];

            let mut coverage =
                Mask16::from_fn(|i| rect.contains(xs.lane(i) as i32, ys.lane(i) as i32));
            for (w, top_left) in weights.iter().zip(edges.top_left) {
                let e = *w * sign;
                let on_edge = if top_left {
                    e.simd_eq(F32x16::ZERO)
                } else {
                    Mask16::NONE
                };
                coverage = coverage & (e.simd_gt(F32x16::ZERO) | on_edge);
            }
            if coverage.none() {
                continue;
            }

            let barycentric = weights.map(|w| w * inv_area);
            let depth =
                barycentric[0].mul_add(z0, barycentric[1].mul_add(z1, barycentric[2] * z2));

            visit(&QuadQuadFragment {
                x: qx,
                y: qy,
                morton_index: morton::encode(qx, qy),
                coverage,
                xs,
                ys,
                barycentric,
                depth,
            });
        }
    }
}
