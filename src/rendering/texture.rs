/// Planar, Morton-ordered texture storage
///
/// Memory layout optimized for quad-quad access:
/// - One array per channel so a 16-lane load touches four contiguous runs
/// - Pixels ordered along a Z-curve; an aligned 4×4 block is 16 consecutive slots
/// - Each plane holds `side²` slots with `side` a power of two, so Morton
///   indices never alias across rows
use std::marker::PhantomData;

use glam::Vec4;

use super::morton;
use crate::error::TextureError;
use crate::lanes::{F32x16, Mask16, U32x16, LANES};

/// Side length of a quad-quad block.
pub const QUAD_QUAD_SIZE: u32 = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Four 8-bit normalized channels
    R8G8B8A8Unorm,
    /// Four 32-bit float channels
    R32G32B32A32Float,
    /// Declared for completeness; no operation is implemented for it
    D32FloatS8Uint,
}

impl TextureFormat {
    #[inline]
    pub fn is_color(self) -> bool {
        !matches!(self, TextureFormat::D32FloatS8Uint)
    }

    #[inline]
    pub fn is_depth_stencil(self) -> bool {
        matches!(self, TextureFormat::D32FloatS8Uint)
    }
}

/// Sixteen RGBA colors in structure-of-arrays form.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ColorLanes {
    pub r: F32x16,
    pub g: F32x16,
    pub b: F32x16,
    pub a: F32x16,
}

impl ColorLanes {
    pub const TRANSPARENT: Self = Self {
        r: F32x16::ZERO,
        g: F32x16::ZERO,
        b: F32x16::ZERO,
        a: F32x16::ZERO,
    };

    #[inline(always)]
    pub fn splat(color: Vec4) -> Self {
        Self {
            r: F32x16::splat(color.x),
            g: F32x16::splat(color.y),
            b: F32x16::splat(color.z),
            a: F32x16::splat(color.w),
        }
    }

    #[inline]
    pub fn lane(&self, lane: usize) -> Vec4 {
        Vec4::new(self.r.lane(lane), self.g.lane(lane), self.b.lane(lane), self.a.lane(lane))
    }

    #[inline]
    pub fn set_lane(&mut self, lane: usize, color: Vec4) {
        self.r.0[lane] = color.x;
        self.g.0[lane] = color.y;
        self.b.0[lane] = color.z;
        self.a.0[lane] = color.w;
    }

    #[inline(always)]
    pub fn select(mask: Mask16, a: &Self, b: &Self) -> Self {
        Self {
            r: F32x16::select(mask, a.r, b.r),
            g: F32x16::select(mask, a.g, b.g),
            b: F32x16::select(mask, a.b, b.b),
            a: F32x16::select(mask, a.a, b.a),
        }
    }

    #[inline(always)]
    pub fn channels(&self) -> [F32x16; 4] {
        [self.r, self.g, self.b, self.a]
    }

    #[inline(always)]
    pub fn from_channels([r, g, b, a]: [F32x16; 4]) -> Self {
        Self { r, g, b, a }
    }
}

enum Planes {
    Unorm8([Vec<u8>; 4]),
    Float32([Vec<f32>; 4]),
    Unallocated,
}

pub struct Texture {
    // Hot data: used for every clamp and index calculation
    width: u32,
    height: u32,
    side: u32,
    format: TextureFormat,
    planes: Planes,
}

impl Texture {
    /// Create a texture cleared to transparent black.
    ///
    /// # Panics
    /// If either dimension is zero or exceeds 65536 (the Morton coordinate range).
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        assert!(width > 0 && height > 0, "texture dimensions must be non-zero");
        assert!(
            width <= morton::MORTON_COORD_LIMIT && height <= morton::MORTON_COORD_LIMIT,
            "texture dimensions must not exceed {}",
            morton::MORTON_COORD_LIMIT
        );

        // Never smaller than one quad-quad so block access stays in bounds
        let side = width.max(height).max(QUAD_QUAD_SIZE).next_power_of_two();
        let slots = side as usize * side as usize;

        let planes = match format {
            TextureFormat::R8G8B8A8Unorm => {
                Planes::Unorm8(std::array::from_fn(|_| vec![0u8; slots]))
            }
            TextureFormat::R32G32B32A32Float => {
                Planes::Float32(std::array::from_fn(|_| vec![0.0f32; slots]))
            }
            TextureFormat::D32FloatS8Uint => Planes::Unallocated,
        };

        log::trace!(
            "texture {}x{} {:?}: {} slots per plane",
            width,
            height,
            format,
            slots
        );

        Self {
            width,
            height,
            side,
            format,
            planes,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Side of the square, power-of-two backing store.
    #[inline]
    pub fn storage_side(&self) -> u32 {
        self.side
    }

    /// Clamp a coordinate pair to the texture's last row/column.
    #[inline(always)]
    pub fn clamp_coords(&self, x: u32, y: u32) -> (u32, u32) {
        (x.min(self.width - 1), y.min(self.height - 1))
    }

    /// Morton index of the (clamped) pixel.
    #[inline]
    pub fn morton_index(&self, x: u32, y: u32) -> u32 {
        let (x, y) = self.clamp_coords(x, y);
        morton::encode(x, y)
    }

    /// Morton index of the quad-quad whose top-left corner is (x, y).
    /// `x` and `y` must be multiples of 4.
    #[inline]
    pub fn quad_quad_index(&self, x: u32, y: u32) -> u32 {
        debug_assert!(
            x % QUAD_QUAD_SIZE == 0 && y % QUAD_QUAD_SIZE == 0,
            "quad-quad origin ({}, {}) is not 4-aligned",
            x,
            y
        );
        let (x, y) = self.clamp_coords(x, y);
        morton::encode(x & !(QUAD_QUAD_SIZE - 1), y & !(QUAD_QUAD_SIZE - 1))
    }

    /// Fill every pixel (including the padding slots) with `color`.
    pub fn clear(&mut self, color: Vec4) {
        match &mut self.planes {
            Planes::Unorm8(planes) => {
                for (plane, value) in planes.iter_mut().zip(color.to_array()) {
                    plane.fill(quantize_unorm(value));
                }
            }
            Planes::Float32(planes) => {
                for (plane, value) in planes.iter_mut().zip(color.to_array()) {
                    plane.fill(value);
                }
            }
            Planes::Unallocated => unsupported_color_op("clear", self.format),
        }
    }

    /// Scalar load with coordinate clamping.
    pub fn load(&self, x: u32, y: u32) -> Vec4 {
        let index = self.morton_index(x, y) as usize;
        match &self.planes {
            Planes::Unorm8(planes) => Vec4::new(
                unorm_to_float(planes[0][index]),
                unorm_to_float(planes[1][index]),
                unorm_to_float(planes[2][index]),
                unorm_to_float(planes[3][index]),
            ),
            Planes::Float32(planes) => Vec4::new(
                planes[0][index],
                planes[1][index],
                planes[2][index],
                planes[3][index],
            ),
            Planes::Unallocated => unsupported_color_op("load", self.format),
        }
    }

    /// Scalar store with coordinate clamping.
    pub fn store(&mut self, x: u32, y: u32, color: Vec4) {
        let index = self.morton_index(x, y) as usize;
        match &mut self.planes {
            Planes::Unorm8(planes) => {
                for (plane, value) in planes.iter_mut().zip(color.to_array()) {
                    plane[index] = quantize_unorm(value);
                }
            }
            Planes::Float32(planes) => {
                for (plane, value) in planes.iter_mut().zip(color.to_array()) {
                    plane[index] = value;
                }
            }
            Planes::Unallocated => unsupported_color_op("store", self.format),
        }
    }

    #[inline]
    fn lane_indices(&self, xs: U32x16, ys: U32x16) -> U32x16 {
        let xs = xs.min(U32x16::splat(self.width - 1));
        let ys = ys.min(U32x16::splat(self.height - 1));
        morton::encode_lanes(xs, ys)
    }

    /// 16-lane gather. Inactive lanes read as transparent black.
    pub fn gather(&self, xs: U32x16, ys: U32x16, mask: Mask16) -> ColorLanes {
        let offsets = self.lane_indices(xs, ys);
        match &self.planes {
            Planes::Unorm8(planes) => {
                let gather = |plane: &[u8]| {
                    F32x16::from_fn(|i| {
                        if mask.test(i) {
                            unorm_to_float(plane[offsets.lane(i) as usize])
                        } else {
                            0.0
                        }
                    })
                };
                ColorLanes {
                    r: gather(&planes[0]),
                    g: gather(&planes[1]),
                    b: gather(&planes[2]),
                    a: gather(&planes[3]),
                }
            }
            Planes::Float32(planes) => ColorLanes {
                r: F32x16::gather(&planes[0], offsets, mask, 0.0),
                g: F32x16::gather(&planes[1], offsets, mask, 0.0),
                b: F32x16::gather(&planes[2], offsets, mask, 0.0),
                a: F32x16::gather(&planes[3], offsets, mask, 0.0),
            },
            Planes::Unallocated => unsupported_color_op("gather", self.format),
        }
    }

    /// 16-lane scatter. Inactive lanes write nothing. When several active
    /// lanes clamp to the same pixel the highest lane wins.
    pub fn scatter(&mut self, xs: U32x16, ys: U32x16, color: &ColorLanes, mask: Mask16) {
        let offsets = self.lane_indices(xs, ys);
        let channels = color.channels();
        match &mut self.planes {
            Planes::Unorm8(planes) => {
                for (plane, channel) in planes.iter_mut().zip(channels) {
                    for lane in mask.iter() {
                        plane[offsets.lane(lane) as usize] = quantize_unorm(channel.lane(lane));
                    }
                }
            }
            Planes::Float32(planes) => {
                for (plane, channel) in planes.iter_mut().zip(channels) {
                    channel.scatter(plane, offsets, mask);
                }
            }
            Planes::Unallocated => unsupported_color_op("scatter", self.format),
        }
    }

    /// Load the aligned quad-quad at (x, y).
    #[inline]
    pub fn quad_quad_load(&self, x: u32, y: u32) -> ColorLanes {
        self.quad_quad_load_morton(self.quad_quad_index(x, y))
    }

    /// Store the aligned quad-quad at (x, y).
    #[inline]
    pub fn quad_quad_store(&mut self, x: u32, y: u32, color: &ColorLanes) {
        let index = self.quad_quad_index(x, y);
        self.quad_quad_store_morton(index, color);
    }

    /// Load the quad-quad starting at Morton index `index` (a multiple of 16).
    pub fn quad_quad_load_morton(&self, index: u32) -> ColorLanes {
        let base = run_base(index);
        match &self.planes {
            Planes::Unorm8(planes) => {
                read_run_unorm(std::array::from_fn(|c| &planes[c][base..base + LANES]))
            }
            Planes::Float32(planes) => {
                read_run_float(std::array::from_fn(|c| &planes[c][base..base + LANES]))
            }
            Planes::Unallocated => unsupported_color_op("quad_quad_load", self.format),
        }
    }

    #[inline]
    pub fn quad_quad_store_morton(&mut self, index: u32, color: &ColorLanes) {
        self.quad_quad_store_masked(index, color, Mask16::ALL);
    }

    /// Store only the lanes selected by `mask`.
    pub fn quad_quad_store_masked(&mut self, index: u32, color: &ColorLanes, mask: Mask16) {
        let base = run_base(index);
        let format = self.format;
        match &mut self.planes {
            Planes::Unorm8(planes) => {
                let [r, g, b, a] = planes;
                write_run_unorm(
                    [
                        &mut r[base..base + LANES],
                        &mut g[base..base + LANES],
                        &mut b[base..base + LANES],
                        &mut a[base..base + LANES],
                    ],
                    color,
                    mask,
                );
            }
            Planes::Float32(planes) => {
                let [r, g, b, a] = planes;
                write_run_float(
                    [
                        &mut r[base..base + LANES],
                        &mut g[base..base + LANES],
                        &mut b[base..base + LANES],
                        &mut a[base..base + LANES],
                    ],
                    color,
                    mask,
                );
            }
            Planes::Unallocated => unsupported_color_op("quad_quad_store", format),
        }
    }

    /// Fallible form of [`Texture::load`].
    pub fn try_load(&self, x: u32, y: u32) -> Result<Vec4, TextureError> {
        self.require_color("load")?;
        Ok(self.load(x, y))
    }

    /// Fallible form of [`Texture::store`].
    pub fn try_store(&mut self, x: u32, y: u32, color: Vec4) -> Result<(), TextureError> {
        self.require_color("store")?;
        self.store(x, y, color);
        Ok(())
    }

    fn require_color(&self, op: &'static str) -> Result<(), TextureError> {
        if self.format.is_color() {
            Ok(())
        } else {
            Err(TextureError::UnsupportedFormat {
                op,
                format: self.format,
            })
        }
    }

    /// Filtered sampling is not part of this pipeline.
    pub fn sample(&self, _u: f32, _v: f32) -> Result<Vec4, TextureError> {
        Err(TextureError::Unimplemented("texture sampling"))
    }

    pub fn sample_depth(&self, _x: u32, _y: u32) -> Result<f32, TextureError> {
        self.depth_stencil_op("sample_depth")
    }

    pub fn load_depth_stencil(&self, _x: u32, _y: u32) -> Result<(f32, u8), TextureError> {
        self.depth_stencil_op("load_depth_stencil")
    }

    pub fn store_depth_stencil(
        &mut self,
        _x: u32,
        _y: u32,
        _depth: f32,
        _stencil: u8,
    ) -> Result<(), TextureError> {
        self.depth_stencil_op("store_depth_stencil")
    }

    fn depth_stencil_op<T>(&self, op: &'static str) -> Result<T, TextureError> {
        if self.format.is_depth_stencil() {
            Err(TextureError::Unimplemented(op))
        } else {
            Err(TextureError::UnsupportedFormat {
                op,
                format: self.format,
            })
        }
    }

    /// Row-major RGBA8 copy of the visible pixels, e.g. for presenting or encoding.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                let index = morton::encode(x, y) as usize;
                match &self.planes {
                    Planes::Unorm8(planes) => {
                        out.extend(planes.iter().map(|plane| plane[index]));
                    }
                    Planes::Float32(planes) => {
                        out.extend(planes.iter().map(|plane| quantize_unorm(plane[index])));
                    }
                    Planes::Unallocated => unsupported_color_op("to_rgba8", self.format),
                }
            }
        }
        out
    }

    /// Raw-pointer view used by parallel workers that write disjoint
    /// quad-quads.
    pub fn writer(&mut self) -> Result<TextureWriter<'_>, TextureError> {
        let planes = match &mut self.planes {
            Planes::Unorm8(planes) => {
                PlanePtrs::Unorm8(planes.each_mut().map(|p| p.as_mut_ptr()))
            }
            Planes::Float32(planes) => {
                PlanePtrs::Float32(planes.each_mut().map(|p| p.as_mut_ptr()))
            }
            Planes::Unallocated => {
                return Err(TextureError::UnsupportedFormat {
                    op: "writer",
                    format: self.format,
                })
            }
        };
        Ok(TextureWriter {
            width: self.width,
            height: self.height,
            slots: self.side as usize * self.side as usize,
            planes,
            _texture: PhantomData,
        })
    }
}

#[derive(Copy, Clone)]
enum PlanePtrs {
    Unorm8([*mut u8; 4]),
    Float32([*mut f32; 4]),
}

/// Shared view into a color texture for parallel, tile-exclusive writes.
///
/// Internally it uses raw pointers into the planes; callers must ensure no
/// two threads touch the same quad-quad concurrently.
#[derive(Copy, Clone)]
pub struct TextureWriter<'a> {
    width: u32,
    height: u32,
    slots: usize,
    planes: PlanePtrs,
    _texture: PhantomData<&'a mut Texture>,
}

// Safety: TextureWriter only carries raw pointers into the texture planes;
// the disjoint-write contract on its unsafe methods rules out data races.
unsafe impl Send for TextureWriter<'_> {}
unsafe impl Sync for TextureWriter<'_> {}

impl TextureWriter<'_> {
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Load the quad-quad at Morton index `index`.
    ///
    /// # Safety
    /// No other thread may be writing the same quad-quad.
    #[inline]
    pub unsafe fn quad_quad_load_morton(&self, index: u32) -> ColorLanes {
        let base = run_base(index);
        assert!(base + LANES <= self.slots, "quad-quad index {} out of range", index);
        match self.planes {
            PlanePtrs::Unorm8(ptrs) => read_run_unorm(
                ptrs.map(|p| std::slice::from_raw_parts(p.add(base) as *const u8, LANES)),
            ),
            PlanePtrs::Float32(ptrs) => read_run_float(
                ptrs.map(|p| std::slice::from_raw_parts(p.add(base) as *const f32, LANES)),
            ),
        }
    }

    /// Store the lanes of `color` selected by `mask` into the quad-quad at
    /// Morton index `index`.
    ///
    /// # Safety
    /// No other thread may be reading or writing the same quad-quad.
    #[inline]
    pub unsafe fn quad_quad_store_masked(&self, index: u32, color: &ColorLanes, mask: Mask16) {
        let base = run_base(index);
        assert!(base + LANES <= self.slots, "quad-quad index {} out of range", index);
        match self.planes {
            PlanePtrs::Unorm8(ptrs) => write_run_unorm(
                ptrs.map(|p| std::slice::from_raw_parts_mut(p.add(base), LANES)),
                color,
                mask,
            ),
            PlanePtrs::Float32(ptrs) => write_run_float(
                ptrs.map(|p| std::slice::from_raw_parts_mut(p.add(base), LANES)),
                color,
                mask,
            ),
        }
    }
}

#[inline(always)]
fn run_base(index: u32) -> usize {
    debug_assert!(index % LANES as u32 == 0, "quad-quad index {} is not 16-aligned", index);
    (index as usize) & !(LANES - 1)
}

#[inline(always)]
fn unorm_to_float(value: u8) -> f32 {
    value as f32 / 255.0
}

/// Round half away from zero, then clamp to the byte range.
#[inline(always)]
pub fn quantize_unorm(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

#[inline(always)]
fn read_run_unorm(planes: [&[u8]; 4]) -> ColorLanes {
    ColorLanes::from_channels(planes.map(|run| F32x16::from_fn(|i| unorm_to_float(run[i]))))
}

#[inline(always)]
fn read_run_float(planes: [&[f32]; 4]) -> ColorLanes {
    ColorLanes::from_channels(planes.map(|run| F32x16::from_fn(|i| run[i])))
}

#[inline(always)]
fn write_run_unorm(planes: [&mut [u8]; 4], color: &ColorLanes, mask: Mask16) {
    for (run, channel) in planes.into_iter().zip(color.channels()) {
        if mask.all() {
            for (dst, value) in run.iter_mut().zip(channel.0) {
                *dst = quantize_unorm(value);
            }
        } else {
            for lane in mask.iter() {
                run[lane] = quantize_unorm(channel.lane(lane));
            }
        }
    }
}

#[inline(always)]
fn write_run_float(planes: [&mut [f32]; 4], color: &ColorLanes, mask: Mask16) {
    for (run, channel) in planes.into_iter().zip(color.channels()) {
        if mask.all() {
            run.copy_from_slice(&channel.0);
        } else {
            for lane in mask.iter() {
                run[lane] = channel.lane(lane);
            }
        }
    }
}

#[cold]
#[inline(never)]
fn unsupported_color_op(op: &'static str, format: TextureFormat) -> ! {
    panic!("{}", TextureError::UnsupportedFormat { op, format })
}
