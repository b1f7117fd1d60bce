/// Pixel shader boundary
use glam::Vec4;

use super::interpolation::InterpolationContext;
use super::rasterizer::TriangleData;
use super::texture::ColorLanes;
use crate::lanes::{F32x16, Mask16, U32x16};
use crate::mesh::{MeshData, SpanMesh};

/// Everything a shader sees for one quad-quad of one triangle.
#[derive(Copy, Clone, Debug)]
pub struct PixelInput<'a> {
    pub interpolation: &'a InterpolationContext,
    /// Covered lanes; inactive lanes are discarded after shading
    pub mask: Mask16,
    pub triangle: &'a TriangleData,
    pub xs: U32x16,
    pub ys: U32x16,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PixelOutput {
    pub color: ColorLanes,
    /// Reserved for depth testing
    pub depth: F32x16,
    /// Reserved for stencil testing
    pub stencil: U32x16,
}

impl PixelOutput {
    #[inline]
    pub fn from_color(color: ColorLanes) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }
}

/// Computes colors for 16 pixels at once. Called concurrently from
/// worker threads.
pub trait PixelShader<M: MeshData + ?Sized>: Sync {
    fn shade(&self, input: &PixelInput<'_>, mesh: &M) -> PixelOutput;
}

/// Fills every covered pixel with one color.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SolidColorShader {
    pub color: Vec4,
}

impl SolidColorShader {
    pub fn new(color: Vec4) -> Self {
        Self { color }
    }
}

impl<M: MeshData + ?Sized> PixelShader<M> for SolidColorShader {
    #[inline]
    fn shade(&self, _input: &PixelInput<'_>, _mesh: &M) -> PixelOutput {
        PixelOutput::from_color(ColorLanes::splat(self.color))
    }
}

/// Perspective-correct interpolation of per-vertex colors. Meshes without
/// colors shade white.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct VertexColorShader;

impl PixelShader<SpanMesh<'_>> for VertexColorShader {
    fn shade(&self, input: &PixelInput<'_>, mesh: &SpanMesh<'_>) -> PixelOutput {
        let [a, b, c] = match mesh.triangle_colors(input.triangle.primitive) {
            Some(colors) => colors,
            None => return PixelOutput::from_color(ColorLanes::splat(Vec4::ONE)),
        };
        PixelOutput::from_color(input.interpolation.interpolate_vec4(a, b, c))
    }
}
