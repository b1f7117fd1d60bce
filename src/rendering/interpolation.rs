/// Perspective-correct barycentric interpolation for one quad-quad
use glam::Vec4;

use crate::lanes::F32x16;

use super::texture::ColorLanes;

/// Per-lane interpolation weights for one triangle over one quad-quad.
///
/// `linear` holds screen-space barycentrics (`edge * inverse_area`);
/// `perspective` holds the same weights corrected by each vertex's `1/w`.
#[derive(Copy, Clone, Debug)]
pub struct InterpolationContext {
    pub linear: [F32x16; 3],
    pub perspective: [F32x16; 3],
}

impl InterpolationContext {
    /// Build the context from screen-space weights and the clip-space `w`
    /// of the three vertices.
    #[inline]
    pub fn new(linear: [F32x16; 3], clip_w: [f32; 3]) -> Self {
        let inv_w = clip_w.map(|w| F32x16::splat(w.recip()));
        let p0 = linear[0] * inv_w[0];
        let p1 = linear[1] * inv_w[1];
        let p2 = linear[2] * inv_w[2];
        let norm = (p0 + p1 + p2).recip();
        Self {
            linear,
            perspective: [p0 * norm, p1 * norm, p2 * norm],
        }
    }

    /// Perspective-correct interpolation of a scalar vertex attribute.
    #[inline]
    pub fn interpolate(&self, a: f32, b: f32, c: f32) -> F32x16 {
        let [w0, w1, w2] = self.perspective;
        w0.mul_add(F32x16::splat(a), w1.mul_add(F32x16::splat(b), w2 * F32x16::splat(c)))
    }

    /// Screen-space (affine) interpolation, used for depth.
    #[inline]
    pub fn interpolate_linear(&self, a: f32, b: f32, c: f32) -> F32x16 {
        let [w0, w1, w2] = self.linear;
        w0.mul_add(F32x16::splat(a), w1.mul_add(F32x16::splat(b), w2 * F32x16::splat(c)))
    }

    /// Perspective-correct interpolation of a 4-component attribute.
    #[inline]
    pub fn interpolate_vec4(&self, a: Vec4, b: Vec4, c: Vec4) -> ColorLanes {
        ColorLanes {
            r: self.interpolate(a.x, b.x, c.x),
            g: self.interpolate(a.y, b.y, c.y),
            b: self.interpolate(a.z, b.z, c.z),
            a: self.interpolate(a.w, b.w, c.w),
        }
    }
}
