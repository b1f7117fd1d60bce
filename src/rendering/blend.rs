/// Output-merger blending and color write masking.
/// Kept separate from the rasterizer so blend equations
/// can evolve independently of coverage computation.
use bitflags::bitflags;

use crate::lanes::{F32x16, Mask16};

use super::texture::ColorLanes;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstColor,
    InvDstColor,
    DstAlpha,
    InvDstAlpha,
    /// Leave the term unscaled
    None,
}

impl BlendFactor {
    #[inline]
    fn reads_destination(self) -> bool {
        matches!(
            self,
            BlendFactor::DstColor
                | BlendFactor::InvDstColor
                | BlendFactor::DstAlpha
                | BlendFactor::InvDstAlpha
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlendOp {
    /// src + dst
    Add,
    /// src - dst
    Sub,
    /// dst - src
    RevSub,
    /// min(src, dst), factors ignored
    Min,
    /// max(src, dst), factors ignored
    Max,
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
        const ALL = Self::R.bits() | Self::G.bits() | Self::B.bits() | Self::A.bits();
    }
}

/// Blend configuration for one draw call.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BlendState {
    /// If false, shaded color replaces the destination.
    pub enabled: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
    pub write_mask: ColorWriteMask,
}

impl Default for BlendState {
    fn default() -> Self {
        Self::OPAQUE
    }
}

impl BlendState {
    pub const OPAQUE: Self = Self {
        enabled: false,
        src_color: BlendFactor::One,
        dst_color: BlendFactor::Zero,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::Zero,
        alpha_op: BlendOp::Add,
        write_mask: ColorWriteMask::ALL,
    };

    pub const ADDITIVE: Self = Self {
        enabled: true,
        src_color: BlendFactor::One,
        dst_color: BlendFactor::One,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::One,
        alpha_op: BlendOp::Add,
        write_mask: ColorWriteMask::ALL,
    };

    /// Classic "over" compositing with non-premultiplied source.
    pub const ALPHA: Self = Self {
        enabled: true,
        src_color: BlendFactor::SrcAlpha,
        dst_color: BlendFactor::InvSrcAlpha,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::InvSrcAlpha,
        alpha_op: BlendOp::Add,
        write_mask: ColorWriteMask::ALL,
    };

    /// Whether merging `coverage` into the target needs the current
    /// destination pixels.
    #[inline]
    pub fn needs_destination(&self, coverage: Mask16) -> bool {
        if !coverage.all() || self.write_mask != ColorWriteMask::ALL {
            return true;
        }
        self.enabled
            && (self.src_color.reads_destination()
                || self.dst_color.reads_destination()
                || self.src_alpha.reads_destination()
                || self.dst_alpha.reads_destination()
                || matches!(self.color_op, BlendOp::Min | BlendOp::Max)
                || matches!(self.alpha_op, BlendOp::Min | BlendOp::Max)
                || self.dst_color != BlendFactor::Zero
                || self.dst_alpha != BlendFactor::Zero)
    }

    /// Merge `src` into `dst` for the lanes in `coverage`.
    ///
    /// `load_dst` is only called when the result depends on the destination.
    /// Returns the colors to store and the lanes that actually change.
    #[inline]
    pub fn apply(
        &self,
        src: &ColorLanes,
        coverage: Mask16,
        load_dst: impl FnOnce() -> ColorLanes,
    ) -> (ColorLanes, Mask16) {
        if coverage.none() || self.write_mask.is_empty() {
            return (*src, Mask16::NONE);
        }

        let dst = if self.needs_destination(coverage) {
            Some(load_dst())
        } else {
            None
        };

        let blended = match (&dst, self.enabled) {
            (Some(dst), true) => self.blend(src, dst),
            _ => *src,
        };

        let out = match dst {
            Some(dst) => {
                let masked = self.apply_write_mask(&blended, &dst);
                ColorLanes::select(coverage, &masked, &dst)
            }
            // Full coverage, full write mask, no destination term
            None => blended,
        };
        (out, coverage)
    }

    #[inline]
    fn blend(&self, src: &ColorLanes, dst: &ColorLanes) -> ColorLanes {
        let src_rgb = [src.r, src.g, src.b];
        let dst_rgb = [dst.r, dst.g, dst.b];
        let [r, g, b] = std::array::from_fn(|c| {
            let s = src_rgb[c] * factor(self.src_color, c, src, dst);
            let d = dst_rgb[c] * factor(self.dst_color, c, src, dst);
            combine(self.color_op, s, d, src_rgb[c], dst_rgb[c])
        });
        let sa = src.a * factor(self.src_alpha, 3, src, dst);
        let da = dst.a * factor(self.dst_alpha, 3, src, dst);
        let a = combine(self.alpha_op, sa, da, src.a, dst.a);
        ColorLanes { r, g, b, a }
    }

    #[inline]
    fn apply_write_mask(&self, blended: &ColorLanes, dst: &ColorLanes) -> ColorLanes {
        if self.write_mask == ColorWriteMask::ALL {
            return *blended;
        }
        let pick = |flag: ColorWriteMask, new: F32x16, old: F32x16| {
            if self.write_mask.contains(flag) {
                new
            } else {
                old
            }
        };
        ColorLanes {
            r: pick(ColorWriteMask::R, blended.r, dst.r),
            g: pick(ColorWriteMask::G, blended.g, dst.g),
            b: pick(ColorWriteMask::B, blended.b, dst.b),
            a: pick(ColorWriteMask::A, blended.a, dst.a),
        }
    }
}

/// Blend factor for `channel` (0..3 = r, g, b, a).
#[inline(always)]
fn factor(factor: BlendFactor, channel: usize, src: &ColorLanes, dst: &ColorLanes) -> F32x16 {
    let pick = |colors: &ColorLanes| colors.channels()[channel];
    match factor {
        BlendFactor::Zero => F32x16::ZERO,
        BlendFactor::One | BlendFactor::None => F32x16::ONE,
        BlendFactor::SrcColor => pick(src),
        BlendFactor::InvSrcColor => F32x16::ONE - pick(src),
        BlendFactor::SrcAlpha => src.a,
        BlendFactor::InvSrcAlpha => F32x16::ONE - src.a,
        BlendFactor::DstColor => pick(dst),
        BlendFactor::InvDstColor => F32x16::ONE - pick(dst),
        BlendFactor::DstAlpha => dst.a,
        BlendFactor::InvDstAlpha => F32x16::ONE - dst.a,
    }
}

#[inline(always)]
fn combine(op: BlendOp, s: F32x16, d: F32x16, raw_src: F32x16, raw_dst: F32x16) -> F32x16 {
    match op {
        BlendOp::Add => s + d,
        BlendOp::Sub => s - d,
        BlendOp::RevSub => d - s,
        BlendOp::Min => raw_src.min(raw_dst),
        BlendOp::Max => raw_src.max(raw_dst),
    }
}
