/// Fixed 16-lane value types consumed by the rasterizer
///
/// Each type is a plain 64-byte array wrapper. Plain arithmetic is left to the
/// auto-vectorizer (baseline SSE2/NEON covers it). Fused multiply-add, rounding
/// and comparisons have no baseline x86_64 instruction, so those dispatch at
/// runtime to AVX2+FMA kernels over two `__m256` halves, with a scalar fallback.
use std::ops::{Add, BitAnd, BitOr, Div, Mul, Neg, Not, Shl, Shr, Sub};
use std::sync::OnceLock;

/// Number of lanes processed by one vector operation (one quad-quad or one
/// triangle lane group).
pub const LANES: usize = 16;

/// Instruction set the dispatched lane operations run on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SimdLevel {
    /// AVX2 with FMA3 (two `__m256` halves per operation)
    Avx2Fma,
    Scalar,
}

impl SimdLevel {
    /// Detected once per process; every later call is a cached load.
    #[inline(always)]
    pub fn detected() -> Self {
        static LEVEL: OnceLock<SimdLevel> = OnceLock::new();
        *LEVEL.get_or_init(Self::detect)
    }

    fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                return Self::Avx2Fma;
            }
        }
        Self::Scalar
    }
}

/// Per-lane boolean mask, bit `i` set means lane `i` is active.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Mask16(pub u16);

impl Mask16 {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u16::MAX);

    #[inline(always)]
    pub fn from_fn(mut f: impl FnMut(usize) -> bool) -> Self {
        let mut bits = 0u16;
        for i in 0..LANES {
            bits |= (f(i) as u16) << i;
        }
        Self(bits)
    }

    /// Mask with the first `count` lanes active.
    #[inline]
    pub fn first_n(count: usize) -> Self {
        if count >= LANES {
            Self::ALL
        } else {
            Self(((1u32 << count) - 1) as u16)
        }
    }

    #[inline(always)]
    pub fn test(self, lane: usize) -> bool {
        (self.0 >> lane) & 1 != 0
    }

    #[inline(always)]
    pub fn set(&mut self, lane: usize, value: bool) {
        if value {
            self.0 |= 1 << lane;
        } else {
            self.0 &= !(1 << lane);
        }
    }

    #[inline(always)]
    pub fn any(self) -> bool {
        self.0 != 0
    }

    #[inline(always)]
    pub fn all(self) -> bool {
        self.0 == u16::MAX
    }

    #[inline(always)]
    pub fn none(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterate the indices of active lanes in ascending order.
    #[inline]
    pub fn iter(self) -> impl Iterator<Item = usize> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let lane = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(lane)
        })
    }
}

impl BitAnd for Mask16 {
    type Output = Self;
    #[inline(always)]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for Mask16 {
    type Output = Self;
    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Not for Mask16 {
    type Output = Self;
    #[inline(always)]
    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// Sixteen `f32` lanes.
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(C, align(64))]
pub struct F32x16(pub [f32; LANES]);

impl Default for F32x16 {
    fn default() -> Self {
        Self::ZERO
    }
}

macro_rules! lane_binop {
    ($ty:ident, $trait:ident, $method:ident, $op:tt) => {
        impl $trait for $ty {
            type Output = Self;
            #[inline(always)]
            fn $method(self, rhs: Self) -> Self {
                let mut out = self.0;
                for i in 0..LANES {
                    out[i] = out[i] $op rhs.0[i];
                }
                Self(out)
            }
        }
    };
}

lane_binop!(F32x16, Add, add, +);
lane_binop!(F32x16, Sub, sub, -);
lane_binop!(F32x16, Mul, mul, *);
lane_binop!(F32x16, Div, div, /);

impl Neg for F32x16 {
    type Output = Self;
    #[inline(always)]
    fn neg(self) -> Self {
        self.map(|v| -v)
    }
}

impl F32x16 {
    pub const ZERO: Self = Self([0.0; LANES]);
    pub const ONE: Self = Self([1.0; LANES]);

    #[inline(always)]
    pub fn splat(value: f32) -> Self {
        Self([value; LANES])
    }

    #[inline(always)]
    pub fn from_fn(f: impl FnMut(usize) -> f32) -> Self {
        Self(std::array::from_fn(f))
    }

    #[inline(always)]
    pub fn lane(&self, lane: usize) -> f32 {
        self.0[lane]
    }

    #[inline(always)]
    pub fn map(self, mut f: impl FnMut(f32) -> f32) -> Self {
        let mut out = self.0;
        for v in out.iter_mut() {
            *v = f(*v);
        }
        Self(out)
    }

    #[inline(always)]
    fn zip(self, rhs: Self, mut f: impl FnMut(f32, f32) -> f32) -> Self {
        let mut out = self.0;
        for i in 0..LANES {
            out[i] = f(out[i], rhs.0[i]);
        }
        Self(out)
    }

    #[inline(always)]
    fn compare(self, rhs: Self, mut f: impl FnMut(f32, f32) -> bool) -> Mask16 {
        Mask16::from_fn(|i| f(self.0[i], rhs.0[i]))
    }

    /// `self * b + c` with a single rounding.
    #[inline(always)]
    pub fn mul_add(self, b: Self, c: Self) -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if SimdLevel::detected() == SimdLevel::Avx2Fma {
                return unsafe { avx2::mul_add(&self, &b, &c) };
            }
        }
        let mut out = self.0;
        for i in 0..LANES {
            out[i] = out[i].mul_add(b.0[i], c.0[i]);
        }
        Self(out)
    }

    /// `self * b - c` with a single rounding.
    #[inline(always)]
    pub fn mul_sub(self, b: Self, c: Self) -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if SimdLevel::detected() == SimdLevel::Avx2Fma {
                return unsafe { avx2::mul_sub(&self, &b, &c) };
            }
        }
        let mut out = self.0;
        for i in 0..LANES {
            out[i] = out[i].mul_add(b.0[i], -c.0[i]);
        }
        Self(out)
    }

    #[inline(always)]
    pub fn min(self, rhs: Self) -> Self {
        self.zip(rhs, f32::min)
    }

    #[inline(always)]
    pub fn max(self, rhs: Self) -> Self {
        self.zip(rhs, f32::max)
    }

    #[inline(always)]
    pub fn clamp(self, lo: Self, hi: Self) -> Self {
        self.max(lo).min(hi)
    }

    #[inline(always)]
    pub fn floor(self) -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if SimdLevel::detected() == SimdLevel::Avx2Fma {
                return unsafe { avx2::floor(&self) };
            }
        }
        self.map(f32::floor)
    }

    #[inline(always)]
    pub fn ceil(self) -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if SimdLevel::detected() == SimdLevel::Avx2Fma {
                return unsafe { avx2::ceil(&self) };
            }
        }
        self.map(f32::ceil)
    }

    /// Round half away from zero.
    #[inline(always)]
    pub fn round(self) -> Self {
        self.map(f32::round)
    }

    #[inline(always)]
    pub fn recip(self) -> Self {
        self.map(f32::recip)
    }

    #[inline(always)]
    pub fn abs(self) -> Self {
        self.map(f32::abs)
    }

    #[inline(always)]
    pub fn simd_lt(self, rhs: Self) -> Mask16 {
        #[cfg(target_arch = "x86_64")]
        {
            if SimdLevel::detected() == SimdLevel::Avx2Fma {
                return unsafe { avx2::simd_lt(&self, &rhs) };
            }
        }
        self.compare(rhs, |a, b| a < b)
    }

    #[inline(always)]
    pub fn simd_le(self, rhs: Self) -> Mask16 {
        #[cfg(target_arch = "x86_64")]
        {
            if SimdLevel::detected() == SimdLevel::Avx2Fma {
                return unsafe { avx2::simd_le(&self, &rhs) };
            }
        }
        self.compare(rhs, |a, b| a <= b)
    }

    #[inline(always)]
    pub fn simd_gt(self, rhs: Self) -> Mask16 {
        #[cfg(target_arch = "x86_64")]
        {
            if SimdLevel::detected() == SimdLevel::Avx2Fma {
                return unsafe { avx2::simd_gt(&self, &rhs) };
            }
        }
        self.compare(rhs, |a, b| a > b)
    }

    #[inline(always)]
    pub fn simd_ge(self, rhs: Self) -> Mask16 {
        #[cfg(target_arch = "x86_64")]
        {
            if SimdLevel::detected() == SimdLevel::Avx2Fma {
                return unsafe { avx2::simd_ge(&self, &rhs) };
            }
        }
        self.compare(rhs, |a, b| a >= b)
    }

    #[inline(always)]
    pub fn simd_eq(self, rhs: Self) -> Mask16 {
        #[cfg(target_arch = "x86_64")]
        {
            if SimdLevel::detected() == SimdLevel::Avx2Fma {
                return unsafe { avx2::simd_eq(&self, &rhs) };
            }
        }
        self.compare(rhs, |a, b| a == b)
    }

    #[inline(always)]
    pub fn is_finite(self) -> Mask16 {
        Mask16::from_fn(|i| self.0[i].is_finite())
    }

    /// Per lane: `mask ? a : b`.
    #[inline(always)]
    pub fn select(mask: Mask16, a: Self, b: Self) -> Self {
        Self::from_fn(|i| if mask.test(i) { a.0[i] } else { b.0[i] })
    }

    /// Load `base[offsets[i]]` for every active lane; inactive lanes read as `fallback`.
    #[inline]
    pub fn gather(base: &[f32], offsets: U32x16, mask: Mask16, fallback: f32) -> Self {
        Self::from_fn(|i| {
            if mask.test(i) {
                base[offsets.0[i] as usize]
            } else {
                fallback
            }
        })
    }

    /// Store lane `i` to `base[offsets[i]]` for every active lane.
    #[inline]
    pub fn scatter(self, base: &mut [f32], offsets: U32x16, mask: Mask16) {
        for i in mask.iter() {
            base[offsets.0[i] as usize] = self.0[i];
        }
    }

    /// Lanes rearranged so that output lane `i` is input lane `indices[i]`.
    #[inline]
    pub fn shuffle(self, indices: [u8; LANES]) -> Self {
        Self::from_fn(|i| self.0[indices[i] as usize])
    }
}

/// Sixteen `u32` lanes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct U32x16(pub [u32; LANES]);

lane_binop!(U32x16, BitAnd, bitand, &);
lane_binop!(U32x16, BitOr, bitor, |);

impl Add for U32x16 {
    type Output = Self;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self::from_fn(|i| self.0[i].wrapping_add(rhs.0[i]))
    }
}

impl Shl<u32> for U32x16 {
    type Output = Self;
    #[inline(always)]
    fn shl(self, rhs: u32) -> Self {
        Self::from_fn(|i| self.0[i] << rhs)
    }
}

impl Shr<u32> for U32x16 {
    type Output = Self;
    #[inline(always)]
    fn shr(self, rhs: u32) -> Self {
        Self::from_fn(|i| self.0[i] >> rhs)
    }
}

impl U32x16 {
    pub const ZERO: Self = Self([0; LANES]);

    #[inline(always)]
    pub fn splat(value: u32) -> Self {
        Self([value; LANES])
    }

    #[inline(always)]
    pub fn from_fn(f: impl FnMut(usize) -> u32) -> Self {
        Self(std::array::from_fn(f))
    }

    /// `[0, 1, 2, ..., 15]`
    #[inline(always)]
    pub fn lane_index() -> Self {
        Self::from_fn(|i| i as u32)
    }

    #[inline(always)]
    pub fn lane(&self, lane: usize) -> u32 {
        self.0[lane]
    }

    #[inline(always)]
    pub fn min(self, rhs: Self) -> Self {
        Self::from_fn(|i| self.0[i].min(rhs.0[i]))
    }

    #[inline(always)]
    pub fn simd_lt(self, rhs: Self) -> Mask16 {
        Mask16::from_fn(|i| self.0[i] < rhs.0[i])
    }

    #[inline(always)]
    pub fn simd_eq(self, rhs: Self) -> Mask16 {
        Mask16::from_fn(|i| self.0[i] == rhs.0[i])
    }

    #[inline(always)]
    pub fn select(mask: Mask16, a: Self, b: Self) -> Self {
        Self::from_fn(|i| if mask.test(i) { a.0[i] } else { b.0[i] })
    }

    #[inline(always)]
    pub fn to_f32(self) -> F32x16 {
        F32x16::from_fn(|i| self.0[i] as f32)
    }

    /// Load `base[offsets[i]]` for every active lane; inactive lanes read as zero.
    #[inline]
    pub fn gather(base: &[u32], offsets: Self, mask: Mask16) -> Self {
        Self::from_fn(|i| {
            if mask.test(i) {
                base[offsets.0[i] as usize]
            } else {
                0
            }
        })
    }
}

/// AVX2+FMA kernels. Callers must have seen [`SimdLevel::Avx2Fma`].
#[cfg(target_arch = "x86_64")]
mod avx2 {
    use super::{F32x16, Mask16};
    use core::arch::x86_64::*;

    #[inline]
    #[target_feature(enable = "avx2,fma")]
    unsafe fn load(v: &F32x16, half: usize) -> __m256 {
        _mm256_loadu_ps(v.0.as_ptr().add(half))
    }

    macro_rules! fused {
        ($name:ident, $intrinsic:ident) => {
            #[target_feature(enable = "avx2,fma")]
            pub unsafe fn $name(a: &F32x16, b: &F32x16, c: &F32x16) -> F32x16 {
                let mut out = F32x16::ZERO;
                for half in [0, 8] {
                    let r = $intrinsic(load(a, half), load(b, half), load(c, half));
                    _mm256_storeu_ps(out.0.as_mut_ptr().add(half), r);
                }
                out
            }
        };
    }

    macro_rules! rounding {
        ($name:ident, $intrinsic:ident) => {
            #[target_feature(enable = "avx2,fma")]
            pub unsafe fn $name(a: &F32x16) -> F32x16 {
                let mut out = F32x16::ZERO;
                for half in [0, 8] {
                    _mm256_storeu_ps(out.0.as_mut_ptr().add(half), $intrinsic(load(a, half)));
                }
                out
            }
        };
    }

    // Ordered, non-signalling predicates: a NaN lane compares false like `<` on f32.
    macro_rules! compare {
        ($name:ident, $predicate:ident) => {
            #[target_feature(enable = "avx2,fma")]
            pub unsafe fn $name(a: &F32x16, b: &F32x16) -> Mask16 {
                let mut bits = 0u16;
                for half in [0, 8] {
                    let m = _mm256_cmp_ps(load(a, half), load(b, half), $predicate);
                    bits |= ((_mm256_movemask_ps(m) as u16) & 0xFF) << half;
                }
                Mask16(bits)
            }
        };
    }

    fused!(mul_add, _mm256_fmadd_ps);
    fused!(mul_sub, _mm256_fmsub_ps);
    rounding!(floor, _mm256_floor_ps);
    rounding!(ceil, _mm256_ceil_ps);
    compare!(simd_lt, _CMP_LT_OQ);
    compare!(simd_le, _CMP_LE_OQ);
    compare!(simd_gt, _CMP_GT_OQ);
    compare!(simd_ge, _CMP_GE_OQ);
    compare!(simd_eq, _CMP_EQ_OQ);
}
