/// Morton (Z-order curve) coding for texture addressing
///
/// Morton encoding interleaves the bits of X and Y coordinates:
/// x = ...x2 x1 x0
/// y = ...y2 y1 y0
/// morton = ...y2 x2 y1 x1 y0 x0
///
/// Three interchangeable implementations exist. The fastest one available on
/// the running CPU is picked once on first use and cached; every strategy can
/// also be called directly.
use std::sync::OnceLock;

use crate::lanes::{U32x16, LANES};

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::{_pdep_u32, _pext_u32};

/// Largest coordinate (exclusive) representable by a 32-bit Morton index.
pub const MORTON_COORD_LIMIT: u32 = 1 << 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MortonStrategy {
    /// BMI2 `pdep`/`pext`
    Bmi2,
    /// Shift/mask bit spreading
    ShiftMask,
    /// Byte-wise interleave table lookup
    Table,
}

impl MortonStrategy {
    /// All strategies usable on this CPU, best first.
    pub fn available() -> Vec<MortonStrategy> {
        let mut strategies = Vec::with_capacity(3);
        if bmi2_detected() {
            strategies.push(MortonStrategy::Bmi2);
        }
        strategies.push(MortonStrategy::ShiftMask);
        strategies.push(MortonStrategy::Table);
        strategies
    }

    /// Detect once and return the cached choice.
    pub fn detected() -> MortonStrategy {
        static STRATEGY: OnceLock<MortonStrategy> = OnceLock::new();
        *STRATEGY.get_or_init(|| {
            let strategy = if bmi2_detected() {
                MortonStrategy::Bmi2
            } else if vector_shifts_detected() {
                MortonStrategy::ShiftMask
            } else {
                MortonStrategy::Table
            };
            log::debug!("morton coding strategy: {:?}", strategy);
            strategy
        })
    }

    #[inline]
    pub fn encode(self, x: u32, y: u32) -> u32 {
        match self {
            MortonStrategy::Bmi2 => encode_bmi2(x, y),
            MortonStrategy::ShiftMask => encode_shift_mask(x, y),
            MortonStrategy::Table => encode_table(x, y),
        }
    }

    #[inline]
    pub fn decode(self, morton: u32) -> (u32, u32) {
        match self {
            MortonStrategy::Bmi2 => decode_bmi2(morton),
            MortonStrategy::ShiftMask => decode_shift_mask(morton),
            MortonStrategy::Table => decode_table(morton),
        }
    }

    /// Encode sixteen coordinate pairs.
    #[inline]
    pub fn encode_lanes(self, x: U32x16, y: U32x16) -> U32x16 {
        match self {
            MortonStrategy::ShiftMask => spread_lanes(x) | (spread_lanes(y) << 1),
            _ => U32x16::from_fn(|i| self.encode(x.0[i], y.0[i])),
        }
    }

    /// Decode sixteen Morton indices.
    #[inline]
    pub fn decode_lanes(self, morton: U32x16) -> (U32x16, U32x16) {
        match self {
            MortonStrategy::ShiftMask => (compact_lanes(morton), compact_lanes(morton >> 1)),
            _ => {
                let mut xs = [0u32; LANES];
                let mut ys = [0u32; LANES];
                for i in 0..LANES {
                    let (x, y) = self.decode(morton.0[i]);
                    xs[i] = x;
                    ys[i] = y;
                }
                (U32x16(xs), U32x16(ys))
            }
        }
    }
}

/// Encode (x, y) with the detected strategy. Coordinates must be below 65536.
#[inline]
pub fn encode(x: u32, y: u32) -> u32 {
    MortonStrategy::detected().encode(x, y)
}

/// Decode a Morton index with the detected strategy.
#[inline]
pub fn decode(morton: u32) -> (u32, u32) {
    MortonStrategy::detected().decode(morton)
}

#[inline]
pub fn encode_lanes(x: U32x16, y: U32x16) -> U32x16 {
    MortonStrategy::detected().encode_lanes(x, y)
}

#[inline]
pub fn decode_lanes(morton: U32x16) -> (U32x16, U32x16) {
    MortonStrategy::detected().decode_lanes(morton)
}

/// Cached after the first call; `Bmi2` encodes and decodes consult it every time.
#[inline]
fn bmi2_detected() -> bool {
    static BMI2: OnceLock<bool> = OnceLock::new();
    *BMI2.get_or_init(|| {
        #[cfg(target_arch = "x86_64")]
        {
            std::arch::is_x86_feature_detected!("bmi2")
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            false
        }
    })
}

/// The lane form of the shift/mask sequence needs packed 32-bit shifts.
#[inline]
fn vector_shifts_detected() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::arch::is_x86_feature_detected!("sse2")
    }
    #[cfg(target_arch = "aarch64")]
    {
        std::arch::is_aarch64_feature_detected!("neon")
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        false
    }
}

#[inline]
fn encode_bmi2(x: u32, y: u32) -> u32 {
    #[cfg(target_arch = "x86_64")]
    {
        if bmi2_detected() {
            // SAFETY: bmi2 support was verified at runtime.
            return unsafe { encode_pdep(x, y) };
        }
    }
    encode_shift_mask(x, y)
}

#[inline]
fn decode_bmi2(morton: u32) -> (u32, u32) {
    #[cfg(target_arch = "x86_64")]
    {
        if bmi2_detected() {
            // SAFETY: bmi2 support was verified at runtime.
            return unsafe { decode_pext(morton) };
        }
    }
    decode_shift_mask(morton)
}

/// PDEP (parallel deposit) spreads bits according to a mask
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "bmi2")]
unsafe fn encode_pdep(x: u32, y: u32) -> u32 {
    _pdep_u32(x, 0x5555_5555) | _pdep_u32(y, 0xAAAA_AAAA)
}

/// PEXT (parallel extract) compacts bits according to a mask
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "bmi2")]
unsafe fn decode_pext(morton: u32) -> (u32, u32) {
    (_pext_u32(morton, 0x5555_5555), _pext_u32(morton, 0xAAAA_AAAA))
}

#[inline(always)]
const fn spread(mut v: u32) -> u32 {
    v &= 0x0000_FFFF;
    v = (v | (v << 8)) & 0x00FF_00FF;
    v = (v | (v << 4)) & 0x0F0F_0F0F;
    v = (v | (v << 2)) & 0x3333_3333;
    v = (v | (v << 1)) & 0x5555_5555;
    v
}

#[inline(always)]
const fn compact(mut v: u32) -> u32 {
    v &= 0x5555_5555;
    v = (v | (v >> 1)) & 0x3333_3333;
    v = (v | (v >> 2)) & 0x0F0F_0F0F;
    v = (v | (v >> 4)) & 0x00FF_00FF;
    v = (v | (v >> 8)) & 0x0000_FFFF;
    v
}

#[inline]
fn encode_shift_mask(x: u32, y: u32) -> u32 {
    spread(x) | (spread(y) << 1)
}

#[inline]
fn decode_shift_mask(morton: u32) -> (u32, u32) {
    (compact(morton), compact(morton >> 1))
}

#[inline(always)]
fn spread_lanes(v: U32x16) -> U32x16 {
    let v = v & U32x16::splat(0x0000_FFFF);
    let v = (v | (v << 8)) & U32x16::splat(0x00FF_00FF);
    let v = (v | (v << 4)) & U32x16::splat(0x0F0F_0F0F);
    let v = (v | (v << 2)) & U32x16::splat(0x3333_3333);
    (v | (v << 1)) & U32x16::splat(0x5555_5555)
}

#[inline(always)]
fn compact_lanes(v: U32x16) -> U32x16 {
    let v = v & U32x16::splat(0x5555_5555);
    let v = (v | (v >> 1)) & U32x16::splat(0x3333_3333);
    let v = (v | (v >> 2)) & U32x16::splat(0x0F0F_0F0F);
    let v = (v | (v >> 4)) & U32x16::splat(0x00FF_00FF);
    (v | (v >> 8)) & U32x16::splat(0x0000_FFFF)
}

/// `SPREAD_TABLE[b]` holds the 8 bits of `b` moved to the even bit positions.
static SPREAD_TABLE: [u16; 256] = build_spread_table();

/// `COMPACT_TABLE[b]` packs the even bits of `b` into the low nibble and the
/// odd bits into the high nibble.
static COMPACT_TABLE: [u8; 256] = build_compact_table();

const fn build_spread_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = spread(i as u32) as u16;
        i += 1;
    }
    table
}

const fn build_compact_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let x = compact(i as u32);
        let y = compact((i as u32) >> 1);
        table[i] = (x | (y << 4)) as u8;
        i += 1;
    }
    table
}

#[inline]
fn encode_table(x: u32, y: u32) -> u32 {
    let lo = (SPREAD_TABLE[(x & 0xFF) as usize] as u32)
        | ((SPREAD_TABLE[(y & 0xFF) as usize] as u32) << 1);
    let hi = (SPREAD_TABLE[((x >> 8) & 0xFF) as usize] as u32)
        | ((SPREAD_TABLE[((y >> 8) & 0xFF) as usize] as u32) << 1);
    lo | (hi << 16)
}

#[inline]
fn decode_table(morton: u32) -> (u32, u32) {
    let mut x = 0u32;
    let mut y = 0u32;
    for byte in 0..4 {
        let packed = COMPACT_TABLE[((morton >> (byte * 8)) & 0xFF) as usize] as u32;
        x |= (packed & 0xF) << (byte * 4);
        y |= (packed >> 4) << (byte * 4);
    }
    (x, y)
}

/// Lane offsets of a 4×4 quad-quad: lane `i` covers pixel `(QUAD_QUAD_X[i], QUAD_QUAD_Y[i])`.
pub const QUAD_QUAD_X: [u32; LANES] = quad_quad_offsets().0;
pub const QUAD_QUAD_Y: [u32; LANES] = quad_quad_offsets().1;

const fn quad_quad_offsets() -> ([u32; LANES], [u32; LANES]) {
    let mut xs = [0u32; LANES];
    let mut ys = [0u32; LANES];
    let mut i = 0;
    while i < LANES {
        xs[i] = compact(i as u32);
        ys[i] = compact((i as u32) >> 1);
        i += 1;
    }
    (xs, ys)
}
