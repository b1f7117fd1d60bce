/// Tile binning for the pixel stage
///
/// Key Design Principles:
/// 1. Tile size: 16×16 pixels, i.e. 4×4 quad-quads of 16 lanes each
/// 2. Binning: a triangle visits only the tiles its clamped pixel bounds overlap
/// 3. Tiles are pixel-disjoint, so the tiles of one triangle can be shaded in parallel
use super::texture::QUAD_QUAD_SIZE;

/// Tile size in pixels
pub const TILE_SIZE: u32 = 16;

/// Inclusive integer pixel rectangle. Empty when `min > max` on either axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Default for PixelRect {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl PixelRect {
    pub const EMPTY: Self = Self {
        min_x: 0,
        min_y: 0,
        max_x: -1,
        max_y: -1,
    };

    #[inline]
    pub const fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Rectangle of `width × height` pixels starting at (x, y).
    #[inline]
    pub fn from_origin_size(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self::new(
            x,
            y,
            x.saturating_add(width as i32).saturating_sub(1),
            y.saturating_add(height as i32).saturating_sub(1),
        )
    }

    /// Pixels whose centres (`x + 0.5`) fall inside the continuous range
    /// `[min, max]` on both axes.
    #[inline]
    pub fn covering_centres(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self::new(
            (min_x - 0.5).ceil() as i32,
            (min_y - 0.5).ceil() as i32,
            (max_x - 0.5).floor() as i32,
            (max_y - 0.5).floor() as i32,
        )
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    #[inline]
    pub fn intersect(&self, other: &Self) -> Self {
        Self::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        )
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    #[inline]
    pub fn width(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            (self.max_x - self.min_x + 1) as u32
        }
    }

    #[inline]
    pub fn height(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            (self.max_y - self.min_y + 1) as u32
        }
    }

    /// Origins of every aligned quad-quad overlapping the rectangle,
    /// row by row.
    pub fn quad_quads(&self) -> impl Iterator<Item = (u32, u32)> {
        let align = !(QUAD_QUAD_SIZE as i32 - 1);
        let (x0, y0) = (self.min_x & align, self.min_y & align);
        let (x1, y1) = (self.max_x, self.max_y);
        let empty = self.is_empty() || self.min_x < 0 || self.min_y < 0;
        let rows = if empty { 0..0 } else { 0..((y1 - y0) as u32 / QUAD_QUAD_SIZE + 1) };
        let cols = if empty { 0 } else { (x1 - x0) as u32 / QUAD_QUAD_SIZE + 1 };
        rows.flat_map(move |row| {
            (0..cols).map(move |col| {
                (
                    x0 as u32 + col * QUAD_QUAD_SIZE,
                    y0 as u32 + row * QUAD_QUAD_SIZE,
                )
            })
        })
    }
}

/// Tile address in units of `TILE_SIZE` pixels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    #[inline]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Top-left pixel of the tile
    #[inline]
    pub fn origin(&self) -> (u32, u32) {
        (self.x * TILE_SIZE, self.y * TILE_SIZE)
    }

    #[inline]
    pub fn pixel_rect(&self) -> PixelRect {
        let (x0, y0) = self.origin();
        PixelRect::from_origin_size(x0 as i32, y0 as i32, TILE_SIZE, TILE_SIZE)
    }
}

/// Inclusive range of tiles overlapped by a pixel rectangle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TileRange {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TileRange {
    /// Tiles overlapping `rect`. `None` for empty or negative rectangles;
    /// callers clamp to the render target first.
    pub fn covering(rect: &PixelRect) -> Option<Self> {
        if rect.is_empty() || rect.min_x < 0 || rect.min_y < 0 {
            return None;
        }
        Some(Self {
            min_x: rect.min_x as u32 / TILE_SIZE,
            min_y: rect.min_y as u32 / TILE_SIZE,
            max_x: rect.max_x as u32 / TILE_SIZE,
            max_y: rect.max_y as u32 / TILE_SIZE,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        (self.max_x - self.min_x + 1) as usize
    }

    #[inline]
    pub fn height(&self) -> usize {
        (self.max_y - self.min_y + 1) as usize
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.width() * self.height()
    }

    /// Tile at offset (dx, dy) from the range's first tile.
    #[inline]
    pub fn tile(&self, dx: usize, dy: usize) -> TileCoord {
        debug_assert!(dx < self.width() && dy < self.height());
        TileCoord::new(self.min_x + dx as u32, self.min_y + dy as u32)
    }

    #[inline]
    pub fn contains(&self, tile: TileCoord) -> bool {
        (self.min_x..=self.max_x).contains(&tile.x) && (self.min_y..=self.max_y).contains(&tile.y)
    }

    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (0..self.height()).flat_map(move |dy| (0..self.width()).map(move |dx| self.tile(dx, dy)))
    }
}
