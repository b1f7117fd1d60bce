/// Mesh input for draw calls
/// Triangles are consumed in clusters, each loaded 16 triangles at a time
use glam::Vec4;

use crate::error::{DrawError, DrawResult};
use crate::lanes::LANES;
use crate::rendering::rasterizer::TriangleLanes;

/// Triangles per cluster (64 lane groups)
pub const CLUSTER_SIZE: usize = 1024;

/// Read-only triangle source shared by every worker of a draw call.
pub trait MeshData: Sync {
    fn num_clusters(&self) -> usize;

    fn num_primitives(&self, cluster: usize) -> usize;

    /// Lane group `step` of `cluster`: primitives `step * 16 ..` of the
    /// cluster, inactive lanes past its end.
    fn load(&self, cluster: usize, step: usize) -> TriangleLanes;

    /// Check every index and attribute before any work is scheduled.
    fn validate(&self) -> DrawResult<()>;

    /// Number of lane groups in `cluster`.
    fn num_steps(&self, cluster: usize) -> usize {
        self.num_primitives(cluster).div_ceil(LANES)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexLayout<'a> {
    /// `[a0, b0, c0, a1, b1, c1, ...]`
    Interleaved(&'a [u32]),
    /// One array per triangle corner
    Planar([&'a [u32]; 3]),
}

/// Slice-backed mesh with clip-space positions and optional vertex colors.
#[derive(Copy, Clone, Debug)]
pub struct SpanMesh<'a> {
    positions: &'a [Vec4],
    colors: Option<&'a [Vec4]>,
    indices: IndexLayout<'a>,
    triangle_count: usize,
}

impl<'a> SpanMesh<'a> {
    /// Mesh with interleaved indices; draws `indices.len() / 3` triangles.
    pub fn new(positions: &'a [Vec4], indices: &'a [u32]) -> Self {
        Self {
            positions,
            colors: None,
            indices: IndexLayout::Interleaved(indices),
            triangle_count: indices.len() / 3,
        }
    }

    /// Mesh with planar indices; draws `a.len()` triangles.
    pub fn planar(positions: &'a [Vec4], a: &'a [u32], b: &'a [u32], c: &'a [u32]) -> Self {
        Self {
            positions,
            colors: None,
            indices: IndexLayout::Planar([a, b, c]),
            triangle_count: a.len(),
        }
    }

    pub fn with_colors(mut self, colors: &'a [Vec4]) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Draw only the first `count` triangles.
    pub fn with_triangle_count(mut self, count: usize) -> Self {
        self.triangle_count = count;
        self
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    #[inline]
    pub fn indices(&self) -> IndexLayout<'a> {
        self.indices
    }

    #[inline]
    pub fn triangle_indices(&self, primitive: u32) -> [u32; 3] {
        let p = primitive as usize;
        match self.indices {
            IndexLayout::Interleaved(indices) => {
                [indices[3 * p], indices[3 * p + 1], indices[3 * p + 2]]
            }
            IndexLayout::Planar([a, b, c]) => [a[p], b[p], c[p]],
        }
    }

    #[inline]
    pub fn triangle_positions(&self, primitive: u32) -> [Vec4; 3] {
        self.triangle_indices(primitive)
            .map(|index| self.positions[index as usize])
    }

    #[inline]
    pub fn triangle_colors(&self, primitive: u32) -> Option<[Vec4; 3]> {
        let colors = self.colors?;
        Some(
            self.triangle_indices(primitive)
                .map(|index| colors[index as usize]),
        )
    }

    fn available_triangles(&self) -> DrawResult<usize> {
        match self.indices {
            IndexLayout::Interleaved(indices) => {
                if indices.len() % 3 != 0 {
                    return Err(DrawError::IndexCountNotTriangles(indices.len()));
                }
                Ok(indices.len() / 3)
            }
            IndexLayout::Planar([a, b, c]) => {
                if a.len() != b.len() || b.len() != c.len() {
                    return Err(DrawError::IndexLengthMismatch {
                        a: a.len(),
                        b: b.len(),
                        c: c.len(),
                    });
                }
                Ok(a.len())
            }
        }
    }
}

impl MeshData for SpanMesh<'_> {
    fn num_clusters(&self) -> usize {
        self.triangle_count.div_ceil(CLUSTER_SIZE)
    }

    fn num_primitives(&self, cluster: usize) -> usize {
        self.triangle_count
            .saturating_sub(cluster * CLUSTER_SIZE)
            .min(CLUSTER_SIZE)
    }

    fn load(&self, cluster: usize, step: usize) -> TriangleLanes {
        let cluster_end = cluster * CLUSTER_SIZE + self.num_primitives(cluster);
        let first = cluster * CLUSTER_SIZE + step * LANES;
        let mut lanes = TriangleLanes::default();
        for (lane, primitive) in (first..cluster_end.max(first)).take(LANES).enumerate() {
            let primitive = primitive as u32;
            lanes.set_lane(lane, primitive, self.triangle_positions(primitive));
        }
        lanes
    }

    fn validate(&self) -> DrawResult<()> {
        let available = self.available_triangles()?;
        if self.triangle_count > available {
            return Err(DrawError::IndexArraysTooShort {
                required: self.triangle_count,
                available,
            });
        }

        let vertex_count = self.positions.len();
        for primitive in 0..self.triangle_count {
            for index in self.triangle_indices(primitive as u32) {
                if index as usize >= vertex_count {
                    return Err(DrawError::IndexOutOfRange {
                        index,
                        vertex_count,
                    });
                }
            }
        }

        if let Some(colors) = self.colors {
            if colors.len() < vertex_count {
                return Err(DrawError::AttributeTooShort {
                    attribute: "colors",
                    required: vertex_count,
                    available: colors.len(),
                });
            }
        }
        Ok(())
    }
}
