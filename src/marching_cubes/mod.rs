mod buffer;
mod tables;

use nalgebra::Vector3;
use ndarray::Array3;
use rayon::prelude::*;

use crate::{
    error::F3dError,
    mesh::Mesh,
    volume::{triangle_capacity_estimate, PassKind, VolumeConfig, VoxelGrid},
};

use buffer::{TriangleBuffer, TriangleSlot};
use tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRIANGLE_TABLE};

/// Most triangles a single cube configuration produces.
const MAX_CUBE_TRIANGLES: usize = 5;

pub struct ExtractionParameters {
    /// Cubes with any corner weight below this are skipped. Zero keeps every cube.
    ///
    /// With zero, never-observed voxels (tsdf 0, weight 0) count as outside, so a
    /// partial scan also gets a surface where observed voxels behind the surface meet
    /// unobserved ones. Set a positive value to keep only observed cubes.
    pub min_weight: f32,
    /// Output buffer capacity in triangles. `None` uses [`triangle_capacity_estimate`].
    pub max_triangles: Option<usize>,
}

impl Default for ExtractionParameters {
    fn default() -> Self {
        ExtractionParameters {
            min_weight: 0.0,
            max_triangles: None,
        }
    }
}

impl ExtractionParameters {
    pub fn from_config(config: &VolumeConfig) -> Self {
        ExtractionParameters {
            min_weight: config.min_weight,
            max_triangles: config.max_triangles,
        }
    }
}

/// Surface vertex on a cube edge.
#[derive(Clone, Copy, Default)]
struct EdgeVertex {
    position: Vector3<f32>,
    normal: Option<Vector3<f32>>,
}

/// Extracts the zero level set of a [`VoxelGrid`] as a triangle soup.
#[derive(Default)]
pub struct MarchingCubes {
    params: ExtractionParameters,
}

impl MarchingCubes {
    pub fn new(params: ExtractionParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ExtractionParameters {
        &self.params
    }

    /// Polygonizes every cube of eight neighboring voxels in parallel.
    ///
    /// # Arguments
    ///
    /// * `grid` - The volume. It is only read, and other extractions may run over it
    ///   at the same time.
    ///
    /// # Returns
    ///
    /// The mesh in world coordinates. Triangle order is unspecified. Fails with
    /// [`F3dError::CapacityOverflow`] when the output buffer is too small, and with
    /// [`F3dError::ConcurrencyViolation`] when a fusion or reset holds the grid.
    pub fn extract(&self, grid: &VoxelGrid) -> Result<Mesh, F3dError> {
        let _pass = grid.begin_pass(PassKind::Extraction)?;

        let capacity = self
            .params
            .max_triangles
            .unwrap_or_else(|| triangle_capacity_estimate(grid.dimensions()));
        let buffer = TriangleBuffer::with_capacity(capacity);

        let [nx, ny, nz] = grid.dimensions();
        let (cx, cy, cz) = (nx - 1, ny - 1, nz - 1);
        (0..cx * cy * cz).into_par_iter().for_each(|cube| {
            let corner = [cube % cx, (cube / cx) % cy, cube / (cx * cy)];
            let mut triangles = [TriangleSlot::default(); MAX_CUBE_TRIANGLES];
            let count = self.polygonize(grid, corner, &mut triangles);
            buffer.push(&triangles[..count]);
        });

        let required = buffer.required();
        match buffer.into_mesh() {
            Ok(mesh) => {
                log::debug!(
                    "Extracted {} triangles from {} cubes",
                    mesh.triangle_count(),
                    cx * cy * cz
                );
                Ok(mesh)
            }
            Err(err) => {
                log::warn!(
                    "Extraction needs {} triangles, but the buffer holds {}",
                    required,
                    capacity
                );
                Err(err)
            }
        }
    }

    /// Writes the triangles of the cube whose lowest corner is `corner`.
    /// Returns how many were written.
    fn polygonize(
        &self,
        grid: &VoxelGrid,
        corner: [usize; 3],
        triangles: &mut [TriangleSlot; MAX_CUBE_TRIANGLES],
    ) -> usize {
        let tsdf = grid.tsdf();
        let voxels = CORNER_OFFSETS
            .map(|[dx, dy, dz]| [corner[0] + dx, corner[1] + dy, corner[2] + dz]);

        if self.params.min_weight > 0.0 {
            let weight = grid.weight();
            if voxels
                .iter()
                .any(|&[x, y, z]| weight[(z, y, x)] < self.params.min_weight)
            {
                return 0;
            }
        }

        let configuration = voxels
            .iter()
            .enumerate()
            .fold(0usize, |config, (i, [x, y, z])| {
                if tsdf[(*z, *y, *x)] < 0.0 {
                    config | (1 << i)
                } else {
                    config
                }
            });
        let crossed_edges = EDGE_TABLE[configuration];
        if crossed_edges == 0 {
            return 0;
        }

        let mut edge_vertices = [EdgeVertex::default(); 12];
        for (edge, [a, b]) in EDGE_CORNERS.iter().enumerate() {
            if crossed_edges & (1 << edge) != 0 {
                edge_vertices[edge] = edge_vertex(grid, voxels[*a], voxels[*b]);
            }
        }

        let mut count = 0;
        for edges in TRIANGLE_TABLE[configuration]
            .chunks_exact(3)
            .take_while(|edges| edges[0] >= 0)
        {
            // The table winds triangles towards the inside; swapping two corners
            // makes them face the positive side.
            let corners = [edges[0], edges[2], edges[1]].map(|edge| edge_vertices[edge as usize]);
            let positions = corners.map(|vertex| vertex.position);

            let face_normal = (positions[1] - positions[0])
                .cross(&(positions[2] - positions[0]))
                .try_normalize(f32::EPSILON)
                .unwrap_or_else(Vector3::z);
            let normals = corners.map(|vertex| vertex.normal.unwrap_or(face_normal));

            triangles[count] = TriangleSlot { positions, normals };
            count += 1;
        }
        count
    }
}

/// Interpolates the zero crossing between two neighboring voxels.
///
/// Endpoints are ordered by storage index first, so every cube sharing the edge
/// computes the same bits.
fn edge_vertex(grid: &VoxelGrid, a: [usize; 3], b: [usize; 3]) -> EdgeVertex {
    let (a, b) = if grid.flat_index(b[0], b[1], b[2]) < grid.flat_index(a[0], a[1], a[2]) {
        (b, a)
    } else {
        (a, b)
    };

    let tsdf = grid.tsdf();
    let value_a = tsdf[(a[2], a[1], a[0])].abs();
    let value_b = tsdf[(b[2], b[1], b[0])].abs();
    let t = value_a / (value_a + value_b);

    let position_a = grid.voxel_position(a[0], a[1], a[2]);
    let position_b = grid.voxel_position(b[0], b[1], b[2]);
    let position = position_a + (position_b - position_a) * t;

    let gradient_a = gradient(tsdf, a, grid.voxel_size());
    let gradient_b = gradient(tsdf, b, grid.voxel_size());
    let gradient = gradient_a + (gradient_b - gradient_a) * t;

    let volume_to_world = grid.volume_to_world();
    EdgeVertex {
        position: volume_to_world.transform_point(&position),
        normal: volume_to_world
            .transform_vector(&gradient)
            .try_normalize(1e-6),
    }
}

/// Tsdf gradient at a voxel. Central differences inside the grid, one-sided on the border.
fn gradient(tsdf: &Array3<f32>, voxel: [usize; 3], voxel_size: f32) -> Vector3<f32> {
    let (nz, ny, nx) = tsdf.dim();
    let sizes = [nx, ny, nz];

    let mut gradient = Vector3::zeros();
    for axis in 0..3 {
        let (mut lo, mut hi) = (voxel, voxel);
        lo[axis] = voxel[axis].saturating_sub(1);
        hi[axis] = (voxel[axis] + 1).min(sizes[axis] - 1);
        let span = (hi[axis] - lo[axis]) as f32 * voxel_size;
        gradient[axis] = (tsdf[(hi[2], hi[1], hi[0])] - tsdf[(lo[2], lo[1], lo[0])]) / span;
    }
    gradient
}
