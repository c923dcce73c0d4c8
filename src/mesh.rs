use nalgebra::Vector3;
use ndarray::Array2;

use crate::{bounds::Box3Df, error::F3dError};

/// Triangle soup produced by isosurface extraction.
///
/// Vertices `3*i`, `3*i + 1` and `3*i + 2` form triangle `i`, wound counter-clockwise
/// when seen from the positive (in front of the surface) side.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    /// Vertex positions in world meters.
    pub vertices: Vec<Vector3<f32>>,
    /// Unit normals, one per vertex.
    pub normals: Vec<Vector3<f32>>,
    triangle_count: usize,
}

impl Mesh {
    /// Creates a mesh from parallel vertex and normal buffers.
    /// Both must hold `3 * triangle_count` entries.
    pub fn new(vertices: Vec<Vector3<f32>>, normals: Vec<Vector3<f32>>) -> Result<Self, F3dError> {
        if vertices.len() != normals.len() {
            return Err(F3dError::configuration(format!(
                "mesh has {} vertices but {} normals",
                vertices.len(),
                normals.len()
            )));
        }
        if vertices.len() % 3 != 0 {
            return Err(F3dError::configuration(format!(
                "mesh vertex count {} is not a multiple of 3",
                vertices.len()
            )));
        }
        let triangle_count = vertices.len() / 3;
        Ok(Self {
            vertices,
            normals,
            triangle_count,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    pub fn vertex_count(&self) -> usize {
        self.triangle_count * 3
    }

    pub fn is_empty(&self) -> bool {
        self.triangle_count == 0
    }

    /// Triangle indices into `vertices`, as array with shape: (triangle_count, 3).
    pub fn faces(&self) -> Array2<usize> {
        Array2::from_shape_fn((self.triangle_count, 3), |(triangle, corner)| {
            triangle * 3 + corner
        })
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Vector3<f32>; 3]> + '_ {
        self.vertices
            .chunks_exact(3)
            .map(|triangle| [triangle[0], triangle[1], triangle[2]])
    }

    /// Geometric normal of each triangle, following the winding order.
    /// Degenerate triangles get a zero vector.
    pub fn face_normals(&self) -> Vec<Vector3<f32>> {
        self.triangles()
            .map(|[p0, p1, p2]| {
                let normal = (p1 - p0).cross(&(p2 - p0));
                let mag = normal.magnitude();
                if mag > 0.0 {
                    normal / mag
                } else {
                    normal
                }
            })
            .collect()
    }

    pub fn bounds(&self) -> Box3Df {
        Box3Df::from_points(self.vertices.iter())
    }
}
