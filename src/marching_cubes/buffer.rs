use std::{
    cell::UnsafeCell,
    sync::atomic::{AtomicUsize, Ordering},
};

use nalgebra::Vector3;

use crate::{error::F3dError, mesh::Mesh};

#[derive(Clone, Copy)]
pub(crate) struct TriangleSlot {
    pub positions: [Vector3<f32>; 3],
    pub normals: [Vector3<f32>; 3],
}

impl Default for TriangleSlot {
    fn default() -> Self {
        Self {
            positions: [Vector3::zeros(); 3],
            normals: [Vector3::zeros(); 3],
        }
    }
}

/// Fixed-capacity triangle output shared by the extraction workers.
///
/// Workers reserve contiguous blocks through an atomic counter. The counter keeps
/// advancing past the capacity, so after the pass it holds the number of triangles
/// the extraction actually needed.
pub(crate) struct TriangleBuffer {
    slots: Vec<UnsafeCell<TriangleSlot>>,
    count: AtomicUsize,
}

// Each reserved block is written by exactly one worker, and blocks never overlap.
unsafe impl Sync for TriangleBuffer {}

impl TriangleBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity)
                .map(|_| UnsafeCell::new(TriangleSlot::default()))
                .collect(),
            count: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Reserves room for `triangles` and writes them. Blocks that do not fit are
    /// counted but dropped.
    pub fn push(&self, triangles: &[TriangleSlot]) {
        if triangles.is_empty() {
            return;
        }

        let start = self.count.fetch_add(triangles.len(), Ordering::Relaxed);
        let end = start + triangles.len();
        if end > self.slots.len() {
            return;
        }

        for (slot, triangle) in self.slots[start..end].iter().zip(triangles) {
            unsafe {
                *slot.get() = *triangle;
            }
        }
    }

    /// Number of triangles reserved so far, including dropped ones.
    pub fn required(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn into_mesh(self) -> Result<Mesh, F3dError> {
        let required = self.count.into_inner();
        let capacity = self.slots.len();
        if required > capacity {
            return Err(F3dError::CapacityOverflow { required, capacity });
        }

        let mut vertices = Vec::with_capacity(required * 3);
        let mut normals = Vec::with_capacity(required * 3);
        for slot in self.slots.into_iter().take(required) {
            let triangle = slot.into_inner();
            vertices.extend_from_slice(&triangle.positions);
            normals.extend_from_slice(&triangle.normals);
        }
        Mesh::new(vertices, normals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    fn slot(value: f32) -> TriangleSlot {
        TriangleSlot {
            positions: [Vector3::repeat(value); 3],
            normals: [Vector3::z(); 3],
        }
    }

    #[test]
    fn test_parallel_push() {
        let buffer = TriangleBuffer::with_capacity(400);
        (0..100).into_par_iter().for_each(|i| {
            buffer.push(&[slot(i as f32), slot(i as f32)]);
        });
        assert_eq!(buffer.required(), 200);

        let mesh = buffer.into_mesh().unwrap();
        assert_eq!(mesh.triangle_count(), 200);

        let mut values = mesh
            .triangles()
            .map(|triangle| triangle[0][0] as usize)
            .collect::<Vec<_>>();
        values.sort_unstable();
        let expected = (0..100).flat_map(|i| [i, i]).collect::<Vec<_>>();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_overflow_reports_required() {
        let buffer = TriangleBuffer::with_capacity(3);
        buffer.push(&[slot(0.0), slot(1.0)]);
        buffer.push(&[slot(2.0), slot(3.0)]);
        buffer.push(&[]);
        assert_eq!(buffer.capacity(), 3);

        match buffer.into_mesh() {
            Err(F3dError::CapacityOverflow { required, capacity }) => {
                assert_eq!(required, 4);
                assert_eq!(capacity, 3);
            }
            other => panic!("expected capacity overflow, got {:?}", other),
        }
    }
}
