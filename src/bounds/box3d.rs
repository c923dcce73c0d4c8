use nalgebra::Vector3;

/// Axis-aligned box. An empty box has `min > max` on every axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Box3Df {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Box3Df {
    ///
    /// # Arguments
    ///
    /// * `start_point`: The minimum point in the X, Y, and Z axis.
    /// * `size`: The size of in the X, Y, and Z axis.
    pub fn from_extents(start_point: Vector3<f32>, size: Vector3<f32>) -> Self {
        Box3Df {
            min: start_point,
            max: start_point + size,
        }
    }

    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f32::INFINITY),
            max: Vector3::repeat(f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grows the box to include the point.
    pub fn add_point(&mut self, point: &Vector3<f32>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Vector3<f32>>,
    {
        let mut bounds = Self::empty();
        for point in points {
            bounds.add_point(point);
        }
        bounds
    }

    /// Whether the point is inside, with `tolerance` slack on each side.
    pub fn contains(&self, point: &Vector3<f32>, tolerance: f32) -> bool {
        (0..3).all(|axis| {
            point[axis] >= self.min[axis] - tolerance && point[axis] <= self.max[axis] + tolerance
        })
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }
}
