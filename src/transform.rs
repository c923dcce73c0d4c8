use nalgebra::{Isometry3, Matrix4, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};

use std::ops;

/// Rigid transform. Used for camera poses (camera to world) and for the
/// fixed volume origin (volume to world).
#[derive(Clone, Debug, PartialEq)]
pub struct Transform(Isometry3<f32>);

impl Transform {
    pub fn eye() -> Self {
        Self(Isometry3::identity())
    }

    pub fn from_translation(translation: &Vector3<f32>) -> Self {
        Self(Isometry3::from_parts(
            Translation3::from(*translation),
            UnitQuaternion::identity(),
        ))
    }

    pub fn new(translation: &Vector3<f32>, rotation: &UnitQuaternion<f32>) -> Self {
        Self(Isometry3::from_parts(
            Translation3::from(*translation),
            *rotation,
        ))
    }

    /// Creates a transform that places the camera at `eye` looking at `target`.
    /// The camera looks along its +Z axis, with +Y pointing down in the image.
    ///
    /// # Arguments
    ///
    /// * eye: The camera position.
    /// * target: The point the camera looks at.
    /// * up: World up direction, must not be parallel to `target - eye`.
    ///
    /// # Returns
    ///
    /// * The camera to world transform.
    pub fn look_at(eye: &Vector3<f32>, target: &Vector3<f32>, up: &Vector3<f32>) -> Self {
        let forward = (target - eye).normalize();
        let right = forward.cross(up).normalize();
        let down = forward.cross(&right);
        let rotation = Rotation3::from_basis_unchecked(&[right, down, forward]);
        Self(Isometry3::from_parts(
            Translation3::from(*eye),
            UnitQuaternion::from_rotation_matrix(&rotation),
        ))
    }

    /// Creates a transform from the rotation and translation parts of a 4x4 matrix.
    /// The rotation block is re-orthonormalized.
    pub fn from_matrix4(matrix: &Matrix4<f32>) -> Self {
        let translation = Translation3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(
            &matrix.fixed_slice::<3, 3>(0, 0).into_owned(),
        ));
        Self(Isometry3::from_parts(translation, rotation))
    }

    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    /// Applies rotation and translation to a point.
    pub fn transform_point(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.0.transform_point(&Point3::from(*point)).coords
    }

    /// Applies only the rotation, for directions and normals.
    pub fn transform_vector(&self, vector: &Vector3<f32>) -> Vector3<f32> {
        self.0.transform_vector(vector)
    }

    pub fn translation(&self) -> Vector3<f32> {
        self.0.translation.vector
    }
}

impl ops::Mul<&Vector3<f32>> for &Transform {
    type Output = Vector3<f32>;

    fn mul(self, rhs: &Vector3<f32>) -> Self::Output {
        self.transform_point(rhs)
    }
}

impl ops::Mul<&Transform> for &Transform {
    type Output = Transform;

    fn mul(self, rhs: &Transform) -> Self::Output {
        Transform(self.0 * rhs.0)
    }
}

impl From<Transform> for Matrix4<f32> {
    fn from(transform: Transform) -> Self {
        transform.0.into()
    }
}
