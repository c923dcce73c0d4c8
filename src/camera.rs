use nalgebra::{Matrix3, Vector3};

use crate::error::F3dError;

use super::transform::Transform;

/// Camera intrinsic parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length and pixel scale in the X-axis.
    pub fx: f64,
    /// Focal length and pixel scale in the Y-axis.
    pub fy: f64,
    /// Camera X-center.
    pub cx: f64,
    /// Camera Y-center.
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn from_simple_intrinsic(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Reads the parameters from a pinhole projection matrix
    /// `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    ///
    /// # Arguments
    ///
    /// * matrix: The 3x3 projection matrix, row-major indexing.
    ///
    /// # Returns
    ///
    /// * The intrinsics, or a configuration error if the matrix is not a pinhole matrix.
    pub fn from_matrix3(matrix: &Matrix3<f64>) -> Result<Self, F3dError> {
        let last_row = (matrix[(2, 0)], matrix[(2, 1)], matrix[(2, 2)]);
        if last_row != (0.0, 0.0, 1.0) {
            return Err(F3dError::configuration(format!(
                "intrinsic matrix last row must be (0, 0, 1), got {:?}",
                last_row
            )));
        }
        let intrinsics = Self::from_simple_intrinsic(
            matrix[(0, 0)],
            matrix[(1, 1)],
            matrix[(0, 2)],
            matrix[(1, 2)],
        );
        intrinsics.validate()?;
        Ok(intrinsics)
    }

    pub fn to_matrix3(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Fails on degenerate parameters: non-positive or non-finite focal lengths,
    /// or a non-finite principal point.
    pub fn validate(&self) -> Result<(), F3dError> {
        if !(self.fx.is_finite() && self.fy.is_finite() && self.fx > 0.0 && self.fy > 0.0) {
            return Err(F3dError::configuration(format!(
                "degenerate focal length (fx={}, fy={})",
                self.fx, self.fy
            )));
        }
        if !(self.cx.is_finite() && self.cy.is_finite()) {
            return Err(F3dError::configuration(format!(
                "non-finite principal point (cx={}, cy={})",
                self.cx, self.cy
            )));
        }
        Ok(())
    }

    /// Project a 3D point into image space.
    ///
    /// # Arguments
    ///
    /// * point: The 3D point.
    ///
    /// # Returns
    ///
    /// * (x and y) coordinates.
    pub fn project(&self, point: &Vector3<f32>) -> (f32, f32) {
        (
            point[0] * self.fx as f32 / point[2] + self.cx as f32,
            point[1] * self.fy as f32 / point[2] + self.cy as f32,
        )
    }

    pub fn backproject(&self, x: f32, y: f32, z: f32) -> Vector3<f32> {
        Vector3::new(
            (x - self.cx as f32) * z / self.fx as f32,
            (y - self.cy as f32) * z / self.fy as f32,
            z,
        )
    }

    /// Scale the camera parameters according to the given scale.
    ///
    /// # Arguments
    ///
    /// * scale: The scale factor.
    ///
    /// # Returns
    ///
    /// * A new camera with scaled parameters.
    pub fn scale(&self, scale: f64) -> Self {
        Self {
            fx: self.fx * scale,
            fy: self.fy * scale,
            cx: self.cx * scale,
            cy: self.cy * scale,
        }
    }
}

/// Intrinsics and pose of a camera at capture time, with the inverse pose cached.
#[derive(Clone, Debug)]
pub struct PinholeCamera {
    pub intrinsics: CameraIntrinsics,
    pub camera_to_world: Transform,
    world_to_camera: Transform,
    pub width: usize,
    pub height: usize,
}

impl PinholeCamera {
    pub fn new(
        intrinsics: CameraIntrinsics,
        camera_to_world: Transform,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            intrinsics,
            world_to_camera: camera_to_world.inverse(),
            camera_to_world,
            width,
            height,
        }
    }

    pub fn world_to_camera(&self) -> &Transform {
        &self.world_to_camera
    }

    /// Project a 3D world point into image space.
    ///
    /// # Arguments
    ///
    /// * point: The 3D point.
    ///
    /// # Returns
    ///
    /// * (x and y) coordinates.
    pub fn project(&self, point: &Vector3<f32>) -> (f32, f32) {
        self.intrinsics
            .project(&self.world_to_camera.transform_point(point))
    }

    /// Projects a world point, returning `None` when it is behind the camera or
    /// falls outside the image.
    pub fn project_if_visible(&self, point: &Vector3<f32>) -> Option<(f32, f32)> {
        let camera_point = self.world_to_camera.transform_point(point);
        if camera_point[2] <= 0.0 {
            return None;
        }

        let (x, y) = self.intrinsics.project(&camera_point);
        if x >= -0.5 && x <= self.width as f32 - 0.5 && y >= -0.5 && y <= self.height as f32 - 0.5
        {
            Some((x, y))
        } else {
            None
        }
    }
}
