use nalgebra::Vector3;
use ndarray::Array2;

use crate::{
    camera::CameraIntrinsics, error::F3dError, frame::DepthFrame, image::DepthMap,
    transform::Transform,
};

use super::FrameSource;

/// Renders the z-depth of a sphere seen by a pinhole camera.
///
/// # Arguments
///
/// * `intrinsics` - Camera intrinsics.
/// * `camera_to_world` - Camera pose.
/// * `center` - Sphere center in world coordinates.
/// * `radius` - Sphere radius.
/// * `width` - Image width.
/// * `height` - Image height.
///
/// # Returns
///
/// The depth map. Pixels whose ray misses the sphere are zero.
pub fn render_sphere_depth(
    intrinsics: &CameraIntrinsics,
    camera_to_world: &Transform,
    center: &Vector3<f32>,
    radius: f32,
    width: usize,
    height: usize,
) -> DepthMap {
    // Sphere center in camera space; rays are (x, y, 1) scaled by the z-depth.
    let center = camera_to_world.inverse().transform_point(center);
    let c_sq = center.norm_squared() - radius * radius;

    Array2::from_shape_fn((height, width), |(row, col)| {
        let ray = intrinsics.backproject(col as f32, row as f32, 1.0);
        let a = ray.norm_squared();
        let b = ray.dot(&center);
        let discriminant = b * b - a * c_sq;
        if discriminant < 0.0 {
            return 0.0;
        }

        let sqrt_disc = discriminant.sqrt();
        let near = (b - sqrt_disc) / a;
        let far = (b + sqrt_disc) / a;
        if near > 0.0 {
            near
        } else if far > 0.0 {
            far
        } else {
            0.0
        }
    })
    .into()
}

/// Frame source of cameras circling a sphere around the world Y-axis, all of them
/// looking at its center.
pub struct SphereOrbit {
    pub center: Vector3<f32>,
    pub radius: f32,
    pub intrinsics: CameraIntrinsics,
    pub width: usize,
    pub height: usize,
    poses: Vec<Transform>,
    next: usize,
}

impl SphereOrbit {
    /// Creates the orbit.
    ///
    /// # Arguments
    ///
    /// * `center` - Sphere center.
    /// * `radius` - Sphere radius.
    /// * `camera_distance` - Distance from the cameras to the sphere center.
    /// * `num_views` - Number of cameras, evenly spaced on the orbit.
    /// * `intrinsics` - Intrinsics shared by all cameras.
    /// * `width` - Image width.
    /// * `height` - Image height.
    pub fn new(
        center: Vector3<f32>,
        radius: f32,
        camera_distance: f32,
        num_views: usize,
        intrinsics: CameraIntrinsics,
        width: usize,
        height: usize,
    ) -> Self {
        const ELEVATION: f32 = 0.3;
        let up = -Vector3::y();
        let poses = (0..num_views)
            .map(|i| {
                let azimuth = 2.0 * std::f32::consts::PI * i as f32 / num_views as f32;
                let direction = Vector3::new(
                    azimuth.sin() * ELEVATION.cos(),
                    -ELEVATION.sin(),
                    -azimuth.cos() * ELEVATION.cos(),
                );
                Transform::look_at(&(center + direction * camera_distance), &center, &up)
            })
            .collect();

        Self {
            center,
            radius,
            intrinsics,
            width,
            height,
            poses,
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn poses(&self) -> &[Transform] {
        &self.poses
    }

    /// Renders the view `index`.
    pub fn frame(&self, index: usize) -> DepthFrame {
        let camera_to_world = self.poses[index].clone();
        let depth = render_sphere_depth(
            &self.intrinsics,
            &camera_to_world,
            &self.center,
            self.radius,
            self.width,
            self.height,
        );
        DepthFrame::new(depth, self.intrinsics.clone(), camera_to_world)
    }
}

impl FrameSource for SphereOrbit {
    fn next_frame(&mut self) -> Result<Option<DepthFrame>, F3dError> {
        if self.next >= self.poses.len() {
            return Ok(None);
        }
        let frame = self.frame(self.next);
        self.next += 1;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_render_sphere_depth() {
        let intrinsics = CameraIntrinsics::from_simple_intrinsic(50.0, 50.0, 15.5, 15.5);
        let camera_to_world = Transform::from_translation(&Vector3::new(0.0, 0.0, -1.0));
        let depth = render_sphere_depth(
            &intrinsics,
            &camera_to_world,
            &Vector3::zeros(),
            0.2,
            32,
            32,
        );

        // The principal point is between the four central pixels.
        let center_depth = depth.data[(15, 15)];
        assert!(center_depth > 0.8 && center_depth < 0.801);
        assert_eq!(depth.data[(0, 0)], 0.0);

        // Every hit lies on the sphere.
        for ((row, col), z) in depth.data.indexed_iter() {
            if *z > 0.0 {
                let point = camera_to_world
                    .transform_point(&intrinsics.backproject(col as f32, row as f32, *z));
                assert_relative_eq!(point.norm(), 0.2, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_orbit_looks_at_center() {
        let center = Vector3::new(0.1, 0.0, 0.05);
        let mut orbit = SphereOrbit::new(
            center,
            0.1,
            0.5,
            6,
            CameraIntrinsics::from_simple_intrinsic(40.0, 40.0, 15.5, 11.5),
            32,
            24,
        );
        assert_eq!(orbit.len(), 6);

        for pose in orbit.poses() {
            let camera_center = pose.inverse().transform_point(&center);
            assert_relative_eq!(camera_center, Vector3::new(0.0, 0.0, 0.5), epsilon = 1e-5);
        }

        let mut num_frames = 0;
        while let Some(frame) = orbit.next_frame().unwrap() {
            assert!(frame.depth.data.iter().any(|z| *z > 0.0));
            num_frames += 1;
        }
        assert_eq!(num_frames, 6);
    }
}
