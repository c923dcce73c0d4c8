use nalgebra::Vector3;
use rstest::*;

use crate::{
    camera::CameraIntrinsics,
    frame::DepthFrame,
    image::DepthMap,
    source::SphereOrbit,
    transform::Transform,
    volume::{VolumeConfig, VoxelGrid},
};

pub struct SphereScene {
    pub center: Vector3<f32>,
    pub radius: f32,
    pub truncation: f32,
    pub config: VolumeConfig,
}

/// A 40^3 grid of 1cm voxels around a 12cm sphere. The center is off the voxel
/// lattice so no voxel sits exactly on the surface.
#[fixture]
pub fn sphere_scene() -> SphereScene {
    let truncation = 0.03;
    SphereScene {
        center: Vector3::new(0.013, -0.007, 0.004),
        radius: 0.12,
        truncation,
        config: VolumeConfig::new([40, 40, 40], 0.01, truncation),
    }
}

#[fixture]
pub fn sphere_grid(sphere_scene: SphereScene) -> (VoxelGrid, SphereScene) {
    let grid = VoxelGrid::from_sdf(&sphere_scene.config, |point| {
        (point - sphere_scene.center).norm() - sphere_scene.radius
    })
    .unwrap();
    (grid, sphere_scene)
}

/// Four depth renders of the sphere scene, from cameras around it.
#[fixture]
pub fn sphere_frames(sphere_scene: SphereScene) -> (Vec<DepthFrame>, SphereScene) {
    let orbit = SphereOrbit::new(
        sphere_scene.center,
        sphere_scene.radius,
        0.6,
        4,
        CameraIntrinsics::from_simple_intrinsic(60.0, 60.0, 23.5, 23.5),
        48,
        48,
    );
    let frames = (0..orbit.len()).map(|i| orbit.frame(i)).collect();
    (frames, sphere_scene)
}

pub struct PlaneScene {
    /// Depth of the fronto-parallel plane seen by the camera.
    pub depth: f32,
    pub config: VolumeConfig,
}

/// Camera half a meter in front of the volume center, looking along +Z at a
/// plane through the center.
#[fixture]
pub fn plane_frame() -> (DepthFrame, PlaneScene) {
    let scene = PlaneScene {
        depth: 0.5,
        config: VolumeConfig::new([24, 24, 24], 0.02, 0.06),
    };
    let frame = DepthFrame::new(
        DepthMap::constant(32, 24, scene.depth),
        CameraIntrinsics::from_simple_intrinsic(30.0, 30.0, 15.5, 11.5),
        Transform::from_translation(&Vector3::new(0.0, 0.0, -scene.depth)),
    );
    (frame, scene)
}
