mod scenes;
pub(crate) use scenes::{plane_frame, sphere_frames, sphere_grid, PlaneScene, SphereScene};
