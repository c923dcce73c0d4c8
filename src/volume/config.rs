use std::path::Path;

use nalgebra::Vector3;
use serde_derive::Deserialize;

use crate::{error::F3dError, transform::Transform};

/// Upper bound of triangles emitted by marching cubes over a grid with the given
/// dimensions: `nx*ny*nz*5/3`.
pub fn triangle_capacity_estimate(dimensions: [usize; 3]) -> usize {
    dimensions.iter().product::<usize>() * 5 / 3
}

fn default_frame_weight() -> f32 {
    1.0
}

/// Volume and pipeline configuration. Set once per scanning session.
///
/// Loadable from JSON, e.g.:
///
/// ```json
/// {
///     "dimensions": [256, 256, 256],
///     "voxel_size": 0.004,
///     "truncation_distance": 0.02,
///     "max_triangles": 2000000
/// }
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct VolumeConfig {
    /// Number of voxels along X, Y and Z.
    pub dimensions: [usize; 3],
    /// Meters per voxel edge.
    pub voxel_size: f32,
    /// Half-width of the signed distance band, in meters.
    pub truncation_distance: f32,
    /// World position of voxel `(0, 0, 0)`. `None` centers the volume on the world origin.
    #[serde(default)]
    pub origin: Option<[f32; 3]>,
    /// Triangle capacity of the extraction buffer. `None` uses [`triangle_capacity_estimate`].
    #[serde(default)]
    pub max_triangles: Option<usize>,
    /// Weight of each frame observation.
    #[serde(default = "default_frame_weight")]
    pub frame_weight: f32,
    /// Depth samples beyond this range are rejected.
    #[serde(default)]
    pub max_depth: Option<f32>,
    /// Cubes with a corner weight below this are not polygonized. Zero also
    /// polygonizes the boundary between observed and never-observed voxels.
    #[serde(default)]
    pub min_weight: f32,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self::new([256, 256, 256], 0.004, 0.02)
    }
}

impl VolumeConfig {
    pub fn new(dimensions: [usize; 3], voxel_size: f32, truncation_distance: f32) -> Self {
        Self {
            dimensions,
            voxel_size,
            truncation_distance,
            origin: None,
            max_triangles: None,
            frame_weight: default_frame_weight(),
            max_depth: None,
            min_weight: 0.0,
        }
    }

    pub fn with_origin(mut self, origin: [f32; 3]) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_max_triangles(mut self, max_triangles: usize) -> Self {
        self.max_triangles = Some(max_triangles);
        self
    }

    pub fn with_min_weight(mut self, min_weight: f32) -> Self {
        self.min_weight = min_weight;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, F3dError> {
        let config: VolumeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, F3dError> {
        let buffer = std::io::BufReader::new(std::fs::File::open(path)?);
        let config: VolumeConfig = serde_json::from_reader(buffer)?;
        config.validate()?;
        Ok(config)
    }

    pub fn num_voxels(&self) -> usize {
        self.dimensions.iter().product()
    }

    pub fn triangle_capacity(&self) -> usize {
        self.max_triangles
            .unwrap_or_else(|| triangle_capacity_estimate(self.dimensions))
    }

    /// Transform from volume space (voxel index times voxel size) to world.
    pub fn volume_to_world(&self) -> Transform {
        let origin = match self.origin {
            Some(origin) => Vector3::from(origin),
            None => {
                let [nx, ny, nz] = self.dimensions;
                -Vector3::new(
                    nx.saturating_sub(1) as f32,
                    ny.saturating_sub(1) as f32,
                    nz.saturating_sub(1) as f32,
                ) * self.voxel_size
                    * 0.5
            }
        };
        Transform::from_translation(&origin)
    }

    pub fn validate(&self) -> Result<(), F3dError> {
        if let Some(axis) = self.dimensions.iter().position(|dim| *dim < 2) {
            return Err(F3dError::configuration(format!(
                "grid dimensions {:?} must be at least 2 on every axis (axis {} is not)",
                self.dimensions, axis
            )));
        }

        let num_voxels = self
            .dimensions
            .iter()
            .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
            .ok_or_else(|| {
                F3dError::configuration(format!(
                    "grid dimensions {:?} overflow the voxel count",
                    self.dimensions
                ))
            })?;
        // The capacity estimate multiplies by 5 and vertex buffers by 3.
        if num_voxels.checked_mul(5).is_none() {
            return Err(F3dError::configuration(format!(
                "grid dimensions {:?} are too large",
                self.dimensions
            )));
        }

        if !(self.voxel_size.is_finite() && self.voxel_size > 0.0) {
            return Err(F3dError::configuration(format!(
                "voxel size must be positive, got {}",
                self.voxel_size
            )));
        }

        if !(self.truncation_distance.is_finite() && self.truncation_distance > 0.0) {
            return Err(F3dError::configuration(format!(
                "truncation distance must be positive, got {}",
                self.truncation_distance
            )));
        }

        if !(self.frame_weight.is_finite() && self.frame_weight > 0.0) {
            return Err(F3dError::configuration(format!(
                "frame weight must be positive, got {}",
                self.frame_weight
            )));
        }

        if let Some(max_depth) = self.max_depth {
            if !(max_depth > 0.0) {
                return Err(F3dError::configuration(format!(
                    "maximum depth must be positive, got {}",
                    max_depth
                )));
            }
        }

        if !(self.min_weight.is_finite() && self.min_weight >= 0.0) {
            return Err(F3dError::configuration(format!(
                "minimum weight must be non-negative, got {}",
                self.min_weight
            )));
        }

        let capacity = self.triangle_capacity();
        if capacity == 0 || capacity.checked_mul(3).is_none() {
            return Err(F3dError::configuration(format!(
                "invalid triangle capacity {}",
                capacity
            )));
        }

        if let Some(origin) = self.origin {
            if origin.iter().any(|v| !v.is_finite()) {
                return Err(F3dError::configuration(format!(
                    "volume origin {:?} is not finite",
                    origin
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_default_is_reference_volume() {
        let config = VolumeConfig::default();
        assert_eq!(config.dimensions, [256, 256, 256]);
        assert_eq!(config.num_voxels(), 256 * 256 * 256);
        assert_eq!(config.triangle_capacity(), 256 * 256 * 256 * 5 / 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_centered_origin() {
        let config = VolumeConfig::new([11, 21, 5], 0.1, 0.3);
        let volume_to_world = config.volume_to_world();
        assert_relative_eq!(
            &volume_to_world * &Vector3::new(0.5, 1.0, 0.2),
            Vector3::zeros(),
            epsilon = 1e-6
        );

        let config = config.with_origin([1.0, 2.0, 3.0]);
        assert_eq!(
            config.volume_to_world().translation(),
            Vector3::new(1.0, 2.0, 3.0)
        );
    }

    #[rstest]
    #[case(VolumeConfig::new([1, 16, 16], 0.01, 0.03))]
    #[case(VolumeConfig::new([16, 16, 16], 0.0, 0.03))]
    #[case(VolumeConfig::new([16, 16, 16], -0.01, 0.03))]
    #[case(VolumeConfig::new([16, 16, 16], 0.01, 0.0))]
    #[case(VolumeConfig::new([16, 16, 16], f32::NAN, 0.03))]
    #[case(VolumeConfig::new([16, 16, 16], 0.01, 0.03).with_max_triangles(0))]
    #[case(VolumeConfig::new([usize::MAX, 16, 16], 0.01, 0.03))]
    #[case(VolumeConfig::new([16, 16, 16], 0.01, 0.03).with_min_weight(-1.0))]
    fn test_invalid_configuration(#[case] config: VolumeConfig) {
        assert!(matches!(
            config.validate(),
            Err(F3dError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_json() {
        let config = VolumeConfig::from_json_str(
            r#"{"dimensions": [64, 32, 16], "voxel_size": 0.01, "truncation_distance": 0.04}"#,
        )
        .unwrap();
        assert_eq!(config, VolumeConfig::new([64, 32, 16], 0.01, 0.04));
        assert_eq!(config.frame_weight, 1.0);

        assert!(matches!(
            VolumeConfig::from_json_str(r#"{"dimensions": [64, 32, 16]}"#),
            Err(F3dError::Parser(_))
        ));
        assert!(matches!(
            VolumeConfig::from_json_str(
                r#"{"dimensions": [64, 32, 16], "voxel_size": -1.0, "truncation_distance": 0.04}"#
            ),
            Err(F3dError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"dimensions": [32, 32, 32], "voxel_size": 0.02, "truncation_distance": 0.06,
                "origin": [-0.3, -0.3, 0.2], "max_triangles": 5000, "max_depth": 3.0}}"#
        )
        .unwrap();

        let config = VolumeConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.origin, Some([-0.3, -0.3, 0.2]));
        assert_eq!(config.triangle_capacity(), 5000);
        assert_eq!(config.max_depth, Some(3.0));

        assert!(matches!(
            VolumeConfig::from_json_file("does/not/exist.json"),
            Err(F3dError::Io(_))
        ));
    }
}
