use ndarray::Array2;
use num::clamp;

use crate::utils::math::floor_fractional;

/// A metric depth image. Shape is `(height, width)` and values are meters along
/// the camera Z-axis. Pixels with depth `<= 0` have no sensor return.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthMap {
    pub data: Array2<f32>,
}

impl DepthMap {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Depth map with the same depth on every pixel.
    pub fn constant(width: usize, height: usize, depth: f32) -> Self {
        Self {
            data: Array2::from_elem((height, width), depth),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bilinear sampling with clamp-to-edge addressing.
    ///
    /// # Arguments
    ///
    /// * `x` - Column coordinate. Integer values are pixel centers.
    /// * `y` - Row coordinate. Integer values are pixel centers.
    ///
    /// # Returns
    ///
    /// The interpolated depth. Invalid (zero) pixels are interpolated like any other value,
    /// so samples next to holes are pulled towards zero.
    ///
    /// The map must not be empty.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> f32 {
        let (height, width) = self.data.dim();
        let (x0, x_frac) = floor_fractional(x);
        let (y0, y_frac) = floor_fractional(y);

        let clamp_col = |col: isize| clamp(col, 0, width as isize - 1) as usize;
        let clamp_row = |row: isize| clamp(row, 0, height as isize - 1) as usize;
        let (col0, col1) = (clamp_col(x0), clamp_col(x0 + 1));
        let (row0, row1) = (clamp_row(y0), clamp_row(y0 + 1));

        let top = self.data[(row0, col0)] * (1.0 - x_frac) + self.data[(row0, col1)] * x_frac;
        let bottom = self.data[(row1, col0)] * (1.0 - x_frac) + self.data[(row1, col1)] * x_frac;
        top * (1.0 - y_frac) + bottom * y_frac
    }

    /// Bilinear sampling at normalized texture coordinates, `(0, 0)` being the top-left
    /// corner of the first pixel and `(1, 1)` the bottom-right corner of the last one.
    pub fn sample_uv(&self, u: f32, v: f32) -> f32 {
        self.sample_bilinear(
            u * self.width() as f32 - 0.5,
            v * self.height() as f32 - 0.5,
        )
    }
}

impl From<Array2<f32>> for DepthMap {
    fn from(data: Array2<f32>) -> Self {
        Self::new(data)
    }
}
