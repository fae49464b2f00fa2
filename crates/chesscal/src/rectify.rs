//! Undistortion remap tables.

use crate::solver::CalibrationParameters;
use crate::Frame;
use chesscal_core::{sample_bilinear_border, CameraIntrinsics, Distortion};
use image::{GrayImage, Luma};
use nalgebra::{Point2, Vector2};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Source coordinate stored for output pixels whose sample lands off the
/// input, or whose model evaluates to a non-finite position.
pub const OFF_IMAGE: f32 = -2.0;

/// Per-pixel source coordinates for undistorting frames of one size.
///
/// Output pixel `(u, v)` samples the input at `(map_x[i], map_y[i])` with
/// `i = v * width + u`. The rectified image keeps the original camera matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct RectificationMap {
    width: u32,
    height: u32,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
    border: u8,
}

impl RectificationMap {
    /// Build the undistortion map for `params` at its image size.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(params), fields(width = params.image_size.0, height = params.image_size.1))
    )]
    pub fn build(params: &CalibrationParameters, border: u8) -> Self {
        let (width, height) = params.image_size;
        let k = params.intrinsics();
        Self::from_model(&k, &params.distortion, width, height, border)
    }

    fn from_model(
        k: &CameraIntrinsics,
        d: &Distortion,
        width: u32,
        height: u32,
        border: u8,
    ) -> Self {
        let n = width as usize * height as usize;
        let mut map_x = Vec::with_capacity(n);
        let mut map_y = Vec::with_capacity(n);
        for v in 0..height {
            for u in 0..width {
                let ideal: Vector2<f64> = k.to_normalized(Point2::new(u as f64, v as f64));
                let src = k.to_pixel(d.distort(ideal));
                let (x, y) = (src.x as f32, src.y as f32);
                let on_input = x.is_finite()
                    && y.is_finite()
                    && x > -1.0
                    && y > -1.0
                    && x < width as f32
                    && y < height as f32;
                if on_input {
                    map_x.push(x);
                    map_y.push(y);
                } else {
                    map_x.push(OFF_IMAGE);
                    map_y.push(OFF_IMAGE);
                }
            }
        }
        Self {
            width,
            height,
            map_x,
            map_y,
            border,
        }
    }

    /// Map that samples every pixel at its own location.
    pub fn identity(width: u32, height: u32, border: u8) -> Self {
        Self::from_model(
            &CameraIntrinsics::identity(),
            &Distortion::default(),
            width,
            height,
            border,
        )
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Source coordinates for output pixel `(u, v)`; [`OFF_IMAGE`] on both
    /// axes when the sample lands off the input.
    pub fn source_of(&self, u: u32, v: u32) -> Option<(f32, f32)> {
        if u >= self.width || v >= self.height {
            return None;
        }
        let i = v as usize * self.width as usize + u as usize;
        Some((self.map_x[i], self.map_y[i]))
    }

    /// Resample `frame` through the map with bilinear interpolation.
    ///
    /// The output has the map's size and the frame's timestamp; taps outside
    /// the input read as the border value.
    pub fn apply(&self, frame: &Frame) -> Frame {
        let src = frame.view();
        let w = self.width as usize;
        let image = GrayImage::from_fn(self.width, self.height, |u, v| {
            let i = v as usize * w + u as usize;
            let value = sample_bilinear_border(&src, self.map_x[i], self.map_y[i], self.border);
            Luma([value.round().clamp(0.0, 255.0) as u8])
        });
        Frame::new(image, frame.timestamp)
    }
}
