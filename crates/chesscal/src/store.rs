//! JSON persistence of calibration parameters.
//!
//! Document layout:
//!
//! ```json
//! {
//!   "image_width": 1280,
//!   "image_height": 720,
//!   "camera_matrix": [[fx, 0, cx], [0, fy, cy], [0, 0, 1]],
//!   "distortion_coefficients": [k1, k2, p1, p2, k3],
//!   "reprojection_error": 0.31
//! }
//! ```

use crate::solver::CalibrationParameters;
use chesscal_core::Distortion;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("parameter document {path} is unreadable: {reason}")]
    StoreUnreadable { path: PathBuf, reason: String },

    #[error("failed to write parameter document {path}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        io: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParameterDocument {
    image_width: u32,
    image_height: u32,
    camera_matrix: [[f64; 3]; 3],
    distortion_coefficients: Vec<f64>,
    #[serde(default)]
    reprojection_error: f64,
}

impl From<&CalibrationParameters> for ParameterDocument {
    fn from(p: &CalibrationParameters) -> Self {
        let k = &p.camera_matrix;
        Self {
            image_width: p.image_size.0,
            image_height: p.image_size.1,
            camera_matrix: std::array::from_fn(|r| std::array::from_fn(|c| k[(r, c)])),
            distortion_coefficients: p.distortion.to_array().to_vec(),
            reprojection_error: p.rms,
        }
    }
}

impl ParameterDocument {
    fn into_parameters(self) -> Result<CalibrationParameters, String> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(format!(
                "invalid image size {}x{}",
                self.image_width, self.image_height
            ));
        }
        if self.distortion_coefficients.len() > 5 {
            return Err(format!(
                "{} distortion coefficients, at most 5 are supported",
                self.distortion_coefficients.len()
            ));
        }
        let m = &self.camera_matrix;
        let camera_matrix = Matrix3::from_fn(|r, c| m[r][c]);
        if !camera_matrix.iter().all(|v| v.is_finite()) {
            return Err("camera matrix has non-finite entries".to_string());
        }
        if !self.distortion_coefficients.iter().all(|v| v.is_finite()) {
            return Err("distortion coefficients are not finite".to_string());
        }
        if !self.reprojection_error.is_finite() {
            return Err("reprojection error is not finite".to_string());
        }
        if camera_matrix[(0, 0)] <= 0.0 || camera_matrix[(1, 1)] <= 0.0 {
            return Err("camera matrix has non-positive focal lengths".to_string());
        }
        Ok(CalibrationParameters {
            camera_matrix,
            distortion: Distortion::from_slice(&self.distortion_coefficients),
            image_size: (self.image_width, self.image_height),
            rms: self.reprojection_error,
        })
    }
}

/// Write `params` to `path` as pretty JSON, replacing any previous document.
pub fn save_parameters(
    params: &CalibrationParameters,
    path: impl AsRef<Path>,
) -> Result<(), StoreError> {
    let path = path.as_ref();
    let write_err = |io| StoreError::StoreWrite {
        path: path.to_path_buf(),
        io,
    };
    let json = serde_json::to_string_pretty(&ParameterDocument::from(params))
        .map_err(|e| write_err(std::io::Error::other(e)))?;
    fs::write(path, json).map_err(write_err)
}

/// Read a document written by [`save_parameters`].
pub fn load_parameters(path: impl AsRef<Path>) -> Result<CalibrationParameters, StoreError> {
    let path = path.as_ref();
    let unreadable = |reason: String| StoreError::StoreUnreadable {
        path: path.to_path_buf(),
        reason,
    };
    let raw = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    let doc: ParameterDocument =
        serde_json::from_str(&raw).map_err(|e| unreadable(e.to_string()))?;
    doc.into_parameters().map_err(unreadable)
}
