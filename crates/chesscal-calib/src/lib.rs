//! Planar camera calibration from chessboard observations.
//!
//! ```no_run
//! use chesscal_calib::{calibrate_planar, PlanarCalibrationOptions};
//! use chesscal_core::Observation;
//!
//! fn run(views: &[Observation]) {
//!     let calib = calibrate_planar(views, (1280, 720), &PlanarCalibrationOptions::default())
//!         .expect("calibration");
//!     println!("K = {:?}, rms = {:.3}px", calib.intrinsics, calib.rms_error);
//! }
//! ```
//!
//! Pipeline:
//! 1. per-view plane homographies (normalised DLT),
//! 2. a rank check that the views constrain the camera,
//! 3. closed-form focal lengths with the principal point at the image centre,
//! 4. per-view poses from the homographies,
//! 5. Levenberg-Marquardt over focal lengths, radial distortion and poses.

mod error;
mod lm;
mod planar;
mod pose;
mod zhang;

#[cfg(test)]
mod synthetic;

pub use error::CalibError;
pub use lm::{levenberg_marquardt, NllsProblem, SolveOptions, SolveReport};
pub use planar::{calibrate_planar, PlanarCalibration, PlanarCalibrationOptions};
pub use pose::pose_from_homography;
pub use zhang::{check_view_diversity, focal_from_homographies};
