//! Batch calibration once the accumulator is full.

use crate::accumulator::DebouncedAccumulator;
use chesscal_calib::{calibrate_planar, CalibError, PlanarCalibrationOptions, SolveOptions};
use chesscal_core::{CameraIntrinsics, Distortion, Observation};
use log::info;
use nalgebra::Matrix3;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Camera model produced by a solve and persisted by the parameter store.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationParameters {
    pub camera_matrix: Matrix3<f64>,
    pub distortion: Distortion,
    /// `(width, height)` of the images the model was estimated from.
    pub image_size: (u32, u32),
    /// RMS reprojection error in pixels; `0` when unknown.
    pub rms: f64,
}

impl CalibrationParameters {
    pub fn intrinsics(&self) -> CameraIntrinsics {
        CameraIntrinsics::from_matrix(&self.camera_matrix)
    }
}

/// Constraints the solver imposes on the estimator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EstimationFlags {
    pub zero_tangent_dist: bool,
    pub fix_principal_point: bool,
}

/// External parameter estimator seam.
pub trait Estimator {
    fn estimate(
        &mut self,
        observations: &[Observation],
        image_size: (u32, u32),
        flags: EstimationFlags,
    ) -> Result<CalibrationParameters, CalibError>;
}

/// Zhang initialisation plus Levenberg-Marquardt refinement.
#[derive(Clone, Debug, Default)]
pub struct PlanarEstimator {
    pub solve: SolveOptions,
}

impl Estimator for PlanarEstimator {
    fn estimate(
        &mut self,
        observations: &[Observation],
        image_size: (u32, u32),
        flags: EstimationFlags,
    ) -> Result<CalibrationParameters, CalibError> {
        let opts = PlanarCalibrationOptions {
            fix_principal_point: flags.fix_principal_point,
            zero_tangent_dist: flags.zero_tangent_dist,
            solve: self.solve.clone(),
            ..PlanarCalibrationOptions::default()
        };
        let calib = calibrate_planar(observations, image_size, &opts)?;
        Ok(CalibrationParameters {
            camera_matrix: calib.intrinsics.matrix(),
            distortion: calib.distortion,
            image_size,
            rms: calib.rms_error,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SolveError {
    #[error("accumulator holds {have} of {need} observations")]
    NotReady { have: usize, need: usize },

    #[error("estimation did not converge")]
    EstimationDidNotConverge(#[from] CalibError),
}

/// Runs the estimator on a full accumulator with zero tangential distortion
/// and a fixed principal point.
pub struct CalibrationSolver<E> {
    estimator: E,
}

impl<E: Estimator> CalibrationSolver<E> {
    pub const FLAGS: EstimationFlags = EstimationFlags {
        zero_tangent_dist: true,
        fix_principal_point: true,
    };

    pub fn new(estimator: E) -> Self {
        Self { estimator }
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, accumulator), fields(observations = accumulator.len()))
    )]
    pub fn solve(
        &mut self,
        accumulator: &DebouncedAccumulator,
        image_size: (u32, u32),
    ) -> Result<CalibrationParameters, SolveError> {
        if !accumulator.is_full() {
            return Err(SolveError::NotReady {
                have: accumulator.len(),
                need: accumulator.target_count(),
            });
        }
        let params =
            self.estimator
                .estimate(accumulator.observations(), image_size, Self::FLAGS)?;
        info!("calibration residual: {:.4} px", params.rms);
        Ok(params)
    }
}
