//! Planar intrinsic calibration: Zhang initialisation followed by joint
//! refinement of intrinsics, distortion and per-view poses.

use crate::lm::{fd_step, levenberg_marquardt, NllsProblem, SolveOptions, SolveReport};
use crate::pose::pose_from_homography;
use crate::zhang::{check_view_diversity, focal_from_homographies};
use crate::CalibError;
use chesscal_core::{estimate_homography, project, CameraIntrinsics, Distortion, Observation};
use log::{debug, info, warn};
use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, Point2, Point3, Rotation3, Translation3, UnitQuaternion,
    Vector3,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Residual assigned to each coordinate of a point behind the camera.
const BEHIND_CAMERA_PENALTY: f64 = 1e6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanarCalibrationOptions {
    /// Keep `(cx, cy)` at the image centre.
    pub fix_principal_point: bool,
    /// Keep `p1 = p2 = 0`.
    pub zero_tangent_dist: bool,
    /// Keep `k3 = 0`.
    pub fix_k3: bool,
    pub min_views: usize,
    pub solve: SolveOptions,
}

impl Default for PlanarCalibrationOptions {
    fn default() -> Self {
        Self {
            fix_principal_point: true,
            zero_tangent_dist: true,
            fix_k3: false,
            min_views: 3,
            solve: SolveOptions::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlanarCalibration {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
    /// Board-to-camera pose per input view.
    pub poses: Vec<Isometry3<f64>>,
    /// RMS reprojection error over all points, in pixels.
    pub rms_error: f64,
    pub per_view_rms: Vec<f64>,
    pub report: SolveReport,
}

struct ViewData {
    object: Vec<Point3<f64>>,
    image: Vec<Point2<f64>>,
}

// Full intrinsic layout: fx, fy, cx, cy, k1, k2, p1, p2, k3.
const FX: usize = 0;
const FY: usize = 1;
const CX: usize = 2;
const CY: usize = 3;
const P1: usize = 6;
const P2: usize = 7;
const K3: usize = 8;

struct PlanarProblem {
    views: Vec<ViewData>,
    base: [f64; 9],
    free: Vec<usize>,
    row_offsets: Vec<usize>,
    num_residuals: usize,
}

impl PlanarProblem {
    fn new(views: Vec<ViewData>, base: [f64; 9], opts: &PlanarCalibrationOptions) -> Self {
        let free = (0..9)
            .filter(|&i| {
                !(opts.fix_principal_point && (i == CX || i == CY)
                    || opts.zero_tangent_dist && (i == P1 || i == P2)
                    || opts.fix_k3 && i == K3)
            })
            .collect();
        let mut row_offsets = Vec::with_capacity(views.len());
        let mut num_residuals = 0;
        for v in &views {
            row_offsets.push(num_residuals);
            num_residuals += 2 * v.object.len();
        }
        Self {
            views,
            base,
            free,
            row_offsets,
            num_residuals,
        }
    }

    fn pose_offset(&self, view: usize) -> usize {
        self.free.len() + 6 * view
    }

    fn pack(&self, poses: &[Isometry3<f64>]) -> DVector<f64> {
        let mut x = DVector::zeros(self.num_params());
        for (slot, &idx) in self.free.iter().enumerate() {
            x[slot] = self.base[idx];
        }
        for (v, pose) in poses.iter().enumerate() {
            let off = self.pose_offset(v);
            let r = pose.rotation.scaled_axis();
            let t = pose.translation.vector;
            x.rows_mut(off, 6)
                .copy_from_slice(&[r.x, r.y, r.z, t.x, t.y, t.z]);
        }
        x
    }

    fn intrinsics(&self, x: &DVector<f64>) -> (CameraIntrinsics, Distortion) {
        let mut p = self.base;
        for (slot, &idx) in self.free.iter().enumerate() {
            p[idx] = x[slot];
        }
        (
            CameraIntrinsics {
                fx: p[FX],
                fy: p[FY],
                cx: p[CX],
                cy: p[CY],
            },
            Distortion::from_slice(&p[4..9]),
        )
    }

    fn pose_params(&self, x: &DVector<f64>, view: usize) -> [f64; 6] {
        let off = self.pose_offset(view);
        std::array::from_fn(|i| x[off + i])
    }

    fn pose(&self, x: &DVector<f64>, view: usize) -> Isometry3<f64> {
        pose_from_params(&self.pose_params(x, view))
    }

    fn view_residuals(
        &self,
        k: &CameraIntrinsics,
        d: &Distortion,
        pose: &[f64; 6],
        view: &ViewData,
        out: &mut [f64],
    ) {
        let iso = pose_from_params(pose);
        for (n, (obj, img)) in view.object.iter().zip(&view.image).enumerate() {
            let (ex, ey) = match project(k, d, &(iso * obj)) {
                Some(p) => (p.x - img.x, p.y - img.y),
                None => (BEHIND_CAMERA_PENALTY, BEHIND_CAMERA_PENALTY),
            };
            out[2 * n] = ex;
            out[2 * n + 1] = ey;
        }
    }
}

fn pose_from_params(p: &[f64; 6]) -> Isometry3<f64> {
    let rot = Rotation3::new(Vector3::new(p[0], p[1], p[2]));
    Isometry3::from_parts(
        Translation3::new(p[3], p[4], p[5]),
        UnitQuaternion::from_rotation_matrix(&rot),
    )
}

impl NllsProblem for PlanarProblem {
    fn num_params(&self) -> usize {
        self.free.len() + 6 * self.views.len()
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let (k, d) = self.intrinsics(x);
        let mut r = DVector::zeros(self.num_residuals);
        for (v, view) in self.views.iter().enumerate() {
            let start = self.row_offsets[v];
            let len = 2 * view.object.len();
            let pose = self.pose_params(x, v);
            self.view_residuals(&k, &d, &pose, view, &mut r.as_mut_slice()[start..start + len]);
        }
        r
    }

    /// Intrinsic columns touch every residual; pose columns only their own
    /// view's rows, so those are differenced per view.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.num_residuals, self.num_params());

        let mut xp = x.clone();
        for c in 0..self.free.len() {
            let h = fd_step(x[c]);
            xp[c] = x[c] + h;
            let rp = self.residuals(&xp);
            xp[c] = x[c] - h;
            let rm = self.residuals(&xp);
            xp[c] = x[c];
            jac.column_mut(c).copy_from(&((rp - rm) / (2.0 * h)));
        }

        let (k, d) = self.intrinsics(x);
        for (v, view) in self.views.iter().enumerate() {
            let rows = self.row_offsets[v];
            let len = 2 * view.object.len();
            let off = self.pose_offset(v);
            let mut pose = self.pose_params(x, v);
            let mut plus = vec![0.0; len];
            let mut minus = vec![0.0; len];
            for c in 0..6 {
                let orig = pose[c];
                let h = fd_step(orig);
                pose[c] = orig + h;
                self.view_residuals(&k, &d, &pose, view, &mut plus);
                pose[c] = orig - h;
                self.view_residuals(&k, &d, &pose, view, &mut minus);
                pose[c] = orig;
                for r in 0..len {
                    jac[(rows + r, off + c)] = (plus[r] - minus[r]) / (2.0 * h);
                }
            }
        }
        jac
    }
}

fn to_view_data(index: usize, obs: &Observation) -> Result<ViewData, CalibError> {
    let image = obs.image_points();
    let reference = obs.reference_points();
    if image.len() != reference.len() {
        return Err(CalibError::MismatchedPoints {
            view: index,
            image: image.len(),
            reference: reference.len(),
        });
    }
    if image.len() < 4 {
        return Err(CalibError::HomographyFailed { view: index });
    }
    Ok(ViewData {
        object: reference
            .iter()
            .map(|p| Point3::new(p.x as f64, p.y as f64, p.z as f64))
            .collect(),
        image: image
            .iter()
            .map(|p| Point2::new(p.x as f64, p.y as f64))
            .collect(),
    })
}

/// Estimate intrinsics and distortion from planar board observations.
///
/// The principal point starts at the image centre `((w-1)/2, (h-1)/2)`; with
/// the default options it stays there and tangential distortion stays zero.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(observations, opts), fields(views = observations.len()))
)]
pub fn calibrate_planar(
    observations: &[Observation],
    image_size: (u32, u32),
    opts: &PlanarCalibrationOptions,
) -> Result<PlanarCalibration, CalibError> {
    let (width, height) = image_size;
    if width == 0 || height == 0 {
        return Err(CalibError::InvalidImageSize { width, height });
    }
    let need = opts.min_views.max(3);
    if observations.len() < need {
        return Err(CalibError::NotEnoughViews {
            got: observations.len(),
            need,
        });
    }

    let views = observations
        .iter()
        .enumerate()
        .map(|(i, o)| to_view_data(i, o))
        .collect::<Result<Vec<_>, _>>()?;

    let homographies = views
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let plane: Vec<Point2<f64>> = v.object.iter().map(|p| Point2::new(p.x, p.y)).collect();
            let h = estimate_homography(&plane, &v.image)
                .ok_or(CalibError::HomographyFailed { view: i })?;
            let fit = plane
                .iter()
                .zip(&v.image)
                .map(|(p, q)| (h.apply(*p) - *q).norm_squared())
                .sum::<f64>()
                / plane.len() as f64;
            debug!("view {i}: homography fit {:.3} px rms", fit.sqrt());
            Ok(h.h)
        })
        .collect::<Result<Vec<Matrix3<f64>>, _>>()?;

    check_view_diversity(&homographies, image_size)?;

    let cx = (width as f64 - 1.0) * 0.5;
    let cy = (height as f64 - 1.0) * 0.5;
    let (fx, fy) = focal_from_homographies(&homographies, (cx, cy), image_size)?;
    let k0 = CameraIntrinsics { fx, fy, cx, cy };

    let poses = homographies
        .iter()
        .enumerate()
        .map(|(i, h)| pose_from_homography(&k0.matrix(), h).ok_or(CalibError::HomographyFailed { view: i }))
        .collect::<Result<Vec<_>, _>>()?;

    let base = [fx, fy, cx, cy, 0.0, 0.0, 0.0, 0.0, 0.0];
    let problem = PlanarProblem::new(views, base, opts);
    let x0 = problem.pack(&poses);
    let (x, report) = levenberg_marquardt(&problem, x0, &opts.solve);
    debug!(
        "refinement: {} ({} evaluations), cost {:.6e} -> {:.6e}",
        report.termination, report.iterations, report.initial_cost, report.final_cost
    );

    let (intrinsics, distortion) = problem.intrinsics(&x);
    let residuals = problem.residuals(&x);
    let total_points = problem.num_residuals / 2;
    let rms_error = (residuals.norm_squared() / total_points as f64).sqrt();

    let valid = rms_error.is_finite()
        && intrinsics.fx.is_finite()
        && intrinsics.fy.is_finite()
        && intrinsics.fx > 0.0
        && intrinsics.fy > 0.0
        && distortion.to_array().iter().all(|c| c.is_finite());
    if !valid {
        return Err(CalibError::DidNotConverge {
            reason: format!(
                "non-finite or non-positive solution ({}, {} evaluations)",
                report.termination, report.iterations
            ),
        });
    }
    if !report.converged {
        warn!(
            "refinement stopped without meeting tolerances: {} after {} evaluations",
            report.termination, report.iterations
        );
    }

    let per_view_rms = problem
        .views
        .iter()
        .enumerate()
        .map(|(v, view)| {
            let start = problem.row_offsets[v];
            let len = 2 * view.object.len();
            let sq: f64 = residuals.rows(start, len).norm_squared();
            (sq / view.object.len() as f64).sqrt()
        })
        .collect();
    let poses = (0..problem.views.len()).map(|v| problem.pose(&x, v)).collect();

    info!(
        "calibrated: fx={:.2} fy={:.2} cx={:.2} cy={:.2} rms={:.4}px",
        intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy, rms_error
    );

    Ok(PlanarCalibration {
        intrinsics,
        distortion,
        poses,
        rms_error,
        per_view_rms,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_synthetic_camera() {
        let obs = synthetic::observations();
        let calib =
            calibrate_planar(&obs, synthetic::IMAGE_SIZE, &PlanarCalibrationOptions::default())
                .unwrap();
        let (k, d) = synthetic::truth();

        assert_relative_eq!(calib.intrinsics.fx, k.fx, epsilon = 0.5);
        assert_relative_eq!(calib.intrinsics.fy, k.fy, epsilon = 0.5);
        assert_eq!(k.cx, calib.intrinsics.cx);
        assert_eq!(k.cy, calib.intrinsics.cy);
        assert_relative_eq!(calib.distortion.k1, d.k1, epsilon = 2e-3);
        assert_eq!(0.0, calib.distortion.p1);
        assert_eq!(0.0, calib.distortion.p2);
        assert!(calib.rms_error < 1e-3, "rms={}", calib.rms_error);
        assert_eq!(obs.len(), calib.per_view_rms.len());
        assert_eq!(obs.len(), calib.poses.len());
        assert!(calib.report.converged, "{:?}", calib.report);
    }

    #[test]
    fn fewer_than_three_views_fail() {
        let obs = synthetic::observations();
        let err =
            calibrate_planar(&obs[..2], synthetic::IMAGE_SIZE, &PlanarCalibrationOptions::default())
                .unwrap_err();
        assert_eq!(CalibError::NotEnoughViews { got: 2, need: 3 }, err);
    }

    #[test]
    fn identical_views_are_rejected() {
        let one = synthetic::observations().remove(0);
        let obs = vec![one; 5];
        let err = calibrate_planar(&obs, synthetic::IMAGE_SIZE, &PlanarCalibrationOptions::default())
            .unwrap_err();
        assert_eq!(CalibError::DegenerateViews, err);
    }

    #[test]
    fn zero_image_size_is_rejected() {
        let obs = synthetic::observations();
        let err = calibrate_planar(&obs, (0, 480), &PlanarCalibrationOptions::default()).unwrap_err();
        assert_eq!(
            CalibError::InvalidImageSize {
                width: 0,
                height: 480
            },
            err
        );
    }

    #[test]
    fn freeing_the_principal_point_still_fits() {
        let obs = synthetic::observations();
        let opts = PlanarCalibrationOptions {
            fix_principal_point: false,
            fix_k3: true,
            ..PlanarCalibrationOptions::default()
        };
        let calib = calibrate_planar(&obs, synthetic::IMAGE_SIZE, &opts).unwrap();
        assert!(calib.rms_error < 1e-2, "rms={}", calib.rms_error);
        assert_eq!(0.0, calib.distortion.k3);
    }
}
