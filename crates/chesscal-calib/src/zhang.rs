//! Closed-form initialisation from plane homographies (Zhang).
//!
//! Every view contributes two constraints on the image of the absolute conic:
//! `h1' B h2 = 0` and `h1' B h1 = h2' B h2`. With the principal point held
//! fixed and zero skew, `B` reduces to `diag(1/fx^2, 1/fy^2, 1)` and the
//! focal lengths follow from a 2-unknown linear least squares problem.

use crate::CalibError;
use log::debug;
use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, Vector2, Vector6};

/// Smallest accepted ratio between the fifth and the first singular value of
/// the general constraint matrix.
const DIVERSITY_EPS: f64 = 1e-8;

/// Conditioning transform: shift to `(cx, cy)` and scale by `s`.
fn conditioning(cx: f64, cy: f64, s: f64) -> Matrix3<f64> {
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn conditioned(h: &Matrix3<f64>, t: &Matrix3<f64>) -> Matrix3<f64> {
    let hn = t * h;
    let n = hn.norm();
    if n > 0.0 {
        hn / n
    } else {
        hn
    }
}

/// Zhang's `v_ij` row for the general (5 dof + scale) conic.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> Vector6<f64> {
    let hi = h.column(i);
    let hj = h.column(j);
    Vector6::new(
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    )
}

/// Reject view sets whose homographies leave the conic under-determined.
///
/// The general constraint matrix must have rank 5. Repeated board poses,
/// or poses differing only by translation, collapse it to rank 2.
pub fn check_view_diversity(
    homographies: &[Matrix3<f64>],
    image_size: (u32, u32),
) -> Result<(), CalibError> {
    if homographies.len() < 3 {
        return Err(CalibError::NotEnoughViews {
            got: homographies.len(),
            need: 3,
        });
    }
    let (w, h) = (image_size.0 as f64, image_size.1 as f64);
    let t = conditioning(0.5 * w, 0.5 * h, 2.0 / (w + h));

    let mut v = DMatrix::<f64>::zeros(2 * homographies.len(), 6);
    for (k, hk) in homographies.iter().enumerate() {
        let hn = conditioned(hk, &t);
        let v12 = v_ij(&hn, 0, 1);
        let d = v_ij(&hn, 0, 0) - v_ij(&hn, 1, 1);
        v.row_mut(2 * k).copy_from(&v12.transpose());
        v.row_mut(2 * k + 1).copy_from(&d.transpose());
    }

    let mut sv: Vec<f64> = v.singular_values().iter().copied().collect();
    sv.sort_by(|a, b| b.total_cmp(a));
    let ratio = if sv[0] > 0.0 { sv[4] / sv[0] } else { 0.0 };
    debug!("view diversity: sigma5/sigma1 = {ratio:.3e}");
    if ratio.is_finite() && ratio > DIVERSITY_EPS {
        Ok(())
    } else {
        Err(CalibError::DegenerateViews)
    }
}

/// Focal lengths `(fx, fy)` for a fixed principal point `(cx, cy)`.
pub fn focal_from_homographies(
    homographies: &[Matrix3<f64>],
    principal_point: (f64, f64),
    image_size: (u32, u32),
) -> Result<(f64, f64), CalibError> {
    let s = 2.0 / (image_size.0 as f64 + image_size.1 as f64);
    let t = conditioning(principal_point.0, principal_point.1, s);

    let m = homographies.len();
    let mut a = DMatrix::<f64>::zeros(2 * m, 2);
    let mut b = DVector::<f64>::zeros(2 * m);
    for (k, hk) in homographies.iter().enumerate() {
        let hn = conditioned(hk, &t);
        let (h1, h2) = (hn.column(0), hn.column(1));
        a[(2 * k, 0)] = h1[0] * h2[0];
        a[(2 * k, 1)] = h1[1] * h2[1];
        b[2 * k] = -h1[2] * h2[2];
        a[(2 * k + 1, 0)] = h1[0] * h1[0] - h2[0] * h2[0];
        a[(2 * k + 1, 1)] = h1[1] * h1[1] - h2[1] * h2[1];
        b[2 * k + 1] = -(h1[2] * h1[2] - h2[2] * h2[2]);
    }

    let ata: Matrix2<f64> = (a.transpose() * &a).fixed_view::<2, 2>(0, 0).into_owned();
    let atb: Vector2<f64> = (a.transpose() * &b).fixed_rows::<2>(0).into_owned();
    let sol = ata
        .try_inverse()
        .map(|inv| inv * atb)
        .ok_or(CalibError::DegenerateViews)?;

    let (inv_fx2, inv_fy2) = (sol[0], sol[1]);
    if !(inv_fx2 > 0.0 && inv_fy2 > 0.0) {
        return Err(CalibError::FocalInitFailed {
            a: inv_fx2,
            b: inv_fy2,
        });
    }
    let fx = 1.0 / (s * inv_fx2.sqrt());
    let fy = 1.0 / (s * inv_fy2.sqrt());
    debug!("focal initialisation: fx={fx:.2}, fy={fy:.2}");
    Ok((fx, fy))
}
