use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion};

/// Board-to-camera pose from a plane homography and known intrinsics.
///
/// `h` maps board coordinates `(X, Y, 1)` to pixels. The rotation built from
/// the first two columns is projected onto SO(3); the sign is chosen so the
/// board lies in front of the camera.
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<Isometry3<f64>> {
    let k_inv = k.try_inverse()?;
    let b1 = k_inv * h.column(0);
    let b2 = k_inv * h.column(1);
    let b3 = k_inv * h.column(2);

    let norm = 0.5 * (b1.norm() + b2.norm());
    if norm <= f64::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / norm;
    if b3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = b1 * lambda;
    let r2 = b2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = r.svd(true, true);
    let mut u = svd.u?;
    let v_t = svd.v_t?;
    if (u * v_t).determinant() < 0.0 {
        let flipped = -u.column(2).into_owned();
        u.set_column(2, &flipped);
    }
    let rot = Rotation3::from_matrix_unchecked(u * v_t);
    let t = b3 * lambda;

    Some(Isometry3::from_parts(
        Translation3::from(t),
        UnitQuaternion::from_rotation_matrix(&rot),
    ))
}
