//! Noise-free synthetic camera used by the unit tests.

use chesscal_core::{project, CameraIntrinsics, Distortion, GridSpec, Observation};
use nalgebra::{Isometry3, Point2, Point3, Translation3, UnitQuaternion, Vector3};

pub(crate) const IMAGE_SIZE: (u32, u32) = (640, 480);

pub(crate) fn grid() -> GridSpec {
    GridSpec::new(9, 6).unwrap()
}

pub(crate) fn truth() -> (CameraIntrinsics, Distortion) {
    (
        CameraIntrinsics {
            fx: 800.0,
            fy: 790.0,
            cx: 319.5,
            cy: 239.5,
        },
        Distortion {
            k1: -0.12,
            k2: 0.05,
            ..Distortion::default()
        },
    )
}

/// Board poses around 20 squares from the camera with varied tilt.
pub(crate) fn poses() -> Vec<Isometry3<f64>> {
    let center = Vector3::new(2.5, 4.0, 0.0);
    [
        ([0.20, -0.10, 0.05], [0.0, 0.0, 20.0]),
        ([-0.25, 0.15, 0.00], [1.0, -0.5, 19.0]),
        ([0.10, 0.30, -0.10], [-1.0, 0.5, 21.0]),
        ([0.30, 0.25, 0.10], [0.5, 1.0, 22.0]),
        ([-0.20, -0.30, 0.05], [-0.5, -1.0, 18.0]),
    ]
    .iter()
    .map(|(r, c)| {
        let rot = UnitQuaternion::from_scaled_axis(Vector3::new(r[0], r[1], r[2]));
        let t = Vector3::new(c[0], c[1], c[2]) - rot * center;
        Isometry3::from_parts(Translation3::from(t), rot)
    })
    .collect()
}

pub(crate) fn observe(
    k: &CameraIntrinsics,
    d: &Distortion,
    pose: &Isometry3<f64>,
) -> Observation {
    let grid = grid();
    let points: Vec<Point2<f32>> = grid
        .reference_points()
        .iter()
        .map(|p| {
            let pc = pose * Point3::new(p.x as f64, p.y as f64, 0.0);
            let px = project(k, d, &pc).unwrap();
            Point2::new(px.x as f32, px.y as f32)
        })
        .collect();
    Observation::new(grid, points).unwrap()
}

pub(crate) fn observations() -> Vec<Observation> {
    let (k, d) = truth();
    poses().iter().map(|p| observe(&k, &d, p)).collect()
}
