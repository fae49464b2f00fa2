//! Two-mode clustering of ChESS corner orientations on [0, π).
//!
//! On a chessboard the diagonal orientations of corners alternate between two
//! roughly orthogonal directions. This finds both modes and labels every corner
//! with cluster 0, 1, or `None` (outlier). Purely angular; no geometry here.

use crate::Corner;
use log::debug;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OrientationClusteringParams {
    /// Number of histogram bins on [0, π).
    pub num_bins: usize,
    /// Max 2-means refinement iterations.
    pub max_iters: usize,
    /// Minimal separation between the two seed peaks (degrees).
    pub peak_min_separation_deg: f32,
    /// Max distance from the nearest center before a corner is an outlier (degrees).
    pub outlier_threshold_deg: f32,
    /// Minimal peak mass as a fraction of the total weight.
    pub min_peak_weight_fraction: f32,
}

impl Default for OrientationClusteringParams {
    fn default() -> Self {
        Self {
            num_bins: 90,
            max_iters: 10,
            peak_min_separation_deg: 10.0,
            outlier_threshold_deg: 30.0,
            min_peak_weight_fraction: 0.05,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrientationClusteringResult {
    /// Cluster centers in [0, π).
    pub centers: [f32; 2],
    /// Per-corner label, parallel to the input slice.
    pub labels: Vec<Option<usize>>,
}

/// Cluster corner orientations into two dominant directions.
///
/// Corner strengths are used as weights. Returns `None` when fewer than two
/// well separated modes exist.
pub fn cluster_orientations(
    corners: &[Corner],
    params: &OrientationClusteringParams,
) -> Option<OrientationClusteringResult> {
    if corners.is_empty() || params.num_bins < 4 {
        return None;
    }

    let bins = params.num_bins;
    let mut hist = vec![0.0f32; bins];
    let mut total = 0.0f32;
    for c in corners {
        let w = c.strength.max(0.0);
        hist[angle_to_bin(c.orientation, bins)] += w;
        total += w;
    }
    if total <= 0.0 {
        return None;
    }
    let hist = smooth_circular(&hist);

    // Local maxima ordered by smoothed mass.
    let mut peaks: Vec<(usize, f32)> = (0..bins)
        .filter(|&i| {
            let prev = hist[(i + bins - 1) % bins];
            let next = hist[(i + 1) % bins];
            hist[i] > 0.0 && hist[i] >= prev && hist[i] >= next
        })
        .map(|i| (i, hist[i]))
        .collect();
    let min_mass = total * params.min_peak_weight_fraction / bins as f32;
    peaks.retain(|&(_, m)| m >= min_mass);
    peaks.sort_by(|a, b| b.1.total_cmp(&a.1));

    let first = bin_to_angle(peaks.first()?.0, bins);
    let min_sep = params.peak_min_separation_deg.to_radians();
    let Some(second) = peaks
        .iter()
        .map(|&(b, _)| bin_to_angle(b, bins))
        .find(|&a| angular_dist_pi(first, a) >= min_sep)
    else {
        debug!("orientation histogram has a single mode");
        return None;
    };

    let mut centers = [first, second];
    let mut labels = vec![None; corners.len()];
    let outlier = params.outlier_threshold_deg.to_radians();

    for _ in 0..params.max_iters.max(1) {
        let mut changed = false;
        for (label, c) in labels.iter_mut().zip(corners) {
            let d0 = angular_dist_pi(c.orientation, centers[0]);
            let d1 = angular_dist_pi(c.orientation, centers[1]);
            let (best, dist) = if d0 <= d1 { (0, d0) } else { (1, d1) };
            let next = (dist <= outlier).then_some(best);
            if *label != next {
                *label = next;
                changed = true;
            }
        }

        // Circular mean in double-angle space respects the π period.
        let mut acc = [[0.0f32; 2]; 2];
        for (label, c) in labels.iter().zip(corners) {
            if let Some(k) = label {
                let w = c.strength.max(0.0);
                let t = 2.0 * wrap_angle_pi(c.orientation);
                acc[*k][0] += w * t.cos();
                acc[*k][1] += w * t.sin();
            }
        }
        for k in 0..2 {
            if acc[k][0] != 0.0 || acc[k][1] != 0.0 {
                centers[k] = wrap_angle_pi(0.5 * acc[k][1].atan2(acc[k][0]));
            }
        }

        if !changed {
            break;
        }
    }

    Some(OrientationClusteringResult { centers, labels })
}

fn wrap_angle_pi(theta: f32) -> f32 {
    theta.rem_euclid(PI)
}

/// Smallest distance on the circle with period π, in [0, π/2].
fn angular_dist_pi(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(PI);
    if d > FRAC_PI_2 {
        PI - d
    } else {
        d
    }
}

fn angle_to_bin(theta: f32, bins: usize) -> usize {
    let x = wrap_angle_pi(theta) / PI * bins as f32;
    (x.floor() as usize).min(bins - 1)
}

fn bin_to_angle(bin: usize, bins: usize) -> f32 {
    (bin as f32 + 0.5) * PI / bins as f32
}

/// [1, 4, 6, 4, 1] / 16 circular smoothing.
fn smooth_circular(hist: &[f32]) -> Vec<f32> {
    const K: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
    let n = hist.len() as isize;
    (0..n)
        .map(|i| {
            K.iter()
                .enumerate()
                .map(|(k, w)| w * hist[(i + k as isize - 2).rem_euclid(n) as usize])
                .sum::<f32>()
                / 16.0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use std::f32::consts::FRAC_PI_4;

    fn make_corner(theta: f32, strength: f32) -> Corner {
        Corner {
            position: Point2::new(0.0, 0.0),
            orientation: theta,
            orientation_cluster: None,
            strength,
        }
    }

    #[test]
    fn clusters_two_dominant_modes() {
        let a = [FRAC_PI_4 - 0.05, FRAC_PI_4, FRAC_PI_4 + 0.04, FRAC_PI_4 + 0.02];
        let b = [
            3.0 * FRAC_PI_4 - 0.03,
            3.0 * FRAC_PI_4,
            3.0 * FRAC_PI_4 + 0.02,
            3.0 * FRAC_PI_4 + 0.04,
        ];
        let corners: Vec<Corner> = a
            .iter()
            .map(|&t| make_corner(t, 1.0))
            .chain(b.iter().map(|&t| make_corner(t, 1.5)))
            .collect();

        let result = cluster_orientations(&corners, &OrientationClusteringParams::default())
            .expect("two clusters");
        let la = result.labels[0].expect("labelled");
        assert!(result.labels[..4].iter().all(|l| *l == Some(la)));
        assert!(result.labels[4..].iter().all(|l| *l == Some(1 - la)));

        let sep = angular_dist_pi(result.centers[0], result.centers[1]);
        assert!((sep - FRAC_PI_2).abs() < 0.2);
    }

    #[test]
    fn far_angles_become_outliers() {
        let mut corners = vec![make_corner(FRAC_PI_4, 1.0); 5];
        corners.extend(vec![make_corner(3.0 * FRAC_PI_4, 1.0); 5]);
        corners.push(make_corner(0.0, 1.0));

        let result = cluster_orientations(&corners, &OrientationClusteringParams::default())
            .expect("clustering should succeed");
        assert_eq!(10, result.labels.iter().filter(|l| l.is_some()).count());
        assert!(result.labels.last().unwrap().is_none());
    }

    #[test]
    fn single_mode_yields_none() {
        let corners = vec![make_corner(0.1, 1.0); 6];
        assert!(cluster_orientations(&corners, &OrientationClusteringParams::default()).is_none());
    }
}
