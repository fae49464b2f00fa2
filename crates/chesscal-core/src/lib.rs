//! Core types and utilities for chessboard camera calibration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete corner detector, estimator or frame source.

mod board;
mod camera;
mod corner;
mod homography;
mod image;
mod logger;
mod orientation_clustering;

pub use board::{GridSpec, GridSpecError, Observation, ObservationError};
pub use camera::{project, CameraIntrinsics, Distortion};
pub use corner::{Corner, GridCoords, LabeledCorner};
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear_border, GrayImageView};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
pub use orientation_clustering::{
    cluster_orientations, OrientationClusteringParams, OrientationClusteringResult,
};
