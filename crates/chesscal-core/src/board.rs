//! Board geometry and point correspondences.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum GridSpecError {
    #[error("grid dimensions must be positive (width={width}, height={height})")]
    NonPositive { width: u32, height: u32 },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ObservationError {
    #[error("expected {expected} image points for the grid, got {got}")]
    WrongPointCount { expected: usize, got: usize },
}

/// Expected *interior corner* dimensions of the calibration chessboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSpec {
    /// Interior corners per row.
    pub width: u32,
    /// Interior corners per column.
    pub height: u32,
}

impl GridSpec {
    pub fn new(width: u32, height: u32) -> Result<Self, GridSpecError> {
        if width == 0 || height == 0 {
            return Err(GridSpecError::NonPositive { width, height });
        }
        Ok(Self { width, height })
    }

    /// Number of interior corners, `width * height`.
    pub fn board_size(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Reference-plane coordinates `(i / width, i % width, 0)` for every
    /// corner index `i`, in square units.
    pub fn reference_points(&self) -> Vec<Point3<f32>> {
        let w = self.width as usize;
        (0..self.board_size())
            .map(|i| Point3::new((i / w) as f32, (i % w) as f32, 0.0))
            .collect()
    }
}

/// One accepted image-space / reference-space correspondence set.
///
/// `image_points[i]` corresponds to `reference_points[i]`; both always have
/// `grid.board_size()` entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    image_points: Vec<Point2<f32>>,
    reference_points: Vec<Point3<f32>>,
}

impl Observation {
    /// Pair full-resolution image points with the grid's reference points.
    pub fn new(grid: GridSpec, image_points: Vec<Point2<f32>>) -> Result<Self, ObservationError> {
        let expected = grid.board_size();
        if image_points.len() != expected {
            return Err(ObservationError::WrongPointCount {
                expected,
                got: image_points.len(),
            });
        }
        Ok(Self {
            image_points,
            reference_points: grid.reference_points(),
        })
    }

    pub fn image_points(&self) -> &[Point2<f32>] {
        &self.image_points
    }

    pub fn reference_points(&self) -> &[Point3<f32>] {
        &self.reference_points
    }

    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }
}
