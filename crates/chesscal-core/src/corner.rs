use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Canonical 2D corner consumed by the chessboard grid assembler.
///
/// Obtained by adapting the output of a ChESS corner detector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Corner {
    /// Corner position in pixel coordinates.
    pub position: Point2<f32>,

    /// Dominant diagonal orientation at the corner, in radians.
    ///
    /// Defined modulo π: chessboard axes are undirected.
    pub orientation: f32,

    /// Orientation cluster (0 or 1) assigned by [`crate::cluster_orientations`],
    /// `None` before clustering or for outliers.
    pub orientation_cluster: Option<usize>,

    /// Response of the corner detector.
    pub strength: f32,
}

/// Integer grid coordinates (i = column, j = row) in board space.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GridCoords {
    pub i: i32,
    pub j: i32,
}

/// A corner that is part of an assembled grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LabeledCorner {
    pub position: Point2<f32>,
    pub grid: GridCoords,
    pub strength: f32,
}
