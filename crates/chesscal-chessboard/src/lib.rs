//! Chessboard grid assembly built on top of `chesscal-core`.
//!
//! ## Quickstart
//!
//! ```
//! use chesscal_chessboard::{ChessboardDetector, ChessboardParams};
//! use chesscal_core::{Corner, GridSpec};
//!
//! let detector = ChessboardDetector::new(ChessboardParams::default());
//! let corners: Vec<Corner> = Vec::new();
//! let grid = GridSpec::new(9, 6).unwrap();
//! assert!(detector.detect_from_corners(&corners, grid).is_none());
//! ```
//!
//! Algorithm:
//! 1. Drop weak ChESS corners.
//! 2. Cluster corner orientations into the two diagonal directions.
//! 3. Derive the board axes from the two cluster centers.
//! 4. Link every corner to at most one neighbour per axis direction
//!    (opposite cluster, spacing window, axis-aligned edge).
//! 5. Walk each connected component, assigning integer `(i, j)` cells.
//! 6. Accept the component that fills exactly `width x height` cells and
//!    emit it row-major, `i` along image x and `j` along image y.

mod detector;
mod gridgraph;
mod params;

pub use detector::{ChessboardDetection, ChessboardDetector};
pub use gridgraph::{GridAxes, GridGraph, NeighborDirection, NodeNeighbor};
pub use params::{ChessboardParams, GridGraphParams};
