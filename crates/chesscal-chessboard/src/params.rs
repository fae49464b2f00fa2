use chesscal_core::OrientationClusteringParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    /// Nearest neighbours inspected per corner.
    pub k_neighbors: usize,
    /// Max angle between an edge and the local grid axis (degrees).
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 4.0,
            max_spacing_pix: 200.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Parameters of the chessboard grid assembler.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ChessboardParams {
    /// Corners weaker than this are dropped before clustering.
    pub min_corner_strength: f32,
    pub orientation_clustering: OrientationClusteringParams,
    pub graph: GridGraphParams,
}
