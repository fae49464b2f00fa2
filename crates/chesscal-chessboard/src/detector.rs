use crate::gridgraph::{GridAxes, GridGraph};
use crate::params::ChessboardParams;
use chesscal_core::{cluster_orientations, Corner, GridCoords, GridSpec, LabeledCorner};
use log::debug;
use nalgebra::{Point2, Vector2};
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// A complete chessboard: exactly `grid.board_size()` corners in row-major
/// order, `grid.width` corners per row.
#[derive(Clone, Debug)]
pub struct ChessboardDetection {
    pub grid: GridSpec,
    pub corners: Vec<LabeledCorner>,
}

impl ChessboardDetection {
    pub fn points(&self) -> Vec<Point2<f32>> {
        self.corners.iter().map(|c| c.position).collect()
    }
}

/// Chessboard detector over a cloud of ChESS corners.
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    /// Assemble the full `grid` from `corners`.
    ///
    /// Only a complete board is reported: partial grids, extra corners inside
    /// the accepted component, or inconsistent neighbour graphs all yield `None`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, corners), fields(num_corners = corners.len()))
    )]
    pub fn detect_from_corners(
        &self,
        corners: &[Corner],
        grid: GridSpec,
    ) -> Option<ChessboardDetection> {
        let mut strong: Vec<Corner> = corners
            .iter()
            .filter(|c| c.strength >= self.params.min_corner_strength)
            .cloned()
            .collect();

        if strong.len() < grid.board_size() {
            debug!(
                "{} corners after strength filter, need {}",
                strong.len(),
                grid.board_size()
            );
            return None;
        }

        let clustering = cluster_orientations(&strong, &self.params.orientation_clustering)?;
        for (c, label) in strong.iter_mut().zip(&clustering.labels) {
            c.orientation_cluster = *label;
        }
        let axes = GridAxes::from_diagonals(clustering.centers)?;

        let graph = GridGraph::new(&strong, &self.params.graph, &axes);
        let mut components = graph.connected_components();
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));

        components
            .iter()
            .filter(|c| c.len() == grid.board_size())
            .find_map(|component| {
                let coords = graph.assign_grid_coordinates(component)?;
                order_board(&strong, &coords, grid)
            })
    }
}

/// Map BFS cell coordinates onto the canonical board layout.
///
/// The board is transposed when its long side runs along `j`, then each axis
/// is flipped so that `i` grows with image x and `j` with image y.
fn order_board(
    corners: &[Corner],
    coords: &[(usize, i32, i32)],
    grid: GridSpec,
) -> Option<ChessboardDetection> {
    let (w, h) = (grid.width as i32, grid.height as i32);
    let min_i = coords.iter().map(|c| c.1).min()?;
    let min_j = coords.iter().map(|c| c.2).min()?;
    let mut cells: HashMap<(i32, i32), usize> = coords
        .iter()
        .map(|&(node, i, j)| ((i - min_i, j - min_j), node))
        .collect();

    let extent_i = cells.keys().map(|k| k.0).max()? + 1;
    let extent_j = cells.keys().map(|k| k.1).max()? + 1;
    if (extent_i, extent_j) != (w, h) {
        if (extent_i, extent_j) == (h, w) {
            cells = cells.into_iter().map(|((i, j), n)| ((j, i), n)).collect();
        } else {
            debug!("component extent {extent_i}x{extent_j} does not match {w}x{h}");
            return None;
        }
    }
    if cells.len() != grid.board_size() {
        return None;
    }

    let pos = |i: i32, j: i32| -> Option<Vector2<f32>> {
        cells.get(&(i, j)).map(|&n| corners[n].position.coords)
    };
    let along_i = pos(w - 1, 0)? - pos(0, 0)?;
    let along_j = pos(0, h - 1)? - pos(0, 0)?;
    // A square board is free to swap axes; keep i closest to image x.
    let swap = w == h && along_j.x.abs() > along_i.x.abs();
    let (along_i, along_j) = if swap { (along_j, along_i) } else { (along_i, along_j) };
    let flip_i = w > 1 && along_i.x < 0.0;
    let flip_j = h > 1 && along_j.y < 0.0;

    let mut out = Vec::with_capacity(grid.board_size());
    for j in 0..h {
        for i in 0..w {
            let si = if flip_i { w - 1 - i } else { i };
            let sj = if flip_j { h - 1 - j } else { j };
            let key = if swap { (sj, si) } else { (si, sj) };
            let node = *cells.get(&key)?;
            out.push(LabeledCorner {
                position: corners[node].position,
                grid: GridCoords { i, j },
                strength: corners[node].strength,
            });
        }
    }

    Some(ChessboardDetection {
        grid,
        corners: out,
    })
}
