use crate::params::GridGraphParams;
use chesscal_core::Corner;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::{HashMap, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    /// Grid step `(di, dj)` taken when following this edge.
    fn step(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
}

/// Board axes in image space, derived once from the two orientation cluster
/// centers so every edge is classified in the same frame.
#[derive(Debug, Clone, Copy)]
pub struct GridAxes {
    pub u: Vector2<f32>,
    pub v: Vector2<f32>,
}

impl GridAxes {
    /// ChESS orientations follow the square diagonals; the sum and difference
    /// of the two diagonal directions give the row/column axes.
    pub fn from_diagonals(centers: [f32; 2]) -> Option<Self> {
        let a = angle_to_unit(centers[0]);
        let b = angle_to_unit(centers[1]);
        let u = a + b;
        let v = a - b;
        if u.norm_squared() < 1e-6 || v.norm_squared() < 1e-6 {
            return None;
        }
        Some(Self {
            u: u.normalize(),
            v: v.normalize(),
        })
    }

    /// Classify an edge along the closest axis; `None` when it is further
    /// than `tolerance_rad` from both.
    fn classify(&self, e: &Vector2<f32>, tolerance_rad: f32) -> Option<NeighborDirection> {
        let n = e.norm();
        if n <= 0.0 {
            return None;
        }
        let cu = e.dot(&self.u) / n;
        let cv = e.dot(&self.v) / n;
        let min_cos = tolerance_rad.cos();
        if cu.abs() >= cv.abs() {
            if cu.abs() < min_cos {
                return None;
            }
            Some(if cu > 0.0 {
                NeighborDirection::Right
            } else {
                NeighborDirection::Left
            })
        } else {
            if cv.abs() < min_cos {
                return None;
            }
            Some(if cv > 0.0 {
                NeighborDirection::Down
            } else {
                NeighborDirection::Up
            })
        }
    }
}

fn angle_to_unit(theta: f32) -> Vector2<f32> {
    Vector2::new(theta.cos(), theta.sin())
}

fn good_neighbor(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
    axes: &GridAxes,
) -> Option<NodeNeighbor> {
    // Axis neighbours on a chessboard alternate diagonal clusters.
    let (Some(ci), Some(cj)) = (corner.orientation_cluster, neighbor.orientation_cluster) else {
        return None;
    };
    if ci == cj {
        return None;
    }

    let e = neighbor.position - corner.position;
    let distance = e.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    let direction = axes.classify(&e, params.orientation_tolerance_deg.to_radians())?;
    Some(NodeNeighbor {
        direction,
        index: neighbor_index,
        distance,
    })
}

/// Keep at most one neighbour per direction, the nearest.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: HashMap<NeighborDirection, NodeNeighbor> = HashMap::new();
    for c in candidates {
        match best.get(&c.direction) {
            Some(cur) if cur.distance <= c.distance => {}
            _ => {
                best.insert(c.direction, c);
            }
        }
    }
    let mut out: Vec<NodeNeighbor> = best.into_values().collect();
    out.sort_by_key(|n| n.index);
    out
}

pub struct GridGraph {
    /// Per node, at most one neighbour per direction.
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams, axes: &GridAxes) -> Self {
        if corners.is_empty() {
            return Self {
                neighbors: Vec::new(),
            };
        }

        let coords = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();
        // The query point itself is among the results.
        let k = params.k_neighbors + 1;

        let neighbors = corners
            .iter()
            .enumerate()
            .map(|(i, corner)| {
                let query = [corner.position.x, corner.position.y];
                let candidates = tree
                    .nearest_n::<SquaredEuclidean>(&query, k)
                    .into_iter()
                    .map(|nn| nn.item as usize)
                    .filter(|&j| j != i)
                    .filter_map(|j| good_neighbor(corner, &corners[j], j, params, axes))
                    .collect();
                select_neighbors(candidates)
            })
            .collect();

        Self { neighbors }
    }

    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut visited = vec![false; self.neighbors.len()];
        let mut components = Vec::new();

        for start in 0..self.neighbors.len() {
            if visited[start] {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start];
            while let Some(node) = stack.pop() {
                if visited[node] {
                    continue;
                }
                visited[node] = true;
                component.push(node);
                stack.extend(
                    self.neighbors[node]
                        .iter()
                        .map(|n| n.index)
                        .filter(|&j| !visited[j]),
                );
            }
            components.push(component);
        }

        components
    }

    /// BFS from the first node of `component`, assigning integer `(i, j)`.
    ///
    /// Returns `None` when two nodes land on the same cell, which means the
    /// edges are not consistent with a single grid.
    pub fn assign_grid_coordinates(&self, component: &[usize]) -> Option<Vec<(usize, i32, i32)>> {
        let start = *component.first()?;
        let mut coords = Vec::with_capacity(component.len());
        let mut by_node: HashMap<usize, (i32, i32)> = HashMap::new();
        let mut by_cell: HashMap<(i32, i32), usize> = HashMap::new();
        let mut queue = VecDeque::from([(start, 0, 0)]);

        while let Some((node, i, j)) = queue.pop_front() {
            if let Some(&prev) = by_node.get(&node) {
                if prev != (i, j) {
                    return None;
                }
                continue;
            }
            if by_cell.insert((i, j), node).is_some() {
                return None;
            }
            by_node.insert(node, (i, j));
            coords.push((node, i, j));

            for n in &self.neighbors[node] {
                let (di, dj) = n.direction.step();
                queue.push_back((n.index, i + di, j + dj));
            }
        }

        Some(coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use std::f32::consts::FRAC_PI_4;

    fn make_corner(x: f32, y: f32, cluster: usize) -> Corner {
        let orientation = if cluster == 0 { FRAC_PI_4 } else { 3.0 * FRAC_PI_4 };
        Corner {
            position: Point2::new(x, y),
            orientation,
            orientation_cluster: Some(cluster),
            strength: 1.0,
        }
    }

    fn grid(cols: usize, rows: usize, spacing: f32) -> Vec<Corner> {
        (0..rows)
            .flat_map(|j| {
                (0..cols).map(move |i| {
                    make_corner(i as f32 * spacing, j as f32 * spacing, (i + j) % 2)
                })
            })
            .collect()
    }

    fn axes() -> GridAxes {
        GridAxes::from_diagonals([FRAC_PI_4, 3.0 * FRAC_PI_4]).unwrap()
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let corners = grid(3, 3, 10.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), &axes());

        let center: HashMap<_, _> = graph.neighbors[4]
            .iter()
            .map(|n| (n.direction, n.index))
            .collect();
        assert_eq!(4, center.len());
        let mut found: Vec<usize> = center.values().copied().collect();
        found.sort();
        assert_eq!(vec![1, 3, 5, 7], found);
        assert_eq!(2, graph.neighbors[0].len());
    }

    #[test]
    fn same_cluster_corners_are_not_neighbors() {
        let corners = vec![make_corner(0.0, 0.0, 0), make_corner(10.0, 0.0, 0)];
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), &axes());
        assert!(graph.neighbors.iter().all(|n| n.is_empty()));
    }

    #[test]
    fn rejects_neighbors_outside_distance_window() {
        let corners = vec![make_corner(0.0, 0.0, 0), make_corner(30.0, 0.0, 1)];
        let params = GridGraphParams {
            max_spacing_pix: 15.0,
            ..GridGraphParams::default()
        };
        let graph = GridGraph::new(&corners, &params, &axes());
        assert!(graph.neighbors.iter().all(|n| n.is_empty()));
    }

    #[test]
    fn bfs_assigns_unique_cells_covering_the_grid() {
        let corners = grid(4, 3, 12.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), &axes());
        let components = graph.connected_components();
        assert_eq!(1, components.len());

        let coords = graph.assign_grid_coordinates(&components[0]).unwrap();
        assert_eq!(12, coords.len());
        let (min_i, max_i) = coords
            .iter()
            .fold((i32::MAX, i32::MIN), |(lo, hi), c| (lo.min(c.1), hi.max(c.1)));
        let (min_j, max_j) = coords
            .iter()
            .fold((i32::MAX, i32::MIN), |(lo, hi), c| (lo.min(c.2), hi.max(c.2)));
        let extent = ((max_i - min_i + 1), (max_j - min_j + 1));
        assert!(extent == (4, 3) || extent == (3, 4));
    }
}
