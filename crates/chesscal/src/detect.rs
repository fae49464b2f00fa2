//! Observation detection: a pattern detector run on a downscaled frame,
//! with corners mapped back to full resolution.

use crate::Frame;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor, ThresholdMode};
use chesscal_chessboard::{ChessboardDetector, ChessboardParams};
use chesscal_core::{Corner, GridSpec, Observation};
use image::imageops::{self, FilterType};
use log::{debug, warn};
use nalgebra::Point2;
use std::borrow::Cow;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Locates the full chessboard in a grayscale image.
///
/// Returns the `grid.board_size()` corners in row-major order, or `None` when
/// the complete grid is not visible. Internal failures are reported as `None`
/// too.
pub trait PatternDetector {
    fn find_corners(&mut self, image: &image::GrayImage, grid: GridSpec)
        -> Option<Vec<Point2<f32>>>;
}

/// Default settings for the `chess-corners` ChESS detector.
pub fn default_chess_config() -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.threshold_mode = ThresholdMode::Relative;
    cfg.threshold_value = 0.2;
    cfg.nms_radius = 2;
    cfg
}

/// Convert a ChESS descriptor into a grid-assembly corner.
///
/// `Corner::orientation` is the diagonal through the dark sectors, which on
/// an axis-aligned board alternates between π/4 and 3π/4. The descriptor
/// reports the two grid line directions with the dark sector swept from
/// `axes[0]` to `axes[1]`, so their bisector is that diagonal.
fn adapt_chess_corner(c: &CornerDescriptor) -> Corner {
    let [a0, a1] = c.axes;
    Corner {
        position: Point2::new(c.x, c.y),
        orientation: 0.5 * (a0.angle + a1.angle),
        orientation_cluster: None,
        strength: c.response,
    }
}

/// ChESS corners followed by chessboard grid assembly.
pub struct ChessCornersDetector {
    pub chess: ChessConfig,
    pub board: ChessboardDetector,
}

impl ChessCornersDetector {
    pub fn new(chess: ChessConfig, params: ChessboardParams) -> Self {
        Self {
            chess,
            board: ChessboardDetector::new(params),
        }
    }
}

impl Default for ChessCornersDetector {
    fn default() -> Self {
        Self::new(default_chess_config(), ChessboardParams::default())
    }
}

impl PatternDetector for ChessCornersDetector {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, image), fields(width = image.width(), height = image.height()))
    )]
    fn find_corners(
        &mut self,
        image: &image::GrayImage,
        grid: GridSpec,
    ) -> Option<Vec<Point2<f32>>> {
        let corners: Vec<Corner> = match find_chess_corners_image(image, &self.chess) {
            Ok(found) => found.iter().map(adapt_chess_corner).collect(),
            Err(e) => {
                warn!("ChESS detection failed: {e}");
                return None;
            }
        };
        debug!("{} ChESS corners", corners.len());
        self.board
            .detect_from_corners(&corners, grid)
            .map(|d| d.points())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DetectOutcome {
    Found(Observation),
    NotFound,
}

/// Turns frames into observations of a fixed grid.
pub struct ObservationDetector<D> {
    detector: D,
    grid: GridSpec,
    scale_factor: f32,
}

impl<D: PatternDetector> ObservationDetector<D> {
    /// `scale_factor` in `(0, 1]` is the downscale applied before detection.
    pub fn new(detector: D, grid: GridSpec, scale_factor: f32) -> Self {
        Self {
            detector,
            grid,
            scale_factor,
        }
    }

    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    /// Detect the grid in `frame`.
    ///
    /// Stored image points are always in full-resolution pixels.
    pub fn detect(&mut self, frame: &Frame) -> DetectOutcome {
        let scaled = downscale(&frame.image, self.scale_factor);
        let Some(points) = self.detector.find_corners(&scaled, self.grid) else {
            return DetectOutcome::NotFound;
        };

        let s = self.scale_factor;
        let full_res = points
            .into_iter()
            .map(|p| Point2::new(p.x / s, p.y / s))
            .collect();
        match Observation::new(self.grid, full_res) {
            Ok(obs) => DetectOutcome::Found(obs),
            Err(e) => {
                debug!("detector returned an incomplete grid: {e}");
                DetectOutcome::NotFound
            }
        }
    }
}

/// Resize by `scale` with a triangle filter; `scale == 1` borrows the input.
pub fn downscale(img: &image::GrayImage, scale: f32) -> Cow<'_, image::GrayImage> {
    if scale == 1.0 {
        return Cow::Borrowed(img);
    }
    let w = ((img.width() as f32 * scale).round() as u32).max(1);
    let h = ((img.height() as f32 * scale).round() as u32).max(1);
    Cow::Owned(imageops::resize(img, w, h, FilterType::Triangle))
}
