//! Single-camera chessboard calibration pipeline.
//!
//! Frames flow one way: a [`FrameSource`] feeds the [`ObservationDetector`],
//! accepted observations collect in the [`DebouncedAccumulator`], the
//! [`CalibrationSolver`] runs once it is full, the result is written by
//! [`save_parameters`], reloaded, and every later frame is undistorted by a
//! [`RectificationMap`]. The [`Controller`] owns all of it.
//!
//! ## Quickstart
//!
//! ```no_run
//! use chesscal::{
//!     open_source, CancelToken, ChessCornersDetector, Controller, NoPreview, PipelineConfig,
//!     PlanarEstimator, SourceConfig,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig {
//!     source: SourceConfig::Images {
//!         dir: "frames".into(),
//!         frame_interval_secs: 1.0,
//!     },
//!     ..PipelineConfig::default()
//! };
//! let mut source = open_source(&config.source)?;
//! let mut controller = Controller::new(
//!     &config,
//!     ChessCornersDetector::default(),
//!     PlanarEstimator::default(),
//!     CancelToken::new(),
//! )?;
//! let outcome = controller.run(&mut source, &mut NoPreview);
//! println!("success: {}", outcome.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `chesscal::core`: geometry, camera model and image sampling.
//! - `chesscal::chessboard`: chessboard assembly from ChESS corners.
//! - `chesscal::calib`: planar intrinsic calibration.

pub use chesscal_calib as calib;
pub use chesscal_chessboard as chessboard;
pub use chesscal_core as core;

mod accumulator;
mod cancel;
mod config;
mod detect;
mod frame;
mod pipeline;
mod preview;
mod rectify;
mod solver;
mod source;
mod store;

pub use accumulator::{DebouncedAccumulator, Offer, RejectReason};
pub use cancel::CancelToken;
pub use config::{ConfigError, PipelineConfig, SourceConfig};
pub use detect::{
    default_chess_config, downscale, ChessCornersDetector, DetectOutcome, ObservationDetector,
    PatternDetector,
};
pub use frame::Frame;
pub use pipeline::{open_source, Controller, PipelineError, PipelineState, RunOutcome};
pub use preview::{annotate, NoPreview, PngPreview, PreviewFrame, PreviewSink};
pub use rectify::RectificationMap;
pub use solver::{
    CalibrationParameters, CalibrationSolver, EstimationFlags, Estimator, PlanarEstimator,
    SolveError,
};
pub use source::{FfmpegSource, FrameSource, ImageDirSource, SourceError, StreamInput};
pub use store::{load_parameters, save_parameters, StoreError};
