//! The acquisition -> solve -> rectify state machine.

use crate::accumulator::{DebouncedAccumulator, Offer};
use crate::cancel::CancelToken;
use crate::config::{ConfigError, PipelineConfig, SourceConfig};
use crate::detect::{DetectOutcome, ObservationDetector, PatternDetector};
use crate::preview::{PreviewFrame, PreviewSink};
use crate::rectify::RectificationMap;
use crate::solver::{CalibrationParameters, CalibrationSolver, Estimator, SolveError};
use crate::source::{FfmpegSource, FrameSource, ImageDirSource, SourceError, StreamInput};
use crate::store::{load_parameters, save_parameters, StoreError};
use crate::Frame;
use log::{debug, error, info, warn};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Acquiring,
    Solving,
    Rectifying,
    Aborted,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Solve(#[from] SolveError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cancelled while acquiring observations")]
    Cancelled,
    #[error("frame source ended after {collected} of {target} observations")]
    SourceExhausted { collected: usize, target: usize },
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct RunOutcome {
    pub final_state: PipelineState,
    pub frames_processed: usize,
    /// Observations held when acquisition ended.
    pub observations: usize,
    /// Parameters reloaded from the store, when the run got that far.
    pub params: Option<CalibrationParameters>,
    pub abort_reason: Option<PipelineError>,
}

impl RunOutcome {
    /// Rectification ending on stream exhaustion or cancellation is a
    /// success; an aborted run is not.
    pub fn is_success(&self) -> bool {
        self.final_state == PipelineState::Rectifying
    }
}

/// Open the frame source named by `config`.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>, PipelineError> {
    Ok(match config {
        SourceConfig::Device {
            index,
            width,
            height,
        } => Box::new(FfmpegSource::open(
            &StreamInput::Device(*index),
            *width,
            *height,
        )?),
        SourceConfig::Url { url, width, height } => Box::new(FfmpegSource::open(
            &StreamInput::Url(url.clone()),
            *width,
            *height,
        )?),
        SourceConfig::Images {
            dir,
            frame_interval_secs,
        } => Box::new(ImageDirSource::open(dir, *frame_interval_secs)?),
    })
}

/// Owns all run state and drives it frame by frame.
pub struct Controller<D, E> {
    detector: ObservationDetector<D>,
    accumulator: DebouncedAccumulator,
    solver: CalibrationSolver<E>,
    params_path: PathBuf,
    border_value: u8,
    max_read_failures: usize,
    cancel: CancelToken,
    state: PipelineState,
    image_size: (u32, u32),
    map: Option<RectificationMap>,
    params: Option<CalibrationParameters>,
    abort_reason: Option<PipelineError>,
    frames_processed: usize,
    observations: usize,
}

impl<D: PatternDetector, E: Estimator> Controller<D, E> {
    pub fn new(
        config: &PipelineConfig,
        detector: D,
        estimator: E,
        cancel: CancelToken,
    ) -> Result<Self, PipelineError> {
        let grid = config.validate()?;
        Ok(Self {
            detector: ObservationDetector::new(detector, grid, config.scale_factor),
            accumulator: DebouncedAccumulator::new(config.target_count, config.min_interval_secs),
            solver: CalibrationSolver::new(estimator),
            params_path: config.params_path.clone(),
            border_value: config.border_value,
            max_read_failures: config.max_read_failures,
            cancel,
            state: PipelineState::Acquiring,
            image_size: (0, 0),
            map: None,
            params: None,
            abort_reason: None,
            frames_processed: 0,
            observations: 0,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn accumulator(&self) -> &DebouncedAccumulator {
        &self.accumulator
    }

    pub fn params(&self) -> Option<&CalibrationParameters> {
        self.params.as_ref()
    }

    pub fn map(&self) -> Option<&RectificationMap> {
        self.map.as_ref()
    }

    pub fn abort_reason(&self) -> Option<&PipelineError> {
        self.abort_reason.as_ref()
    }

    fn transition(&mut self, to: PipelineState, preview: &mut dyn PreviewSink) {
        info!("pipeline: {:?} -> {:?}", self.state, to);
        preview.on_transition(self.state, to);
        self.state = to;
    }

    fn abort(&mut self, reason: PipelineError, preview: &mut dyn PreviewSink) {
        error!("aborting: {reason}");
        self.accumulator.clear();
        self.abort_reason = Some(reason);
        self.transition(PipelineState::Aborted, preview);
    }

    /// Process one frame in the current state. Frames are ignored in
    /// `Solving` and `Aborted`.
    pub fn process_frame(&mut self, frame: &Frame, preview: &mut dyn PreviewSink) {
        match self.state {
            PipelineState::Acquiring => self.acquire(frame, preview),
            PipelineState::Rectifying => self.rectify(frame, preview),
            PipelineState::Solving | PipelineState::Aborted => {}
        }
        self.frames_processed += 1;
    }

    fn acquire(&mut self, frame: &Frame, preview: &mut dyn PreviewSink) {
        match self.detector.detect(frame) {
            DetectOutcome::NotFound => {
                debug!("no chessboard found, keep searching");
                preview.show(PreviewFrame::Acquiring {
                    frame,
                    corners: None,
                    accepted: false,
                });
            }
            DetectOutcome::Found(obs) => {
                let corners = obs.image_points().to_vec();
                let offer = self.accumulator.offer(obs, frame.timestamp);
                let accepted = offer == Offer::Accepted;
                if accepted {
                    self.image_size = frame.size();
                    self.observations = self.accumulator.len();
                } else {
                    debug!("observation at {:.3}s rejected: {offer:?}", frame.timestamp);
                }
                preview.show(PreviewFrame::Acquiring {
                    frame,
                    corners: Some(&corners),
                    accepted,
                });
                if self.accumulator.is_full() {
                    self.transition(PipelineState::Solving, preview);
                }
            }
        }
    }

    fn rectify(&mut self, frame: &Frame, preview: &mut dyn PreviewSink) {
        if let Some(map) = &self.map {
            let out = map.apply(frame);
            preview.show(PreviewFrame::Rectified { frame: &out });
        }
    }

    /// Run the solve, persist the result and enter `Rectifying`, or abort.
    pub fn solve(&mut self, preview: &mut dyn PreviewSink) {
        if self.state != PipelineState::Solving {
            return;
        }
        let params = match self.solver.solve(&self.accumulator, self.image_size) {
            Ok(p) => p,
            Err(e) => return self.abort(e.into(), preview),
        };
        if let Err(e) = save_parameters(&params, &self.params_path) {
            return self.abort(e.into(), preview);
        }
        info!("wrote {}", self.params_path.display());
        self.transition(PipelineState::Rectifying, preview);
        self.enter_rectifying(preview);
    }

    /// Rectification always works from the stored document.
    fn enter_rectifying(&mut self, preview: &mut dyn PreviewSink) {
        let loaded = match load_parameters(&self.params_path) {
            Ok(p) => p,
            Err(e) => return self.abort(e.into(), preview),
        };
        let (w, h) = loaded.image_size;
        info!("reloaded parameters: image {w}x{h}");
        info!("camera_matrix: {:.6}", loaded.camera_matrix);
        info!("distortion_coefficients: {:?}", loaded.distortion.to_array());
        self.map = Some(RectificationMap::build(&loaded, self.border_value));
        self.params = Some(loaded);
    }

    /// Stream ended or the user cancelled.
    fn finish(&mut self, cancelled: bool, preview: &mut dyn PreviewSink) {
        match self.state {
            PipelineState::Acquiring => {
                let reason = if cancelled {
                    PipelineError::Cancelled
                } else {
                    PipelineError::SourceExhausted {
                        collected: self.accumulator.len(),
                        target: self.accumulator.target_count(),
                    }
                };
                self.abort(reason, preview);
            }
            PipelineState::Rectifying => {
                info!(
                    "rectification ended ({})",
                    if cancelled { "cancelled" } else { "end of stream" }
                );
                self.map = None;
            }
            PipelineState::Solving | PipelineState::Aborted => {}
        }
    }

    /// Pull frames until the stream ends, the user cancels, or the run aborts.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        preview: &mut dyn PreviewSink,
    ) -> RunOutcome {
        let mut failures = 0;
        loop {
            match self.state {
                PipelineState::Solving => {
                    self.solve(preview);
                    continue;
                }
                PipelineState::Aborted => break,
                PipelineState::Acquiring | PipelineState::Rectifying => {}
            }
            if self.cancel.is_cancelled() {
                self.finish(true, preview);
                break;
            }
            match source.next_frame() {
                Ok(Some(frame)) => {
                    failures = 0;
                    self.process_frame(&frame, preview);
                }
                Ok(None) => {
                    self.finish(false, preview);
                    break;
                }
                Err(e) => {
                    failures += 1;
                    warn!("{e} ({failures} in a row)");
                    if failures > self.max_read_failures {
                        self.finish(false, preview);
                        break;
                    }
                }
            }
        }
        self.outcome()
    }

    fn outcome(&mut self) -> RunOutcome {
        RunOutcome {
            final_state: self.state,
            frames_processed: self.frames_processed,
            observations: self.observations,
            params: self.params.clone(),
            abort_reason: self.abort_reason.take(),
        }
    }
}
