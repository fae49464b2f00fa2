#![allow(dead_code)]

use chesscal::core::{project, CameraIntrinsics, Distortion, GridSpec};
use chesscal::{
    Frame, FrameSource, PatternDetector, PipelineState, PreviewFrame, PreviewSink, SourceError,
};
use image::GrayImage;
use nalgebra::{Isometry3, Point2, Point3, Translation3, UnitQuaternion, Vector3};
use std::collections::VecDeque;

pub const IMAGE_SIZE: (u32, u32) = (640, 480);

/// Returns scripted corner sets, one per call; `None` once exhausted.
pub struct ScriptedDetector {
    script: VecDeque<Option<Vec<Point2<f32>>>>,
}

impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = Option<Vec<Point2<f32>>>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl PatternDetector for ScriptedDetector {
    fn find_corners(&mut self, _: &GrayImage, _: GridSpec) -> Option<Vec<Point2<f32>>> {
        self.script.pop_front().flatten()
    }
}

/// Frames (or read failures) in order, then end of stream.
pub struct ScriptedSource {
    items: VecDeque<Result<Frame, String>>,
    pub reads: usize,
}

impl ScriptedSource {
    pub fn frames(timestamps: impl IntoIterator<Item = f64>) -> Self {
        Self::new(timestamps.into_iter().map(|t| Ok(blank_frame(t))))
    }

    pub fn new(items: impl IntoIterator<Item = Result<Frame, String>>) -> Self {
        Self {
            items: items.into_iter().collect(),
            reads: 0,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        self.reads += 1;
        match self.items.pop_front() {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(reason)) => Err(SourceError::Read(reason)),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct RecordingPreview {
    pub transitions: Vec<(PipelineState, PipelineState)>,
    pub acquiring: usize,
    pub accepted: usize,
    pub rectified: Vec<Frame>,
}

impl PreviewSink for RecordingPreview {
    fn show(&mut self, view: PreviewFrame<'_>) {
        match view {
            PreviewFrame::Acquiring { accepted, .. } => {
                self.acquiring += 1;
                if accepted {
                    self.accepted += 1;
                }
            }
            PreviewFrame::Rectified { frame } => self.rectified.push(frame.clone()),
        }
    }

    fn on_transition(&mut self, from: PipelineState, to: PipelineState) {
        self.transitions.push((from, to));
    }
}

pub fn blank_frame(timestamp: f64) -> Frame {
    Frame::new(GrayImage::new(IMAGE_SIZE.0, IMAGE_SIZE.1), timestamp)
}

pub fn grid() -> GridSpec {
    GridSpec::new(9, 6).unwrap()
}

pub fn truth() -> (CameraIntrinsics, Distortion) {
    (
        CameraIntrinsics {
            fx: 610.0,
            fy: 605.0,
            cx: 319.5,
            cy: 239.5,
        },
        Distortion {
            k1: -0.08,
            k2: 0.02,
            ..Distortion::default()
        },
    )
}

fn pose(r: [f64; 3], c: [f64; 3]) -> Isometry3<f64> {
    let center = Vector3::new(2.5, 4.0, 0.0);
    let rot = UnitQuaternion::from_scaled_axis(Vector3::new(r[0], r[1], r[2]));
    let t = Vector3::new(c[0], c[1], c[2]) - rot * center;
    Isometry3::from_parts(Translation3::from(t), rot)
}

pub fn poses() -> Vec<Isometry3<f64>> {
    vec![
        pose([0.20, -0.10, 0.05], [0.0, 0.0, 16.0]),
        pose([-0.25, 0.15, 0.00], [1.0, -0.5, 15.0]),
        pose([0.10, 0.30, -0.10], [-1.0, 0.5, 17.0]),
        pose([0.30, 0.25, 0.10], [0.5, 1.0, 18.0]),
        pose([-0.20, -0.30, 0.05], [-0.5, -1.0, 14.0]),
    ]
}

/// Row-major corners of the board at `pose`, as a detector would report them.
pub fn board_corners(pose: &Isometry3<f64>) -> Vec<Point2<f32>> {
    let (k, d) = truth();
    grid()
        .reference_points()
        .iter()
        .map(|p| {
            let pc = pose * Point3::new(p.x as f64, p.y as f64, 0.0);
            let px = project(&k, &d, &pc).unwrap();
            Point2::new(px.x as f32, px.y as f32)
        })
        .collect()
}
