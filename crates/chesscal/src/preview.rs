//! Optional debug preview. Sinks only observe; nothing they do feeds back
//! into the pipeline.

use crate::pipeline::PipelineState;
use crate::Frame;
use image::{GrayImage, Luma};
use log::{info, warn};
use nalgebra::Point2;
use std::path::PathBuf;

/// What the controller shows for one processed frame.
#[derive(Clone, Copy, Debug)]
pub enum PreviewFrame<'a> {
    /// A raw frame during acquisition, with the detected corners (if any)
    /// and whether the observation was accepted.
    Acquiring {
        frame: &'a Frame,
        corners: Option<&'a [Point2<f32>]>,
        accepted: bool,
    },
    /// An undistorted frame.
    Rectified { frame: &'a Frame },
}

pub trait PreviewSink {
    fn show(&mut self, view: PreviewFrame<'_>);

    fn on_transition(&mut self, _from: PipelineState, _to: PipelineState) {}
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPreview;

impl PreviewSink for NoPreview {
    fn show(&mut self, _view: PreviewFrame<'_>) {}
}

/// Writes numbered PNGs into a directory.
///
/// Detected corners are drawn as crosses; accepted frames are inverted.
pub struct PngPreview {
    dir: PathBuf,
    counter: usize,
}

impl PngPreview {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, counter: 0 })
    }

    fn write(&mut self, tag: &str, image: &GrayImage) {
        let path = self.dir.join(format!("{:06}_{tag}.png", self.counter));
        self.counter += 1;
        if let Err(e) = image.save(&path) {
            warn!("preview write to {} failed: {e}", path.display());
        }
    }
}

impl PreviewSink for PngPreview {
    fn show(&mut self, view: PreviewFrame<'_>) {
        match view {
            PreviewFrame::Acquiring {
                frame,
                corners,
                accepted,
            } => {
                let mut img = annotate(&frame.image, corners.unwrap_or(&[]));
                if accepted {
                    image::imageops::invert(&mut img);
                }
                let tag = match (corners.is_some(), accepted) {
                    (_, true) => "accepted",
                    (true, false) => "found",
                    (false, false) => "search",
                };
                self.write(tag, &img);
            }
            PreviewFrame::Rectified { frame } => self.write("rectified", &frame.image),
        }
    }

    fn on_transition(&mut self, from: PipelineState, to: PipelineState) {
        info!("preview: {from:?} -> {to:?}");
    }
}

const CROSS_HALF: i64 = 3;

/// Copy of `image` with a cross at every corner, black on bright pixels and
/// white on dark ones.
pub fn annotate(image: &GrayImage, corners: &[Point2<f32>]) -> GrayImage {
    let mut out = image.clone();
    let (w, h) = (image.width() as i64, image.height() as i64);
    for p in corners {
        let (cx, cy) = (p.x.round() as i64, p.y.round() as i64);
        for d in -CROSS_HALF..=CROSS_HALF {
            for (x, y) in [(cx + d, cy), (cx, cy + d)] {
                if x >= 0 && y >= 0 && x < w && y < h {
                    let px = out.get_pixel_mut(x as u32, y as u32);
                    *px = Luma([if px[0] >= 128 { 0 } else { 255 }]);
                }
            }
        }
    }
    out
}
