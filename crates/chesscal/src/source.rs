//! Frame sources: live capture through an `ffmpeg` child process, or
//! offline replay of an image directory.

use crate::Frame;
use image::GrayImage;
use log::{debug, info};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("cannot open frame source {name}: {reason}")]
    Open { name: String, reason: String },

    #[error("frame read failed: {0}")]
    Read(String),
}

/// Ordered, possibly lossy sequence of frames.
///
/// `Ok(None)` is end of stream; `Err` is a transient read failure after
/// which the caller may keep reading.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        (**self).next_frame()
    }
}

/// Where an `ffmpeg` capture reads from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamInput {
    /// Local video device by index (`/dev/video<N>` through v4l2).
    Device(u32),
    /// Network stream, e.g. `rtsp://host/stream`.
    Url(String),
}

impl StreamInput {
    fn ffmpeg_args(&self) -> Vec<String> {
        match self {
            StreamInput::Device(index) => vec![
                "-f".into(),
                "v4l2".into(),
                "-i".into(),
                format!("/dev/video{index}"),
            ],
            StreamInput::Url(url) if url.starts_with("rtsp://") => vec![
                "-rtsp_transport".into(),
                "tcp".into(),
                "-i".into(),
                url.clone(),
            ],
            StreamInput::Url(url) => vec!["-i".into(), url.clone()],
        }
    }

    fn name(&self) -> String {
        match self {
            StreamInput::Device(index) => format!("device {index}"),
            StreamInput::Url(url) => url.clone(),
        }
    }
}

/// Frames in stream FPS measurement window.
const FPS_WINDOW: usize = 30;

/// Live frames decoded by `ffmpeg` to raw 8-bit gray at a fixed size.
///
/// Timestamps are arrival times: seconds since the first frame was read off
/// the pipe, not capture times. Frames that queue in the pipe while the
/// consumer is busy come out with compressed spacing, so debouncing on them
/// errs towards rejecting.
pub struct FfmpegSource {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    started: Instant,
    pending: Option<Frame>,
    frames: usize,
}

impl FfmpegSource {
    /// Spawn `ffmpeg` and wait for the first frame.
    ///
    /// Fails if the binary cannot be started or the input yields nothing.
    pub fn open(input: &StreamInput, width: u32, height: u32) -> Result<Self, SourceError> {
        let open_err = |reason: String| SourceError::Open {
            name: input.name(),
            reason,
        };
        if width == 0 || height == 0 {
            return Err(open_err(format!("invalid frame size {width}x{height}")));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(input.ffmpeg_args())
            .args(["-f", "rawvideo", "-pix_fmt", "gray", "-vf"])
            .arg(format!("scale={width}:{height}"))
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        debug!("spawning {cmd:?}");
        let mut child = cmd
            .spawn()
            .map_err(|e| open_err(format!("failed to start ffmpeg: {e}")))?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(open_err("ffmpeg stdout unavailable".to_string()));
        };

        let mut source = Self {
            child,
            stdout,
            width,
            height,
            started: Instant::now(),
            pending: None,
            frames: 0,
        };
        match source.read_frame() {
            Ok(Some(first)) => {
                info!("opened {} at {width}x{height}", input.name());
                source.pending = Some(first);
                Ok(source)
            }
            Ok(None) => Err(open_err("stream produced no frames".to_string())),
            Err(e) => Err(open_err(e.to_string())),
        }
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut buf = vec![0u8; self.width as usize * self.height as usize];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(SourceError::Read(e.to_string())),
        }
        if self.frames == 0 {
            self.started = Instant::now();
        }
        // Arrival time; ffmpeg does not pass capture timestamps over rawvideo.
        let timestamp = self.started.elapsed().as_secs_f64();
        self.frames += 1;
        if self.frames == FPS_WINDOW && timestamp > 0.0 {
            info!("stream rate {:.1} fps", (FPS_WINDOW - 1) as f64 / timestamp);
        }
        let image = GrayImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| SourceError::Read("frame buffer size mismatch".to_string()))?;
        Ok(Some(Frame::new(image, timestamp)))
    }
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if let Some(first) = self.pending.take() {
            return Ok(Some(first));
        }
        self.read_frame()
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff", "pgm"];

/// Sorted image files replayed at a fixed synthetic frame interval.
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
    frame_interval: f64,
}

impl ImageDirSource {
    pub fn open(dir: impl AsRef<Path>, frame_interval: f64) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let open_err = |reason: String| SourceError::Open {
            name: dir.display().to_string(),
            reason,
        };
        let entries = std::fs::read_dir(dir).map_err(|e| open_err(e.to_string()))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(open_err("no image files".to_string()));
        }
        info!("replaying {} images from {}", files.len(), dir.display());
        Ok(Self {
            files,
            next: 0,
            frame_interval,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let timestamp = self.next as f64 * self.frame_interval;
        self.next += 1;
        let image = image::open(path)
            .map_err(|e| SourceError::Read(format!("{}: {e}", path.display())))?
            .to_luma8();
        Ok(Some(Frame::new(image, timestamp)))
    }
}
