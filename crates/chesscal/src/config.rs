//! Run configuration, loadable from JSON and validated once at startup.

use chesscal_calib::SolveOptions;
use chesscal_core::{GridSpec, GridSpecError};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Grid(#[from] GridSpecError),
    #[error("target_count must be at least 1")]
    TargetCount,
    #[error("scale_factor must be in (0, 1], got {0}")]
    ScaleFactor(f32),
    #[error("min_interval_secs must be a non-negative number, got {0}")]
    MinInterval(f64),
    #[error("frame size must be positive, got {width}x{height}")]
    FrameSize { width: u32, height: u32 },
    #[error("frame_interval_secs must be positive, got {0}")]
    FrameInterval(f64),
}

fn default_frame_width() -> u32 {
    640
}

fn default_frame_height() -> u32 {
    480
}

fn default_frame_interval() -> f64 {
    1.0 / 30.0
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Local capture device by index.
    Device {
        index: u32,
        #[serde(default = "default_frame_width")]
        width: u32,
        #[serde(default = "default_frame_height")]
        height: u32,
    },
    /// Network stream URL.
    Url {
        url: String,
        #[serde(default = "default_frame_width")]
        width: u32,
        #[serde(default = "default_frame_height")]
        height: u32,
    },
    /// Directory of still images replayed in name order.
    Images {
        dir: PathBuf,
        #[serde(default = "default_frame_interval")]
        frame_interval_secs: f64,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Device {
            index: 0,
            width: default_frame_width(),
            height: default_frame_height(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Interior corners per row.
    pub grid_width: u32,
    /// Interior corners per column.
    pub grid_height: u32,
    /// Observations to collect before solving.
    pub target_count: usize,
    /// Downscale applied before pattern detection.
    pub scale_factor: f32,
    /// Minimum time between accepted observations, seconds.
    pub min_interval_secs: f64,
    pub source: SourceConfig,
    /// Directory for preview PNGs; no preview when unset.
    pub preview_dir: Option<PathBuf>,
    pub params_path: PathBuf,
    /// Consecutive read failures tolerated before the stream counts as ended.
    pub max_read_failures: usize,
    /// Fill value for pixels the undistortion maps outside the frame.
    pub border_value: u8,
    pub solve: SolveOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid_width: 9,
            grid_height: 6,
            target_count: 10,
            scale_factor: 0.5,
            min_interval_secs: 1.0,
            source: SourceConfig::default(),
            preview_dir: None,
            params_path: PathBuf::from("intrinsics.json"),
            max_read_failures: 30,
            border_value: 0,
            solve: SolveOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config from disk; missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn grid(&self) -> Result<GridSpec, GridSpecError> {
        GridSpec::new(self.grid_width, self.grid_height)
    }

    /// Check every option; the returned grid is the validated board layout.
    pub fn validate(&self) -> Result<GridSpec, ConfigError> {
        let grid = self.grid()?;
        if self.target_count == 0 {
            return Err(ConfigError::TargetCount);
        }
        if !(self.scale_factor > 0.0 && self.scale_factor <= 1.0) {
            return Err(ConfigError::ScaleFactor(self.scale_factor));
        }
        if !(self.min_interval_secs >= 0.0 && self.min_interval_secs.is_finite()) {
            return Err(ConfigError::MinInterval(self.min_interval_secs));
        }
        match &self.source {
            SourceConfig::Device { width, height, .. } | SourceConfig::Url { width, height, .. } => {
                if *width == 0 || *height == 0 {
                    return Err(ConfigError::FrameSize {
                        width: *width,
                        height: *height,
                    });
                }
            }
            SourceConfig::Images {
                frame_interval_secs,
                ..
            } => {
                if !(*frame_interval_secs > 0.0 && frame_interval_secs.is_finite()) {
                    return Err(ConfigError::FrameInterval(*frame_interval_secs));
                }
            }
        }
        Ok(grid)
    }
}
