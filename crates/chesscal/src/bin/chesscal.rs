use chesscal::{
    open_source, CancelToken, ChessCornersDetector, Controller, NoPreview, PipelineConfig,
    PlanarEstimator, PngPreview, PreviewSink, SourceConfig,
};
use clap::Parser;
use log::{error, info, LevelFilter};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

const EXIT_ABORTED: u8 = 1;
const EXIT_STARTUP: u8 = 2;

/// Calibrate a camera from chessboard views, then undistort its stream.
///
/// Type `q` (or ESC) and Enter to stop.
#[derive(Parser, Debug)]
#[command(name = "chesscal", version, about)]
struct Cli {
    /// JSON run configuration; flags override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interior corners per chessboard row.
    #[arg(long)]
    grid_width: Option<u32>,

    /// Interior corners per chessboard column.
    #[arg(long)]
    grid_height: Option<u32>,

    /// Observations to collect before solving.
    #[arg(long)]
    target_count: Option<usize>,

    /// Downscale factor applied before detection, in (0, 1].
    #[arg(long)]
    scale_factor: Option<f32>,

    /// Minimum seconds between accepted observations.
    #[arg(long)]
    min_interval: Option<f64>,

    /// Capture from a local video device.
    #[arg(long, conflicts_with_all = ["url", "images"])]
    device: Option<u32>,

    /// Capture from a network stream, e.g. rtsp://host/stream.
    #[arg(long, conflicts_with = "images")]
    url: Option<String>,

    /// Replay a directory of images instead of capturing.
    #[arg(long)]
    images: Option<PathBuf>,

    /// Capture width for device and stream sources.
    #[arg(long)]
    frame_width: Option<u32>,

    /// Capture height for device and stream sources.
    #[arg(long)]
    frame_height: Option<u32>,

    /// Seconds between replayed images.
    #[arg(long)]
    frame_interval: Option<f64>,

    /// Write preview PNGs into this directory.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Where the calibration document is written.
    #[arg(long)]
    params: Option<PathBuf>,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors.
    #[arg(short, long)]
    quiet: bool,

    /// Emit JSON `tracing` events instead of plain log lines.
    #[cfg(feature = "tracing")]
    #[arg(long)]
    json_log: bool,
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Warn;
        }
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn into_config(self) -> Result<PipelineConfig, chesscal::ConfigError> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::load_json(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(v) = self.grid_width {
            cfg.grid_width = v;
        }
        if let Some(v) = self.grid_height {
            cfg.grid_height = v;
        }
        if let Some(v) = self.target_count {
            cfg.target_count = v;
        }
        if let Some(v) = self.scale_factor {
            cfg.scale_factor = v;
        }
        if let Some(v) = self.min_interval {
            cfg.min_interval_secs = v;
        }
        if let Some(v) = self.preview {
            cfg.preview_dir = Some(v);
        }
        if let Some(v) = self.params {
            cfg.params_path = v;
        }

        let (width, height) = match &cfg.source {
            SourceConfig::Device { width, height, .. } | SourceConfig::Url { width, height, .. } => {
                (*width, *height)
            }
            SourceConfig::Images { .. } => (640, 480),
        };
        let width = self.frame_width.unwrap_or(width);
        let height = self.frame_height.unwrap_or(height);
        if let Some(index) = self.device {
            cfg.source = SourceConfig::Device {
                index,
                width,
                height,
            };
        } else if let Some(url) = self.url {
            cfg.source = SourceConfig::Url { url, width, height };
        } else if let Some(dir) = self.images {
            cfg.source = SourceConfig::Images {
                dir,
                frame_interval_secs: self.frame_interval.unwrap_or(1.0 / 30.0),
            };
        }
        match &mut cfg.source {
            SourceConfig::Device {
                width: w,
                height: h,
                ..
            }
            | SourceConfig::Url {
                width: w,
                height: h,
                ..
            } => {
                *w = width;
                *h = height;
            }
            SourceConfig::Images {
                frame_interval_secs,
                ..
            } => {
                if let Some(v) = self.frame_interval {
                    *frame_interval_secs = v;
                }
            }
        }
        Ok(cfg)
    }
}

/// Cancel on a `q` or ESC line from stdin. EOF leaves the run alone.
fn spawn_cancel_listener(token: CancelToken) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.eq_ignore_ascii_case("q") || line.contains('\u{1b}') {
                info!("stop requested");
                token.cancel();
                break;
            }
        }
    });
}

fn init_logging(cli: &Cli) {
    #[cfg(feature = "tracing")]
    if cli.json_log {
        chesscal::core::init_tracing(true);
        return;
    }
    let _ = chesscal::core::init_with_level(cli.log_level());
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match cli.into_config() {
        Ok(c) => c,
        Err(e) => {
            error!("invalid configuration: {e}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let cancel = CancelToken::new();
    let mut controller = match Controller::new(
        &config,
        ChessCornersDetector::default(),
        PlanarEstimator {
            solve: config.solve.clone(),
        },
        cancel.clone(),
    ) {
        Ok(c) => c,
        Err(e) => {
            error!("invalid configuration: {e}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let mut source = match open_source(&config.source) {
        Ok(s) => s,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let mut preview: Box<dyn PreviewSink> = match &config.preview_dir {
        Some(dir) => match PngPreview::new(dir) {
            Ok(p) => Box::new(p),
            Err(e) => {
                error!("cannot create preview directory {}: {e}", dir.display());
                return ExitCode::from(EXIT_STARTUP);
            }
        },
        None => Box::new(NoPreview),
    };

    spawn_cancel_listener(cancel);
    info!(
        "calibrating a {}x{} chessboard, {} observations",
        config.grid_width, config.grid_height, config.target_count
    );
    let outcome = controller.run(&mut source, preview.as_mut());
    info!(
        "{} frames processed, final state {:?}",
        outcome.frames_processed, outcome.final_state
    );

    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        if let Some(reason) = &outcome.abort_reason {
            error!("{reason}");
        }
        ExitCode::from(EXIT_ABORTED)
    }
}
