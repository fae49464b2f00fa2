/// Errors produced by the planar calibration solver.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibError {
    #[error("need at least {need} views for calibration, got {got}")]
    NotEnoughViews { got: usize, need: usize },

    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },

    #[error("view {view}: point counts differ (image={image}, reference={reference})")]
    MismatchedPoints {
        view: usize,
        image: usize,
        reference: usize,
    },

    #[error("view {view}: plane homography estimation failed")]
    HomographyFailed { view: usize },

    #[error("views do not constrain the intrinsics (too little pose diversity)")]
    DegenerateViews,

    #[error("focal length initialisation failed (1/fx^2={a:.3e}, 1/fy^2={b:.3e})")]
    FocalInitFailed { a: f64, b: f64 },

    #[error("refinement did not converge: {reason}")]
    DidNotConverge { reason: String },
}
