use thiserror::Error;

/// Result type for gamma comparison operations
pub type Result<T> = std::result::Result<T, GammaError>;

/// Failures that prevent a comparison from being computed at all.
///
/// Per-point anomalies (out-of-bounds compare data, masked voxels, a zero
/// normalization dose) are never reported here; they end up in the
/// [`GammaResult`](crate::GammaResult) instead.
#[derive(Debug, Error)]
pub enum GammaError {
    #[error("Invalid tolerance {name}: {value}")]
    InvalidTolerance { name: &'static str, value: f64 },

    #[error("Invalid grid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Dose field expects {expected} values, got {actual}")]
    ValueCountMismatch { expected: usize, actual: usize },

    #[error("Mask dimensions do not match the dose grid")]
    MaskShapeMismatch,

    #[error("Direction matrix is singular")]
    SingularDirection,

    #[error("Invalid DVH curve: {0}")]
    InvalidCurve(String),

    #[error("DVH curve has no bins")]
    EmptyCurve,

    #[error("Invalid normalization {name}: {value}")]
    InvalidNormalization { name: &'static str, value: f64 },

    #[error("Slice index {index} out of range for {orientation:?}")]
    SliceOutOfRange {
        index: usize,
        orientation: crate::enums::Orientation,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
