use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes of the renderer.
///
/// Per-splat conditions (behind the camera, outside the frustum,
/// numerically degenerate) are not errors; they are counted and the
/// splat is dropped. These variants cover the boundaries where a caller
/// has to react.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("arena exhausted while allocating {what} ({requested} bytes)")]
    Allocation { what: &'static str, requested: usize },

    #[error("numerical instability: {0}")]
    NumericalInstability(&'static str),

    #[error("coprocessor batch exceeded its time budget ({elapsed_us} us > {budget_us} us)")]
    BatchTimeout { elapsed_us: u64, budget_us: u64 },

    #[error("asset format: {0}")]
    AssetFormat(FormatError),

    #[error("resource exhausted: {0}")]
    ResourceExhaustion(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Rejection reasons for the splat container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),
    #[error("unsupported version {0}")]
    BadVersion(u32),
    #[error("splat count {0} out of range 1..=65536")]
    BadCount(u32),
    #[error("file truncated: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Error {
        Error::AssetFormat(e)
    }
}
