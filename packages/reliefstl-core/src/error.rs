use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GenerateError>;

/// Failure modes of STL generation and job orchestration.
#[derive(Error, Debug)]
pub enum GenerateError {
    /// Request parameters out of range, malformed bbox or outline.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// A terrain/building/road source exhausted its retries or returned
    /// nothing usable for a valid bbox.
    #[error("{component} fetch failed: {message}")]
    FetchFailed {
        component: &'static str,
        message: String,
    },

    /// Elevation grid carries no finite sample.
    #[error("elevation grid contains no data")]
    NoData,

    /// Final mesh exceeded the hard boundary-edge threshold.
    #[error("mesh integrity too low (boundary edges={boundary_edges})")]
    IntegrityTooLow { boundary_edges: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl GenerateError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::InputInvalid(msg.into())
    }

    pub fn fetch(component: &'static str, msg: impl Into<String>) -> Self {
        Self::FetchFailed {
            component,
            message: msg.into(),
        }
    }
}
