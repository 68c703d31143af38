use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all hoist operations.
#[derive(Debug, Error, Diagnostic)]
pub enum HoistError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Descriptor or artifact absent on every configured repository.
    #[error("{subject} not found in any repository")]
    NotFound { subject: String },

    /// Offline policy was in effect and the file is not cached.
    #[error("not in cache: {url}")]
    #[diagnostic(help("Re-run without the offline cache mode to allow downloads"))]
    NotInCache { url: String },

    /// A verified checksum disagreed with the downloaded bytes.
    #[error("{algorithm} mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        algorithm: String,
        expected: String,
        actual: String,
    },

    /// Network failure that exhausted the retry budget.
    #[error("download of {url} failed: {message}")]
    Transport { url: String, message: String },

    /// 401/403 after exhausting credential candidates.
    #[error("unauthorized: HTTP {status} for {url}")]
    #[diagnostic(help("Check the credentials configured for this host"))]
    Unauthorized { url: String, status: u16 },

    /// Malformed descriptor, with the byte offset of the failure.
    #[error("parse error at byte {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// `${...}` substitution chased its own tail.
    #[error("property cycle while expanding ${{{property}}}")]
    PropertyCycle { property: String },

    /// Parent chain exceeded the depth limit or revisited a coordinate.
    #[error("parent cycle detected at {coordinate}")]
    ParentCycle { coordinate: String },

    /// The resolution loop failed to reach a fixed point.
    #[error("resolution did not converge after {limit} iterations")]
    MaxIterations { limit: usize },

    /// Strict reconciliation found more than one candidate version.
    #[error("version conflict for {module}: {versions:?}")]
    VersionConflict {
        module: String,
        versions: Vec<String>,
    },

    /// The operation was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,

    /// `latest`/`release` requested but no version listing was available.
    #[error("cannot determine a version for {module}: no version listing")]
    UnknownVersion { module: String },

    /// Invalid configuration (env var, policy token, credentials file).
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

impl HoistError {
    /// Whether this error must abort a whole resolution rather than a
    /// single coordinate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HoistError::MaxIterations { .. }
                | HoistError::ParentCycle { .. }
                | HoistError::PropertyCycle { .. }
                | HoistError::VersionConflict { .. }
        )
    }
}

/// Convenience alias for `miette::Result<T>`.
pub type HoistResult<T> = miette::Result<T>;
