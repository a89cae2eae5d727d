use thiserror::Error;

/// Typed error hierarchy for intelparser.
///
/// Use at module boundaries (archive handling, sink writes, config
/// validation). Internal/leaf functions can continue using
/// `anyhow::Result` — the `Internal` variant allows seamless conversion
/// via the `?` operator.
#[derive(Debug, Error)]
pub enum IntelparserError {
    #[error("archive has no Info.csv manifest")]
    ManifestMissing,

    #[error("file rejected: unsupported binary content")]
    UnsupportedBinary,

    #[error("file rejected: exceeds max target size")]
    TooLarge,

    #[error("permission denied reading {0}")]
    PermissionDenied(String),

    #[error("rule post-processor rejected finding: {0}")]
    DecodeFailed(String),

    #[error("insufficient free disk space to extract archive")]
    NoSpace,

    #[error("sink write failed: {sink}: {message}")]
    SinkWriteFailed { sink: String, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `IntelparserError`.
pub type IntelparserResult<T> = std::result::Result<T, IntelparserError>;

impl IntelparserError {
    /// Whether the run as a whole should continue after this error.
    ///
    /// Per-file and per-sink errors never stop the pool; archive-level
    /// and configuration errors abort that unit of work but not the run;
    /// only cancellation is fatal for the whole process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the file this error applies to should be counted as
    /// skipped (not errored) in the run summary.
    pub fn is_skip_not_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedBinary | Self::TooLarge | Self::PermissionDenied(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_fatal() {
        assert!(IntelparserError::Cancelled.is_fatal());
        assert!(!IntelparserError::TooLarge.is_fatal());
    }

    #[test]
    fn binary_and_size_are_skips() {
        assert!(IntelparserError::UnsupportedBinary.is_skip_not_error());
        assert!(IntelparserError::TooLarge.is_skip_not_error());
        assert!(!IntelparserError::NoSpace.is_skip_not_error());
    }

    #[test]
    fn internal_from_anyhow() {
        let err: IntelparserError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, IntelparserError::Internal(_)));
    }

    #[test]
    fn sink_write_failed_display() {
        let err = IntelparserError::SinkWriteFailed {
            sink: "jsonl".into(),
            message: "disk full".into(),
        };
        assert_eq!(err.to_string(), "sink write failed: jsonl: disk full");
    }
}
