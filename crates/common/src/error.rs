//! Error types shared across Clipforge crates.

use std::fmt;

/// An error reported by an external media collaborator (demuxer, muxer,
/// decoder, encoder).
///
/// Collaborators keep the last error they hit and hand out clones, so the
/// same value can reach both the status query path and the completion hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{domain} error {code}: {message}")]
pub struct MediaError {
    /// Subsystem that raised the error (`"demuxer"`, `"muxer"`, ...).
    pub domain: String,
    /// Collaborator-specific error code.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl MediaError {
    pub fn new(domain: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            code,
            message: message.into(),
        }
    }

    pub fn demuxer(message: impl Into<String>) -> Self {
        Self::new("demuxer", -1, message)
    }

    pub fn muxer(message: impl Into<String>) -> Self {
        Self::new("muxer", -1, message)
    }
}

/// Closed classification of export failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request is incomplete or invalid; nothing was constructed.
    Configuration,
    /// The demuxer or muxer rejected a track or its settings.
    Setup,
    /// The demuxer or muxer could not begin reading/writing.
    Start,
    /// A pump failed mid-stream.
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Setup => "setup",
            ErrorKind::Start => "start",
            ErrorKind::Runtime => "runtime",
        };
        f.write_str(label)
    }
}

/// Top-level error type for export operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExportError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Setup error: {message}")]
    Setup {
        message: String,
        #[source]
        cause: Option<MediaError>,
    },

    #[error("Start error: {message}")]
    Start {
        message: String,
        #[source]
        cause: Option<MediaError>,
    },

    #[error("Runtime error: {message}")]
    Runtime {
        message: String,
        #[source]
        cause: Option<MediaError>,
    },
}

/// Result type alias using ExportError.
pub type ExportResult<T> = Result<T, ExportError>;

impl ExportError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    pub fn setup(msg: impl Into<String>, cause: Option<MediaError>) -> Self {
        Self::Setup {
            message: msg.into(),
            cause,
        }
    }

    pub fn start(msg: impl Into<String>, cause: Option<MediaError>) -> Self {
        Self::Start {
            message: msg.into(),
            cause,
        }
    }

    pub fn runtime(msg: impl Into<String>, cause: Option<MediaError>) -> Self {
        Self::Runtime {
            message: msg.into(),
            cause,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::Configuration { .. } => ErrorKind::Configuration,
            ExportError::Setup { .. } => ErrorKind::Setup,
            ExportError::Start { .. } => ErrorKind::Start,
            ExportError::Runtime { .. } => ErrorKind::Runtime,
        }
    }

    /// The collaborator error behind this failure, if any.
    pub fn cause(&self) -> Option<&MediaError> {
        match self {
            ExportError::Configuration { .. } => None,
            ExportError::Setup { cause, .. }
            | ExportError::Start { cause, .. }
            | ExportError::Runtime { cause, .. } => cause.as_ref(),
        }
    }
}

/// Errors raised while loading or saving configuration files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(
            ExportError::configuration("missing width").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(ExportError::setup("x", None).kind(), ErrorKind::Setup);
        assert_eq!(ExportError::start("x", None).kind(), ErrorKind::Start);
        assert_eq!(ExportError::runtime("x", None).kind(), ErrorKind::Runtime);
    }

    #[test]
    fn test_cause_is_exposed_as_source() {
        let cause = MediaError::muxer("disk full");
        let err = ExportError::start("muxer could not begin writing", Some(cause.clone()));
        assert_eq!(err.cause(), Some(&cause));
        let source = err.source().expect("source should be set");
        assert_eq!(source.to_string(), "muxer error -1: disk full");
    }

    #[test]
    fn test_configuration_has_no_cause() {
        let err = ExportError::configuration("no output location");
        assert!(err.cause().is_none());
        assert_eq!(err.to_string(), "Configuration error: no output location");
    }
}
