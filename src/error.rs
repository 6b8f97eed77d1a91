/*!
 * Error handling for the MRF ingestion core.
 *
 * The taxonomy mirrors how the pipeline can fail: a source whose suffix
 * is not a recognizable MRF payload, a remote open that exhausted its
 * retries, a local file that is missing or unreadable, and a hash
 * request over a record with no fields. Variants carry enough context to
 * diagnose a failed job from its log line alone, plus a suggestion
 * string where recovery guidance exists.
 */

use std::path::PathBuf;
use thiserror::Error;

/// MRF library result type
pub type Result<T> = std::result::Result<T, MrfError>;

/// Error types for streaming, filtering, hashing, and orchestration
#[derive(Error, Debug)]
pub enum MrfError {
    /// Source suffix does not resolve to `.json` or `.json.gz`
    #[error("unsupported source suffix '{suffix}' for '{location}'")]
    Format {
        location: String,
        suffix: String,
    },

    /// Remote stream could not be opened after exhausting retries
    #[error("connection to '{url}' failed after {attempts} attempt(s): {message}")]
    Connection {
        url: String,
        attempts: u32,
        message: String,
        suggestion: Option<String>,
    },

    /// Local file missing with guidance
    #[error("file not found: {path}")]
    FileNotFound {
        path: PathBuf,
        suggestion: String,
    },

    /// File I/O errors with context
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// A filter file that could not be parsed at all
    #[error("CSV parsing error at line {line:?}: {message}")]
    CsvParse {
        message: String,
        line: Option<u64>,
    },

    /// Refused to hash a record with no fields
    #[error("cannot derive an identity for an empty record")]
    EmptyRecord,

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        suggestion: Option<String>,
    },

    /// Generic errors with custom message
    #[error("{message}")]
    Custom {
        message: String,
        suggestion: Option<String>,
    },
}

impl MrfError {
    /// Create a file not found error with a helpful suggestion
    pub fn file_not_found(path: PathBuf) -> Self {
        let suggestion = if path.extension().map(|e| e == "csv").unwrap_or(false) {
            format!(
                "Check that the filter file exists at '{}' and is readable. \
                Filter files are plain CSV with a header line followed by identifier rows.",
                path.display()
            )
        } else {
            format!(
                "Check that the file exists at '{}' and you have read permissions.",
                path.display()
            )
        };

        Self::FileNotFound { path, suggestion }
    }

    /// Create a format error for a location whose suffix is not an MRF payload
    pub fn unsupported_suffix(location: &str, suffix: &str) -> Self {
        Self::Format {
            location: location.to_string(),
            suffix: suffix.to_string(),
        }
    }

    /// Create a connection error after a retry loop gave up
    pub fn connection_exhausted(url: &str, attempts: u32, message: String) -> Self {
        Self::Connection {
            url: url.to_string(),
            attempts,
            message,
            suggestion: Some(
                "Check the URL and your network connection; transient failures are retried automatically".to_string(),
            ),
        }
    }

    /// Create a configuration error for an out-of-range identity width
    pub fn identity_width(width_bytes: usize) -> Self {
        Self::Configuration {
            message: format!(
                "identity width must be between 1 and {} bytes, got {}",
                crate::constants::MAX_IDENTITY_WIDTH,
                width_bytes
            ),
            suggestion: Some("Identities are u64 join keys; pick a width of 1..=8 bytes".to_string()),
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::Connection { suggestion: Some(sug), .. } => {
                format!("{}\n\nSuggestion: {}", self, sug)
            }
            Self::FileNotFound { suggestion, .. } => {
                format!("{}\n\nSuggestion: {}", self, suggestion)
            }
            Self::Configuration { suggestion: Some(sug), .. } => {
                format!("{}\n\nSuggestion: {}", self, sug)
            }
            Self::Custom { suggestion: Some(sug), .. } => {
                format!("{}\n\nSuggestion: {}", self, sug)
            }
            _ => self.to_string(),
        }
    }
}

// Convenience conversions
impl From<std::io::Error> for MrfError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<csv::Error> for MrfError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|pos| pos.line());
        Self::CsvParse {
            message: err.to_string(),
            line,
        }
    }
}

impl From<serde_json::Error> for MrfError {
    fn from(err: serde_json::Error) -> Self {
        Self::Custom {
            message: format!("serialization error: {}", err),
            suggestion: Some("Check that the record is serializable to JSON".to_string()),
        }
    }
}

impl From<reqwest::Error> for MrfError {
    fn from(err: reqwest::Error) -> Self {
        Self::Connection {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            attempts: 1,
            message: err.to_string(),
            suggestion: Some("Check the URL and your network connection".to_string()),
        }
    }
}
