use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the prompt generator.
///
/// Per-file, per-subprocess and clipboard failures are recoverable (see
/// [`Error::is_recoverable`]); the pipeline logs them and keeps going.
/// Everything else aborts the run.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Root directory is missing or unreadable.
    #[error("Cannot traverse '{path}': {message}")]
    Traversal {
        /// Root path that failed
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A single file could not be read.
    #[error("Failed to read '{path}': {message}")]
    FileRead {
        /// Path of the unreadable file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Invalid UTF-8 encountered in file.
    #[error("Invalid UTF-8 encoding in file '{path}'. File may be binary or use unsupported encoding.")]
    InvalidUtf8 {
        /// Path to file with encoding issues
        path: PathBuf,
    },

    /// The diff subprocess failed to start or exited with an error.
    #[error("Failed to collect git output: {message}")]
    DiffCollection {
        /// Error message
        message: String,
    },

    /// The diff subprocess did not finish in time and was killed.
    #[error("Git output unavailable: subprocess timed out after {timeout_secs}s")]
    DiffUnavailable {
        /// Timeout that elapsed
        timeout_secs: u64,
    },

    /// Unknown tokenizer identifier or encoder failure.
    #[error("Tokenizer '{id}' unavailable: {message}")]
    Tokenizer {
        /// Requested tokenizer identifier
        id: String,
        /// Error message
        message: String,
    },

    /// Template compilation or rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// A user-provided template file failed pre-flight checks.
    #[error("Invalid template '{path}': {message}")]
    TemplateValidation {
        /// Template file path
        path: String,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// Invalid glob pattern.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The invalid pattern
        pattern: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// Clipboard sink failure.
    #[error("Clipboard error: {message}")]
    Clipboard {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a traversal error for the given root.
    #[must_use]
    pub fn traversal(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Traversal {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a file read error from an IO failure.
    #[must_use]
    pub fn file_read(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        Self::Template {
            template: template.into(),
            message: render_tera_error(&source),
        }
    }

    /// Creates a template validation error.
    #[must_use]
    pub fn template_validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateValidation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a tokenizer error.
    #[must_use]
    pub fn tokenizer(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tokenizer {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Creates a diff collection error.
    #[must_use]
    pub fn diff(message: impl Into<String>) -> Self {
        Self::DiffCollection {
            message: message.into(),
        }
    }

    /// Creates an invalid UTF-8 error.
    #[must_use]
    pub fn invalid_utf8(path: impl Into<PathBuf>) -> Self {
        Self::InvalidUtf8 { path: path.into() }
    }

    /// Creates an invalid pattern error.
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Creates a clipboard error.
    #[must_use]
    pub fn clipboard(message: impl Into<String>) -> Self {
        Self::Clipboard {
            message: message.into(),
        }
    }

    /// Returns true if the run can continue after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FileRead { .. }
                | Self::InvalidUtf8 { .. }
                | Self::DiffCollection { .. }
                | Self::DiffUnavailable { .. }
                | Self::Clipboard { .. }
        )
    }
}

/// Flattens a tera error and its sources into one line.
///
/// Tera puts the useful part (line, column, expected token) in the source chain.
pub(crate) fn render_tera_error(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
