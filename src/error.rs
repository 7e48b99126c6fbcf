//! Error types for the prefixer.
//!
//! Errors fall into two groups.  Per-file problems (a file that cannot be
//! read or written) are reported and skipped by the batch operations, so
//! they rarely surface to callers.  Pattern problems mean a search pattern
//! could not be built; they would repeat on every file, so they abort the
//! whole run.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PrefixError>;

#[derive(Debug, Error)]
pub enum PrefixError {
    /// A search pattern failed to compile.
    #[error("{operation}: invalid pattern `{pattern}`: {source}")]
    Pattern {
        operation: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A search pattern compiled past the engine's size limit.
    ///
    /// This is the linear-time engine's counterpart of a backtrack limit:
    /// the input pattern is pathological and nothing was matched.
    #[error("{operation}: pattern `{pattern}` exceeds the matcher size limit")]
    PatternLimit {
        operation: &'static str,
        pattern: String,
    },

    /// A custom namespace replacement pattern from configuration is unusable.
    #[error("invalid namespace replacement pattern `{pattern}`: {reason}")]
    InvalidReplacementPattern { pattern: String, reason: String },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    /// A fatal error raised while rewriting a specific file.
    #[error("while rewriting {}: {source}", path.display())]
    Rewrite {
        path: PathBuf,
        #[source]
        source: Box<PrefixError>,
    },
}

impl PrefixError {
    /// Build the error for a pattern that failed to compile in `operation`.
    pub(crate) fn pattern(operation: &'static str, pattern: &str, source: regex::Error) -> Self {
        match source {
            regex::Error::CompiledTooBig(_) => PrefixError::PatternLimit {
                operation,
                pattern: pattern.to_string(),
            },
            source => PrefixError::Pattern {
                operation,
                pattern: pattern.to_string(),
                source,
            },
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PrefixError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must stop the run instead of skipping one file.
    pub fn is_fatal(&self) -> bool {
        match self {
            PrefixError::Pattern { .. }
            | PrefixError::PatternLimit { .. }
            | PrefixError::InvalidReplacementPattern { .. }
            | PrefixError::Config { .. } => true,
            PrefixError::Rewrite { source, .. } => source.is_fatal(),
            PrefixError::Io { .. } => false,
        }
    }

    /// The name of the operation whose pattern failed, if any.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            PrefixError::Pattern { operation, .. } | PrefixError::PatternLimit { operation, .. } => {
                Some(operation)
            }
            PrefixError::Rewrite { source, .. } => source.operation(),
            _ => None,
        }
    }
}

/// Compile `pattern` for `operation`, keeping the engine's default size
/// limit so pathological patterns surface as [`PrefixError::PatternLimit`].
pub(crate) fn compile(operation: &'static str, pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(pattern).map_err(|e| PrefixError::pattern(operation, pattern, e))
}
