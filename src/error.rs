//! Structured error types for configuration resolution.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Error kinds for programmatic error handling.
///
/// Every kind is fatal to a resolution pass. `MissingFile` is the only one a
/// caller may choose to swallow, and only for directory-discovered sources.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MissingFile,
    WrongFileType,
    Parse,
    NestingTooDeep,
    IsolationContext,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MissingFile => "missing file",
            ErrorKind::WrongFileType => "wrong file type",
            ErrorKind::Parse => "parse error",
            ErrorKind::NestingTooDeep => "nesting too deep",
            ErrorKind::IsolationContext => "isolation context error",
            ErrorKind::Io => "i/o error",
        };
        f.write_str(name)
    }
}

/// Error raised while resolving configuration.
///
/// Displays as `path: message`, which is exactly what the binary prints
/// before exiting.
#[derive(Debug, Serialize, thiserror::Error)]
#[error("{}: {message}", .path.display())]
pub struct ConfigError {
    pub kind: ErrorKind,
    pub path: PathBuf,
    pub message: String,
}

impl ConfigError {
    pub fn new(kind: ErrorKind, path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    // Convenience constructors

    pub fn missing_file(path: impl AsRef<Path>) -> Self {
        Self::new(ErrorKind::MissingFile, path, "no such file")
    }

    pub fn wrong_file_type(path: impl AsRef<Path>) -> Self {
        Self::new(ErrorKind::WrongFileType, path, "path is not a file")
    }

    pub fn parse(path: impl AsRef<Path>, err: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Parse, path, err.to_string())
    }

    pub fn nesting_too_deep(path: impl AsRef<Path>, depth: usize) -> Self {
        Self::new(
            ErrorKind::NestingTooDeep,
            path,
            format!("include nesting too deep ({} levels)", depth),
        )
    }

    pub fn isolation(path: impl AsRef<Path>, err: impl fmt::Display) -> Self {
        Self::new(ErrorKind::IsolationContext, path, err.to_string())
    }

    pub fn io(path: impl AsRef<Path>, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return Self::missing_file(path);
        }
        Self::new(ErrorKind::Io, path, err.to_string())
    }

    /// Whether this error only says the file was not there.
    pub fn is_missing(&self) -> bool {
        self.kind == ErrorKind::MissingFile
    }
}

/// Result type for resolution operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
