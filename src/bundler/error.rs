//! Error types for release operations.
//!
//! The variants follow the failure taxonomy the pipeline acts on:
//! format and validation errors reject the current candidate, transient IO
//! errors are retried before they surface here, and collaborator errors carry
//! the identity of the external tool that failed.

use std::{
    fmt::Display,
    io,
    path::{Path, PathBuf},
};

/// Result alias used throughout the release tooling.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while reading packages, codecs, manifests and the pipeline.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed package manifest, bundle header, release line or bundle entry.
    #[error("format error: {0}")]
    Format(String),

    /// A candidate package violates a release constraint.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Filesystem contention that outlived the retry budget.
    #[error("{context} `{}` failed after {attempts} attempts: {source}", .path.display())]
    TransientIo {
        /// What was being attempted.
        context: String,
        /// File the operation targeted.
        path: PathBuf,
        /// Number of attempts made.
        attempts: u32,
        /// Last error observed.
        #[source]
        source: io::Error,
    },

    /// An external collaborator (signer, introspector, transport, ...) failed.
    #[error("{collaborator} failed: {reason}")]
    Collaborator {
        /// Name of the collaborator.
        collaborator: String,
        /// Failure description reported by it.
        reason: String,
    },

    /// Filesystem error with the path and operation that caused it.
    #[error("{context} `{}`: {error}", .path.display())]
    Fs {
        /// Operation description.
        context: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        error: io::Error,
    },

    /// Adds context to an inner error without losing its kind.
    #[error("{context}: {source}")]
    Context {
        /// Context message.
        context: String,
        /// Wrapped error.
        #[source]
        source: Box<Error>,
    },

    /// Catch-all error with a message.
    #[error("{0}")]
    GenericError(String),

    /// IO error.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// Zip archive error.
    #[error(transparent)]
    ZipError(#[from] zip::result::ZipError),

    /// XML parse error.
    #[error(transparent)]
    XmlParse(#[from] xmltree::ParseError),

    /// XML write error.
    #[error(transparent)]
    XmlWrite(#[from] xmltree::Error),

    /// Version parse error.
    #[error(transparent)]
    Semver(#[from] semver::Error),

    /// URL parse error.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// Image decode or encode error.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// Directory walk error.
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),

    /// Path prefix error.
    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// Template render error.
    #[error(transparent)]
    Template(#[from] handlebars::RenderError),
}

impl Error {
    /// Builds a [`Error::Format`].
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    /// Builds a [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Builds a [`Error::Collaborator`].
    pub fn collaborator(collaborator: impl Into<String>, reason: impl Display) -> Self {
        Self::Collaborator {
            collaborator: collaborator.into(),
            reason: reason.to_string(),
        }
    }

    /// Innermost error, looking through [`Error::Context`] layers.
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the failure rejects the candidate package (format or validation).
    ///
    /// IO failures surfacing through the zip reader are not rejections.
    pub fn is_rejection(&self) -> bool {
        match self.root() {
            Self::Format(_) | Self::Validation(_) | Self::XmlParse(_) | Self::Semver(_) | Self::Url(_) => {
                true
            }
            Self::ZipError(e) => !matches!(e, zip::result::ZipError::Io(_)),
            _ => false,
        }
    }

    /// Whether the failure is transient filesystem contention.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), Self::TransientIo { .. })
    }
}

/// Attach filesystem context to `io::Result`s.
pub trait ErrorExt<T> {
    /// Wraps the error with the operation and the path it touched.
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, io::Error> {
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.as_ref().to_path_buf(),
            error,
        })
    }
}

/// Attach a message to a missing value or a failed operation.
pub trait Context<T> {
    /// Adds `context` to the failure.
    fn context<C: Display>(self, context: C) -> Result<T>;

    /// Adds lazily built context to the failure.
    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T> Context<T> for Option<T> {
    fn context<C: Display>(self, context: C) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

impl<T> Context<T> for Result<T> {
    fn context<C: Display>(self, context: C) -> Result<T> {
        self.map_err(|source| Error::Context {
            context: context.to_string(),
            source: Box::new(source),
        })
    }

    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|source| Error::Context {
            context: f().to_string(),
            source: Box::new(source),
        })
    }
}

/// Return early with a [`Error::GenericError`].
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::bundler::Error::GenericError(format!($msg)))
    };
    ($fmt:literal, $($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($fmt, $($arg)*)))
    };
}
