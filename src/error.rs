use crate::scope::ScopeError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix of every [`LoaderError`] message
pub const ERROR_TAG: &str = "LoaderError: ";

/// The loader's own error kind: every failure to produce an instance once the
/// arguments are valid, except raw I/O errors reading a descriptor.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("{}descriptor entry '{entry}' not found in {}", ERROR_TAG, .archive.display())]
    DescriptorNotFound { archive: PathBuf, entry: String },

    #[error("{}invalid descriptor in {}: {reason}", ERROR_TAG, .archive.display())]
    InvalidDescriptor { archive: PathBuf, reason: String },

    #[error("{}failed to open loading scope over {}", ERROR_TAG, .archive.display())]
    ScopeFailed {
        archive: PathBuf,
        #[source]
        source: ScopeError,
    },

    #[error(
        "{}failed to create object of class {class} from archive {}",
        ERROR_TAG,
        .archive.display()
    )]
    LoadFailed {
        class: String,
        archive: PathBuf,
        #[source]
        source: ScopeError,
    },
}

impl LoaderError {
    pub fn archive(&self) -> &Path {
        match self {
            Self::DescriptorNotFound { archive, .. }
            | Self::InvalidDescriptor { archive, .. }
            | Self::ScopeFailed { archive, .. }
            | Self::LoadFailed { archive, .. } => archive.as_path(),
        }
    }

    /// Class the failed request named, when there was one
    pub fn class(&self) -> Option<&str> {
        match self {
            Self::LoadFailed { class, .. } => Some(class),
            _ => None,
        }
    }

    /// The underlying failure
    pub fn cause(&self) -> Option<&ScopeError> {
        match self {
            Self::ScopeFailed { source, .. } | Self::LoadFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// A precondition on the arguments was violated
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The archive could not be opened or read while looking up its descriptor
    #[error("Failed to read archive: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Loader(#[from] LoaderError),
}

impl Error {
    pub fn as_loader_error(&self) -> Option<&LoaderError> {
        match self {
            Self::Loader(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
