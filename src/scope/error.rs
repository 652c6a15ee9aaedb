use std::path::PathBuf;
use thiserror::Error;

/// Why a class could not be loaded from an archive.
#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse ZIP archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid path in archive: {0}")]
    InvalidPath(String),

    #[error("Library too large: {size} bytes (max: {max})")]
    LibraryTooLarge { size: u64, max: u64 },

    #[error("Failed to link library {}: {source}", library.display())]
    Link {
        library: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("Class not found: {0}")]
    ClassNotFound(String),

    #[error("Class {0} has no default constructor")]
    NoDefaultConstructor(String),

    #[error("Initializer of class {class} failed: {message}")]
    Initializer { class: String, message: String },

    #[error("Constructor of class {class} failed: {message}")]
    Constructor { class: String, message: String },
}
