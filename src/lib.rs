//! Instantiate classes exported by native libraries packed in zip archives.
//!
//! Each call opens an isolated [`LoadScope`] over the archive, resolves the
//! requested class there and builds it with its default constructor:
//!
//! ```no_run
//! let upper = archload::get("plugins/x.jar", "Teste")?;
//! let function = upper.as_string_function().expect("Teste is a string function");
//! assert_eq!(function.apply("ok")?, "OK");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Libraries export classes with `archload_abi::export_classes!`.

pub mod descriptor;
pub mod error;
pub mod instance;
pub mod loader;
pub mod report;
pub mod scope;
pub mod security;

use std::path::Path;

// Re-export main types for convenience
pub use descriptor::{read_text, DESCRIPTOR_ENTRY};
pub use error::{Error, LoaderError, Result, ERROR_TAG};
pub use instance::{CallError, Capability, Instance, StringFunction};
pub use loader::{Loader, LoaderBuilder};
pub use report::ArchiveReport;
pub use scope::{ClassInfo, LibraryEntry, LoadScope, ScopeError};

pub use archload_abi::STRING_FUNCTION;

/// Instantiate `class` from `archive` with a default [`Loader`]
pub fn get(archive: impl AsRef<Path>, class: &str) -> Result<Instance> {
    Loader::default().get(archive, class)
}

/// Instantiate the class named by `archive`'s `servico.txt` with a default [`Loader`]
pub fn get_by_descriptor(archive: impl AsRef<Path>) -> Result<Instance> {
    Loader::default().get_by_descriptor(archive)
}
