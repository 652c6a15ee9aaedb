use crate::descriptor::{self, DESCRIPTOR_ENTRY};
use crate::error::{Error, LoaderError, Result};
use crate::instance::Instance;
use crate::report::ArchiveReport;
use crate::scope::LoadScope;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_MAX_LIBRARY_SIZE: u64 = 256 * 1024 * 1024;
pub const DEFAULT_MAX_DESCRIPTOR_SIZE: u64 = 64 * 1024;

/// Loads classes from archives. Holds configuration only; every call opens
/// its own loading scope.
#[derive(Debug, Clone)]
pub struct Loader {
    max_library_size: u64,
    max_descriptor_size: u64,
    scratch_dir: PathBuf,
    descriptor_entry: String,
}

/// Builder for a [`Loader`]
#[derive(Debug, Clone)]
pub struct LoaderBuilder {
    max_library_size: u64,
    max_descriptor_size: u64,
    scratch_dir: PathBuf,
    descriptor_entry: String,
}

impl LoaderBuilder {
    /// Create a new builder with default limits
    pub fn new() -> Self {
        Self {
            max_library_size: DEFAULT_MAX_LIBRARY_SIZE,
            max_descriptor_size: DEFAULT_MAX_DESCRIPTOR_SIZE,
            scratch_dir: std::env::temp_dir(),
            descriptor_entry: DESCRIPTOR_ENTRY.to_string(),
        }
    }

    /// Set maximum size of a single library in the archive
    pub fn max_library_size(mut self, size: u64) -> Self {
        self.max_library_size = size;
        self
    }

    /// Set maximum size of the descriptor entry
    pub fn max_descriptor_size(mut self, size: u64) -> Self {
        self.max_descriptor_size = size;
        self
    }

    /// Set the directory under which loading scopes are created
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Set the name of the descriptor entry
    pub fn descriptor_entry(mut self, name: impl Into<String>) -> Self {
        self.descriptor_entry = name.into();
        self
    }

    pub fn build(self) -> Loader {
        Loader {
            max_library_size: self.max_library_size,
            max_descriptor_size: self.max_descriptor_size,
            scratch_dir: self.scratch_dir,
            descriptor_entry: self.descriptor_entry,
        }
    }
}

impl Default for LoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for Loader {
    fn default() -> Self {
        LoaderBuilder::new().build()
    }
}

fn check_archive(archive: &Path) -> Result<()> {
    if archive.as_os_str().is_empty() {
        return Err(Error::InvalidArgument("archive path must not be empty"));
    }
    Ok(())
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::new()
    }

    pub fn max_library_size(&self) -> u64 {
        self.max_library_size
    }

    pub fn max_descriptor_size(&self) -> u64 {
        self.max_descriptor_size
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn descriptor_entry(&self) -> &str {
        &self.descriptor_entry
    }

    /// Open an isolated loading scope over `archive`.
    ///
    /// Useful to create several instances that share code and statics; the
    /// scope is released once the returned `Arc` and all its instances drop.
    pub fn open_scope(&self, archive: impl AsRef<Path>) -> Result<Arc<LoadScope>> {
        let archive = archive.as_ref();
        check_archive(archive)?;

        LoadScope::open(archive, &self.scratch_dir, self.max_library_size).map_err(|source| {
            LoaderError::ScopeFailed {
                archive: archive.to_path_buf(),
                source,
            }
            .into()
        })
    }

    /// Instantiate `class` from `archive` with its default constructor.
    ///
    /// Every failure past the argument checks is reported as
    /// [`LoaderError::LoadFailed`] carrying the original cause.
    pub fn get(&self, archive: impl AsRef<Path>, class: &str) -> Result<Instance> {
        let archive = archive.as_ref();
        check_archive(archive)?;
        if class.is_empty() {
            return Err(Error::InvalidArgument("class name must not be empty"));
        }

        debug!(class, archive = %archive.display(), "Loading class");

        LoadScope::open(archive, &self.scratch_dir, self.max_library_size)
            .and_then(|scope| scope.instantiate(class))
            .map_err(|source| {
                LoaderError::LoadFailed {
                    class: class.to_string(),
                    archive: archive.to_path_buf(),
                    source,
                }
                .into()
            })
    }

    /// Instantiate the class named by the archive's descriptor entry.
    ///
    /// Failing to open or read the archive is an [`Error::Io`]; a missing or
    /// unusable descriptor and any load failure are [`Error::Loader`].
    pub fn get_by_descriptor(&self, archive: impl AsRef<Path>) -> Result<Instance> {
        let archive = archive.as_ref();
        check_archive(archive)?;

        let class =
            descriptor::read_class_name(archive, &self.descriptor_entry, self.max_descriptor_size)?;
        self.get(archive, &class)
    }

    /// Run `f` with an instance of `class`. The instance, and with it the
    /// loading scope, is released as soon as `f` returns unless `f` cloned
    /// the scope handle.
    pub fn with_instance<R>(
        &self,
        archive: impl AsRef<Path>,
        class: &str,
        f: impl FnOnce(&Instance) -> R,
    ) -> Result<R> {
        let instance = self.get(archive, class)?;
        Ok(f(&instance))
    }

    /// Describe what `archive` provides without instantiating anything
    pub fn inspect(&self, archive: impl AsRef<Path>) -> Result<ArchiveReport> {
        let archive = archive.as_ref();
        check_archive(archive)?;

        // An unusable descriptor is part of the report, not a reason to stop
        let (descriptor, descriptor_issue) = match descriptor::read_class_name(
            archive,
            &self.descriptor_entry,
            self.max_descriptor_size,
        ) {
            Ok(class) => (Some(class), None),
            Err(Error::Loader(LoaderError::DescriptorNotFound { .. })) => (None, None),
            Err(Error::Loader(LoaderError::InvalidDescriptor { reason, .. })) => {
                (None, Some(reason))
            }
            Err(e) => return Err(e),
        };

        let scope = self.open_scope(archive)?;
        Ok(ArchiveReport {
            archive: archive.to_path_buf(),
            descriptor,
            descriptor_issue,
            libraries: scope.libraries().to_vec(),
            classes: scope.classes(),
        })
    }
}
