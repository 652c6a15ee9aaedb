mod entry;
mod error;

pub use entry::LibraryEntry;
pub use error::ScopeError;

use crate::instance::{take_bytes, Instance};
use crate::security::PathSanitizer;
use archload_abi::{ClassDescriptor, ClassTableFn, OwnedBytes, CLASS_TABLE_SYMBOL, STRING_FUNCTION};
use libloading::Library;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::env::consts::DLL_EXTENSION;
use std::ffi::CStr;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Interfaces the host can adapt instances to
const KNOWN_INTERFACES: &[&CStr] = &[STRING_FUNCTION];

/// A class visible in a loading scope
#[derive(Debug, Clone, Serialize)]
pub struct ClassInfo {
    pub name: String,
    /// Virtual path of the defining library
    pub library: String,
    pub default_constructor: bool,
    pub interfaces: Vec<String>,
}

/// Isolated loading scope over one archive.
///
/// Every native library in the archive is copied into a private scratch
/// directory and opened from there, so each scope links its own copy of the
/// code and statics. Libraries are opened with `RTLD_NOW | RTLD_LOCAL` on
/// unix: unresolved symbols fail at open time and nothing is exported into
/// the global namespace.
///
/// Instances hold an `Arc` to their scope. Dropping the last one closes the
/// libraries and removes the scratch directory.
#[derive(Debug)]
pub struct LoadScope {
    id: Uuid,
    archive: PathBuf,
    dir: PathBuf,
    entries: Vec<LibraryEntry>,
    libraries: Vec<Library>,
    /// Classes whose initializer already ran in this scope
    initialized: Mutex<HashSet<String>>,
}

impl LoadScope {
    pub(crate) fn open(
        archive: &Path,
        scratch_dir: &Path,
        max_library_size: u64,
    ) -> Result<Arc<Self>, ScopeError> {
        let id = Uuid::new_v4();
        let mut scope = Self {
            id,
            archive: archive.to_path_buf(),
            dir: scratch_dir.join(format!("archload-{}", id)),
            entries: Vec::new(),
            libraries: Vec::new(),
            initialized: Mutex::new(HashSet::new()),
        };

        // Any early return below drops `scope`, which removes the directory
        fs::create_dir_all(&scope.dir)?;
        debug!(
            scope = %id,
            archive = %archive.display(),
            dir = %scope.dir.display(),
            "Opening loading scope"
        );

        scope.extract_libraries(max_library_size)?;
        scope.link_libraries()?;

        Ok(Arc::new(scope))
    }

    fn extract_libraries(&mut self, max_library_size: u64) -> Result<(), ScopeError> {
        let file = File::open(&self.archive)?;
        let mut archive = zip::ZipArchive::new(file)?;

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;

            if file.is_dir() || !is_library(file.name()) {
                continue;
            }

            let virtual_path = PathSanitizer::sanitize(file.name())?;

            if file.size() > max_library_size {
                return Err(ScopeError::LibraryTooLarge {
                    size: file.size(),
                    max: max_library_size,
                });
            }

            // Headers can lie about the size, so cap the read as well
            let mut contents = Vec::with_capacity(file.size() as usize);
            (&mut file)
                .take(max_library_size + 1)
                .read_to_end(&mut contents)?;
            if contents.len() as u64 > max_library_size {
                return Err(ScopeError::LibraryTooLarge {
                    size: contents.len() as u64,
                    max: max_library_size,
                });
            }

            let target = self.dir.join(&virtual_path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &contents)?;

            let entry = LibraryEntry {
                archive_index: i,
                virtual_path,
                size: contents.len() as u64,
                sha256: hex::encode(Sha256::digest(&contents)),
            };
            debug!(
                scope = %self.id,
                library = %entry.virtual_path,
                size = entry.size,
                sha256 = %entry.sha256,
                "Extracted library"
            );
            self.entries.push(entry);
        }

        Ok(())
    }

    fn link_libraries(&mut self) -> Result<(), ScopeError> {
        for entry in &self.entries {
            let path = self.dir.join(&entry.virtual_path);
            let library = open_isolated(&path).map_err(|source| ScopeError::Link {
                library: PathBuf::from(&entry.virtual_path),
                source,
            })?;
            self.libraries.push(library);
        }
        Ok(())
    }

    /// Class tables of every library that exports one, in archive order
    fn class_tables(&self) -> impl Iterator<Item = (&LibraryEntry, &[ClassDescriptor])> + '_ {
        self.entries
            .iter()
            .zip(&self.libraries)
            .filter_map(|(entry, library)| {
                // Safety: the symbol type is fixed by the ABI crate
                let table = match unsafe { library.get::<ClassTableFn>(CLASS_TABLE_SYMBOL) } {
                    Ok(table) => table,
                    Err(_) => {
                        debug!(library = %entry.virtual_path, "Library exports no class table");
                        return None;
                    }
                };
                // Safety: the table points into the library, which lives as long as `self`
                let classes = unsafe { (*table)().as_slice() };
                Some((entry, classes))
            })
    }

    fn resolve(&self, class: &str) -> Result<&ClassDescriptor, ScopeError> {
        for (entry, classes) in self.class_tables() {
            let found = classes
                .iter()
                .find(|descriptor| unsafe { descriptor.name() }.to_bytes() == class.as_bytes());
            if let Some(descriptor) = found {
                debug!(scope = %self.id, class, library = %entry.virtual_path, "Resolved class");
                return Ok(descriptor);
            }
        }
        Err(ScopeError::ClassNotFound(class.to_string()))
    }

    /// Runs the class initializer unless it already ran in this scope
    fn initialize(&self, class: &str, descriptor: &ClassDescriptor) -> Result<(), ScopeError> {
        let mut initialized = self
            .initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if initialized.contains(class) {
            return Ok(());
        }

        let mut error = OwnedBytes::empty();
        if !unsafe { (descriptor.initialize)(&mut error) } {
            return Err(ScopeError::Initializer {
                class: class.to_string(),
                message: failure_message(descriptor, error),
            });
        }

        initialized.insert(class.to_string());
        Ok(())
    }

    /// Resolve `class`, run its initializer and call its default constructor
    pub fn instantiate(self: &Arc<Self>, class: &str) -> Result<Instance, ScopeError> {
        let descriptor = self.resolve(class)?;
        self.initialize(class, descriptor)?;

        let construct = descriptor
            .construct
            .ok_or_else(|| ScopeError::NoDefaultConstructor(class.to_string()))?;

        let mut error = OwnedBytes::empty();
        let object = unsafe { construct(&mut error) };
        if object.is_null() {
            return Err(ScopeError::Constructor {
                class: class.to_string(),
                message: failure_message(descriptor, error),
            });
        }

        debug!(scope = %self.id, class, "Instantiated class");
        // Safety: `object` was just built by this descriptor's constructor
        Ok(unsafe { Instance::new(Arc::clone(self), descriptor, object, class) })
    }

    /// Every class exported by the scope's libraries
    pub fn classes(&self) -> Vec<ClassInfo> {
        self.class_tables()
            .flat_map(|(entry, classes)| {
                classes.iter().map(move |descriptor| ClassInfo {
                    name: unsafe { descriptor.name() }.to_string_lossy().into_owned(),
                    library: entry.virtual_path.clone(),
                    default_constructor: descriptor.construct.is_some(),
                    interfaces: KNOWN_INTERFACES
                        .iter()
                        .filter(|interface| {
                            !unsafe { (descriptor.query_interface)(interface.as_ptr()) }.is_null()
                        })
                        .map(|interface| interface.to_string_lossy().into_owned())
                        .collect(),
                })
            })
            .collect()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Scratch directory holding the extracted libraries
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn libraries(&self) -> &[LibraryEntry] {
        &self.entries
    }
}

impl Drop for LoadScope {
    fn drop(&mut self) {
        // Close the libraries before deleting the files they were mapped from
        self.libraries.clear();

        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(scope = %self.id, "Released loading scope"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                scope = %self.id,
                dir = %self.dir.display(),
                error = %e,
                "Failed to remove scope directory"
            ),
        }
    }
}

fn is_library(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DLL_EXTENSION))
}

fn failure_message(descriptor: &ClassDescriptor, error: OwnedBytes) -> String {
    // Safety: `error` was filled in by this descriptor's library
    let bytes = unsafe { take_bytes(descriptor, error) };
    if bytes.is_empty() {
        "no details".to_string()
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(unix)]
fn open_isolated(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};

    // Safety: running the library's initialization routines is the point of loading it
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map(Library::from)
}

#[cfg(not(unix))]
fn open_isolated(path: &Path) -> Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}
