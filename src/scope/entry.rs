use serde::Serialize;

/// A native library extracted from the archive into a loading scope
#[derive(Debug, Clone, Serialize)]
pub struct LibraryEntry {
    /// Position of the entry in the archive's central directory
    pub archive_index: usize,
    /// Sanitized virtual path (e.g., "lib/libplugin.so")
    pub virtual_path: String,
    /// Length in bytes
    pub size: u64,
    /// Lowercase hex SHA-256 of the library bytes
    pub sha256: String,
}
