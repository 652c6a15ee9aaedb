//! The descriptor entry naming the class an archive provides.

use crate::error::{Error, LoaderError};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

/// Root-level entry holding the class name
pub const DESCRIPTOR_ENTRY: &str = "servico.txt";

/// Read everything from `reader` and decode it as UTF-8
pub fn read_text<R: Read>(mut reader: R) -> io::Result<String> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Class name carried by descriptor text. A leading byte order mark and
/// surrounding whitespace are dropped.
pub fn class_name(text: &str) -> &str {
    text.trim_start_matches('\u{feff}').trim()
}

/// Open `archive`, read its `entry` and return the class name it names.
///
/// The archive handle is closed before returning on every path.
pub(crate) fn read_class_name(archive: &Path, entry: &str, max_size: u64) -> Result<String, Error> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file).map_err(zip_to_io)?;

    let descriptor = match zip.by_name(entry) {
        Ok(descriptor) => descriptor,
        Err(ZipError::FileNotFound) => {
            return Err(LoaderError::DescriptorNotFound {
                archive: archive.to_path_buf(),
                entry: entry.to_string(),
            }
            .into())
        }
        Err(e) => return Err(zip_to_io(e).into()),
    };

    if descriptor.size() > max_size {
        return Err(LoaderError::InvalidDescriptor {
            archive: archive.to_path_buf(),
            reason: format!("{} bytes exceeds the {} byte limit", descriptor.size(), max_size),
        }
        .into());
    }

    // Headers can lie about the size, so cap the read as well
    let Some(bytes) = read_capped(descriptor, max_size)? else {
        return Err(LoaderError::InvalidDescriptor {
            archive: archive.to_path_buf(),
            reason: format!("more than {} bytes", max_size),
        }
        .into());
    };

    let text = String::from_utf8(bytes).map_err(|e| LoaderError::InvalidDescriptor {
        archive: archive.to_path_buf(),
        reason: format!("'{}' is not valid UTF-8: {}", entry, e),
    })?;
    let name = class_name(&text);
    if name.is_empty() {
        return Err(LoaderError::InvalidDescriptor {
            archive: archive.to_path_buf(),
            reason: format!("'{}' is empty", entry),
        }
        .into());
    }

    debug!(archive = %archive.display(), class = name, "Read descriptor");
    Ok(name.to_string())
}

/// Read at most `max_size` bytes; `None` when the reader holds more
fn read_capped<R: Read>(reader: R, max_size: u64) -> io::Result<Option<Vec<u8>>> {
    let mut bytes = Vec::new();
    reader.take(max_size.saturating_add(1)).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > max_size {
        Ok(None)
    } else {
        Ok(Some(bytes))
    }
}

fn zip_to_io(error: ZipError) -> io::Error {
    match error {
        ZipError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}
