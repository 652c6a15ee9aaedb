use crate::scope::{ClassInfo, LibraryEntry};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// What an archive provides, as reported by [`crate::Loader::inspect`]
#[derive(Debug, Serialize)]
pub struct ArchiveReport {
    pub archive: PathBuf,
    /// Class named by the descriptor entry, if the archive has one
    pub descriptor: Option<String>,
    /// Why the descriptor entry could not be used, when it exists but is invalid
    pub descriptor_issue: Option<String>,
    pub libraries: Vec<LibraryEntry>,
    pub classes: Vec<ClassInfo>,
}

impl fmt::Display for ArchiveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Archive:    {}", self.archive.display())?;
        match (&self.descriptor, &self.descriptor_issue) {
            (Some(class), _) => writeln!(f, "Descriptor: {}", class)?,
            (None, Some(issue)) => writeln!(f, "Descriptor: (invalid: {})", issue)?,
            (None, None) => writeln!(f, "Descriptor: (none)")?,
        }

        writeln!(f, "Libraries:  {}", self.libraries.len())?;
        for library in &self.libraries {
            writeln!(
                f,
                "  {} ({} bytes, sha256 {})",
                library.virtual_path, library.size, library.sha256
            )?;
        }

        writeln!(f, "Classes:    {}", self.classes.len())?;
        for class in &self.classes {
            let constructor = if class.default_constructor {
                ""
            } else {
                " [no default constructor]"
            };
            let interfaces = if class.interfaces.is_empty() {
                String::new()
            } else {
                format!(" implements {}", class.interfaces.join(", "))
            };
            writeln!(
                f,
                "  {} in {}{}{}",
                class.name, class.library, interfaces, constructor
            )?;
        }
        Ok(())
    }
}
