use crate::scope::ScopeError;
use std::path::{Component, Path};

pub struct PathSanitizer;

impl PathSanitizer {
    /// Sanitize an archive entry name before it is extracted into a loading
    /// scope, rejecting:
    /// - Directory traversal (../)
    /// - Absolute paths (/etc/libc.so, C:\lib.dll)
    /// - Backslash separators, which only some platforms treat as separators
    ///
    /// Returns a normalized virtual path relative to the scope directory.
    pub fn sanitize(raw_path: &str) -> Result<String, ScopeError> {
        if raw_path.is_empty() {
            return Err(ScopeError::InvalidPath("Empty path".to_string()));
        }

        if raw_path.contains('\\') {
            return Err(ScopeError::InvalidPath(format!(
                "Backslash not allowed: {}",
                raw_path
            )));
        }

        let mut components = Vec::new();

        for component in Path::new(raw_path).components() {
            match component {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(ScopeError::InvalidPath(format!(
                        "Absolute path not allowed: {}",
                        raw_path
                    )));
                }
                Component::ParentDir => {
                    return Err(ScopeError::InvalidPath(format!(
                        "Parent directory traversal not allowed: {}",
                        raw_path
                    )));
                }
                Component::CurDir => continue,
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| {
                        ScopeError::InvalidPath(format!("Invalid UTF-8 in path: {:?}", part))
                    })?;
                    components.push(part);
                }
            }
        }

        if components.is_empty() {
            return Err(ScopeError::InvalidPath(format!(
                "No valid components: {}",
                raw_path
            )));
        }

        Ok(components.join("/"))
    }
}
