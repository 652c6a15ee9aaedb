use crate::security::PathSanitizer;

#[test]
fn test_library_at_root() {
    let result = PathSanitizer::sanitize("libplugin.so");
    assert_eq!(result.unwrap(), "libplugin.so");
}

#[test]
fn test_nested_library() {
    let result = PathSanitizer::sanitize("native/linux-x86_64/libplugin.so");
    assert_eq!(result.unwrap(), "native/linux-x86_64/libplugin.so");
}

#[test]
fn test_hidden_components_allowed() {
    let result = PathSanitizer::sanitize(".libs/libplugin.so");
    assert_eq!(result.unwrap(), ".libs/libplugin.so");
}

#[test]
fn test_reject_parent_directory_traversal() {
    let result = PathSanitizer::sanitize("../libevil.so");
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("Parent directory traversal")
    );
}

#[test]
fn test_reject_parent_in_middle() {
    let result = PathSanitizer::sanitize("lib/../../libevil.so");
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("Parent directory traversal")
    );
}

#[test]
fn test_reject_absolute_unix_path() {
    let result = PathSanitizer::sanitize("/usr/lib/libc.so");
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Absolute path"));
}

#[test]
fn test_reject_backslash() {
    let result = PathSanitizer::sanitize("lib\\..\\libevil.dll");
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Backslash"));
}

#[test]
fn test_reject_empty_path() {
    let result = PathSanitizer::sanitize("");
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Empty path"));
}

#[test]
fn test_normalize_current_dir_markers() {
    let result = PathSanitizer::sanitize("./lib/./libplugin.so");
    assert_eq!(result.unwrap(), "lib/libplugin.so");
}

#[test]
fn test_reject_only_current_dir() {
    let result = PathSanitizer::sanitize("./.");
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("No valid components")
    );
}

#[test]
fn test_path_with_unicode() {
    let result = PathSanitizer::sanitize("bibliotecas/módulo/libplugin.so");
    assert_eq!(result.unwrap(), "bibliotecas/módulo/libplugin.so");
}
