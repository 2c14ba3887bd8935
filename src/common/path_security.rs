//! Path Security Utilities
//!
//! Entry names come out of a decrypted header, so they are untrusted input.
//! These helpers decide which components of such a name may be used on the
//! host file system.

use std::path::{Component, Path};

/// Check if a foreign (backslash or slash separated) name contains path
/// traversal patterns.
///
/// Detects:
/// - `..` components
/// - Absolute path indicators
/// - Windows drive letters
/// - Null bytes
pub fn contains_traversal_pattern(name: &str) -> bool {
    if name.contains('\0') {
        return true;
    }

    if name.starts_with('/') || name.starts_with('\\') {
        return true;
    }

    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }

    name.split(['/', '\\']).any(|component| component == "..")
}

/// Whether a single path component may be joined under an output root.
///
/// Rejects empty, `.` and `..` components, drive designators such as `C:`
/// and anything containing a null byte.
pub fn is_safe_component(component: &str) -> bool {
    if component.is_empty() || component == "." || component == ".." {
        return false;
    }
    if component.contains('\0') {
        return false;
    }
    let bytes = component.as_bytes();
    !(bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

/// Validate that a relative host path stays below whatever it is joined to.
pub fn is_safe_path(path: &Path) -> bool {
    path.components().all(|component| matches!(component, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_traversal_pattern() {
        // Should detect traversal
        assert!(contains_traversal_pattern("..\\secret.txt"));
        assert!(contains_traversal_pattern("foo\\..\\bar"));
        assert!(contains_traversal_pattern("../secret.txt"));
        assert!(contains_traversal_pattern("\\Windows\\System32"));
        assert!(contains_traversal_pattern("/etc/passwd"));
        assert!(contains_traversal_pattern("C:\\Windows"));
        assert!(contains_traversal_pattern("file\0.txt"));

        // Should be safe
        assert!(!contains_traversal_pattern("file.txt"));
        assert!(!contains_traversal_pattern("SETUP\\file.txt"));
        assert!(!contains_traversal_pattern("file..name.txt"));
    }

    #[test]
    fn test_is_safe_component() {
        assert!(is_safe_component("SETUP"));
        assert!(is_safe_component("file..name.txt"));
        assert!(!is_safe_component(""));
        assert!(!is_safe_component("."));
        assert!(!is_safe_component(".."));
        assert!(!is_safe_component("C:"));
        assert!(!is_safe_component("a\0b"));
    }

    #[test]
    fn test_is_safe_path() {
        assert!(is_safe_path(Path::new("file.txt")));
        assert!(is_safe_path(Path::new("subdir/file.txt")));
        assert!(!is_safe_path(Path::new("../secret.txt")));
        assert!(!is_safe_path(Path::new("/etc/passwd")));
    }
}
