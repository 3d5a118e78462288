// src/watch/path_utils.rs

use std::path::Path;

/// `path` relative to `root`, with forward slashes.
///
/// Falls back to comparing canonical forms when the watcher reports a
/// different absolute prefix for the same directory (symlinked roots,
/// `/private/var` on macOS).
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let to_str = |rel: &Path| rel.to_string_lossy().replace('\\', "/");

    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_str(rel));
    }

    let root = root.canonicalize().ok()?;
    let path = path.canonicalize().ok()?;
    path.strip_prefix(&root).ok().map(to_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_root_prefix() {
        assert_eq!(
            relative_str(Path::new("/status"), Path::new("/status/a/b.status")),
            Some("a/b.status".to_string())
        );
        assert_eq!(relative_str(Path::new("/status"), Path::new("/elsewhere/x")), None);
    }
}
