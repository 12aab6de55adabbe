//! Filesystem walking for subject folders.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Sorted entries of a directory, hidden ones excluded.
fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "failed to read directory");
            return Vec::new();
        }
    };
    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| !is_hidden(path))
        .collect();
    paths.sort();
    paths
}

/// Every regular file under `dir`, depth-first in name order.
pub(crate) fn walk_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    walk_into(dir, &mut files);
    files
}

fn walk_into(dir: &Path, files: &mut Vec<PathBuf>) {
    for path in sorted_entries(dir) {
        if path.is_dir() {
            walk_into(&path, files);
        } else if path.is_file() {
            files.push(path);
        }
    }
}

/// Whether any regular file exists under `dir`.
pub(crate) fn contains_file(dir: &Path) -> bool {
    sorted_entries(dir)
        .iter()
        .any(|path| path.is_file() || (path.is_dir() && contains_file(path)))
}

/// Immediate subdirectories of `root`, sorted by name.
pub(crate) fn subdirectories(root: &Path) -> Vec<PathBuf> {
    sorted_entries(root)
        .into_iter()
        .filter(|path| path.is_dir())
        .collect()
}

/// `path` relative to `base` with `/` separators, for provenance.
pub(crate) fn relative_name(path: &Path, base: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_walk_is_sorted_and_skips_hidden() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("week2")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("week2/c.txt"), "c").unwrap();
        fs::write(root.join(".cache/d.txt"), "d").unwrap();
        fs::write(root.join(".DS_Store"), "").unwrap();

        let names: Vec<String> = walk_files(root)
            .iter()
            .map(|p| relative_name(p, root))
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "week2/c.txt"]);
    }

    #[test]
    fn test_contains_file_is_recursive() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("empty/nested")).unwrap();
        fs::create_dir_all(root.join("deep/nested")).unwrap();
        fs::write(root.join("deep/nested/notes.txt"), "x").unwrap();

        assert!(!contains_file(&root.join("empty")));
        assert!(contains_file(&root.join("deep")));
        assert!(!contains_file(&root.join("missing")));
    }
}
