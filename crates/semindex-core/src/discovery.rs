//! Recursive directory discovery (C3).
//!
//! `walk` never reads file contents; it only produces an ordered sequence
//! of absolute paths for the orchestrator to hand to the classifier.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::IndexResult;

/// Directory base names pruned unconditionally, regardless of configured
/// ignore patterns.
const DEFAULT_IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "coverage",
    "__pycache__",
    ".venv",
    "venv",
    ".next",
];

fn is_ignored_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| DEFAULT_IGNORED_DIRS.contains(&name))
}

/// Recursively walk `root`, depth-first, visiting directory entries in
/// alphabetical order, and return every file path found. Directories whose
/// base name is in the ignore set are pruned before descending; symlinked
/// directories are never followed (a symlink to a regular file is still
/// reported, since classification only cares about the target's content).
///
/// # Errors
/// Returns an error if `root` or a descendant directory cannot be read.
pub fn walk(root: &Path) -> IndexResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_entry(|entry| !is_ignored_dir(entry));

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let is_file = if entry.path_is_symlink() {
            std::fs::metadata(entry.path()).is_ok_and(|meta| meta.is_file())
        } else {
            entry.file_type().is_file()
        };
        if is_file {
            out.push(entry.into_path());
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn walk_returns_files_in_alphabetical_depth_first_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.txt"));
        touch(&dir.path().join("a.txt"));
        touch(&dir.path().join("sub/c.txt"));

        let found = walk(dir.path()).unwrap();
        let relative: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            relative,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b.txt"),
                PathBuf::from("sub/c.txt"),
            ]
        );
    }

    #[test]
    fn walk_prunes_git_and_node_modules_and_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join(".git/HEAD"));
        touch(&dir.path().join("node_modules/pkg/index.js"));
        touch(&dir.path().join("target/debug/out"));
        touch(&dir.path().join("coverage/lcov.info"));
        touch(&dir.path().join("keep.rs"));

        let found = walk(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name().unwrap(), "keep.rs");
    }

    #[test]
    fn walk_does_not_follow_directory_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir_all(&real).unwrap();
        touch(&real.join("inside.txt"));

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&real, dir.path().join("link")).unwrap();
            let found = walk(dir.path()).unwrap();
            assert_eq!(found.len(), 1);
            assert!(found[0].ends_with("real/inside.txt"));
        }
    }
}
