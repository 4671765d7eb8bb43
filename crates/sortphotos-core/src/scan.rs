use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::folder_classify;

/// A directory to process, with its location relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDir {
    pub path: PathBuf,
    pub relative: PathBuf,
}

fn should_skip_dir(entry: &DirEntry, exclude: Option<&Path>) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    if exclude.is_some_and(|ex| entry.path() == ex) {
        return true;
    }
    entry
        .file_name()
        .to_str()
        .map(folder_classify::is_excluded_dir)
        .unwrap_or(false)
}

/// Every directory under `root` (itself included), depth-first and sorted by
/// name, minus excluded directories and their subtrees. `exclude` is pruned
/// too; pass it in the same form as `root` (both canonical).
pub fn collect_directories(root: &Path, exclude: Option<&Path>) -> Vec<ScanDir> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !should_skip_dir(e, exclude))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable path: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        dirs.push(ScanDir {
            path: entry.into_path(),
            relative,
        });
    }
    dirs
}

/// Regular files directly inside `dir`, sorted by name. Symlinks are not followed.
pub fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
