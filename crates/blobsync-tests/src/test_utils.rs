//! Local directory fixtures with controlled modification times

use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// A file to place in a fixture tree
#[derive(Debug, Clone, Copy)]
pub struct FixtureFile<'a> {
    /// Path relative to the tree root, `/`-separated
    pub path: &'a str,
    /// File content
    pub content: &'a str,
    /// Modification time in seconds since the epoch
    pub mtime: u64,
}

impl<'a> FixtureFile<'a> {
    /// Shorthand constructor
    pub const fn new(path: &'a str, content: &'a str, mtime: u64) -> Self {
        Self {
            path,
            content,
            mtime,
        }
    }
}

/// Timestamp `secs` seconds after the epoch
pub fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

/// Write one file, creating parent directories, and set its mtime
pub fn write_file(root: &Path, file: FixtureFile<'_>) -> PathBuf {
    let path = root.join(file.path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create fixture directory");
    }
    fs::write(&path, file.content).expect("Failed to write fixture file");
    set_file_mtime(&path, FileTime::from_system_time(at(file.mtime)))
        .expect("Failed to set fixture mtime");
    path
}

/// Create a temporary tree holding `files`
///
/// Directory mtimes are pinned to the newest file below them so that
/// watermark pruning sees stable values.
pub fn create_tree(files: &[FixtureFile<'_>]) -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp dir");
    for file in files {
        write_file(temp.path(), *file);
    }
    pin_directory_mtimes(temp.path(), files);
    temp
}

fn pin_directory_mtimes(root: &Path, files: &[FixtureFile<'_>]) {
    for file in files {
        let mut current = Path::new(file.path).parent();
        while let Some(dir) = current.filter(|d| !d.as_os_str().is_empty()) {
            let newest = files
                .iter()
                .filter(|f| Path::new(f.path).starts_with(dir))
                .map(|f| f.mtime)
                .max()
                .unwrap_or(file.mtime);
            set_file_mtime(root.join(dir), FileTime::from_system_time(at(newest)))
                .expect("Failed to set directory mtime");
            current = dir.parent();
        }
    }
}

/// Write a YAML configuration file into `dir`
pub fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("azure_upload.yml");
    fs::write(&path, yaml).expect("Failed to write config file");
    path
}
