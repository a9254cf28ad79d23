//! Player data discovery: list `<root>/<bucket>/<player-id>.<ext>` files.
//!
//! The game server shards player files into one subdirectory per bucket.
//! Both levels are sorted by name so every scan visits files in the same order.
//! The walk uses blocking `std::fs` calls; async callers run it on the
//! blocking pool.

use std::fs::DirEntry;
use std::path::{Path, PathBuf};

/// One discovered player save file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerFile {
    /// File name up to the first `.` (usually the player's UUID).
    pub player_id: String,
    pub path: PathBuf,
}

/// Errors from walking the stats directory.
#[derive(Debug)]
pub enum WalkError {
    /// A directory (or one of its entries) could not be read.
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for WalkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalkError::ReadDir { path, source } => {
                write!(f, "failed to list directory {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for WalkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WalkError::ReadDir { source, .. } => Some(source),
        }
    }
}

/// Derive the player identifier from a file name by cutting at the first `.`.
pub fn player_id_from_file_name(file_name: &str) -> &str {
    file_name
        .split_once('.')
        .map_or(file_name, |(id, _)| id)
}

/// List every player file under `root`, in directory-then-file name order.
pub fn list_player_files(root: &Path) -> Result<Vec<PlayerFile>, WalkError> {
    let mut files = Vec::new();

    for bucket in sorted_entries(root)? {
        let bucket_path = bucket.path();
        if !is_kind(&bucket_path, std::fs::Metadata::is_dir)? {
            tracing::debug!(path = %bucket_path.display(), "skipping non-directory entry");
            continue;
        }

        for entry in sorted_entries(&bucket_path)? {
            let path = entry.path();
            if !is_kind(&path, std::fs::Metadata::is_file)? {
                tracing::debug!(path = %path.display(), "skipping non-file entry");
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                tracing::warn!(path = %path.display(), "skipping file with non UTF-8 name");
                continue;
            };
            let player_id = player_id_from_file_name(name);
            if player_id.is_empty() {
                tracing::debug!(path = %path.display(), "skipping hidden file");
                continue;
            }
            files.push(PlayerFile {
                player_id: player_id.to_string(),
                path,
            });
        }
    }

    Ok(files)
}

fn sorted_entries(dir: &Path) -> Result<Vec<DirEntry>, WalkError> {
    let read_err = |source| WalkError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = std::fs::read_dir(dir)
        .map_err(read_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err)?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

// Follows symlinks, so a linked bucket or save file is treated like the real thing.
fn is_kind(path: &Path, check: fn(&std::fs::Metadata) -> bool) -> Result<bool, WalkError> {
    std::fs::metadata(path)
        .map(|m| check(&m))
        .map_err(|source| WalkError::ReadDir {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "{}").unwrap();
    }

    #[test]
    fn player_id_strips_from_first_dot() {
        assert_eq!(player_id_from_file_name("uuid123.json"), "uuid123");
        assert_eq!(player_id_from_file_name("uuid123.json.old"), "uuid123");
        assert_eq!(player_id_from_file_name("uuid123"), "uuid123");
        assert_eq!(player_id_from_file_name(".hidden"), "");
    }

    #[test]
    fn lists_files_in_sorted_order() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b2/ffff.json");
        touch(dir.path(), "a1/cccc.json");
        touch(dir.path(), "a1/aaaa.json");

        let files = list_player_files(dir.path()).unwrap();
        let ids: Vec<_> = files.iter().map(|f| f.player_id.as_str()).collect();
        assert_eq!(ids, ["aaaa", "cccc", "ffff"]);
        assert_eq!(files[0].path, dir.path().join("a1/aaaa.json"));
    }

    #[test]
    fn skips_stray_files_and_nested_dirs() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "readme.txt");
        touch(dir.path(), "a1/aaaa.json");
        touch(dir.path(), "a1/nested/bbbb.json");
        touch(dir.path(), "a1/.DS_Store");

        let files = list_player_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].player_id, "aaaa");
    }

    #[test]
    fn empty_root_yields_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(list_player_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = list_player_files(&missing).unwrap_err();
        assert!(err.to_string().contains("nope"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn unlistable_bucket_is_an_error() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a1/aaaa.json");
        std::os::unix::fs::symlink("b2", dir.path().join("b2")).unwrap();

        let err = list_player_files(dir.path()).unwrap_err();
        let WalkError::ReadDir { path, .. } = &err;
        assert_eq!(path, &dir.path().join("b2"));
    }

    #[test]
    fn duplicate_ids_in_different_buckets_are_kept() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a1/same.json");
        touch(dir.path(), "b2/same.json");
        let files = list_player_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
    }
}
