//! Backup and save helpers

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AccessOp, NfoError, Result};

/// Suffix appended to a file name for its backup copy
pub const BACKUP_SUFFIX: &str = ".backup";

/// First free backup name for `path`
///
/// `movie.nfo` backs up to `movie.nfo.backup`, then `movie.nfo.backup.1`,
/// `movie.nfo.backup.2` and so on, so earlier backups are never replaced.
pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(BACKUP_SUFFIX);
    let base = path.with_file_name(&name);
    if !base.exists() {
        return base;
    }

    (1u32..)
        .map(|n| {
            let mut numbered = name.clone();
            numbered.push(format!(".{n}"));
            path.with_file_name(numbered)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(base)
}

/// Copy an existing file to its backup name
///
/// Returns `None` when there is nothing to back up.
pub fn create_backup(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let backup = backup_path_for(path);
    fs::copy(path, &backup).map_err(|err| NfoError::access(path, AccessOp::Backup, err))?;
    debug!(path = %path.display(), backup = %backup.display(), "Created backup");
    Ok(Some(backup))
}

/// Write bytes to `path`, creating missing parent directories
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| NfoError::access(parent, AccessOp::Write, err))?;
    }
    fs::write(path, bytes).map_err(|err| NfoError::access(path, AccessOp::Write, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_names_never_collide() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("movie.nfo");
        fs::write(&file, "one").unwrap();

        let first = create_backup(&file).unwrap().unwrap();
        assert_eq!(first, dir.path().join("movie.nfo.backup"));

        fs::write(&file, "two").unwrap();
        let second = create_backup(&file).unwrap().unwrap();
        assert_eq!(second, dir.path().join("movie.nfo.backup.1"));

        assert_eq!(fs::read_to_string(&first).unwrap(), "one");
        assert_eq!(fs::read_to_string(&second).unwrap(), "two");
    }

    #[test]
    fn test_no_backup_for_missing_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(create_backup(&dir.path().join("new.nfo")).unwrap(), None);
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a/b/movie.nfo");
        write_bytes(&file, b"<movie/>").unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"<movie/>");
    }
}
