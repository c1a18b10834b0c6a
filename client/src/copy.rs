//! Client-side `copy` transport for `pushPath`.
//!
//! The client's filesystem is the source of truth: the local path is either
//! linked or duplicated at the remote path, which must be reachable from
//! this host (a shared mount).

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use pfurl_shared::{Error, Result};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Linked,
    Copied { files: u64 },
}

pub fn push_copy(local: &Path, remote: &Path, symlink: bool) -> Result<CopyOutcome> {
    let source = local.canonicalize().map_err(|e| unreadable(local, e))?;

    if fs::symlink_metadata(remote).is_ok() {
        return Err(Error::InvalidRemotePath(format!(
            "{}: already exists",
            remote.display()
        )));
    }
    if !symlink && source.is_dir() && resolve_missing(remote)?.starts_with(&source) {
        return Err(Error::InvalidRemotePath(format!(
            "{}: inside the source tree {}",
            remote.display(),
            source.display()
        )));
    }
    if let Some(parent) = remote.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    if symlink {
        link(&source, remote)?;
        info!("Linked {} -> {}", remote.display(), source.display());
        return Ok(CopyOutcome::Linked);
    }

    let files = if source.is_dir() {
        match copy_dir(&source, remote) {
            Ok(files) => files,
            Err(e) => {
                // remote did not exist before; drop the partial tree
                if let Err(rm) = fs::remove_dir_all(remote) {
                    debug!("Failed to remove partial copy {}: {}", remote.display(), rm);
                }
                return Err(e);
            }
        }
    } else {
        copy_file(&source, remote)?;
        1
    };
    info!("Copied {} file(s) from {} to {}", files, source.display(), remote.display());
    Ok(CopyOutcome::Copied { files })
}

fn unreadable(path: &Path, e: io::Error) -> Error {
    Error::InvalidLocalPath(format!("{}: {}", path.display(), e))
}

/// Canonical form of a path that may not exist yet: the deepest existing
/// ancestor is resolved and the missing tail appended.
fn resolve_missing(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut tail = Vec::new();
    let mut cursor = absolute.as_path();
    loop {
        if let Ok(base) = cursor.canonicalize() {
            return Ok(tail.iter().rev().fold(base, |acc, part| acc.join(part)));
        }
        match (cursor.file_name(), cursor.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name.to_os_string());
                cursor = parent;
            }
            _ => return Ok(absolute),
        }
    }
}

#[cfg(unix)]
fn link(source: &Path, remote: &Path) -> Result<()> {
    std::os::unix::fs::symlink(source, remote)?;
    Ok(())
}

#[cfg(windows)]
fn link(source: &Path, remote: &Path) -> Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, remote)?;
    } else {
        std::os::windows::fs::symlink_file(source, remote)?;
    }
    Ok(())
}

fn copy_dir(source: &Path, dest: &Path) -> Result<u64> {
    fs::create_dir_all(dest)?;
    let mut files = 0;
    for entry in fs::read_dir(source).map_err(|e| unreadable(source, e))? {
        let entry = entry.map_err(|e| unreadable(source, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if fs::metadata(&from)?.is_dir() {
            if entry.file_type()?.is_symlink() {
                debug!("Skipping symlinked directory {}", from.display());
                continue;
            }
            files += copy_dir(&from, &to)?;
        } else {
            copy_file(&from, &to)?;
            files += 1;
        }
    }
    Ok(files)
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    File::open(from).map_err(|e| unreadable(from, e))?;
    fs::copy(from, to)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_symlink_instead_of_copy() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("client/data.txt");
        fs::create_dir_all(local.parent().unwrap()).unwrap();
        fs::write(&local, "payload").unwrap();
        let remote = dir.path().join("server/inbox/data.txt");

        let outcome = push_copy(&local, &remote, true).unwrap();
        assert_eq!(outcome, CopyOutcome::Linked);

        let meta = fs::symlink_metadata(&remote).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(fs::read_link(&remote).unwrap(), local.canonicalize().unwrap());
        assert_eq!(fs::read_to_string(&remote).unwrap(), "payload");
    }

    #[test]
    fn test_copy_directory_tree() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("src");
        fs::create_dir_all(local.join("nested")).unwrap();
        fs::write(local.join("a"), "1").unwrap();
        fs::write(local.join("nested/b"), "2").unwrap();
        let remote = dir.path().join("dst");

        let outcome = push_copy(&local, &remote, false).unwrap();
        assert_eq!(outcome, CopyOutcome::Copied { files: 2 });
        assert!(!fs::symlink_metadata(&remote).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(remote.join("nested/b")).unwrap(), "2");
    }

    #[test]
    fn test_existing_destination_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a");
        let remote = dir.path().join("b");
        fs::write(&local, "x").unwrap();
        fs::write(&remote, "y").unwrap();

        let err = push_copy(&local, &remote, false).unwrap_err();
        assert!(matches!(err, Error::InvalidRemotePath(_)));
        assert_eq!(fs::read_to_string(&remote).unwrap(), "y");
    }

    #[test]
    fn test_destination_inside_source_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("src");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join("a"), "1").unwrap();

        let err = push_copy(&local, &local.join("backup/today"), false).unwrap_err();
        assert!(matches!(err, Error::InvalidRemotePath(_)));
        assert!(!local.join("backup").exists());

        // Same tree reached through a relative detour
        let detour = local.join("..").join("src").join("nested");
        let err = push_copy(&local, &detour, false).unwrap_err();
        assert!(matches!(err, Error::InvalidRemotePath(_)));
        assert!(!local.join("nested").exists());
    }

    #[test]
    fn test_sibling_with_common_prefix_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("src");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join("a"), "1").unwrap();

        let outcome = push_copy(&local, &dir.path().join("src-copy"), false).unwrap();
        assert_eq!(outcome, CopyOutcome::Copied { files: 1 });
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_entry_is_invalid_local_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("src");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join("a"), "1").unwrap();
        let locked = local.join("z-locked");
        fs::write(&locked, "secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if File::open(&locked).is_ok() {
            // Privileged users bypass mode bits
            return;
        }

        let remote = dir.path().join("dst");
        let err = push_copy(&local, &remote, false).unwrap_err();
        assert!(matches!(err, Error::InvalidLocalPath(_)));
        assert!(!remote.exists());

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = push_copy(&dir.path().join("missing"), &dir.path().join("b"), true).unwrap_err();
        assert!(matches!(err, Error::InvalidLocalPath(_)));
    }
}
