//! Zip archives for the `compress` transport.
//!
//! An archive artifact is a temporary file owned by exactly one invocation.
//! Its name is unique per invocation (`pfurl-<utc time>-<random>.zip`), so
//! two transfers of the same source never share a file. When `cleanup` is
//! set the artifact is deleted once the owner lets go of it, whether the
//! transfer succeeded or not; otherwise it is kept on disk.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use pfurl_shared::protocol::CompressSpec;
use pfurl_shared::{Error, Result};
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Scoped archive file
#[derive(Debug)]
pub struct ArchiveArtifact {
    temp: Option<NamedTempFile>,
    path: PathBuf,
    cleanup: bool,
}

impl ArchiveArtifact {
    /// Create an empty artifact in `dir`.
    pub fn create_in(dir: &Path, cleanup: bool) -> Result<Self> {
        let prefix = format!("pfurl-{}-", chrono::Utc::now().format("%Y%m%dT%H%M%S"));
        let temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".zip")
            .tempfile_in(dir)?;
        let path = temp.path().to_path_buf();
        debug!("Created archive artifact {}", path.display());
        Ok(Self {
            temp: Some(temp),
            path,
            cleanup,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive.zip".to_string())
    }

    fn file(&self) -> Result<&File> {
        self.temp
            .as_ref()
            .map(NamedTempFile::as_file)
            .ok_or_else(|| Error::ArchiveFailed("artifact already released".into()))
    }

    /// Release the artifact: delete it when `cleanup` is set, keep it
    /// otherwise. Returns the kept path.
    pub fn finish(mut self) -> Result<Option<PathBuf>> {
        match self.temp.take() {
            Some(temp) => release(temp, self.cleanup),
            None => Ok(None),
        }
    }

    /// Delete the artifact regardless of `cleanup`; used when it is broken.
    pub fn discard(mut self) {
        self.cleanup = true;
    }
}

impl Drop for ArchiveArtifact {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            if let Err(e) = release(temp, self.cleanup) {
                warn!("Failed to release archive artifact {}: {}", self.path.display(), e);
            }
        }
    }
}

fn release(temp: NamedTempFile, cleanup: bool) -> Result<Option<PathBuf>> {
    if cleanup {
        let path = temp.path().to_path_buf();
        temp.close()?;
        debug!("Removed archive artifact {}", path.display());
        Ok(None)
    } else {
        let (_, path) = temp.keep().map_err(|e| Error::Io(e.error))?;
        info!("Archive kept at {}", path.display());
        Ok(Some(path))
    }
}

fn zip_error(e: ZipError) -> Error {
    Error::ArchiveFailed(e.to_string())
}

fn options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
}

/// Archive `source` into a fresh artifact in `dir`.
///
/// A directory is stored under its own name (`dir/a.txt`); a single file is
/// stored under its file name only. The artifact never archives itself, even
/// when `dir` sits inside `source`.
pub fn pack(source: &Path, dir: &Path, cleanup: bool) -> Result<ArchiveArtifact> {
    let source = source
        .canonicalize()
        .map_err(|e| unreadable(source, e))?;
    let root = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidLocalPath(format!("{}: cannot archive a filesystem root", source.display())))?;

    let artifact = ArchiveArtifact::create_in(dir, cleanup)?;
    let own_path = artifact.path().canonicalize()?;
    let written = write_archive(&source, &root, &own_path, artifact.file()?);
    match written {
        Ok(entries) => {
            info!("Archived {} ({} entries) into {}", source.display(), entries, artifact.path().display());
            Ok(artifact)
        }
        Err(e) => {
            artifact.discard();
            Err(e)
        }
    }
}

/// A source entry that cannot be read
fn unreadable(path: &Path, e: io::Error) -> Error {
    Error::InvalidLocalPath(format!("{}: {}", path.display(), e))
}

fn write_archive(source: &Path, root: &str, skip: &Path, out: &File) -> Result<usize> {
    let mut zip = ZipWriter::new(out);
    let mut entries = 0;

    if source.is_dir() {
        zip.add_directory(format!("{}/", root), options()).map_err(zip_error)?;
        entries += 1;
        entries += add_dir(&mut zip, source, root, skip)?;
    } else {
        add_file(&mut zip, source, root)?;
        entries += 1;
    }

    let mut out = zip.finish().map_err(zip_error)?;
    out.flush()?;
    Ok(entries)
}

fn add_dir<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    prefix: &str,
    skip: &Path,
) -> Result<usize> {
    let mut children: Vec<_> = fs::read_dir(dir)
        .and_then(|it| it.collect::<io::Result<Vec<_>>>())
        .map_err(|e| unreadable(dir, e))?;
    children.sort_by_key(|e| e.file_name());

    let mut entries = 0;
    for child in children {
        let path = child.path();
        if path == skip {
            debug!("Skipping the artifact itself at {}", path.display());
            continue;
        }
        let name = format!("{}/{}", prefix, child.file_name().to_string_lossy());
        // Follows symlinks; dangling links are skipped
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        if meta.is_dir() {
            if child.file_type()?.is_symlink() {
                debug!("Skipping symlinked directory {}", path.display());
                continue;
            }
            zip.add_directory(format!("{}/", name), options()).map_err(zip_error)?;
            entries += 1 + add_dir(zip, &path, &name, skip)?;
        } else {
            add_file(zip, &path, &name)?;
            entries += 1;
        }
    }
    Ok(entries)
}

fn add_file<W: Write + io::Seek>(zip: &mut ZipWriter<W>, path: &Path, name: &str) -> Result<()> {
    let mut file = File::open(path).map_err(|e| unreadable(path, e))?;
    zip.start_file(name, options()).map_err(zip_error)?;
    io::copy(&mut file, zip)?;
    Ok(())
}

/// Extract `archive` into `dest`, returning the number of entries.
pub fn unpack(archive: &Path, dest: &Path) -> Result<usize> {
    let mut zip = ZipArchive::new(File::open(archive)?).map_err(zip_error)?;
    fs::create_dir_all(dest)?;
    zip.extract(dest).map_err(zip_error)?;
    debug!("Unpacked {} entries into {}", zip.len(), dest.display());
    Ok(zip.len())
}

/// Store a pulled archive next to `local`, unpack it if asked, and report
/// what ended up on disk.
pub fn receive(bytes: &[u8], local: &Path, compress: CompressSpec) -> Result<Value> {
    let parent = match local.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let artifact = ArchiveArtifact::create_in(&parent, compress.cleanup)?;
    {
        let mut file = artifact.file()?;
        file.write_all(bytes)?;
        file.flush()?;
    }

    // Reject anything that is not a readable zip before touching `local`
    let check = ZipArchive::new(File::open(artifact.path())?);
    if let Err(e) = check {
        artifact.discard();
        return Err(zip_error(e));
    }

    let unpacked = if compress.unpack {
        unpack(artifact.path(), local)?;
        true
    } else {
        false
    };

    let kept = artifact.finish()?;
    Ok(json!({
        "status": true,
        "local": {
            "path": local.display().to_string(),
            "archive": kept.map(|p| p.display().to_string()),
            "unpacked": unpacked,
            "bytes": bytes.len(),
        }
    }))
}
