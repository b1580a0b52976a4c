//! Streaming archive extraction for tool downloads.
//!
//! The format is selected from the URL suffix: `.tar.gz`/`.tgz` archives are
//! gunzipped and untarred straight off the stream; `.zip` archives are
//! buffered in memory first since zip needs random access; anything else is
//! reported as [`Error::UnknownArchiveFormat`] so the caller can store the
//! raw payload instead.

use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Cursor, ErrorKind, Read};
use std::os::unix::fs::{symlink, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use flate2::read::GzDecoder;
use tar::EntryType;
use tracing::debug;

use crate::error::{Error, Result};

/// Unpack the stream fetched from `url` into `dst`.
pub fn inflate(url: &str, reader: impl Read, dst: &Path) -> Result<()> {
    if url.ends_with(".tar.gz") || url.ends_with(".tgz") {
        debug!(url, dst = %dst.display(), "untarring archive");
        untar(GzDecoder::new(reader), dst)
    } else if url.ends_with(".zip") {
        debug!(url, dst = %dst.display(), "unzipping archive");
        unzip(reader, dst)
    } else {
        Err(Error::UnknownArchiveFormat(url.to_string()))
    }
}

fn untar(reader: impl Read, dst: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = dst.join(entry.path()?);
        let mode = entry.header().mode()? & 0o7777;

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&name)?;
                fs::set_permissions(&name, Permissions::from_mode(mode))?;
            }
            EntryType::Regular => {
                ensure_parent(&name)?;
                let mut file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .mode(mode)
                    .open(&name)?;
                io::copy(&mut entry, &mut file)?;
            }
            EntryType::Symlink => {
                ensure_parent(&name)?;
                let target = entry
                    .link_name()?
                    .ok_or_else(|| Error::UnsupportedArchiveEntry("symlink without target".into()))?
                    .into_owned();
                symlink(&target, &name)?;
            }
            EntryType::Link => {
                let linked = entry
                    .link_name()?
                    .ok_or_else(|| {
                        Error::UnsupportedArchiveEntry("hard link without target".into())
                    })?
                    .into_owned();
                let target = dst.join(linked);
                ensure_parent(&name)?;
                ensure_parent(&target)?;
                // The linked file may appear later in the archive; create an
                // empty placeholder that a subsequent entry overwrites.
                match OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(mode)
                    .open(&target)
                {
                    Ok(_) => {}
                    Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                    Err(err) => return Err(err.into()),
                }
                fs::hard_link(&target, &name)?;
            }
            other => {
                return Err(Error::UnsupportedArchiveEntry(format!("{other:?}")));
            }
        }
    }
    Ok(())
}

fn unzip(mut reader: impl Read, dst: &Path) -> Result<()> {
    // Zip cannot be decoded from a one-way reader; buffer the whole payload
    // in memory, which is feasible for tool-sized archives.
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;
    let mut archive = zip::ZipArchive::new(Cursor::new(buffer))?;

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let Some(relative) = file.enclosed_name() else {
            continue;
        };
        let out = dst.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&out)?;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&out, Permissions::from_mode(mode))?;
            }
            continue;
        }

        ensure_parent(&out)?;
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        if let Some(mode) = file.unix_mode() {
            options.mode(mode);
        }
        let mut target = options.open(&out)?;
        io::copy(&mut file, &mut target)?;
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
