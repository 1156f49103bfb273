//! Zip packing and unpacking of resource directories.

use crate::error::CacheError;

use std::fs::{self, File};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Unpacks an in-memory zip archive into `dst`, creating it if needed.
pub fn extract(data: &[u8], dst: &Path) -> Result<(), CacheError> {
    extract_from(ZipArchive::new(Cursor::new(data))?, dst)
}

/// Unpacks the zip archive at `src` into `dst`.
pub fn extract_file(src: &Path, dst: &Path) -> Result<(), CacheError> {
    extract_from(ZipArchive::new(File::open(src)?)?, dst)
}

fn extract_from<R: Read + Seek>(mut archive: ZipArchive<R>, dst: &Path) -> Result<(), CacheError> {
    fs::create_dir_all(dst)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping archive entry with unsafe path [{}]", entry.name());
            continue;
        };
        let out = dst.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        std::io::copy(&mut entry, &mut file)?;
    }
    Ok(())
}

/// Packs every file below `src_dir` into a new zip file at `dst_zip`.
pub fn compress(src_dir: &Path, dst_zip: &Path) -> Result<(), CacheError> {
    compress_into(src_dir, File::create(dst_zip)?, Some(dst_zip))?;
    Ok(())
}

/// Packs every file below `src_dir` into an in-memory zip archive.
pub fn compress_to_vec(src_dir: &Path) -> Result<Vec<u8>, CacheError> {
    let cursor = compress_into(src_dir, Cursor::new(Vec::new()), None)?;
    Ok(cursor.into_inner())
}

fn compress_into<W: Write + Seek>(
    src_dir: &Path,
    sink: W,
    skip: Option<&Path>,
) -> Result<W, CacheError> {
    let mut writer = ZipWriter::new(sink);
    let options = SimpleFileOptions::default();

    for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if skip.is_some_and(|skip| skip == entry.path()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(src_dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            writer.add_directory(name, options)?;
        } else {
            writer.start_file(name, options)?;
            let mut file = File::open(entry.path())?;
            std::io::copy(&mut file, &mut writer)?;
        }
    }

    Ok(writer.finish()?)
}
