//! Zip extraction into a provider directory.
//!
//! Each entry is written to its own staging file and renamed into place
//! once its size matches the size recorded in the archive. A failing entry
//! leaves every previously extracted entry committed.

use std::fs;
use std::io::{self, Read, Seek, Write};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

use super::error::FetchError;
use crate::storage::{sanitize_name, temp_path_for};

/// An entry committed to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    pub name: String,
    pub size: u64,
}

/// Extract the archive read from `reader` into `target_dir`, committing
/// entries one at a time
pub fn extract_zip<R: Read + Seek>(
    reader: R,
    target_dir: &Path,
) -> Result<Vec<ExtractedEntry>, FetchError> {
    let mut archive = ZipArchive::new(reader).map_err(|e| FetchError::Archive(e.to_string()))?;
    let mut extracted = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| FetchError::Archive(e.to_string()))?;
        let raw_name = entry.name().to_string();

        let relative = sanitize_name(&raw_name).map_err(|_| {
            FetchError::InvalidFormat(format!("unsafe archive entry name '{}'", raw_name))
        })?;
        let final_path = target_dir.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&final_path)?;
            continue;
        }

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = temp_path_for(&final_path);
        let declared = entry.size();
        let written = match write_entry(&mut entry, &temp_path) {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(FetchError::Archive(format!(
                    "entry '{}' unreadable: {}",
                    raw_name, e
                )));
            }
        };

        if written != declared {
            let _ = fs::remove_file(&temp_path);
            return Err(FetchError::SizeMismatch {
                name: raw_name,
                declared,
                transferred: written,
            });
        }

        fs::rename(&temp_path, &final_path)?;
        debug!(entry = %relative.display(), size = written, "Committed archive entry");

        extracted.push(ExtractedEntry {
            name: relative.to_string_lossy().into_owned(),
            size: written,
        });
    }

    Ok(extracted)
}

fn write_entry(entry: &mut impl Read, temp_path: &Path) -> io::Result<u64> {
    let mut out = fs::File::create(temp_path)?;
    let written = io::copy(entry, &mut out)?;
    out.flush()?;
    out.sync_all()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extracts_files_and_directories() {
        let temp = TempDir::new().unwrap();
        let data = build_zip(&[
            ("fonts/", b""),
            ("fonts/roboto.ttf", b"TTF-DATA"),
            ("LICENSE.txt", b"Apache"),
        ]);

        let entries = extract_zip(Cursor::new(&data), temp.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(fs::read(temp.path().join("fonts/roboto.ttf")).unwrap(), b"TTF-DATA");
        assert_eq!(fs::read(temp.path().join("LICENSE.txt")).unwrap(), b"Apache");
        assert!(!temp.path().join("LICENSE.txt.tmp").exists());
    }

    #[test]
    fn test_rejects_traversal_entries() {
        let temp = TempDir::new().unwrap();
        let data = build_zip(&[("../evil.sh", b"rm -rf")]);

        let err = extract_zip(Cursor::new(&data), &temp.path().join("google")).unwrap_err();
        assert!(matches!(err, FetchError::InvalidFormat(_)));
        assert!(!temp.path().join("evil.sh").exists());
    }

    #[test]
    fn test_corrupt_entry_keeps_earlier_entries() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.ttf"), b"previous").unwrap();

        let mut data = build_zip(&[("a.ttf", b"AAAAAAAAAAAA"), ("b.ttf", b"BBBBBBBBBBBB")]);
        let offset = data
            .windows(12)
            .position(|w| w == b"BBBBBBBBBBBB")
            .unwrap();
        data[offset] = b'X';

        let err = extract_zip(Cursor::new(&data), temp.path()).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(fs::read(temp.path().join("a.ttf")).unwrap(), b"AAAAAAAAAAAA");
        assert_eq!(fs::read(temp.path().join("b.ttf")).unwrap(), b"previous");
        assert!(!temp.path().join("b.ttf.tmp").exists());
    }

    /// Rewrite the uncompressed size recorded for `name` in both the local
    /// file header and the central directory
    fn patch_declared_size(data: &mut [u8], name: &str, size: u32) {
        let u16_at = |data: &[u8], at: usize| u16::from_le_bytes([data[at], data[at + 1]]) as usize;
        let mut patched = 0;

        for at in 0..data.len().saturating_sub(46) {
            let (size_at, name_len_at, name_at) = match &data[at..at + 4] {
                b"PK\x03\x04" => (at + 22, at + 26, at + 30),
                b"PK\x01\x02" => (at + 24, at + 28, at + 46),
                _ => continue,
            };
            let name_len = u16_at(data, name_len_at);
            if data.get(name_at..name_at + name_len) == Some(name.as_bytes()) {
                data[size_at..size_at + 4].copy_from_slice(&size.to_le_bytes());
                patched += 1;
            }
        }
        assert_eq!(patched, 2, "entry {} not found", name);
    }

    #[test]
    fn test_short_entry_is_a_size_mismatch() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.ttf"), b"previous").unwrap();

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file("a.ttf", options).unwrap();
        writer.write_all(b"AAAAAAAAAAAAAAAAAAAA").unwrap();
        writer.start_file("b.ttf", options).unwrap();
        writer.write_all(b"BBBBBBBBBBBBBBBBBBBB").unwrap();
        let mut data = writer.finish().unwrap().into_inner();
        patch_declared_size(&mut data, "b.ttf", 25);

        let err = extract_zip(Cursor::new(&data), temp.path()).unwrap_err();
        assert!(matches!(
            err,
            FetchError::SizeMismatch {
                ref name,
                declared: 25,
                transferred: 20,
            } if name == "b.ttf"
        ));
        assert!(err.is_retryable());
        assert_eq!(fs::read(temp.path().join("a.ttf")).unwrap(), b"AAAAAAAAAAAAAAAAAAAA");
        assert_eq!(fs::read(temp.path().join("b.ttf")).unwrap(), b"previous");
        assert!(!temp.path().join("b.ttf.tmp").exists());
    }

    #[test]
    fn test_garbage_is_an_archive_error() {
        let temp = TempDir::new().unwrap();
        let err = extract_zip(Cursor::new(b"<html>not a zip</html>"), temp.path()).unwrap_err();
        assert!(matches!(err, FetchError::Archive(_)));
    }
}
