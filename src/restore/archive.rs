// restoretool/src/restore/archive.rs
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use zip::ZipArchive;

use crate::errors::{RestoreError, Result};

// Fixed-size copy buffer so memory use stays independent of dump size.
pub const EXTRACT_CHUNK_SIZE: usize = 128 * 1024;

/// Decompresses the decrypted archive into a temp SQL file. The format is
/// sniffed rather than trusted from a name: historical producers shipped
/// dumps as single-entry zip containers, newer ones as raw gzip streams.
/// The zip probe runs first; gzip is the fallback.
pub fn extract_dump_from_archive(archive_path: &Path) -> Result<NamedTempFile> {
    if let Some(sql_file) = try_extract_zip(archive_path)? {
        return Ok(sql_file);
    }
    if let Some(sql_file) = try_extract_gzip(archive_path)? {
        return Ok(sql_file);
    }
    Err(RestoreError::UnsupportedArchive(format!(
        "{} is neither a zip container nor a gzip stream",
        archive_path.display()
    )))
}

fn try_extract_zip(archive_path: &Path) -> Result<Option<NamedTempFile>> {
    let archive_file = File::open(archive_path)?;
    let mut archive = match ZipArchive::new(archive_file) {
        Ok(archive) => archive,
        Err(_) => return Ok(None),
    };
    if archive.len() == 0 {
        return Ok(None);
    }

    let mut entry = match archive.by_index(0) {
        Ok(entry) => entry,
        Err(_) => return Ok(None),
    };
    let entry_name = entry.name().to_string();

    let mut sql_file = NamedTempFile::new()?;
    match copy_chunked(&mut entry, sql_file.as_file_mut()) {
        Ok(bytes) => {
            println!("✓ Extracted {} bytes from zip entry '{}'", bytes, entry_name);
            Ok(Some(sql_file))
        }
        Err(_) => Ok(None),
    }
}

fn try_extract_gzip(archive_path: &Path) -> Result<Option<NamedTempFile>> {
    let archive_file = File::open(archive_path)?;
    let mut decoder = GzDecoder::new(archive_file);

    let mut sql_file = NamedTempFile::new()?;
    match copy_chunked(&mut decoder, sql_file.as_file_mut()) {
        Ok(bytes) => {
            println!("✓ Extracted {} bytes from gzip stream", bytes);
            Ok(Some(sql_file))
        }
        Err(_) => Ok(None),
    }
}

fn copy_chunked<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> std::io::Result<u64> {
    let mut buffer = vec![0u8; EXTRACT_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
        total += bytes_read as u64;
    }
    writer.flush()?;
    Ok(total)
}
