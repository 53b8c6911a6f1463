//! Destination file preparation and positional I/O (spec §4.4).
//!
//! Writes use a `pwrite`-equivalent primitive on a single shared file
//! handle instead of a seek-then-write under a mutex, so concurrent
//! workers never contend on a cursor — the pattern this crate's sibling
//! `kdownload` example uses for the same reason.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt as WindowsFileExt;

/// Prepare the destination for range mode: (re)create and pre-size to
/// `file_size` if absent or mismatched, so every offset in `[0,
/// file_size)` is addressable for positional overwrite.
pub fn prepare_range_destination(dest: &Path, file_size: u64) -> io::Result<File> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let needs_resize = match std::fs::metadata(dest) {
        Ok(meta) => meta.len() != file_size,
        Err(_) => true,
    };
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(dest)?;
    if needs_resize {
        file.set_len(file_size)?;
    }
    Ok(file)
}

/// Prepare the destination for sequential mode: create empty if absent;
/// truncate to zero if it exists and is larger than `file_size` (presumed
/// corrupt). Never pre-sized — that would double-count bytes on append.
pub fn prepare_sequential_destination(dest: &Path, file_size: u64) -> io::Result<File> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let existing_len = std::fs::metadata(dest).map(|m| m.len()).unwrap_or(0);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(dest)?;
    if existing_len > file_size {
        file.set_len(0)?;
    }
    Ok(file)
}

#[cfg(unix)]
pub fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
pub fn write_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        let written = file.seek_write(buf, offset)?;
        if written == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "failed to write destination bytes",
            ));
        }
        buf = &buf[written..];
        offset += written as u64;
    }
    Ok(())
}

#[cfg(unix)]
pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
pub fn read_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        let read = file.seek_read(buf, offset)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short read of destination bytes",
            ));
        }
        buf = &mut buf[read..];
        offset += read as u64;
    }
    Ok(())
}
