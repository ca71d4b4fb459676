//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Sizing sources before a job starts
//! - Validating the destination directory
//! - Opening source/destination handles with explicit error classification
//! - The chunked copy loop shared by every worker

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{CopyError, CopyErrorKind, EngineError};

/// Byte length of a source file, or 0 when it cannot be stat'ed.
pub fn source_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Destination path for a source: destination dir joined with the source's base name.
///
/// A source without a base name (e.g. `/`) maps to the directory itself; opening it
/// as a source fails before anything is written there.
pub fn destination_path_for(destination: &Path, source: &Path) -> PathBuf {
    match source.file_name() {
        Some(name) => destination.join(name),
        None => destination.to_path_buf(),
    }
}

/// Check that the destination exists and is a directory.
///
/// Writability is not probed; a read-only directory surfaces as per-file
/// `DestinationUnwritable` failures.
pub fn check_destination_dir(path: &Path) -> Result<(), EngineError> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DestinationNotDirectory {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(EngineError::DestinationNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(EngineError::DestinationAccessDenied {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Open a source file for streamed reading.
///
/// Directories and other non-regular files are rejected up front since only
/// flat files are copied.
pub fn open_source(path: &Path) -> Result<fs::File, CopyError> {
    let file = fs::File::open(path)
        .map_err(|e| CopyError::from_io(CopyErrorKind::SourceUnreadable, path, &e))?;

    let metadata = file
        .metadata()
        .map_err(|e| CopyError::from_io(CopyErrorKind::SourceUnreadable, path, &e))?;
    if !metadata.is_file() {
        return Err(CopyError::new(
            CopyErrorKind::SourceUnreadable,
            path,
            "not a regular file",
        ));
    }

    Ok(file)
}

/// Create or truncate the destination file.
pub fn create_destination(path: &Path) -> Result<fs::File, CopyError> {
    fs::File::create(path)
        .map_err(|e| CopyError::from_io(CopyErrorKind::DestinationUnwritable, path, &e))
}

/// Why the copy loop stopped before reaching end of source.
#[derive(Debug)]
pub enum ChunkStop {
    /// The cancellation token was observed
    Cancelled,
    /// The per-task time limit elapsed
    TimedOut,
    /// A read failed
    Read(io::Error),
    /// A write or flush failed
    Write(io::Error),
}

/// Stream `reader` into `writer` in chunks of `chunk_size` bytes.
///
/// `gate` runs before every read; returning `Some(stop)` ends the loop without
/// touching either handle again. `on_chunk` runs after each chunk has been fully
/// written, with the number of bytes in that chunk. Returns the total byte count
/// once a read yields zero bytes.
pub fn copy_chunked<R, W, G, F>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
    mut gate: G,
    mut on_chunk: F,
) -> Result<u64, ChunkStop>
where
    R: Read,
    W: Write,
    G: FnMut(u64) -> Option<ChunkStop>,
    F: FnMut(u64),
{
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut copied: u64 = 0;

    loop {
        if let Some(stop) = gate(copied) {
            return Err(stop);
        }

        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ChunkStop::Read(e)),
        };

        writer
            .write_all(&buffer[..read])
            .map_err(ChunkStop::Write)?;

        copied += read as u64;
        on_chunk(read as u64);
    }

    writer.flush().map_err(ChunkStop::Write)?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that fails after handing out `ok_reads` chunks.
    struct FlakyReader {
        ok_reads: usize,
    }

    impl Read for FlakyReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.ok_reads == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "device went away"));
            }
            self.ok_reads -= 1;
            let n = buf.len().min(4);
            buf[..n].fill(7);
            Ok(n)
        }
    }

    /// Writer that refuses every write.
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_source_size_of_missing_file_is_zero() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        assert_eq!(source_size(&temp_dir.path().join("nope.bin")), 0);
    }

    #[test]
    fn test_source_size_of_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("data.bin");
        fs::write(&path, b"twelve bytes").expect("Failed to write file");
        assert_eq!(source_size(&path), 12);
    }

    #[test]
    fn test_destination_path_uses_base_name() {
        let dst = destination_path_for(Path::new("/backup"), Path::new("/home/u/report.pdf"));
        assert_eq!(dst, PathBuf::from("/backup/report.pdf"));
    }

    #[test]
    fn test_check_destination_dir() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        assert!(check_destination_dir(temp_dir.path()).is_ok());

        let missing = temp_dir.path().join("missing");
        assert!(matches!(
            check_destination_dir(&missing),
            Err(EngineError::DestinationNotFound { .. })
        ));

        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x").expect("Failed to write file");
        assert!(matches!(
            check_destination_dir(&file),
            Err(EngineError::DestinationNotDirectory { .. })
        ));
    }

    #[test]
    fn test_open_source_missing_is_unreadable() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let err = open_source(&temp_dir.path().join("ghost.txt")).expect_err("should fail");
        assert_eq!(err.kind, CopyErrorKind::SourceUnreadable);
        assert_eq!(err.file_name, "ghost.txt");
    }

    #[test]
    fn test_open_source_rejects_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let err = open_source(temp_dir.path()).expect_err("directory should be rejected");
        assert_eq!(err.kind, CopyErrorKind::SourceUnreadable);
        assert_eq!(err.reason, "not a regular file");
    }

    #[test]
    fn test_create_destination_in_missing_dir_is_unwritable() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("no_such_dir").join("out.bin");
        let err = create_destination(&path).expect_err("should fail");
        assert_eq!(err.kind, CopyErrorKind::DestinationUnwritable);
    }

    #[test]
    fn test_create_destination_truncates() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("out.bin");
        fs::write(&path, b"old contents that are long").expect("Failed to write file");

        let mut file = create_destination(&path).expect("Failed to create destination");
        file.write_all(b"new").expect("Failed to write");
        drop(file);

        assert_eq!(fs::read(&path).expect("Failed to read"), b"new");
    }

    #[test]
    fn test_copy_chunked_reports_every_chunk() {
        let data: Vec<u8> = (0..10u8).collect();
        let mut reader = Cursor::new(data.clone());
        let mut out = Vec::new();
        let mut chunks = Vec::new();

        let copied = copy_chunked(&mut reader, &mut out, 4, |_| None, |n| chunks.push(n))
            .expect("copy should succeed");

        assert_eq!(copied, 10);
        assert_eq!(out, data);
        assert_eq!(chunks, vec![4, 4, 2]);
    }

    #[test]
    fn test_copy_chunked_empty_source() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        let mut out = Vec::new();
        let mut chunks = 0;

        let copied = copy_chunked(&mut reader, &mut out, 4, |_| None, |_| chunks += 1)
            .expect("copy should succeed");

        assert_eq!(copied, 0);
        assert_eq!(chunks, 0);
    }

    #[test]
    fn test_copy_chunked_stops_writing_once_gate_closes() {
        let mut reader = Cursor::new(vec![1u8; 100]);
        let mut out = Vec::new();
        let mut gate_calls = 0;

        // Gate closes before the fourth read
        let result = copy_chunked(
            &mut reader,
            &mut out,
            10,
            |_| {
                gate_calls += 1;
                if gate_calls > 3 {
                    Some(ChunkStop::Cancelled)
                } else {
                    None
                }
            },
            |_| {},
        );

        assert!(matches!(result, Err(ChunkStop::Cancelled)));
        assert_eq!(out.len(), 30);
    }

    #[test]
    fn test_copy_chunked_read_error() {
        let mut reader = FlakyReader { ok_reads: 2 };
        let mut out = Vec::new();

        let result = copy_chunked(&mut reader, &mut out, 4, |_| None, |_| {});
        assert!(matches!(result, Err(ChunkStop::Read(_))));
        // Bytes read before the failure were still written
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn test_copy_chunked_write_error() {
        let mut reader = Cursor::new(vec![0u8; 16]);
        let mut reported = 0u64;

        let result = copy_chunked(&mut reader, &mut FullDisk, 4, |_| None, |n| reported += n);
        assert!(matches!(result, Err(ChunkStop::Write(_))));
        assert_eq!(reported, 0);
    }
}
