// src/io/byte_io.rs

//! Random-access byte I/O over one open MP4 file.
//!
//! `ByteIo` owns the file handle, a cursor and the cached file length. Every
//! atom operation reaches the disk through it; atoms never hold a handle of
//! their own.

use crate::utils::error::{Mp4Error, Result};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Largest file the library accepts (32-bit signed offsets).
pub const MAX_FILE_SIZE: u64 = i32::MAX as u64;

/// Block size used for bulk copies.
const COPY_BLOCK: usize = 64 * 1024;

/// A positioned reader/writer over a single file.
#[derive(Debug)]
pub struct ByteIo {
    file: File,
    path: PathBuf,
    len: u64,
    pos: u64,
    writable: bool,
}

impl ByteIo {
    /// Opens an existing file.
    ///
    /// Returns `NotFound` if the file does not exist and `NotSupported` if it
    /// is too large for 32-bit offsets.
    pub fn open<P: AsRef<Path>>(path: P, read_write: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(read_write)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => Mp4Error::NotFound(path.display().to_string()),
                _ => Mp4Error::Io(e),
            })?;

        let len = file.metadata()?.len();
        if len > MAX_FILE_SIZE {
            return Err(Mp4Error::NotSupported(format!(
                "{} is {} bytes, files must stay below 2 GiB",
                path.display(),
                len
            )));
        }

        Ok(ByteIo {
            file,
            path: path.to_path_buf(),
            len,
            pos: 0,
            writable: read_write,
        })
    }

    /// Creates (or truncates) a file for reading and writing.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(ByteIo {
            file,
            path: path.to_path_buf(),
            len: 0,
            pos: 0,
            writable: true,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached length of the file in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Moves the cursor. Positions past the end of the file are rejected.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.len {
            return Err(Mp4Error::OutOfRange(format!(
                "seek to {} beyond file end {}",
                offset, self.len
            )));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        Ok(())
    }

    /// Fills `buf` from the cursor and advances it.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let end = self.pos + buf.len() as u64;
        if end > self.len {
            return Err(Mp4Error::OutOfRange(format!(
                "read of {} bytes at {} beyond file end {}",
                buf.len(),
                self.pos,
                self.len
            )));
        }
        self.file.seek(SeekFrom::Start(self.pos))?;
        self.file.read_exact(buf)?;
        self.pos = end;
        Ok(())
    }

    /// Fills `buf` from `offset`; the cursor is left where it was.
    pub fn read_from(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let saved = self.pos;
        self.pos = offset;
        let result = self.read(buf);
        self.pos = saved;
        result
    }

    /// Writes `buf` at the cursor and advances it, growing the file if needed.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let end = self.pos + buf.len() as u64;
        if end > MAX_FILE_SIZE {
            return Err(Mp4Error::NotEnoughSpace(format!(
                "write of {} bytes at {} exceeds the 2 GiB limit",
                buf.len(),
                self.pos
            )));
        }
        self.file.seek(SeekFrom::Start(self.pos))?;
        self.file.write_all(buf)?;
        self.pos = end;
        self.len = self.len.max(end);
        Ok(())
    }

    /// Writes `buf` at `offset`; the cursor is left where it was.
    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        if offset > self.len {
            return Err(Mp4Error::OutOfRange(format!(
                "write at {} would leave a hole after file end {}",
                offset, self.len
            )));
        }
        let saved = self.pos;
        self.pos = offset;
        let result = self.write(buf);
        self.pos = saved;
        result
    }

    /// Shrinks or extends the file to `len` bytes.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.ensure_writable()?;
        self.file.set_len(len)?;
        self.len = len;
        self.pos = self.pos.min(len);
        Ok(())
    }

    /// Copies `total` bytes starting at `from` in `src` into this file.
    ///
    /// The destination is `to`, or the cursor when `to` is `None`; in the
    /// latter case the cursor ends up after the copied bytes.
    pub fn copy_from(
        &mut self,
        src: &mut ByteIo,
        from: u64,
        total: u64,
        to: Option<u64>,
    ) -> Result<()> {
        self.ensure_writable()?;
        let mut dst = to.unwrap_or(self.pos);
        let mut src_pos = from;
        let mut remaining = total;
        let mut block = vec![0u8; COPY_BLOCK.min(total as usize)];

        while remaining > 0 {
            let n = remaining.min(COPY_BLOCK as u64) as usize;
            src.read_from(src_pos, &mut block[..n])?;
            self.write_at(dst, &block[..n])?;
            src_pos += n as u64;
            dst += n as u64;
            remaining -= n as u64;
        }

        if to.is_none() {
            self.pos = dst;
        }
        Ok(())
    }

    /// Moves `total` bytes from `from` to `to` inside this file.
    ///
    /// Overlapping ranges are handled by copying back to front when the
    /// destination lies after the source.
    pub fn copy_within(&mut self, from: u64, total: u64, to: u64) -> Result<()> {
        self.ensure_writable()?;
        if from == to || total == 0 {
            return Ok(());
        }
        if from + total > self.len {
            return Err(Mp4Error::OutOfRange(format!(
                "copy source {}..{} beyond file end {}",
                from,
                from + total,
                self.len
            )));
        }

        let mut block = vec![0u8; COPY_BLOCK.min(total as usize)];
        if to < from {
            let mut done = 0u64;
            while done < total {
                let n = (total - done).min(COPY_BLOCK as u64) as usize;
                self.read_from(from + done, &mut block[..n])?;
                self.write_at(to + done, &block[..n])?;
                done += n as u64;
            }
        } else {
            let mut remaining = total;
            while remaining > 0 {
                let n = remaining.min(COPY_BLOCK as u64) as usize;
                let start = remaining - n as u64;
                self.read_from(from + start, &mut block[..n])?;
                // Writes past the current end must not leave a hole.
                if to + start > self.len {
                    let gap = vec![0u8; (to + start - self.len) as usize];
                    let end = self.len;
                    self.write_at(end, &gap)?;
                }
                self.write_at(to + start, &block[..n])?;
                remaining -= n as u64;
            }
        }

        debug!(
            "{}: moved {} bytes from {} to {}",
            self.path.display(),
            total,
            from,
            to
        );
        Ok(())
    }

    /// Flushes file data to disk.
    pub fn flush(&mut self) -> Result<()> {
        if self.writable {
            self.file.flush()?;
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Mp4Error::ReadOnly(format!(
                "{} was opened read-only",
                self.path.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn file_with(bytes: &[u8]) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().expect("temp file");
        tmp.write_all(bytes).expect("write temp file");
        tmp.flush().expect("flush temp file");
        tmp
    }

    #[test]
    fn read_advances_and_read_from_restores() {
        let tmp = file_with(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let mut io = ByteIo::open(tmp.path(), false).unwrap();
        assert_eq!(io.len(), 8);

        let mut buf = [0u8; 3];
        io.read(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2]);
        assert_eq!(io.position(), 3);

        io.read_from(5, &mut buf).unwrap();
        assert_eq!(buf, [5, 6, 7]);
        assert_eq!(io.position(), 3);
    }

    #[test]
    fn read_past_end_is_out_of_range() {
        let tmp = file_with(&[0, 1, 2, 3]);
        let mut io = ByteIo::open(tmp.path(), false).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            io.read_from(2, &mut buf),
            Err(Mp4Error::OutOfRange(_))
        ));
        assert!(matches!(io.seek(5), Err(Mp4Error::OutOfRange(_))));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = ByteIo::open(dir.path().join("missing.mp4"), false);
        assert!(matches!(result, Err(Mp4Error::NotFound(_))));
    }

    #[test]
    fn read_only_rejects_writes() {
        let tmp = file_with(&[0; 4]);
        let mut io = ByteIo::open(tmp.path(), false).unwrap();
        assert!(matches!(io.write(&[1]), Err(Mp4Error::ReadOnly(_))));
        assert!(matches!(io.truncate(2), Err(Mp4Error::ReadOnly(_))));
    }

    #[test]
    fn copy_within_handles_forward_overlap() {
        let tmp = file_with(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let mut io = ByteIo::open(tmp.path(), true).unwrap();
        io.copy_within(0, 6, 3).unwrap();

        let mut buf = [0u8; 10];
        io.read_from(0, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 1, 2, 3, 4, 5, 6, 10]);
    }

    #[test]
    fn copy_within_handles_backward_overlap() {
        let tmp = file_with(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let mut io = ByteIo::open(tmp.path(), true).unwrap();
        io.copy_within(4, 6, 1).unwrap();

        let mut buf = [0u8; 10];
        io.read_from(0, &mut buf).unwrap();
        assert_eq!(buf, [1, 5, 6, 7, 8, 9, 10, 8, 9, 10]);
    }

    #[test]
    fn copy_from_other_file_appends_at_cursor() {
        let src_tmp = file_with(b"abcdefgh");
        let mut src = ByteIo::open(src_tmp.path(), false).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut dst = ByteIo::create(dir.path().join("out.bin")).unwrap();

        dst.write(b"xy").unwrap();
        dst.copy_from(&mut src, 2, 4, None).unwrap();
        assert_eq!(dst.position(), 6);
        assert_eq!(dst.len(), 6);

        let mut buf = [0u8; 6];
        dst.read_from(0, &mut buf).unwrap();
        assert_eq!(&buf, b"xycdef");
    }

    #[test]
    fn truncate_updates_cached_length() {
        let tmp = file_with(&[0; 16]);
        let mut io = ByteIo::open(tmp.path(), true).unwrap();
        io.seek(12).unwrap();
        io.truncate(10).unwrap();
        assert_eq!(io.len(), 10);
        assert_eq!(io.position(), 10);
        assert_eq!(std::fs::metadata(tmp.path()).unwrap().len(), 10);
    }
}
