//! Random-access, explicit-offset reads over a `.sub` file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::errors::BufferError;

/// A random-access view over a file, with big-endian fixed-width reads
/// at caller-supplied offsets.
///
/// Reads never advance an implicit cursor: every accessor takes the
/// offset it wants to read from. That's what makes it possible for
/// [`super::reader::SubpictureReader`] to reassemble a control header
/// out of fragments scattered across several packets without the
/// buffer's own state getting in the way.
///
/// The underlying file handle is closed when the `ByteBuffer` is
/// dropped, or explicitly via [`ByteBuffer::close`]; both paths are
/// equivalent, but `close` lets a caller surface a close-time error
/// (there isn't one on Unix-like platforms, but this keeps the API
/// honest about the resource it owns).
#[derive(Debug)]
pub struct ByteBuffer {
    file: File,
    size: u64,
    path: PathBuf,
}

impl ByteBuffer {
    /// Open `path` for random-access reads.
    ///
    /// # Errors
    /// Returns [`BufferError::Io`] if the file can't be opened or its
    /// length can't be determined.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BufferError> {
        let path = path.as_ref().to_owned();
        let mkerr = |source| BufferError::Io {
            source,
            path: path.clone(),
        };
        let file = File::open(&path).map_err(mkerr)?;
        let size = file.metadata().map_err(mkerr)?.len();
        Ok(Self { file, size, path })
    }

    /// Total size of the underlying file, in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Release the underlying file handle. Equivalent to dropping the
    /// `ByteBuffer`, provided for callers that want to make the point in
    /// the source where a stream's resources are released explicit.
    pub fn close(self) {
        drop(self);
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<(), BufferError> {
        if offset.checked_add(len as u64).is_none_or(|end| end > self.size) {
            return Err(BufferError::OutOfRange {
                offset,
                len,
                size: self.size,
            });
        }
        Ok(())
    }

    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), BufferError> {
        self.check_range(offset, buf.len())?;
        let mkerr = |source| BufferError::Io {
            source,
            path: self.path.clone(),
        };
        self.file.seek(SeekFrom::Start(offset)).map_err(mkerr)?;
        self.file.read_exact(buf).map_err(mkerr)?;
        Ok(())
    }

    /// Read a single byte at `offset`.
    ///
    /// # Errors
    /// Returns [`BufferError`] if `offset` is out of range or the
    /// underlying read fails.
    pub fn read_u8(&mut self, offset: u64) -> Result<u8, BufferError> {
        let mut buf = [0u8; 1];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf[0])
    }

    /// Read a big-endian `u16` at `offset`.
    ///
    /// # Errors
    /// Returns [`BufferError`] if `offset` is out of range or the
    /// underlying read fails.
    pub fn read_u16_be(&mut self, offset: u64) -> Result<u16, BufferError> {
        let mut buf = [0u8; 2];
        self.read_exact_at(offset, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Read a big-endian `u32` at `offset`.
    ///
    /// # Errors
    /// Returns [`BufferError`] if `offset` is out of range or the
    /// underlying read fails.
    pub fn read_u32_be(&mut self, offset: u64) -> Result<u32, BufferError> {
        let mut buf = [0u8; 4];
        self.read_exact_at(offset, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Read `len` bytes starting at `offset` into a fresh `Vec`.
    ///
    /// # Errors
    /// Returns [`BufferError`] if the range is out of bounds or the
    /// underlying read fails.
    pub fn read_bytes(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, BufferError> {
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn fixture(bytes: &[u8]) -> (tempfile_path::TempPath, ByteBuffer) {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "vobsub_codec_bytebuffer_test_{:x}",
            std::ptr::addr_of!(bytes) as usize
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        drop(f);
        let buf = ByteBuffer::open(&path).unwrap();
        (tempfile_path::TempPath(path), buf)
    }

    mod tempfile_path {
        pub struct TempPath(pub std::path::PathBuf);
        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
            }
        }
    }

    #[test]
    fn reads_fixed_width_big_endian_values() {
        let (_guard, mut buf) = fixture(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        assert_eq!(buf.size(), 8);
        assert_eq!(buf.read_u8(0).unwrap(), 0x00);
        assert_eq!(buf.read_u16_be(0).unwrap(), 0x0001);
        assert_eq!(buf.read_u32_be(0).unwrap(), 0x0001_0203);
        assert_eq!(buf.read_u32_be(4).unwrap(), 0x0405_0607);
    }

    #[test]
    fn out_of_range_reads_fail() {
        let (_guard, mut buf) = fixture(&[0x00, 0x01]);
        assert!(matches!(
            buf.read_u32_be(0),
            Err(BufferError::OutOfRange { .. })
        ));
        assert!(matches!(
            buf.read_u8(5),
            Err(BufferError::OutOfRange { .. })
        ));
    }

    #[test]
    fn reads_do_not_advance_a_cursor() {
        let (_guard, mut buf) = fixture(&[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(buf.read_u8(3).unwrap(), 0xDD);
        assert_eq!(buf.read_u8(0).unwrap(), 0xAA);
        assert_eq!(buf.read_u8(2).unwrap(), 0xCC);
    }
}
