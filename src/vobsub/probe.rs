//! Try to guess the types of files on disk.

use crate::errors::VobSubError;
use std::{fs, io::Read as _, path::Path};

/// Internal helper function which looks for "magic" bytes at the start of
/// a file. A file shorter than `magic` is simply not a match, not an error.
fn has_magic(path: &Path, magic: &[u8]) -> Result<bool, VobSubError> {
    let mut f = fs::File::open(path)?;
    let mut bytes = vec![0; magic.len()];
    match f.read_exact(&mut bytes) {
        Ok(()) => Ok(magic == &bytes[..]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Does the specified path appear to point to an `*.idx` file?
/// # Errors
///
/// Will return `Err` if the file can't be read.
pub fn is_idx_file<P: AsRef<Path>>(path: P) -> Result<bool, VobSubError> {
    has_magic(path.as_ref(), b"# VobSub index file")
}

/// Does the specified path appear to point to a `*.sub` file?
///
/// Note that this may (or may not) return false positives for certain
/// MPEG-2 related formats.
///
/// # Errors
///
/// Will return `Err` if the file can't be read.
pub fn is_sub_file<P: AsRef<Path>>(path: P) -> Result<bool, VobSubError> {
    has_magic(path.as_ref(), &[0x00, 0x00, 0x01, 0xba])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    struct TempFile(std::path::PathBuf);
    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn fixture(bytes: &[u8]) -> (TempFile, std::path::PathBuf) {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "vobsub_codec_probe_test_{:x}",
            std::ptr::addr_of!(bytes[0]) as usize
        ));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        (TempFile(path.clone()), path)
    }

    #[test]
    fn probe_idx_files() {
        let (_idx_guard, idx_path) = fixture(b"# VobSub index file, v7 (do not modify this line!)\n");
        let (_sub_guard, sub_path) = fixture(&[0x00, 0x00, 0x01, 0xba, 0, 0, 0, 0]);
        assert!(is_idx_file(&idx_path).unwrap());
        assert!(!is_idx_file(&sub_path).unwrap());
    }

    #[test]
    fn probe_sub_files() {
        let (_idx_guard, idx_path) = fixture(b"# VobSub index file, v7 (do not modify this line!)\n");
        let (_sub_guard, sub_path) = fixture(&[0x00, 0x00, 0x01, 0xba, 0, 0, 0, 0]);
        assert!(is_sub_file(&sub_path).unwrap());
        assert!(!is_sub_file(&idx_path).unwrap());
    }

    #[test]
    fn a_truncated_file_is_not_a_match_rather_than_an_error() {
        let (_guard, path) = fixture(&[0x00, 0x00]);
        assert!(!is_idx_file(&path).unwrap());
        assert!(!is_sub_file(&path).unwrap());
    }
}
