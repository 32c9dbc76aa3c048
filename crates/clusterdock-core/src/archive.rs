//! Single-file tar archives for moving files in and out of containers.

use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ClusterError, Result};

/// Directory the archive produced by [`encode_file`] must be extracted at.
pub const ARCHIVE_ROOT: &str = "/";

const FILE_MODE: u32 = 0o644;

/// Build an in-memory tar holding one regular file at `path`.
///
/// The leading `/` is stripped so the member is relative to
/// [`ARCHIVE_ROOT`]. The modification time is set to now since some
/// consumers decide whether to reload a file by its timestamp.
pub fn encode_file(path: &str, contents: &[u8]) -> Result<Vec<u8>> {
    let relative = path.trim_start_matches('/');
    if relative.is_empty() {
        return Err(ClusterError::Archive(format!("invalid file path: {path:?}")));
    }

    let mtime = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());

    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(FILE_MODE);
    header.set_mtime(mtime);

    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_data(&mut header, relative, contents)
        .map_err(|e| ClusterError::Archive(format!("failed to add {path} to archive: {e}")))?;
    builder
        .into_inner()
        .map_err(|e| ClusterError::Archive(format!("failed to finish archive: {e}")))
}

/// Return the contents of the first member of a tar archive.
pub fn decode_first_file(archive: &[u8]) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(archive);
    let mut entries = archive
        .entries()
        .map_err(|e| ClusterError::Archive(format!("invalid archive: {e}")))?;

    let mut entry = entries
        .next()
        .ok_or_else(|| ClusterError::Archive("archive is empty".to_string()))?
        .map_err(|e| ClusterError::Archive(format!("invalid archive entry: {e}")))?;

    let mut contents = Vec::new();
    entry
        .read_to_end(&mut contents)
        .map_err(|e| ClusterError::Archive(format!("failed to read archive entry: {e}")))?;
    Ok(contents)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_encoded_member_is_relative() {
        let archive = encode_file("/etc/motd", b"hello").unwrap();
        let mut archive = tar::Archive::new(&archive[..]);
        let entry = archive.entries().unwrap().next().unwrap().unwrap();

        assert_eq!(entry.path().unwrap().to_str(), Some("etc/motd"));
        assert_eq!(entry.header().mode().unwrap(), 0o644);
        assert_eq!(entry.header().size().unwrap(), 5);
        assert!(entry.header().mtime().unwrap() > 0);
    }

    #[test]
    fn test_long_paths_are_supported() {
        let path = format!("/opt/{}/config.xml", "nested/".repeat(30));
        let archive = encode_file(&path, b"<x/>").unwrap();
        assert_eq!(decode_first_file(&archive).unwrap(), b"<x/>");
    }

    #[test]
    fn test_decode_returns_first_member_bytes() {
        let contents = [0u8, 159, 146, 150, 255];
        let archive = encode_file("/bin/blob", &contents).unwrap();
        assert_eq!(decode_first_file(&archive).unwrap(), contents);
    }

    #[test]
    fn test_root_path_rejected() {
        assert!(matches!(encode_file("/", b"x"), Err(ClusterError::Archive(_))));
    }

    #[test]
    fn test_empty_archive_rejected() {
        let empty = tar::Builder::new(Vec::new()).into_inner().unwrap();
        assert!(matches!(decode_first_file(&empty), Err(ClusterError::Archive(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode_first_file(b"definitely not a tarball").is_err());
    }
}
