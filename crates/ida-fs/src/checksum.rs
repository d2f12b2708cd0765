use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub const CHECKSUM_BLOCK_SIZE: usize = 64 * 1024;

/// SHA-256 of a regular file as lowercase hex, without an algorithm prefix.
///
/// Returns `Ok(None)` when `path` is missing or not a regular file.
pub fn sha256_file(path: &Path) -> Result<Option<String>> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("stat {}", path.display())),
    };
    if !meta.is_file() {
        return Ok(None);
    }

    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHECKSUM_BLOCK_SIZE];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        hasher.update(&buf[..n]);
    }
    Ok(Some(hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest_and_non_files() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("a.txt");
        std::fs::write(&f, b"test").unwrap();
        assert_eq!(
            sha256_file(&f).unwrap().as_deref(),
            Some("9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")
        );
        assert_eq!(sha256_file(dir.path()).unwrap(), None);
        assert_eq!(sha256_file(&dir.path().join("missing")).unwrap(), None);
    }

    #[test]
    fn spans_multiple_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("big.bin");
        let data = vec![7u8; CHECKSUM_BLOCK_SIZE * 2 + 17];
        std::fs::write(&f, &data).unwrap();
        let expected = hex::encode(Sha256::digest(&data));
        assert_eq!(sha256_file(&f).unwrap(), Some(expected));
    }
}
