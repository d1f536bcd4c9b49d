//! Artifact checksum calculation.
//!
//! Release entries carry an uppercase hex SHA-1 of the published package.
//! Bundle identifiers are derived from SHA-256 digests of bundled files.

use crate::bundler::{Result, error::ErrorExt};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::{io::Read, path::Path};

const CHUNK: usize = 8192;

/// Calculates the SHA-1 of a file as 40 uppercase hex characters.
///
/// Reads the file in 8KB chunks so large packages are not loaded whole.
///
/// # Arguments
///
/// * `path` - File to hash
///
/// # Returns
///
/// * `Ok(String)` - Uppercase hex SHA-1
/// * `Err` - If the file cannot be read
pub fn sha1_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).fs_context("opening file for hashing", path)?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; CHUNK];
    loop {
        let n = file
            .read(&mut buffer)
            .fs_context("reading file for hash calculation", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode_upper(hasher.finalize()))
}

/// SHA-256 of an in-memory buffer.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_is_uppercase_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha1_file(&path).unwrap(),
            "A9993E364706816ABA3E25717850C26C9CD0D89D"
        );
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
