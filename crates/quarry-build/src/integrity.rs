//! Checksum verification for downloaded tools.
//!
//! Checksums are declared as `<algo>:<hex>`; only sha256 is supported. Hex
//! comparison is case-insensitive.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Reader that hashes everything passing through it and can validate the
/// final digest against a declared checksum.
#[derive(Debug)]
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    expected: String,
}

impl<R: Read> HashingReader<R> {
    /// Wrap `inner`, validating later against `hash` (`sha256:<hex>`).
    pub fn new(inner: R, hash: &str) -> Result<Self> {
        let (algo, digest) = hash
            .split_once(':')
            .ok_or_else(|| Error::InvalidChecksum(hash.to_string()))?;
        if algo != "sha256" {
            return Err(Error::UnsupportedHashAlgorithm(algo.to_string()));
        }
        Ok(Self {
            inner,
            hasher: Sha256::new(),
            expected: digest.to_ascii_lowercase(),
        })
    }

    /// Drain whatever the consumer left unread, then compare the digest of
    /// the complete payload against the declared checksum.
    pub fn validate(mut self) -> Result<()> {
        io::copy(&mut self, &mut io::sink())?;
        let actual = hex::encode(self.hasher.finalize());
        if actual == self.expected {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch {
                expected: self.expected,
                actual,
            })
        }
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Checksum of a file on disk, in declaration form (`sha256:<hex>`).
pub fn checksum_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    #[test]
    fn validates_matching_checksum() {
        let data = b"tool archive bytes";
        let hash = format!("sha256:{}", sha256_hex(data));
        let reader = HashingReader::new(&data[..], &hash).unwrap();
        reader.validate().unwrap();
    }

    #[test]
    fn hex_comparison_is_case_insensitive() {
        let data = b"tool archive bytes";
        let hash = format!("sha256:{}", sha256_hex(data).to_uppercase());
        let reader = HashingReader::new(&data[..], &hash).unwrap();
        reader.validate().unwrap();
    }

    #[test]
    fn validates_remainder_left_by_partial_consumer() {
        let data = b"tool archive bytes";
        let hash = format!("sha256:{}", sha256_hex(data));
        let mut reader = HashingReader::new(&data[..], &hash).unwrap();
        let mut partial = [0u8; 4];
        reader.read_exact(&mut partial).unwrap();
        reader.validate().unwrap();
    }

    #[test]
    fn detects_mismatch() {
        let data = b"tool archive bytes";
        let hash = format!("sha256:{}", sha256_hex(b"something else"));
        let reader = HashingReader::new(&data[..], &hash).unwrap();
        let err = reader.validate().unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn rejects_malformed_declarations() {
        assert!(matches!(
            HashingReader::new(io::empty(), "deadbeef").unwrap_err(),
            Error::InvalidChecksum(_)
        ));
        assert!(matches!(
            HashingReader::new(io::empty(), "md5:deadbeef").unwrap_err(),
            Error::UnsupportedHashAlgorithm(algo) if algo == "md5"
        ));
    }

    #[test]
    fn checksum_file_matches_streamed_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binary");
        std::fs::write(&path, b"payload").unwrap();
        assert_eq!(
            checksum_file(&path).unwrap(),
            format!("sha256:{}", sha256_hex(b"payload"))
        );
    }
}
