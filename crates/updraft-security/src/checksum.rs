use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};

pub fn sha256_hex(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

pub fn sha256_reader_hex<R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = reader
            .read(&mut buffer)
            .context("failed reading payload for sha256")?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn sha256_file_hex(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    sha256_reader_hex(BufReader::new(file))
        .with_context(|| format!("failed to hash {}", path.display()))
}

/// Errors when the file's digest differs from `expected_hex`.
pub fn verify_sha256_file(path: &Path, expected_hex: &str) -> Result<()> {
    let actual = sha256_file_hex(path)?;
    if !actual.eq_ignore_ascii_case(expected_hex.trim()) {
        return Err(anyhow!(
            "sha256 mismatch for {}: expected {}, got {}",
            path.display(),
            expected_hex.trim(),
            actual
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_payload_matches_known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn reader_and_slice_digests_agree() {
        let payload = vec![7_u8; 200_000];
        let from_reader =
            sha256_reader_hex(payload.as_slice()).expect("reader hashing must succeed");
        assert_eq!(from_reader, sha256_hex(&payload));
    }

    #[test]
    fn verify_sha256_file_detects_mismatch() {
        let path = std::env::temp_dir().join(format!(
            "updraft-security-{}-{}.bin",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("system time")
                .as_nanos()
        ));
        std::fs::write(&path, b"abc").expect("must write payload");

        verify_sha256_file(
            &path,
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD",
        )
        .expect("uppercase digest must verify");
        assert!(verify_sha256_file(&path, &sha256_hex(b"abd")).is_err());

        let _ = std::fs::remove_file(&path);
    }
}
