//! Droplet content digests

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::errors::StagerError;
use crate::utils::hex;

const READ_CHUNK: usize = 64 * 1024;

/// Digest used as the droplet identity key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    /// Digest a byte slice
    pub fn digest_bytes(&self, data: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        }
    }
}

/// Digest the full content of a file, reading it in chunks
pub async fn file_digest(path: &Path, algorithm: DigestAlgorithm) -> Result<String, StagerError> {
    match algorithm {
        DigestAlgorithm::Sha1 => stream_digest::<Sha1>(path).await,
        DigestAlgorithm::Sha256 => stream_digest::<Sha256>(path).await,
    }
}

async fn stream_digest<D: Digest>(path: &Path) -> Result<String, StagerError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            DigestAlgorithm::Sha1.digest_bytes(b"BITS"),
            "d77e6195246d944913a35b6749e14763ebd6e709"
        );
        assert_eq!(
            DigestAlgorithm::Sha256.digest_bytes(b"BITS"),
            "94383f71bb67e1abe7b5f06eab59a146924dea7bf9362394ef5fc528051d48d1"
        );
    }

    #[tokio::test]
    async fn test_file_digest_matches_in_memory_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("droplet.tgz");
        // larger than one read chunk
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &content).await.unwrap();

        for algorithm in [DigestAlgorithm::Sha1, DigestAlgorithm::Sha256] {
            let from_file = file_digest(&path, algorithm).await.unwrap();
            assert_eq!(from_file, algorithm.digest_bytes(&content));
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let result = file_digest(Path::new("/nonexistent/droplet"), DigestAlgorithm::Sha1).await;
        assert!(matches!(result, Err(StagerError::IoError(_))));
    }
}
