//! Size and content hash of artifacts on local disk.

use anyhow::Context;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use super::error::QueueError;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// What the queue remembers about an artifact at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub file_size: u64,
    /// `sha256:<hex>`
    pub checksum: String,
}

/// Hash the file on a blocking thread.
pub async fn inspect(path: &Path) -> Result<ArtifactInfo, QueueError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || inspect_blocking(&path))
        .await
        .context("Checksum task failed")?
}

/// Fails with `ArtifactMissing` or `ArtifactCorrupted` if the file no longer
/// matches what was recorded at enqueue time.
pub async fn verify(path: &Path, file_size: u64, checksum: &str) -> Result<(), QueueError> {
    let actual = inspect(path).await?;
    if actual.file_size != file_size {
        return Err(QueueError::ArtifactCorrupted {
            path: path.to_path_buf(),
            reason: format!(
                "size changed from {} to {} bytes",
                file_size, actual.file_size
            ),
        });
    }
    if actual.checksum != checksum {
        return Err(QueueError::ArtifactCorrupted {
            path: path.to_path_buf(),
            reason: format!("checksum changed from {} to {}", checksum, actual.checksum),
        });
    }
    Ok(())
}

fn inspect_blocking(path: &Path) -> Result<ArtifactInfo, QueueError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(QueueError::ArtifactMissing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        return Err(QueueError::ArtifactMissing(path.to_path_buf()));
    }

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut file_size = 0u64;
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        file_size += read as u64;
    }

    Ok(ArtifactInfo {
        file_size,
        checksum: format!("sha256:{:x}", hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_inspect_known_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"abc").unwrap();

        let info = inspect(&path).await.unwrap();
        assert_eq!(info.file_size, 3);
        assert_eq!(
            info.checksum,
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_inspect_larger_than_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let content = vec![7u8; READ_BUFFER_SIZE * 3 + 17];
        std::fs::write(&path, &content).unwrap();

        let info = inspect(&path).await.unwrap();
        assert_eq!(info.file_size, content.len() as u64);
        assert_eq!(
            info.checksum,
            format!("sha256:{:x}", Sha256::digest(&content))
        );
    }

    #[tokio::test]
    async fn test_inspect_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.mp4");

        let result = inspect(&path).await;
        assert!(matches!(result, Err(QueueError::ArtifactMissing(p)) if p == path));
    }

    #[tokio::test]
    async fn test_inspect_directory_is_missing() {
        let dir = tempdir().unwrap();

        let result = inspect(dir.path()).await;
        assert!(matches!(result, Err(QueueError::ArtifactMissing(_))));
    }

    #[tokio::test]
    async fn test_verify_detects_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"original content").unwrap();
        let info = inspect(&path).await.unwrap();

        verify(&path, info.file_size, &info.checksum).await.unwrap();

        // Same length, different bytes
        std::fs::write(&path, b"modified content").unwrap();
        let result = verify(&path, info.file_size, &info.checksum).await;
        assert!(
            matches!(result, Err(QueueError::ArtifactCorrupted { ref reason, .. }) if reason.contains("checksum"))
        );

        // Truncated
        std::fs::write(&path, b"orig").unwrap();
        let result = verify(&path, info.file_size, &info.checksum).await;
        assert!(
            matches!(result, Err(QueueError::ArtifactCorrupted { ref reason, .. }) if reason.contains("size"))
        );

        std::fs::remove_file(&path).unwrap();
        let result = verify(&path, info.file_size, &info.checksum).await;
        assert!(matches!(result, Err(QueueError::ArtifactMissing(_))));
    }
}
