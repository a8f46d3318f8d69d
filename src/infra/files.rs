//! Filesystem helpers for cache-owned asset files and raw response dumps.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Whether `path` currently exists as a regular file. I/O errors count as absent.
pub async fn backing_file_exists(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(metadata) => metadata.is_file(),
        Err(_) => false,
    }
}

/// Size of the file in bytes, or `None` when it cannot be inspected.
pub async fn backing_file_len(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .await
        .ok()
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
}

/// Remove a backing file. Returns the number of bytes reclaimed, or `None` when the file
/// was already gone.
pub async fn remove_backing_file(path: &Path) -> Result<Option<u64>, FileStoreError> {
    let size = backing_file_len(path).await;
    match fs::remove_file(path).await {
        Ok(()) => Ok(Some(size.unwrap_or(0))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(FileStoreError::Io(err)),
    }
}

/// Directory receiving raw generator responses that failed to decode.
#[derive(Debug, Clone)]
pub struct RawResponseStore {
    root: PathBuf,
}

impl RawResponseStore {
    /// Initialise the store rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `body` to a fresh file named after `label` and return its path.
    pub async fn store(&self, label: &str, body: &str) -> Result<PathBuf, FileStoreError> {
        let path = self.root.join(self.build_file_name(label));
        let mut file = fs::File::create(&path).await?;
        file.write_all(body.as_bytes()).await?;
        file.flush().await?;
        Ok(path)
    }

    fn build_file_name(&self, label: &str) -> String {
        let (year, month, day) = time::OffsetDateTime::now_utc().to_calendar_date();
        let label = sanitize_label(label);
        format!(
            "{year}{:02}{:02}-{label}-{}.txt",
            month as u8,
            day,
            Uuid::new_v4().simple()
        )
    }
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .take(32)
        .collect();
    if cleaned.is_empty() {
        "response".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remove_reports_reclaimed_bytes_and_tolerates_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("asset.png");
        fs::write(&path, b"12345").await.expect("write asset");

        assert!(backing_file_exists(&path).await);
        assert_eq!(remove_backing_file(&path).await.expect("remove"), Some(5));
        assert!(!backing_file_exists(&path).await);
        assert_eq!(remove_backing_file(&path).await.expect("remove twice"), None);
    }

    #[tokio::test]
    async fn raw_responses_land_under_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RawResponseStore::new(dir.path().join("raw")).expect("store");

        let path = store
            .store("abc/../def", "not json at all")
            .await
            .expect("store raw response");

        assert!(path.starts_with(store.root()));
        let name = path.file_name().and_then(|n| n.to_str()).expect("file name");
        assert!(name.contains("-abcdef-"));
        let contents = fs::read_to_string(&path).await.expect("read back");
        assert_eq!(contents, "not json at all");
    }
}
