//! Rendered invoice storage.
//!
//! Artifacts are addressed by (room number, month, language) and laid out as
//! `<root>/YYYY_MM/invoice_room_<number>_<YYYY_MM>_<lang>.txt`.

use super::renderer::Language;
use crate::{core::month::month_slug, errors::Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Address of one rendered invoice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub room_number: String,
    pub month: NaiveDate,
    pub language: Language,
}

impl ArtifactKey {
    #[must_use]
    pub fn new(room_number: &str, month: NaiveDate, language: Language) -> Self {
        Self {
            room_number: room_number.to_string(),
            month,
            language,
        }
    }

    /// File name shown to recipients.
    #[must_use]
    pub fn file_name(&self) -> String {
        let slug = month_slug(self.month);
        let room: String = self
            .room_number
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("invoice_room_{room}_{slug}_{}.txt", self.language.code())
    }

    /// Path relative to the store root.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        Path::new(&month_slug(self.month)).join(self.file_name())
    }
}

/// Persists rendered invoices.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Whether the artifact exists.
    async fn exists(&self, key: &ArtifactKey) -> Result<bool>;

    /// Artifact bytes, or `None` when absent.
    async fn load(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>>;

    /// Stores (or replaces) an artifact.
    async fn save(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<()>;
}

/// Stores artifacts as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute location of an artifact.
    #[must_use]
    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.relative_path())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn exists(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }

    async fn load(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "Invoice artifact written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    fn feb_2025() -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(2025, 2, 1).ok_or(Error::Validation {
            message: "bad date".to_string(),
        })
    }

    #[test]
    fn test_artifact_layout() -> Result<()> {
        let key = ArtifactKey::new("A1", feb_2025()?, Language::English);
        assert_eq!(key.file_name(), "invoice_room_A1_2025_02_en.txt");
        assert_eq!(
            key.relative_path(),
            PathBuf::from("2025_02").join("invoice_room_A1_2025_02_en.txt")
        );

        let odd = ArtifactKey::new("B/2", feb_2025()?, Language::Khmer);
        assert_eq!(odd.file_name(), "invoice_room_B_2_2025_02_kh.txt");
        Ok(())
    }

    #[tokio::test]
    async fn test_fs_store_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FsArtifactStore::new(dir.path());
        let key = ArtifactKey::new("A1", feb_2025()?, Language::French);

        assert!(!store.exists(&key).await?);
        assert!(store.load(&key).await?.is_none());

        store.save(&key, b"FACTURE").await?;
        assert!(store.exists(&key).await?);
        assert_eq!(store.load(&key).await?.as_deref(), Some(&b"FACTURE"[..]));
        assert!(store.path_for(&key).starts_with(dir.path().join("2025_02")));
        Ok(())
    }
}
