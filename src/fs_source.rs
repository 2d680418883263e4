//! Local-directory image source.
//!
//! Resolves storage keys against a root directory, so `captures/7_1_a.jpg`
//! reads `<root>/captures/7_1_a.jpg`. Keys that would escape the root
//! (absolute paths, `..` segments) are refused.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::traits::ImageFetcher;

pub struct FsImageSource {
    root: PathBuf,
}

impl FsImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("image key '{}' escapes the image root", key);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageFetcher for FsImageSource {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fetch_reads_relative_key() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("captures")).unwrap();
        std::fs::write(tmp.path().join("captures/7_1_a.jpg"), b"\xff\xd8jpeg").unwrap();

        let source = FsImageSource::new(tmp.path());
        let bytes = source.fetch("captures/7_1_a.jpg").await.unwrap();
        assert_eq!(bytes, b"\xff\xd8jpeg");
    }

    #[tokio::test]
    async fn test_missing_image_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let source = FsImageSource::new(tmp.path());
        assert!(source.fetch("7_1_a.jpg").await.is_err());
    }

    #[tokio::test]
    async fn test_refuses_escaping_keys() {
        let tmp = TempDir::new().unwrap();
        let source = FsImageSource::new(tmp.path());
        assert!(source.fetch("../etc/passwd").await.is_err());
        assert!(source.fetch("/etc/passwd").await.is_err());
    }
}
