//! Append-only, whole-file JSON history.
//!
//! The history file maps plant name to its blocks in append order. Every
//! commit rewrites the whole structure: it is serialized into a staging
//! file next to the target, flushed to disk, then renamed over the target.
//! A failure at any point before the rename leaves the previously
//! committed file untouched.
//!
//! After a successful local commit the serialized bytes are handed to the
//! configured [`HistoryMirror`] (best effort). When no local file exists
//! yet, [`HistoryStore::load`] falls back to the mirrored copy so a fresh
//! host picks up where the fleet left off. If that copy could not be read,
//! the host starts empty and stops uploading until the mirror answers, so
//! it never replaces the fleet's history with its own.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{IngestError, IngestResult};
use crate::models::{Block, History};
use crate::traits::HistoryMirror;

/// File-backed history store with an optional remote mirror.
#[derive(Clone)]
pub struct HistoryStore {
    path: PathBuf,
    mirror: Option<(Arc<dyn HistoryMirror>, String)>,
    /// Set when the mirrored copy exists or may exist but was never read.
    mirror_unread: Arc<AtomicBool>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mirror: None,
            mirror_unread: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mirror every commit to `mirror` under `key`.
    pub fn with_mirror(mut self, mirror: Arc<dyn HistoryMirror>, key: impl Into<String>) -> Self {
        self.mirror = Some((mirror, key.into()));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file the next commit is staged into before the rename.
    pub fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "history.json".to_string());
        self.path.with_file_name(format!("{}.tmp", name))
    }

    /// Load the full history: local file first, then the mirror, else empty.
    pub async fn load(&self) -> IngestResult<History> {
        if let Some(history) = self.read_local()? {
            return Ok(history);
        }

        let Some((mirror, key)) = &self.mirror else {
            return Ok(History::new());
        };

        match mirror.fetch(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<History>(&bytes) {
                Ok(history) => {
                    self.mirror_unread.store(false, Ordering::SeqCst);
                    tracing::info!(key = %key, "seeded history from mirror");
                    Ok(history)
                }
                Err(e) => {
                    self.mirror_unread.store(true, Ordering::SeqCst);
                    tracing::error!(key = %key, error = %e, "mirrored history is unreadable; starting empty, uploads paused");
                    Ok(History::new())
                }
            },
            Ok(None) => {
                self.mirror_unread.store(false, Ordering::SeqCst);
                Ok(History::new())
            }
            Err(e) => {
                self.mirror_unread.store(true, Ordering::SeqCst);
                tracing::error!(key = %key, error = %e, "could not fetch mirrored history; starting empty, uploads paused");
                Ok(History::new())
            }
        }
    }

    /// Blocks recorded for one plant, in append order.
    pub async fn load_plant(&self, plant: &str) -> IngestResult<Vec<Block>> {
        let mut history = self.load().await?;
        Ok(history.remove(plant).unwrap_or_default())
    }

    /// Load, append one block for `plant`, and commit.
    pub async fn append(&self, plant: &str, block: Block) -> IngestResult<()> {
        let mut history = self.load().await?;
        history.entry(plant.to_string()).or_default().push(block);
        self.commit(&history).await
    }

    /// Persist `history` as the new committed state, then mirror it.
    pub async fn commit(&self, history: &History) -> IngestResult<()> {
        let bytes = serde_json::to_vec_pretty(history).map_err(|e| IngestError::Persist {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        write_atomic(&self.path, &self.staging_path(), &bytes).map_err(|source| {
            IngestError::Persist {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some((mirror, key)) = &self.mirror {
            if !self.mirror_writable(mirror.as_ref(), key).await {
                tracing::error!(key = %key, "mirrored history was never read on this host; not overwriting it");
            } else if let Err(e) = mirror.persist(&bytes, key).await {
                tracing::warn!(key = %key, error = %e, "history mirror failed; local commit kept");
            }
        }

        Ok(())
    }

    /// Whether uploading would not clobber a mirrored copy this host never read.
    ///
    /// While paused the mirror is asked again on every commit. Uploads resume
    /// once it answers that it holds no copy.
    async fn mirror_writable(&self, mirror: &dyn HistoryMirror, key: &str) -> bool {
        if !self.mirror_unread.load(Ordering::SeqCst) {
            return true;
        }
        match mirror.fetch(key).await {
            Ok(None) => {
                self.mirror_unread.store(false, Ordering::SeqCst);
                true
            }
            Ok(Some(_)) | Err(_) => false,
        }
    }

    fn read_local(&self) -> IngestResult<Option<History>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(IngestError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Some(History::new()));
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| IngestError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }
}

/// Write `bytes` to `staging`, sync it, then rename it over `target`.
fn write_atomic(target: &Path, staging: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let result = (|| {
        let mut file = fs::File::create(staging)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(staging, target)
    })();

    if result.is_err() && staging.is_file() {
        let _ = fs::remove_file(staging);
    }
    result
}
