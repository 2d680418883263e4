//! Seams to the engine's external collaborators.
//!
//! The engine owns pairing, dedup and growth accounting. Everything else
//! (moving bytes around, looking at pixels, running a classifier, shipping
//! results downstream) sits behind one of these traits so deployments and
//! tests can plug in their own implementations.
//!
//! ```text
//!   ImageFetcher ─▶ AreaExtractor ─▶ Classifier      (before the lock)
//!                                        │
//!                                        ▼
//!                                  GrowthEngine ───▶ HistoryMirror
//!                                        │           (inside the lock)
//!                                        ▼
//!                               CompletionNotifier   (after the lock)
//! ```
//!
//! All traits are `Send + Sync` and use `async-trait`, so implementations
//! can be shared across tokio tasks behind an `Arc`.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Block;

/// Retrieves raw image bytes by storage key.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;
}

/// Computes the plant's pixel area in an image.
#[async_trait]
pub trait AreaExtractor: Send + Sync {
    async fn extract_area(&self, image: &[u8]) -> Result<u64>;
}

/// Labels an image with a disease class.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<String>;
}

/// Durable replica of the history file.
///
/// Called after every successful local commit. Failures are logged by the
/// history store and never undo the commit.
#[async_trait]
pub trait HistoryMirror: Send + Sync {
    /// Upload the serialized history under `key`.
    async fn persist(&self, blob: &[u8], key: &str) -> Result<()>;

    /// Download the mirrored history, `None` if the mirror has no copy.
    ///
    /// Used once to seed a host that has no local history file yet.
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Receives each newly committed block for downstream delivery.
///
/// Invoked after the engine lock is released; failures are logged only.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, plant: &str, block: &Block) -> Result<()>;
}
