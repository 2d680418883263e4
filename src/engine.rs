//! The pairing engine: one serialized unit of work per image.
//!
//! ```text
//!  ImageAnalysis ─▶ dedup ─▶ parse name ─▶ pending buffer ─┬─▶ Pending
//!                    │           │                         │
//!                    ▼           ▼                         ▼ pair complete
//!                Duplicate    Rejected              growth ─▶ commit ─▶ Paired
//!                                                                  │
//!                                                                  ▼
//!                                                          notifier (after lock)
//! ```
//!
//! All state (processed identifiers, per-plant pending pairs, history
//! load/commit) is touched only while the engine lock is held. Waiting for
//! the lock can be abandoned freely; once the lock is acquired the unit of
//! work runs on its own task and finishes even if the caller goes away.
//!
//! Identifiers of a completed pair are admitted only after the history
//! commit succeeds. A unit of work that fails (or panics) restores the
//! plant's pending buffer to its state before the call, so resubmitting the
//! same image is treated as new.
//!
//! Completion notifications run on tracked tasks after the lock is
//! released. Call [`GrowthEngine::drain_notifications`] before shutting the
//! runtime down so the last deliveries are not dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinSet;

use crate::dedup::DedupGuard;
use crate::error::{IngestError, IngestResult};
use crate::growth::build_block;
use crate::history::HistoryStore;
use crate::identifier::{dedup_identifier, parse_pair_key, IdentifierError};
use crate::models::{Block, ImageAnalysis, ImageRecord};
use crate::pending::{PairProgress, PendingPairBuffer};
use crate::traits::CompletionNotifier;

/// What happened to one submitted image.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The image completed a pair; `block` was appended to the plant's history.
    Paired {
        plant: String,
        block: Block,
        evicted: Vec<String>,
    },
    /// The image is waiting for its partner.
    Pending {
        plant: String,
        group_id: String,
        evicted: Vec<String>,
    },
    /// The file name carries no usable group/position; the image was dropped.
    Rejected {
        file_key: String,
        reason: IdentifierError,
    },
    /// The image was already accounted.
    Duplicate { identifier: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Paired { .. } => "paired",
            Outcome::Pending { .. } => "pending",
            Outcome::Rejected { .. } => "rejected",
            Outcome::Duplicate { .. } => "duplicate",
        }
    }

    /// Orphan groups discarded while handling this image.
    pub fn evicted(&self) -> &[String] {
        match self {
            Outcome::Paired { evicted, .. } | Outcome::Pending { evicted, .. } => evicted,
            _ => &[],
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Paired { plant, block, .. } => write!(
                f,
                "paired {} + {} for {} (area {} px, growth {:+} px / {}%)",
                block.images[0].file_key,
                block.images[1].file_key,
                plant,
                block.global_area_pixels,
                block.global_growth,
                block.global_growth_percent
            ),
            Outcome::Pending {
                plant, group_id, ..
            } => write!(f, "pending group {} for {}", group_id, plant),
            Outcome::Rejected { reason, .. } => write!(f, "rejected: {}", reason),
            Outcome::Duplicate { identifier } => write!(f, "duplicate {}", identifier),
        }
    }
}

/// Mutable accumulators guarded by the engine lock.
#[derive(Default)]
struct EngineState {
    dedup: DedupGuard,
    pending: HashMap<String, PendingPairBuffer>,
}

/// Holds the engine lock for one unit of work.
///
/// Dropping it without [`PendingRollback::keep`] puts the plant's pending
/// buffer back as it was when the lock was taken. Drop also runs while a
/// panicking task unwinds.
struct PendingRollback {
    guard: OwnedMutexGuard<EngineState>,
    plant: String,
    snapshot: Option<PendingPairBuffer>,
}

impl PendingRollback {
    fn new(guard: OwnedMutexGuard<EngineState>, plant: &str) -> Self {
        let snapshot = guard.pending.get(plant).cloned().unwrap_or_default();
        Self {
            guard,
            plant: plant.to_string(),
            snapshot: Some(snapshot),
        }
    }

    fn keep(mut self) {
        self.snapshot = None;
    }
}

impl Drop for PendingRollback {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.guard.pending.insert(self.plant.clone(), snapshot);
        }
    }
}

/// Shared handle to one engine instance. Clones share the same state.
#[derive(Clone)]
pub struct GrowthEngine {
    state: Arc<Mutex<EngineState>>,
    store: HistoryStore,
    notifier: Option<Arc<dyn CompletionNotifier>>,
    notifications: Arc<Mutex<JoinSet<()>>>,
    default_plant: String,
}

impl GrowthEngine {
    pub fn new(store: HistoryStore, default_plant: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState::default())),
            store,
            notifier: None,
            notifications: Arc::new(Mutex::new(JoinSet::new())),
            default_plant: default_plant.into(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn default_plant(&self) -> &str {
        &self.default_plant
    }

    /// Account one analysed image.
    pub async fn submit(&self, analysis: ImageAnalysis) -> IngestResult<Outcome> {
        let plant = analysis
            .plant
            .clone()
            .unwrap_or_else(|| self.default_plant.clone());

        let guard = self.state.clone().lock_owned().await;
        let store = self.store.clone();
        let outcome = tokio::spawn(async move {
            let mut unit = PendingRollback::new(guard, &plant);
            let result = apply(&mut unit.guard, &store, &plant, analysis).await;
            if result.is_ok() {
                unit.keep();
            }
            result
        })
        .await
        .map_err(|e| IngestError::Aborted(e.to_string()))??;

        if let (Outcome::Paired { plant, block, .. }, Some(notifier)) = (&outcome, &self.notifier)
        {
            let notifier = Arc::clone(notifier);
            let plant = plant.clone();
            let block = block.clone();
            let mut notifications = self.notifications.lock().await;
            while notifications.try_join_next().is_some() {}
            notifications.spawn(async move {
                if let Err(e) = notifier.notify(&plant, &block).await {
                    tracing::warn!(plant = %plant, error = %e, "completion notifier failed");
                }
            });
        }

        Ok(outcome)
    }

    /// Wait for every completion notification spawned so far.
    pub async fn drain_notifications(&self) {
        let mut pending = std::mem::take(&mut *self.notifications.lock().await);
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "completion notifier task aborted");
            }
        }
    }

    /// Number of groups waiting for a partner for `plant`.
    pub async fn pending_groups(&self, plant: &str) -> usize {
        let state = self.state.lock().await;
        state.pending.get(plant).map_or(0, PendingPairBuffer::len)
    }

    /// Number of identifiers accounted in memory.
    pub async fn processed_count(&self) -> usize {
        self.state.lock().await.dedup.len()
    }
}

/// The critical section. Runs with the engine lock held.
async fn apply(
    state: &mut EngineState,
    store: &HistoryStore,
    plant: &str,
    analysis: ImageAnalysis,
) -> IngestResult<Outcome> {
    let identifier = dedup_identifier(&analysis.file_key, analysis.capture_time);

    if state.dedup.contains(&identifier) {
        tracing::debug!(identifier = %identifier, "duplicate image (cached)");
        return Ok(Outcome::Duplicate { identifier });
    }

    let mut history = store.load().await?;
    if !state.dedup.check(&identifier, &history).is_new() {
        tracing::debug!(identifier = %identifier, "duplicate image (history)");
        return Ok(Outcome::Duplicate { identifier });
    }

    let key = match parse_pair_key(&analysis.file_key) {
        Ok(key) => key,
        Err(reason) => {
            tracing::warn!(file_key = %analysis.file_key, reason = %reason, "dropping unpairable image");
            return Ok(Outcome::Rejected {
                file_key: analysis.file_key,
                reason,
            });
        }
    };

    let record = ImageRecord::from_analysis(&analysis, identifier.clone());
    let added = state
        .pending
        .entry(plant.to_string())
        .or_default()
        .add(&key, record);

    for group in &added.evicted {
        tracing::info!(plant = %plant, group = %group, "discarded orphan pending pair");
    }
    if let Some(replaced) = &added.replaced {
        tracing::info!(
            plant = %plant,
            group = %key.group_id,
            replaced = %replaced.file_key,
            "newer capture replaced pending image"
        );
    }

    let pair = match added.progress {
        PairProgress::Pending => {
            state.dedup.admit(&identifier);
            tracing::debug!(plant = %plant, group = %key.group_id, position = %key.position, "awaiting partner");
            return Ok(Outcome::Pending {
                plant: plant.to_string(),
                group_id: key.group_id,
                evicted: added.evicted,
            });
        }
        PairProgress::Complete(pair) => pair,
    };

    let admitted = [pair[0].identifier.clone(), pair[1].identifier.clone()];
    let blocks = history.entry(plant.to_string()).or_default();
    let block = build_block(pair, blocks);
    blocks.push(block.clone());

    if let Err(e) = store.commit(&history).await {
        tracing::warn!(plant = %plant, group = %key.group_id, error = %e, "commit failed; pending pair restored");
        return Err(e);
    }

    for id in &admitted {
        state.dedup.admit(id);
    }

    tracing::info!(
        plant = %plant,
        group = %key.group_id,
        area = block.global_area_pixels,
        growth = block.global_growth,
        "appended capture block"
    );

    Ok(Outcome::Paired {
        plant: plant.to_string(),
        block,
        evicted: added.evicted,
    })
}
