//! Ingestion pipeline orchestration.
//!
//! Two ways into the engine:
//!
//! - [`Analyzer`] runs the external collaborators for one image (fetch →
//!   area extraction → classification) and then submits the result. The
//!   collaborators run before the engine lock is taken; any failure aborts
//!   the call with nothing committed.
//! - [`ingest_stream`] reads already-analysed images as JSON lines and
//!   submits them one by one. Each line is its own ingestion call: a bad
//!   line or a failed call is counted and logged, and the stream goes on.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::engine::{GrowthEngine, Outcome};
use crate::error::{IngestError, IngestResult};
use crate::history::HistoryStore;
use crate::models::ImageAnalysis;
use crate::notify::{LogNotifier, WebhookNotifier};
use crate::s3::S3Client;
use crate::traits::{AreaExtractor, Classifier, CompletionNotifier, ImageFetcher};

/// The collaborators needed to turn a storage key into an [`ImageAnalysis`].
#[derive(Clone)]
pub struct Analyzer {
    fetcher: Arc<dyn ImageFetcher>,
    extractor: Arc<dyn AreaExtractor>,
    classifier: Arc<dyn Classifier>,
}

impl Analyzer {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        extractor: Arc<dyn AreaExtractor>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            classifier,
        }
    }

    /// Fetch, measure and classify one image.
    pub async fn analyze(
        &self,
        key: &str,
        capture_time: Option<DateTime<Utc>>,
        plant: Option<String>,
    ) -> IngestResult<ImageAnalysis> {
        let image = self
            .fetcher
            .fetch(key)
            .await
            .map_err(|source| IngestError::Fetch {
                key: key.to_string(),
                source,
            })?;

        let area_pixels =
            self.extractor
                .extract_area(&image)
                .await
                .map_err(|source| IngestError::Extraction {
                    key: key.to_string(),
                    source,
                })?;

        let disease_class =
            self.classifier
                .classify(&image)
                .await
                .map_err(|source| IngestError::Classification {
                    key: key.to_string(),
                    source,
                })?;

        Ok(ImageAnalysis {
            file_key: key.to_string(),
            capture_time,
            area_pixels,
            disease_class,
            plant,
        })
    }

    /// Analyse one image and hand the result to `engine`.
    pub async fn ingest(
        &self,
        engine: &GrowthEngine,
        key: &str,
        capture_time: Option<DateTime<Utc>>,
        plant: Option<String>,
    ) -> IngestResult<Outcome> {
        let analysis = self.analyze(key, capture_time, plant).await?;
        engine.submit(analysis).await
    }
}

/// Counts of what happened to a batch of submissions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub paired: u64,
    pub pending: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub orphans_discarded: u64,
    pub failed: u64,
}

impl IngestSummary {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Paired { .. } => self.paired += 1,
            Outcome::Pending { .. } => self.pending += 1,
            Outcome::Duplicate { .. } => self.duplicates += 1,
            Outcome::Rejected { .. } => self.rejected += 1,
        }
        self.orphans_discarded += outcome.evicted().len() as u64;
    }

    pub fn total(&self) -> u64 {
        self.paired + self.pending + self.duplicates + self.rejected + self.failed
    }
}

/// Submit every JSON line of `reader` to `engine`.
///
/// `plant` overrides the plant of lines that do not name one.
pub async fn ingest_stream<R>(
    engine: &GrowthEngine,
    reader: R,
    plant: Option<&str>,
) -> Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = IngestSummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut analysis: ImageAnalysis = match serde_json::from_str(line) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed input line");
                summary.failed += 1;
                continue;
            }
        };
        if analysis.plant.is_none() {
            analysis.plant = plant.map(str::to_string);
        }

        match engine.submit(analysis).await {
            Ok(outcome) => {
                tracing::debug!(line = line_no, outcome = %outcome, "submitted");
                summary.record(&outcome);
            }
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "ingestion failed");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Build the history store described by `config`, mirrored when configured.
pub fn build_store(config: &Config) -> Result<HistoryStore> {
    let store = HistoryStore::new(&config.history.path);
    match config.mirror {
        Some(ref mirror) => {
            let client = S3Client::from_env(mirror.clone())
                .context("S3 mirror is configured but credentials are missing")?;
            Ok(store.with_mirror(Arc::new(client), config.history.mirror_key.clone()))
        }
        None => Ok(store),
    }
}

/// Build the engine described by `config`.
pub fn build_engine(config: &Config) -> Result<GrowthEngine> {
    let store = build_store(config)?;

    let notifier: Arc<dyn CompletionNotifier> = match config
        .notifier
        .as_ref()
        .map(WebhookNotifier::from_config)
        .transpose()?
        .flatten()
    {
        Some(webhook) => Arc::new(webhook),
        None => Arc::new(LogNotifier),
    };

    Ok(GrowthEngine::new(store, config.plant.name.clone()).with_notifier(notifier))
}

/// `grow ingest`: read JSON lines from `input` (`-` for stdin) and print a summary.
pub async fn run_ingest(config: &Config, input: &Path, plant: Option<String>) -> Result<()> {
    let engine = build_engine(config)?;
    let plant = plant.as_deref();

    let summary = if input == Path::new("-") {
        ingest_stream(&engine, BufReader::new(tokio::io::stdin()), plant).await?
    } else {
        let file = tokio::fs::File::open(input)
            .await
            .with_context(|| format!("Failed to open input {}", input.display()))?;
        ingest_stream(&engine, BufReader::new(file), plant).await?
    };
    engine.drain_notifications().await;

    println!("ingest {}", input.display());
    println!("  images read: {}", summary.total());
    println!("  pairs completed: {}", summary.paired);
    println!("  awaiting partner: {}", summary.pending);
    println!("  duplicates skipped: {}", summary.duplicates);
    println!("  unpairable names: {}", summary.rejected);
    println!("  orphans discarded: {}", summary.orphans_discarded);
    println!("  failed: {}", summary.failed);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stream_summary() {
        let tmp = TempDir::new().unwrap();
        let engine = GrowthEngine::new(
            HistoryStore::new(tmp.path().join("plant_data.json")),
            "Cucumber",
        );

        let input = [
            r#"{"fileKey":"7_1_a.jpg","areaPixels":40,"diseaseClass":"Tomato"}"#,
            r#"{"fileKey":"7_2_b.jpg","areaPixels":60,"diseaseClass":"Tomato"}"#,
            "",
            r#"{"fileKey":"7_2_b.jpg","areaPixels":60,"diseaseClass":"Tomato"}"#,
            r#"{"fileKey":"8_1_a.jpg","areaPixels":10,"diseaseClass":"Tomato"}"#,
            r#"{"fileKey":"9_1_a.jpg","areaPixels":10,"diseaseClass":"Tomato"}"#,
            r#"{"fileKey":"IMG_0001.jpg","areaPixels":10,"diseaseClass":"Tomato"}"#,
            "not json",
        ]
        .join("\n");

        let summary = ingest_stream(&engine, input.as_bytes(), None).await.unwrap();
        assert_eq!(
            summary,
            IngestSummary {
                paired: 1,
                pending: 3,
                duplicates: 1,
                rejected: 1,
                orphans_discarded: 1,
                failed: 1,
            }
        );
        assert_eq!(summary.total(), 7);
    }

    #[tokio::test]
    async fn test_stream_plant_override() {
        let tmp = TempDir::new().unwrap();
        let engine = GrowthEngine::new(
            HistoryStore::new(tmp.path().join("plant_data.json")),
            "Cucumber",
        );
        let input = concat!(
            r#"{"fileKey":"1_1_a.jpg","areaPixels":1,"diseaseClass":"x"}"#,
            "\n",
            r#"{"fileKey":"1_2_b.jpg","areaPixels":1,"diseaseClass":"x"}"#,
            "\n",
        );

        ingest_stream(&engine, input.as_bytes(), Some("Basil"))
            .await
            .unwrap();
        assert_eq!(engine.store().load_plant("Basil").await.unwrap().len(), 1);
        assert!(engine.store().load_plant("Cucumber").await.unwrap().is_empty());
    }
}
