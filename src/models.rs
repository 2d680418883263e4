//! Core data models used throughout the growth engine.
//!
//! These types are the persisted history contract: the JSON history file is
//! a map of plant name to [`Block`]s, serialized with the camelCase field
//! names below. Other tooling (dashboards, galleries) reads this shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which of the two fixed camera angles an image was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    First,
    Second,
}

impl Position {
    /// The marker used for this position inside file names (`1` or `2`).
    pub fn marker(self) -> char {
        match self {
            Position::First => '1',
            Position::Second => '2',
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Position::First => write!(f, "first"),
            Position::Second => write!(f, "second"),
        }
    }
}

/// Result of the external collaborators for one image: the input to the engine.
///
/// This is also the line format of the JSONL stream read by `grow ingest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    pub file_key: String,
    #[serde(default)]
    pub capture_time: Option<DateTime<Utc>>,
    pub area_pixels: u64,
    pub disease_class: String,
    /// Target plant; the configured default plant is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant: Option<String>,
}

/// One accounted image inside a [`Block`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub file_key: String,
    pub capture_time: Option<DateTime<Utc>>,
    /// Dedup identifier, `fileKey@captureTime`.
    pub identifier: String,
    pub area_pixels: u64,
    pub disease_class: String,
    /// Pixel delta against the most recent prior image at the same position.
    pub growth: i64,
    pub growth_percent: f64,
}

impl ImageRecord {
    /// Build a record with zero growth; growth is filled in at pairing time.
    pub fn from_analysis(analysis: &ImageAnalysis, identifier: String) -> Self {
        Self {
            file_key: analysis.file_key.clone(),
            capture_time: analysis.capture_time,
            identifier,
            area_pixels: analysis.area_pixels,
            disease_class: analysis.disease_class.clone(),
            growth: 0,
            growth_percent: 0.0,
        }
    }
}

/// One persisted capture round: exactly two images, First then Second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub global_area_pixels: u64,
    pub global_growth: i64,
    pub global_growth_percent: f64,
    pub disease_class: String,
    pub images: [ImageRecord; 2],
}

impl Block {
    /// The record taken from the given camera angle.
    pub fn image_at(&self, position: Position) -> &ImageRecord {
        match position {
            Position::First => &self.images[0],
            Position::Second => &self.images[1],
        }
    }

    /// Capture time of the round, taken from the first image.
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.images[0].capture_time
    }
}

/// Plant name to append-ordered blocks.
///
/// A `BTreeMap` keeps the serialized file stable across rewrites.
pub type History = BTreeMap<String, Vec<Block>>;

/// One point of a plant's growth series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthPoint {
    pub timestamp: Option<DateTime<Utc>>,
    pub current_px: u64,
    pub growth_px: i64,
    pub growth_percent: f64,
}
