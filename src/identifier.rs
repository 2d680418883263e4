//! File-name parsing for capture pairs.
//!
//! Capture images are named `<group>_<position>_<rest>.<ext>`, where
//! `<group>` is a run of digits shared by both images of one capture round
//! and `<position>` is `1` or `2` for the two camera angles. Storage keys may
//! carry a path prefix (`captures/2024/7_1_left.jpg`); only the final path
//! segment is considered.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::models::Position;

/// Placeholder used in dedup identifiers when the capture time is unknown.
pub const UNKNOWN_CAPTURE_TIME: &str = "NA";

/// Group id and camera position extracted from a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub group_id: String,
    pub position: Position,
}

/// Why a file name could not be paired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("file name '{0}' has an empty stem")]
    EmptyStem(String),
    #[error("file name '{0}' does not start with a numeric group id")]
    MissingGroup(String),
    #[error("file name '{0}' has no position marker (expected _1_ or _2_)")]
    MissingPosition(String),
    #[error("file name '{0}' has nothing after the position marker")]
    MissingSuffix(String),
}

/// Strip the path and the final extension from a storage key.
pub fn file_stem(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(0) | None => base,
        Some(idx) => &base[..idx],
    }
}

/// Parse `<digits>_<1|2>_<rest>` out of a file name or storage key.
pub fn parse_pair_key(name: &str) -> Result<PairKey, IdentifierError> {
    let stem = file_stem(name);
    if stem.is_empty() {
        return Err(IdentifierError::EmptyStem(name.to_string()));
    }

    let mut parts = stem.splitn(3, '_');
    let group = parts.next().unwrap_or_default();
    if group.is_empty() || !group.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentifierError::MissingGroup(name.to_string()));
    }

    let position = match parts.next() {
        Some("1") => Position::First,
        Some("2") => Position::Second,
        _ => return Err(IdentifierError::MissingPosition(name.to_string())),
    };

    match parts.next() {
        Some(rest) if !rest.is_empty() => Ok(PairKey {
            group_id: group.to_string(),
            position,
        }),
        _ => Err(IdentifierError::MissingSuffix(name.to_string())),
    }
}

/// Dedup identifier: `fileKey@captureTime`, or `fileKey@NA` without a time.
pub fn dedup_identifier(file_key: &str, capture_time: Option<DateTime<Utc>>) -> String {
    match capture_time {
        Some(ts) => format!(
            "{}@{}",
            file_key,
            ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ),
        None => format!("{}@{}", file_key, UNKNOWN_CAPTURE_TIME),
    }
}
