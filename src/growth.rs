//! Growth accounting for completed capture pairs.
//!
//! Aggregate growth compares a round's summed pixel area with the previous
//! block. Per-image growth compares each camera angle only with the most
//! recent earlier image from the same angle, because the two viewpoints
//! have different pixel scales.

use crate::models::{Block, GrowthPoint, ImageRecord, Position};

/// Round to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Signed delta and percentage of `current` against `previous`.
///
/// The pixel delta saturates at the `i64` bounds. A zero `previous` yields
/// a percentage of `0.0` rather than a division by zero.
fn delta(current: u64, previous: u64) -> (i64, f64) {
    let exact = i128::from(current) - i128::from(previous);
    let growth = i64::try_from(exact).unwrap_or(if exact > 0 { i64::MAX } else { i64::MIN });
    let percent = if previous == 0 {
        0.0
    } else {
        round2(100.0 * (current as f64 - previous as f64) / previous as f64)
    };
    (growth, percent)
}

/// Area of the most recent prior image taken at `position`.
///
/// Every block holds one image per position, so the newest block always
/// carries the match.
fn previous_area(prior: &[Block], position: Position) -> Option<u64> {
    prior
        .last()
        .map(|block| block.image_at(position).area_pixels)
}

/// Build the block for a completed pair against the plant's prior blocks.
///
/// `pair` must be ordered First, Second (as produced by the pending buffer).
pub fn build_block(pair: [ImageRecord; 2], prior: &[Block]) -> Block {
    let [mut first, mut second] = pair;

    let global_area_pixels = first.area_pixels.saturating_add(second.area_pixels);
    let (global_growth, global_growth_percent) = match prior.last() {
        Some(previous) => delta(global_area_pixels, previous.global_area_pixels),
        None => (0, 0.0),
    };

    for (record, position) in [
        (&mut first, Position::First),
        (&mut second, Position::Second),
    ] {
        let (growth, percent) = match previous_area(prior, position) {
            Some(matched) => delta(record.area_pixels, matched),
            None => (0, 0.0),
        };
        record.growth = growth;
        record.growth_percent = percent;
    }

    Block {
        global_area_pixels,
        global_growth,
        global_growth_percent,
        disease_class: first.disease_class.clone(),
        images: [first, second],
    }
}

/// The last `limit` blocks of a plant as a growth series, in append order.
pub fn growth_series(blocks: &[Block], limit: usize) -> Vec<GrowthPoint> {
    let start = blocks.len().saturating_sub(limit);
    blocks[start..]
        .iter()
        .map(|block| GrowthPoint {
            timestamp: block.captured_at(),
            current_px: block.global_area_pixels,
            growth_px: block.global_growth,
            growth_percent: block.global_growth_percent,
        })
        .collect()
}
