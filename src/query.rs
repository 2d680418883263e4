//! Read-only views of the history: blocks, growth series, name checks.
//!
//! Each view has a library function returning data and a `run_*` CLI entry
//! point that prints it. JSON output goes to stdout.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::Config;
use crate::growth::growth_series;
use crate::identifier::{dedup_identifier, parse_pair_key};
use crate::ingest::build_store;
use crate::models::{Block, GrowthPoint};

/// Response of `grow history`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub plant: String,
    pub blocks: Vec<Block>,
}

/// Response of `grow series`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesResponse {
    pub plant: String,
    pub limit: usize,
    pub points: Vec<GrowthPoint>,
}

/// Response of `grow parse`.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParseResponse {
    pub name: String,
    pub pairable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    /// The `1`/`2` marker found in the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<char>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub identifier: String,
}

pub async fn plant_history(config: &Config, plant: Option<&str>) -> Result<HistoryResponse> {
    let plant = plant.unwrap_or(&config.plant.name).to_string();
    let blocks = build_store(config)?
        .load_plant(&plant)
        .await
        .context("Failed to load history")?;
    Ok(HistoryResponse { plant, blocks })
}

pub async fn plant_series(
    config: &Config,
    plant: Option<&str>,
    limit: Option<usize>,
) -> Result<SeriesResponse> {
    let limit = limit.unwrap_or(config.series.default_limit).max(1);
    let history = plant_history(config, plant).await?;
    Ok(SeriesResponse {
        points: growth_series(&history.blocks, limit),
        plant: history.plant,
        limit,
    })
}

/// Inspect how a file name would be paired.
pub fn parse_name(name: &str) -> ParseResponse {
    let identifier = dedup_identifier(name, None);
    match parse_pair_key(name) {
        Ok(key) => ParseResponse {
            name: name.to_string(),
            pairable: true,
            group_id: Some(key.group_id),
            position: Some(key.position.to_string()),
            marker: Some(key.position.marker()),
            reason: None,
            identifier,
        },
        Err(e) => ParseResponse {
            name: name.to_string(),
            pairable: false,
            group_id: None,
            position: None,
            marker: None,
            reason: Some(e.to_string()),
            identifier,
        },
    }
}

pub async fn run_history(config: &Config, plant: Option<&str>) -> Result<()> {
    let response = plant_history(config, plant).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub async fn run_series(config: &Config, plant: Option<&str>, limit: Option<usize>) -> Result<()> {
    let response = plant_series(config, plant, limit).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub fn run_parse(name: &str) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&parse_name(name))?);
    Ok(())
}
