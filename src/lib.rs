//! # Greenhouse Growth
//!
//! Pairing, deduplication and growth accounting for plant-image captures.
//!
//! Each capture round produces two images of the same plant from two fixed
//! camera angles. Images arrive one at a time, already analysed (pixel area
//! and disease class). The engine accounts each image at most once, pairs
//! the two images of a round by the group id in their file names, computes
//! growth against earlier rounds, and appends the result to a per-plant
//! history file.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────────────┐   ┌────────────┐
//! │ Collaborators│──▶│        GrowthEngine          │──▶│  History   │
//! │ fetch/area/  │   │ dedup → parse → pending pair │   │ JSON file  │
//! │ classify     │   │        → growth              │   │ (+ mirror) │
//! └──────────────┘   └──────────────┬───────────────┘   └────────────┘
//!                                   ▼
//!                          CompletionNotifier
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! grow ingest --input analyses.jsonl     # pair and account a batch
//! grow history --plant Cucumber          # dump the plant's blocks
//! grow series --limit 10                 # growth series for charts
//! grow parse 7_1_left.jpg                # inspect a file name
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Records, blocks and the persisted history shape |
//! | [`identifier`] | Group id / position parsing, dedup identifiers |
//! | [`dedup`] | At-most-once accounting |
//! | [`pending`] | Half-received pairs and orphan eviction |
//! | [`growth`] | Block construction and growth series |
//! | [`history`] | Atomic whole-file history store |
//! | [`engine`] | Serialized ingestion unit of work |
//! | [`ingest`] | Collaborator pipeline and JSONL stream ingestion |
//! | [`query`] | History, series and file-name views |
//! | [`traits`] | Collaborator seams |
//! | [`s3`] | S3 image fetcher and history mirror |
//! | [`fs_source`] | Local-directory image fetcher |
//! | [`notify`] | Log and webhook completion notifiers |
//! | [`error`] | Ingestion error taxonomy |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod fs_source;
pub mod growth;
pub mod history;
pub mod identifier;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod notify;
pub mod pending;
pub mod query;
pub mod s3;
pub mod traits;
