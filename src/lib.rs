//! site-ingest - bounded, polite, failure-aware site ingestion.
//!
//! Discovers and fetches a small set of pages from an external site,
//! classifies anti-automation friction, caches fetches, tracks per-domain
//! risk across runs and reports structured evidence for every run.

pub mod cache;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod http_client;
pub mod ingest;
pub mod models;
pub mod prioritize;
pub mod repository;
pub mod risk;

pub use ingest::{
    run_ingestion, FetchedPage, IngestError, IngestSettings, IngestionOptions, IngestionResult,
};
