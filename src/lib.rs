//! GenePredict - gene-expression classifier web service.
//!
//! Serves a pre-trained binary classifier over HTTP, persists each inference
//! to a relational store, and renders dashboard views over the logged
//! history.
//!
//! # Architecture
//!
//! - **Storage**: dual-backend persistence (networked PostgreSQL with
//!   automatic fallback to an embedded SQLite file), dialect translation,
//!   acquire-per-call connections
//! - **Model**: logistic-regression inference from a JSON weights file
//! - **Server**: axum routes for the prediction form, dashboard, history,
//!   and JSON APIs
//! - **Config**: YAML file with env/CLI overrides

pub mod config;
pub mod model;
pub mod server;
pub mod storage;

pub use config::AppConfig;
pub use model::Model;
pub use storage::{
    BackendKind, Database, Outcome, PredictionRecord, PredictionStore, StatsSummary, StorageError,
};
