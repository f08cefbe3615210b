//! vespawatch-core - Core library for Vespa-Watch
//!
//! This crate contains the shared models, database layer, remote platform
//! client, and reconciliation logic used by the Vespa-Watch API and CLI.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod inat;
pub mod media;
pub mod models;
pub mod reconcile;

pub use config::SyncSettings;
pub use error::{Error, Result};
pub use models::{Observation, ObservationId, ObservationKind, Origin, Taxon, TaxonId};
