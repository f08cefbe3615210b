//! Database layer for Vespa-Watch

mod action_repository;
mod connection;
mod deletion_ledger;
mod migrations;
pub(crate) mod observation_repository;
mod taxon_repository;

pub use action_repository::{LibSqlManagementActionRepository, ManagementActionRepository};
pub use connection::Database;
pub use deletion_ledger::{DeletionLedgerRepository, LibSqlDeletionLedgerRepository};
pub use observation_repository::{LibSqlObservationRepository, ObservationRepository};
pub use taxon_repository::{LibSqlTaxonRepository, TaxonRepository};
