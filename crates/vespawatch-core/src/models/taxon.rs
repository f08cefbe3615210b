//! Taxon model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A unique identifier for a taxon, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxonId(Uuid);

impl TaxonId {
    /// Create a new unique taxon ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TaxonId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaxonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxonId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A species known to the local registry.
///
/// `push_taxon_id` identifies this taxon on the remote platform when creating
/// remote records; `pull_taxon_ids` are the remote ids that reconcile to this
/// taxon when importing. Several remote ids may resolve to one taxon, but a
/// remote id never resolves to more than one (the registry enforces this).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
    /// Unique identifier
    pub id: TaxonId,
    /// Scientific name
    pub name: String,
    /// Vernacular name, if any
    pub vernacular_name: Option<String>,
    /// Remote taxon id used when pushing observations
    pub push_taxon_id: i64,
    /// Remote taxon ids reconciled to this taxon when pulling
    pub pull_taxon_ids: Vec<i64>,
}

impl Taxon {
    /// Create a new taxon record.
    pub fn new(
        name: impl Into<String>,
        vernacular_name: Option<String>,
        push_taxon_id: i64,
        pull_taxon_ids: Vec<i64>,
    ) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput("Taxon name cannot be empty".into()));
        }

        Ok(Self {
            id: TaxonId::new(),
            name,
            vernacular_name: vernacular_name
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            push_taxon_id,
            pull_taxon_ids,
        })
    }

    /// Check whether a remote taxon id reconciles to this taxon.
    #[must_use]
    pub fn matches_pull_taxon_id(&self, remote_taxon_id: i64) -> bool {
        self.pull_taxon_ids.contains(&remote_taxon_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxon_id_unique() {
        let id1 = TaxonId::new();
        let id2 = TaxonId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_taxon_id_parse() {
        let id = TaxonId::new();
        let parsed: TaxonId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_taxon_new_trims_names() {
        let taxon = Taxon::new("  Vespa velutina  ", Some("  ".to_string()), 119_019, vec![])
            .unwrap();
        assert_eq!(taxon.name, "Vespa velutina");
        assert_eq!(taxon.vernacular_name, None);
    }

    #[test]
    fn test_taxon_new_rejects_empty_name() {
        assert!(Taxon::new("  ", None, 1, vec![]).is_err());
    }

    #[test]
    fn test_matches_pull_taxon_id() {
        let taxon = Taxon::new("Vespa velutina", None, 119_019, vec![119_019, 422_518]).unwrap();
        assert!(taxon.matches_pull_taxon_id(422_518));
        assert!(!taxon.matches_pull_taxon_id(54_327));
    }
}
