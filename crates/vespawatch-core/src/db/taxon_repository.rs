//! Taxon registry repository

use async_trait::async_trait;
use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{Taxon, TaxonId};

/// Trait for taxon registry operations
#[async_trait]
pub trait TaxonRepository {
    /// Register a new taxon with its push and pull identifiers
    async fn create(&self, taxon: &Taxon) -> Result<()>;

    /// Get a taxon by ID
    async fn get(&self, id: &TaxonId) -> Result<Option<Taxon>>;

    /// List all registered taxa
    async fn list(&self) -> Result<Vec<Taxon>>;

    /// Resolve a remote taxon id to the local taxon registered for it.
    ///
    /// Fails with [`Error::TaxonMatch`] when no pull-identifier list contains
    /// the id. Never substitutes a fallback taxon; callers decide that policy.
    async fn resolve_pull_taxon_id(&self, remote_taxon_id: i64) -> Result<Taxon>;
}

/// libSQL implementation of `TaxonRepository`
pub struct LibSqlTaxonRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlTaxonRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn pull_taxon_ids(&self, taxon_id: &TaxonId) -> Result<Vec<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT pull_id FROM taxon_pull_ids WHERE taxon_id = ? ORDER BY pull_id",
                params![taxon_id.as_str()],
            )
            .await?;

        let mut pull_ids = Vec::new();
        while let Some(row) = rows.next().await? {
            pull_ids.push(row.get::<i64>(0)?);
        }
        Ok(pull_ids)
    }

    async fn load(&self, taxon_id: &TaxonId, row: &libsql::Row) -> Result<Taxon> {
        let id: String = row.get(0)?;
        Ok(Taxon {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid taxon id: {id}")))?,
            name: row.get(1)?,
            vernacular_name: row.get::<Option<String>>(2)?,
            push_taxon_id: row.get(3)?,
            pull_taxon_ids: self.pull_taxon_ids(taxon_id).await?,
        })
    }
}

#[async_trait]
impl TaxonRepository for LibSqlTaxonRepository<'_> {
    async fn create(&self, taxon: &Taxon) -> Result<()> {
        // Pull ids must stay globally unique across taxa; report the clash
        // before touching the registry.
        for pull_id in &taxon.pull_taxon_ids {
            let mut rows = self
                .conn
                .query(
                    "SELECT taxon_id FROM taxon_pull_ids WHERE pull_id = ?",
                    params![*pull_id],
                )
                .await?;
            if rows.next().await?.is_some() {
                return Err(Error::InvalidInput(format!(
                    "Pull taxon id {pull_id} is already registered to another taxon"
                )));
            }
        }

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let insert = async {
            self.conn
                .execute(
                    "INSERT INTO taxa (id, name, vernacular_name, push_taxon_id)
                     VALUES (?, ?, ?, ?)",
                    params![
                        taxon.id.as_str(),
                        taxon.name.clone(),
                        taxon.vernacular_name.clone(),
                        taxon.push_taxon_id
                    ],
                )
                .await?;

            for pull_id in &taxon.pull_taxon_ids {
                self.conn
                    .execute(
                        "INSERT INTO taxon_pull_ids (taxon_id, pull_id) VALUES (?, ?)",
                        params![taxon.id.as_str(), *pull_id],
                    )
                    .await?;
            }
            Ok::<(), Error>(())
        };

        if let Err(e) = insert.await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e);
        }
        self.conn.execute("COMMIT", ()).await?;
        Ok(())
    }

    async fn get(&self, id: &TaxonId) -> Result<Option<Taxon>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, vernacular_name, push_taxon_id FROM taxa WHERE id = ?",
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(self.load(id, &row).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Taxon>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, vernacular_name, push_taxon_id FROM taxa ORDER BY name",
                (),
            )
            .await?;

        let mut taxa = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let taxon_id: TaxonId = id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid taxon id: {id}")))?;
            taxa.push(self.load(&taxon_id, &row).await?);
        }
        Ok(taxa)
    }

    async fn resolve_pull_taxon_id(&self, remote_taxon_id: i64) -> Result<Taxon> {
        let mut rows = self
            .conn
            .query(
                "SELECT taxon_id FROM taxon_pull_ids WHERE pull_id = ?",
                params![remote_taxon_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Err(Error::TaxonMatch(remote_taxon_id));
        };

        let id: String = row.get(0)?;
        let taxon_id: TaxonId = id
            .parse()
            .map_err(|_| Error::Database(format!("Invalid taxon id: {id}")))?;

        self.get(&taxon_id)
            .await?
            .ok_or_else(|| Error::TaxonMatch(remote_taxon_id))
    }
}
