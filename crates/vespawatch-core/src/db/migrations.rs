//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: Initial schema
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    // Using a transaction for atomicity

    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Taxon registry
        "CREATE TABLE IF NOT EXISTS taxa (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            vernacular_name TEXT,
            push_taxon_id INTEGER NOT NULL
        )",
        // Pull ids are globally unique: a remote taxon id resolves to at most
        // one local taxon
        "CREATE TABLE IF NOT EXISTS taxon_pull_ids (
            taxon_id TEXT NOT NULL REFERENCES taxa(id) ON DELETE CASCADE,
            pull_id INTEGER NOT NULL UNIQUE,
            PRIMARY KEY (taxon_id, pull_id)
        )",
        // Observations: nests and individuals in one table, tagged by kind
        "CREATE TABLE IF NOT EXISTS observations (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('nest', 'individual')),
            origin TEXT NOT NULL CHECK (origin IN ('local', 'remote')),
            taxon_id TEXT REFERENCES taxa(id),
            observation_time INTEGER NOT NULL,
            latitude REAL NOT NULL CHECK (latitude BETWEEN -90 AND 90),
            longitude REAL NOT NULL CHECK (longitude BETWEEN -180 AND 180),
            comments TEXT NOT NULL DEFAULT '',
            remote_id INTEGER,
            remote_species TEXT,
            community_confirmed INTEGER,
            created_at INTEGER NOT NULL,
            nest_size TEXT,
            nest_height TEXT,
            expert_confirmed INTEGER,
            municipality TEXT,
            individual_count INTEGER,
            behaviour TEXT
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_observations_remote_id
            ON observations(remote_id) WHERE remote_id IS NOT NULL",
        // Defensive deduplication constraint
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_observations_dedup
            ON observations(
                COALESCE(taxon_id, ''),
                observation_time,
                latitude,
                longitude,
                comments,
                COALESCE(remote_id, -1)
            )",
        "CREATE INDEX IF NOT EXISTS idx_observations_kind ON observations(kind)",
        "CREATE INDEX IF NOT EXISTS idx_observations_time ON observations(observation_time DESC)",
        // Pictures: bytes live in the media store, rows hold metadata
        "CREATE TABLE IF NOT EXISTS pictures (
            id TEXT PRIMARY KEY,
            observation_id TEXT NOT NULL REFERENCES observations(id) ON DELETE CASCADE,
            filename TEXT NOT NULL,
            source_url TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE (observation_id, filename)
        )",
        // Reconciliation warnings, deduplicated by text per observation
        "CREATE TABLE IF NOT EXISTS observation_warnings (
            observation_id TEXT NOT NULL REFERENCES observations(id) ON DELETE CASCADE,
            text TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (observation_id, text)
        )",
        // Management actions, one-to-one with nests
        "CREATE TABLE IF NOT EXISTS management_actions (
            nest_id TEXT PRIMARY KEY REFERENCES observations(id) ON DELETE CASCADE,
            outcome TEXT NOT NULL,
            site TEXT,
            nest_type TEXT,
            aftercare TEXT,
            product TEXT,
            method TEXT,
            user TEXT NOT NULL,
            action_time INTEGER NOT NULL,
            duration_minutes INTEGER,
            number_of_persons INTEGER,
            comments TEXT NOT NULL DEFAULT ''
        )",
        "CREATE TABLE IF NOT EXISTS management_action_problems (
            nest_id TEXT NOT NULL REFERENCES management_actions(nest_id) ON DELETE CASCADE,
            problem TEXT NOT NULL,
            PRIMARY KEY (nest_id, problem)
        )",
        // Remote ids awaiting deletion on the remote platform
        "CREATE TABLE IF NOT EXISTS pending_deletions (
            remote_id INTEGER PRIMARY KEY,
            created_at INTEGER NOT NULL
        )",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
