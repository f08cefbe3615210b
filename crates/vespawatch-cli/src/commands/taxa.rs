use std::path::Path;

use vespawatch_core::db::{LibSqlTaxonRepository, TaxonRepository};
use vespawatch_core::models::Taxon;

use crate::commands::common::open_database;
use crate::error::CliError;

pub async fn run_list(db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let taxa = LibSqlTaxonRepository::new(db.connection()).list().await?;

    for taxon in taxa {
        let pull_ids = taxon
            .pull_taxon_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{}  {:<30}  push={}  pull=[{pull_ids}]",
            taxon.id, taxon.name, taxon.push_taxon_id
        );
    }
    Ok(())
}

pub async fn run_add(
    name: &str,
    vernacular_name: Option<String>,
    push_taxon_id: i64,
    pull_taxon_ids: Vec<i64>,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let repo = LibSqlTaxonRepository::new(db.connection());

    let taxon = Taxon::new(name, vernacular_name, push_taxon_id, pull_taxon_ids)?;
    repo.create(&taxon).await?;

    println!("{}", taxon.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_test_db_path() -> PathBuf {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_nanos());
        std::env::temp_dir().join(format!("vespawatch-taxa-test-{timestamp}.db"))
    }

    fn cleanup_db_files(path: &PathBuf) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_add_registers_a_resolvable_taxon() {
        let db_path = unique_test_db_path();

        run_add("Vespa velutina", None, 119_019, vec![119_019], &db_path)
            .await
            .unwrap();

        let db = open_database(&db_path).await.unwrap();
        let repo = LibSqlTaxonRepository::new(db.connection());
        let resolved = repo.resolve_pull_taxon_id(119_019).await.unwrap();
        assert_eq!(resolved.name, "Vespa velutina");
        drop(db);

        cleanup_db_files(&db_path);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_add_rejects_duplicate_pull_id() {
        let db_path = unique_test_db_path();

        run_add("Vespa velutina", None, 119_019, vec![119_019], &db_path)
            .await
            .unwrap();
        let error = run_add("Vespa crabro", None, 54_327, vec![119_019], &db_path)
            .await
            .unwrap_err();
        assert!(matches!(error, CliError::Core(_)));

        cleanup_db_files(&db_path);
    }
}
