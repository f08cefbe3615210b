use std::env;
use std::path::{Path, PathBuf};

use vespawatch_core::db::Database;
use vespawatch_core::inat::RemoteCredentials;
use vespawatch_core::media::MediaStore;

use crate::error::CliError;

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("VESPAWATCH_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vespawatch")
        .join("vespawatch.db")
}

pub fn resolve_media_dir(cli_media_dir: Option<PathBuf>) -> PathBuf {
    cli_media_dir
        .or_else(|| env::var_os("VESPAWATCH_MEDIA_DIR").map(PathBuf::from))
        .unwrap_or_else(default_media_dir)
}

pub fn default_media_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vespawatch")
        .join("media")
}

pub async fn open_database(path: &Path) -> Result<Database, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(path).await?)
}

pub fn open_media_store(path: &Path) -> Result<MediaStore, CliError> {
    Ok(MediaStore::open(path)?)
}

/// Remote credentials from the environment; push flows require them.
pub fn credentials_from_env() -> Result<RemoteCredentials, CliError> {
    let token = env::var("INAT_ACCESS_TOKEN").map_err(|_| CliError::MissingCredentials)?;
    RemoteCredentials::new(token).map_err(|_| CliError::MissingCredentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_db_path_prefers_cli_argument() {
        let explicit = PathBuf::from("/tmp/somewhere.db");
        assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
    }

    #[test]
    fn default_paths_are_not_empty() {
        assert!(!default_db_path().as_os_str().is_empty());
        assert!(!default_media_dir().as_os_str().is_empty());
    }
}
