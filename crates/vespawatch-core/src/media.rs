//! Directory-backed storage for observation pictures.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Stores picture bytes on the local filesystem, one file per derived
/// filename. Picture rows in the database reference files here by name.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    /// Open a media store rooted at the given directory, creating it if
    /// needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory this store writes into.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a stored filename.
    pub fn path_for(&self, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        Ok(self.root.join(filename))
    }

    /// Whether a file with this name exists in the store.
    #[must_use]
    pub fn exists(&self, filename: &str) -> bool {
        self.path_for(filename)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    /// Persist picture bytes under the given filename.
    pub fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(filename)?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Load picture bytes by filename.
    pub fn load(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.path_for(filename)?;
        if !path.exists() {
            return Err(Error::NotFound(format!("No stored picture: {filename}")));
        }
        Ok(std::fs::read(path)?)
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return Err(Error::InvalidInput(format!(
            "Invalid picture filename: {filename}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::open(dir.path()).unwrap();

        store.save("1234_large.jpg", b"jpeg-bytes").unwrap();
        assert!(store.exists("1234_large.jpg"));
        assert_eq!(store.load("1234_large.jpg").unwrap(), b"jpeg-bytes");
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::open(dir.path()).unwrap();

        assert!(matches!(
            store.load("missing.jpg").unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_rejects_path_traversal_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::open(dir.path()).unwrap();

        assert!(store.save("../evil.jpg", b"x").is_err());
        assert!(store.save("a/b.jpg", b"x").is_err());
        assert!(!store.exists("../evil.jpg"));
    }
}
