use std::io::Write;
use std::path::{Path, PathBuf};

/// Whole-file storage rooted at a base directory.
///
/// Identifiers are relative paths (`v1.0.0/articles.json`). Parent
/// directories are created on write, never on read.
pub trait StorageManager: Send + Sync {
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
    fn delete_dir(&self, ident: &str) -> std::io::Result<()>;
}

#[derive(Clone, Debug)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        BackendLocal {
            base_dir: storage_dir.into(),
        }
    }

    pub fn path(&self, ident: &str) -> PathBuf {
        self.base_dir.join(ident)
    }
}

impl StorageManager for BackendLocal {
    fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.path(ident)).is_ok()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.path(ident))
    }

    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        write_atomic(&self.path(ident), data)
    }

    fn delete_dir(&self, ident: &str) -> std::io::Result<()> {
        let path = self.path(ident);
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        Ok(())
    }
}

/// Atomic replace: temp file in the target directory -> fsync -> rename.
///
/// Missing parent directories are created.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let store = BackendLocal::new(dir.path());

        store.write("v1.0.0/metadata.json", b"{}").unwrap();

        assert!(store.exists("v1.0.0/metadata.json"));
        assert_eq!(store.read("v1.0.0/metadata.json").unwrap(), b"{}");
    }

    #[test]
    fn test_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let store = BackendLocal::new(dir.path());

        store.write("versions.json", b"old").unwrap();
        store.write("versions.json", b"new").unwrap();

        assert_eq!(store.read("versions.json").unwrap(), b"new");
        // no temp files left behind
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_read_missing_does_not_create() {
        let dir = TempDir::new().unwrap();
        let store = BackendLocal::new(dir.path());

        assert!(store.read("v9.9.9/articles.json").is_err());
        assert!(!dir.path().join("v9.9.9").exists());
    }

    #[test]
    fn test_delete_dir_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = BackendLocal::new(dir.path());

        store.delete_dir("v1.0.0").unwrap();

        store.write("v1.0.0/index.bin", b"x").unwrap();
        store.delete_dir("v1.0.0").unwrap();
        assert!(!store.exists("v1.0.0"));
    }
}
