//! Blob I/O against a local filesystem root.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use dax_location::{Location, Scheme};

use crate::error::{StoreError, StoreResult};
use crate::filelike::BlobIo;

/// Reads and writes artifacts as files under a directory.
///
/// Writes go to a temporary file in the target directory and are moved into
/// place without overwriting, so readers never observe a partial artifact.
#[derive(Debug, Clone)]
pub struct PosixIo {
    root: PathBuf,
}

impl PosixIo {
    /// Use `root` as the datastore directory. With `create` a missing
    /// directory is created; otherwise it must exist.
    pub fn new(root: impl Into<PathBuf>, create: bool) -> StoreResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            if !create {
                return Err(StoreError::InvalidArgument(format!(
                    "datastore root {} does not exist",
                    root.display()
                )));
            }
            fs::create_dir_all(&root)?;
            tracing::info!(root = %root.display(), "created datastore root");
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file(location: &Location) -> PathBuf {
        PathBuf::from(location.path())
    }
}

impl BlobIo for PosixIo {
    fn scheme(&self) -> Scheme {
        Scheme::File
    }

    fn exists(&self, location: &Location) -> StoreResult<bool> {
        Ok(Self::file(location).is_file())
    }

    fn read(&self, location: &Location) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(Self::file(location)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_new(&self, location: &Location, bytes: &[u8]) -> StoreResult<()> {
        let path = Self::file(location);
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                StoreError::AlreadyExists(location.uri().to_string())
            } else {
                StoreError::Io(e.error)
            }
        })?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "wrote artifact");
        Ok(())
    }

    fn delete(&self, location: &Location) -> StoreResult<bool> {
        match fs::remove_file(Self::file(location)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dax_location::LocationFactory;

    #[test]
    fn missing_root_needs_create() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        assert!(matches!(
            PosixIo::new(&root, false),
            Err(StoreError::InvalidArgument(_))
        ));
        PosixIo::new(&root, true).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn write_new_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let io = PosixIo::new(dir.path(), false).unwrap();
        let factory = LocationFactory::new(dir.path().to_str().unwrap()).unwrap();
        let loc = factory.from_path("run/a/b.json").unwrap();

        assert_eq!(io.read(&loc).unwrap(), None);
        io.write_new(&loc, b"first").unwrap();
        assert!(io.exists(&loc).unwrap());
        assert!(matches!(
            io.write_new(&loc, b"second"),
            Err(StoreError::AlreadyExists(_))
        ));
        assert_eq!(io.read(&loc).unwrap().as_deref(), Some(&b"first"[..]));

        assert!(io.delete(&loc).unwrap());
        assert!(!io.delete(&loc).unwrap());
    }
}
