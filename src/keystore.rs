//! Local persistence of private key material.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{AppError, Result};

/// Storage for the operator's private keys, one file per keypair name.
pub trait KeyStore: Send + Sync {
    /// Whether key material for `name` is present.
    fn exists(&self, name: &str) -> bool;

    /// Read the key material for `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the key cannot be read.
    fn read(&self, name: &str) -> Result<String>;

    /// Persist key material for `name`, readable only by the owner.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the key cannot be written.
    fn write(&self, name: &str, material: &str) -> Result<()>;

    /// Remove key material for `name`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file exists but cannot be removed.
    fn delete(&self, name: &str) -> Result<()>;

    /// Filesystem location of the key for `name`.
    fn path(&self, name: &str) -> PathBuf;
}

/// [`KeyStore`] writing `<dir>/<name>` files.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Keys live directly under `dir`, created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the keys.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|err| {
            AppError::Io(format!("failed to create {}: {err}", self.dir.display()))
        })?;
        restrict(&self.dir, 0o700)
    }
}

impl KeyStore for FileKeyStore {
    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.path(name);
        fs::read_to_string(&path)
            .map_err(|err| AppError::Io(format!("failed to read {}: {err}", path.display())))
    }

    fn write(&self, name: &str, material: &str) -> Result<()> {
        self.ensure_dir()?;
        let path = self.path(name);

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&path)
            .map_err(|err| AppError::Io(format!("failed to open {}: {err}", path.display())))?;
        file.write_all(material.as_bytes())
            .map_err(|err| AppError::Io(format!("failed to write {}: {err}", path.display())))?;
        restrict(&path, 0o600)?;

        info!(path = %path.display(), "stored private key");
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "removed private key");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "private key already absent");
                Ok(())
            }
            Err(err) => Err(AppError::Io(format!(
                "failed to remove {}: {err}",
                path.display()
            ))),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[cfg(unix)]
fn restrict(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|err| AppError::Io(format!("failed to chmod {}: {err}", path.display())))
}

#[cfg(not(unix))]
fn restrict(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
