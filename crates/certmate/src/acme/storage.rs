//! Certificate store
//!
//! Holds the artifacts harvested from the ACME client, one directory per
//! domain with fixed file names.
//!
//! # Directory Structure
//!
//! ```text
//! certificates/
//! └── example.com/
//!     ├── cert.pem          # Leaf certificate
//!     ├── chain.pem         # Intermediate chain
//!     ├── fullchain.pem     # Leaf + chain
//!     └── privkey.pem       # Private key (0600)
//! ```
//!
//! There is no locking: a reader can observe a domain directory while an
//! install is copying into it.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace};

use super::error::StorageError;
use crate::providers::write_private_file;

/// Leaf certificate file name
pub const CERT_FILE: &str = "cert.pem";
/// Intermediate chain file name
pub const CHAIN_FILE: &str = "chain.pem";
/// Full chain file name
pub const FULLCHAIN_FILE: &str = "fullchain.pem";
/// Private key file name
pub const PRIVKEY_FILE: &str = "privkey.pem";

/// Every artifact copied into the store, in copy order
pub const ARTIFACT_FILES: [&str; 4] = [CERT_FILE, CHAIN_FILE, FULLCHAIN_FILE, PRIVKEY_FILE];

/// Filesystem certificate store
#[derive(Debug, Clone)]
pub struct CertificateStore {
    /// Base directory
    base_path: PathBuf,
}

impl CertificateStore {
    /// Open the store at `base_path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(base_path: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(base_path)?;

        debug!(
            storage_path = %base_path.display(),
            "Opened certificate store"
        );

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    /// Get the store base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory holding a domain's artifacts
    pub fn domain_path(&self, domain: &str) -> PathBuf {
        self.base_path.join(domain)
    }

    /// Path of a domain's leaf certificate
    pub fn cert_path(&self, domain: &str) -> PathBuf {
        self.domain_path(domain).join(CERT_FILE)
    }

    /// Whether a leaf certificate is stored for the domain
    pub fn has_certificate(&self, domain: &str) -> bool {
        self.cert_path(domain).is_file()
    }

    /// Copy the four artifacts from an ACME client `live` directory into the
    /// store.
    ///
    /// All sources are checked before anything is copied, so a missing
    /// artifact leaves the stored certificate untouched.
    pub fn install_from(&self, live_dir: &Path, domain: &str) -> Result<(), StorageError> {
        for file in ARTIFACT_FILES {
            if !live_dir.join(file).is_file() {
                return Err(StorageError::MissingArtifact {
                    file: file.to_string(),
                    dir: live_dir.display().to_string(),
                });
            }
        }

        let domain_path = self.domain_path(domain);
        fs::create_dir_all(&domain_path)?;

        for file in ARTIFACT_FILES {
            // fs::read follows the symlinks certbot keeps in live/
            let contents = fs::read(live_dir.join(file))?;
            let dest = domain_path.join(file);
            if file == PRIVKEY_FILE {
                write_private_file(&dest, &contents)?;
            } else {
                fs::write(&dest, contents)?;
            }
            trace!(domain = %domain, file = file, "Copied certificate artifact");
        }

        info!(
            domain = %domain,
            path = %domain_path.display(),
            "Installed certificate into store"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, CertificateStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = CertificateStore::new(&temp_dir.path().join("certificates")).unwrap();
        (temp_dir, store)
    }

    fn write_live(dir: &Path, files: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        for file in files {
            fs::write(dir.join(file), format!("contents of {file}")).unwrap();
        }
    }

    #[test]
    fn test_store_creation() {
        let (_temp_dir, store) = setup_store();
        assert!(store.base_path().exists());
        assert!(!store.has_certificate("example.com"));
    }

    #[test]
    fn test_install_copies_all_artifacts() {
        let (temp_dir, store) = setup_store();
        let live = temp_dir.path().join("live/example.com");
        write_live(&live, &ARTIFACT_FILES);

        store.install_from(&live, "example.com").unwrap();

        for file in ARTIFACT_FILES {
            let copied = fs::read_to_string(store.domain_path("example.com").join(file)).unwrap();
            assert_eq!(copied, format!("contents of {file}"));
        }
        assert!(store.has_certificate("example.com"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.domain_path("example.com").join(PRIVKEY_FILE))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_missing_artifact_leaves_store_untouched() {
        let (temp_dir, store) = setup_store();
        let live = temp_dir.path().join("live/example.com");
        write_live(&live, &[CERT_FILE, CHAIN_FILE, FULLCHAIN_FILE]);

        let err = store.install_from(&live, "example.com").unwrap_err();
        assert!(matches!(err, StorageError::MissingArtifact { ref file, .. } if file == PRIVKEY_FILE));
        assert!(!store.domain_path("example.com").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_install_follows_symlinks() {
        let (temp_dir, store) = setup_store();
        let archive = temp_dir.path().join("archive/example.com");
        write_live(&archive, &ARTIFACT_FILES);

        let live = temp_dir.path().join("live/example.com");
        fs::create_dir_all(&live).unwrap();
        for file in ARTIFACT_FILES {
            std::os::unix::fs::symlink(archive.join(file), live.join(file)).unwrap();
        }

        store.install_from(&live, "example.com").unwrap();
        let dest = store.cert_path("example.com");
        assert!(!fs::symlink_metadata(&dest).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(dest).unwrap(), "contents of cert.pem");
    }
}
