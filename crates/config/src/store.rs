//! File-backed settings store.
//!
//! The settings file is guarded by an advisory lock on a sidecar
//! `settings.json.lock` file: readers take a shared lock, writers an exclusive
//! one. Writes go to a temporary file in the same directory that is renamed
//! over the settings file, so readers never observe a partial document.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use certmate_common::{enforce_token_strength, generate_token, validate_email};
use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::domains::normalize_domains;
use crate::errors::SettingsError;
use crate::settings::{MaskedSettings, Settings, StoredSettings, DEFAULT_DNS_PROVIDER};

/// Persistent settings store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    lock_path: PathBuf,
    token_override: Option<String>,
}

impl SettingsStore {
    /// Create a store for the settings file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = OsString::from(path.as_os_str());
        lock_name.push(".lock");

        Self {
            path,
            lock_path: PathBuf::from(lock_name),
            token_override: None,
        }
    }

    /// Use `token` instead of a generated one whenever a default token is
    /// needed.
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        self.token_override = token.filter(|t| !t.is_empty());
        self
    }

    /// Path of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, creating or repairing the file as needed.
    ///
    /// Never fails: unreadable or unparsable files log an error and yield
    /// defaults, which are not persisted in that case.
    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            info!(path = %self.path.display(), "Creating initial settings file with secure defaults");
            let defaults = Settings::with_token(self.default_token());
            return match self.save(&defaults) {
                Ok(saved) => saved,
                Err(e) => {
                    error!(path = %self.path.display(), error = %e, "Failed to persist initial settings");
                    defaults
                }
            };
        }

        let contents = match self.read_locked() {
            Ok(contents) => contents,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to read settings, using defaults");
                return Settings::with_token(self.default_token());
            }
        };

        let stored: StoredSettings = match serde_json::from_str(&contents) {
            Ok(stored) => stored,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to parse settings, using defaults");
                return Settings::with_token(self.default_token());
            }
        };

        let (mut settings, migrated) = stored.into_settings();
        let mut repersist = migrated;
        if migrated {
            info!(domains = settings.domains.len(), "Migrated domain entries to structured format");
        }

        if enforce_token_strength(&settings.api_bearer_token).is_err() {
            warn!("Insecure API token detected, generating new one");
            settings.api_bearer_token = self.default_token();
            repersist = true;
        }

        if repersist {
            match self.save(&settings) {
                Ok(saved) => return saved,
                Err(e) => {
                    error!(path = %self.path.display(), error = %e, "Failed to persist repaired settings");
                }
            }
        }

        debug!(
            path = %self.path.display(),
            domains = settings.domains.len(),
            provider = %settings.dns_provider,
            "Settings loaded"
        );
        settings
    }

    /// Validate and persist settings, returning the value written.
    ///
    /// An invalid email or weak token aborts without touching the file.
    /// Invalid or duplicate domains are dropped and the save proceeds.
    pub fn save(&self, settings: &Settings) -> Result<Settings, SettingsError> {
        let mut normalized = settings.clone();

        if !normalized.email.is_empty() {
            normalized.email = validate_email(&normalized.email)?;
        }
        enforce_token_strength(&normalized.api_bearer_token)?;

        if normalized.dns_provider.is_empty() {
            normalized.dns_provider = DEFAULT_DNS_PROVIDER.to_string();
        }
        normalized.domains = normalize_domains(&normalized.domains, &normalized.dns_provider);

        let json = serde_json::to_string_pretty(&normalized)?;
        self.write_locked(json.as_bytes())?;

        info!(
            path = %self.path.display(),
            domains = normalized.domains.len(),
            "Settings saved"
        );
        Ok(normalized)
    }

    /// External view with secrets masked.
    pub fn mask(settings: &Settings) -> MaskedSettings {
        MaskedSettings::from(settings)
    }

    fn default_token(&self) -> String {
        match &self.token_override {
            Some(token) if enforce_token_strength(token).is_ok() => token.clone(),
            Some(_) => {
                warn!("Configured API_BEARER_TOKEN is too weak, generating a new token");
                generate_token()
            }
            None => generate_token(),
        }
    }

    fn open_lock_file(&self) -> Result<File, SettingsError> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|source| SettingsError::Lock {
                path: self.lock_path.display().to_string(),
                source,
            })
    }

    fn read_locked(&self) -> Result<String, SettingsError> {
        let lock = self.open_lock_file()?;
        FileExt::lock_shared(&lock).map_err(|source| SettingsError::Lock {
            path: self.lock_path.display().to_string(),
            source,
        })?;

        let result = fs::read_to_string(&self.path);

        FileExt::unlock(&lock)?;
        Ok(result?)
    }

    fn write_locked(&self, contents: &[u8]) -> Result<(), SettingsError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let lock = self.open_lock_file()?;
        FileExt::lock_exclusive(&lock).map_err(|source| SettingsError::Lock {
            path: self.lock_path.display().to_string(),
            source,
        })?;

        let result = Self::replace_file(&dir, &self.path, contents);

        FileExt::unlock(&lock)?;
        result
    }

    fn replace_file(dir: &Path, path: &Path, contents: &[u8]) -> Result<(), SettingsError> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
        }

        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| SettingsError::Io(e.error))?;
        Ok(())
    }
}
