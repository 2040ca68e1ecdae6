//! CertMate configuration
//!
//! Two layers live here:
//!
//! - [`Settings`]: operator data persisted as `settings.json` through
//!   [`SettingsStore`], with validation, load-time migration of domain
//!   entries and bearer-token repair.
//! - [`AppConfig`]: process configuration from `CERTMATE_*` environment
//!   variables.

pub mod app;
pub mod domains;
pub mod errors;
pub mod provider;
pub mod settings;
pub mod store;

pub use app::{AppConfig, ENV_PREFIX, TOKEN_ENV_VAR};
pub use domains::{migrate_domains, normalize_domains, DomainEntry, RawDomainEntry};
pub use errors::{ConfigError, SettingsError};
pub use provider::{ProviderConfig, ProviderFields, MASK_SENTINEL, SECRET_FIELDS};
pub use settings::{MaskedSettings, Settings, SettingsUpdate, DEFAULT_DNS_PROVIDER};
pub use store::SettingsStore;
