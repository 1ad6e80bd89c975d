//! Process settings.
//!
//! Built once per process from the environment; the CLI then applies its
//! flag overrides on top (flags win).

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::env::{self, Environment};
use crate::store::StoreSettings;

/// Directory holding the config file, under home or the working directory.
pub const CONFIG_DIR: &str = ".asc";

/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.json";

/// Secret-store service name.
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "asc";

/// API base URL used by network validation.
pub const DEFAULT_BASE_URL: &str = "https://api.appstoreconnect.apple.com/";

/// Network validation timeout when `ASC_TIMEOUT` is unset.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No home directory and no explicit global config path.
    #[error("cannot determine home directory; set ${}", env::CONFIG_PATH)]
    NoHomeDirectory,

    /// An environment variable holds an unusable value.
    #[error("invalid ${var}={value:?}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for one process.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Per-user config file.
    pub global_config: PathBuf,

    /// Per-working-directory config file.
    pub local_config: PathBuf,

    /// Skip the platform secret store entirely.
    pub bypass_keychain: bool,

    /// Reject identities assembled from several sources.
    pub strict: bool,

    /// Explicitly selected profile.
    pub profile: Option<String>,

    /// Secret-store service name.
    pub keychain_service: String,

    /// API base URL for network validation.
    pub base_url: Url,

    /// Network validation timeout.
    pub network_timeout: Duration,
}

impl Settings {
    /// Read settings from `env`, resolving the local config against `cwd`.
    ///
    /// Unrecognised toggle values are treated as off and logged; `doctor`
    /// reports them.
    pub fn from_env(env: &dyn Environment, cwd: &Path) -> Result<Self, ConfigError> {
        let global_config = match env.var(env::CONFIG_PATH) {
            Some(path) => PathBuf::from(path.trim()),
            None => BaseDirs::new()
                .map(|dirs| default_config_path(dirs.home_dir()))
                .ok_or(ConfigError::NoHomeDirectory)?,
        };

        let base_url = match env.var(env::BASE_URL) {
            Some(value) => Url::parse(value.trim()).map_err(|e| ConfigError::InvalidValue {
                var: env::BASE_URL,
                value,
                reason: e.to_string(),
            })?,
            None => Url::parse(DEFAULT_BASE_URL).map_err(|e| ConfigError::InvalidValue {
                var: env::BASE_URL,
                value: DEFAULT_BASE_URL.to_string(),
                reason: e.to_string(),
            })?,
        };

        let network_timeout = match env.var(env::TIMEOUT) {
            Some(value) => parse_timeout(&value).ok_or_else(|| ConfigError::InvalidValue {
                var: env::TIMEOUT,
                value,
                reason: "expected seconds, or a value ending in 'ms' or 's'".to_string(),
            })?,
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            global_config,
            local_config: default_config_path(cwd),
            bypass_keychain: toggle(env, env::BYPASS_KEYCHAIN),
            strict: toggle(env, env::STRICT_AUTH),
            profile: env.var(env::PROFILE).map(|p| p.trim().to_string()),
            keychain_service: DEFAULT_KEYCHAIN_SERVICE.to_string(),
            base_url,
            network_timeout,
        })
    }

    /// Inputs for backend selection.
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            global_path: self.global_config.clone(),
            local_path: self.local_config.clone(),
            bypass_keychain: self.bypass_keychain,
            keychain_service: self.keychain_service.clone(),
        }
    }
}

/// `<dir>/.asc/config.json`
pub fn default_config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Parse `10`, `10s` or `500ms`. Zero is rejected.
pub fn parse_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    let duration = if let Some(ms) = value.strip_suffix("ms") {
        Duration::from_millis(ms.trim().parse().ok()?)
    } else {
        let secs = value.strip_suffix('s').unwrap_or(value);
        Duration::from_secs(secs.trim().parse().ok()?)
    };
    (!duration.is_zero()).then_some(duration)
}

fn toggle(env: &dyn Environment, var: &'static str) -> bool {
    env.flag(var).unwrap_or_else(|value| {
        tracing::warn!("ignoring unrecognised ${}={:?}", var, value);
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;

    fn settings(env: &MapEnv) -> Settings {
        let env = env.clone().with(env::CONFIG_PATH, "/home/test/.asc/config.json");
        Settings::from_env(&env, Path::new("/work/repo")).unwrap()
    }

    #[test]
    fn test_defaults() {
        let s = settings(&MapEnv::new());
        assert_eq!(s.global_config, PathBuf::from("/home/test/.asc/config.json"));
        assert_eq!(s.local_config, PathBuf::from("/work/repo/.asc/config.json"));
        assert!(!s.bypass_keychain);
        assert!(!s.strict);
        assert!(s.profile.is_none());
        assert_eq!(s.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(s.network_timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_environment_overrides() {
        let env = MapEnv::new()
            .with(env::BYPASS_KEYCHAIN, "1")
            .with(env::STRICT_AUTH, "yes")
            .with(env::PROFILE, "ci")
            .with(env::BASE_URL, "http://127.0.0.1:8080/")
            .with(env::TIMEOUT, "250ms");
        let s = settings(&env);

        assert!(s.bypass_keychain);
        assert!(s.strict);
        assert_eq!(s.profile.as_deref(), Some("ci"));
        assert_eq!(s.base_url.as_str(), "http://127.0.0.1:8080/");
        assert_eq!(s.network_timeout, Duration::from_millis(250));

        let store = s.store_settings();
        assert!(store.bypass_keychain);
        assert_eq!(store.keychain_service, "asc");
    }

    #[test]
    fn test_unrecognised_toggle_is_off() {
        let s = settings(&MapEnv::new().with(env::STRICT_AUTH, "sometimes"));
        assert!(!s.strict);
    }

    #[test]
    fn test_invalid_timeout_and_url_rejected() {
        let env = MapEnv::new()
            .with(env::CONFIG_PATH, "/tmp/config.json")
            .with(env::TIMEOUT, "soon");
        let err = Settings::from_env(&env, Path::new("/")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: env::TIMEOUT, .. }));

        let env = MapEnv::new()
            .with(env::CONFIG_PATH, "/tmp/config.json")
            .with(env::BASE_URL, "not a url");
        assert!(Settings::from_env(&env, Path::new("/")).is_err());
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_timeout("3s"), Some(Duration::from_secs(3)));
        assert_eq!(parse_timeout("1500ms"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_timeout("0"), None);
        assert_eq!(parse_timeout("-1"), None);
    }
}
