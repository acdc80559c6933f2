//! Configuration storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::sdes::CryptoSuite;

/// Application configuration
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tracing filter directive, e.g. `"debug"` or `"sdes_srtp=trace"`
    pub log_filter: Option<String>,
    /// SSRC for the local media stream (random when unset)
    pub local_ssrc: Option<u32>,
    /// Suite to offer before any answer was accepted (wire name)
    pub offer_suite: Option<String>,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "sdes-srtp", "sdes-srtp")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load configuration from `path`; a missing file gives defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.offer_suite()?;
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    /// The configured offer suite, validated against the supported set
    pub fn offer_suite(&self) -> Result<Option<CryptoSuite>> {
        self.offer_suite
            .as_deref()
            .map(|name| {
                name.parse::<CryptoSuite>()
                    .with_context(|| format!("Invalid offer_suite in config: {}", name))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sdes-srtp-test-{}-{}", std::process::id(), name))
            .join("config.toml")
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(&temp_path("missing")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("roundtrip");
        let config = Config {
            log_filter: Some("debug".into()),
            local_ssrc: Some(0xCAFE),
            offer_suite: Some("AES_CM_128_HMAC_SHA1_32".into()),
        };
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.offer_suite().unwrap(),
            Some(CryptoSuite::AesCm128HmacSha1_32)
        );
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_parse_partial_file() {
        let config: Config = toml::from_str("local_ssrc = 42\n").unwrap();
        assert_eq!(config.local_ssrc, Some(42));
        assert!(config.log_filter.is_none());
        assert_eq!(config.offer_suite().unwrap(), None);
    }

    #[test]
    fn test_bad_offer_suite_rejected() {
        let path = temp_path("badsuite");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "offer_suite = \"NULL\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
