use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::Commitment;

pub const WORKDIR_ENV: &str = "ESCROW_WORKDIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} must be greater than zero")]
    ZeroAmount(&'static str),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// The agreed trade, shared by both parties before any flow runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terms {
    /// Units of asset Y the initializer wants for its deposit.
    #[serde(alias = "aliceExpectedAmount")]
    pub initializer_expected_amount: u64,
    /// Units of asset X the counterparty receives, i.e. the deposit.
    #[serde(alias = "bobExpectedAmount")]
    pub counterparty_expected_amount: u64,
}

impl Default for Terms {
    fn default() -> Self {
        Self {
            initializer_expected_amount: 100,
            counterparty_expected_amount: 50,
        }
    }
}

impl Terms {
    /// Reads and validates `terms.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let terms: Terms = read_json(path.as_ref())?;
        terms.validate()?;
        Ok(terms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initializer_expected_amount == 0 {
            return Err(ConfigError::ZeroAmount("initializerExpectedAmount"));
        }
        if self.counterparty_expected_amount == 0 {
            return Err(ConfigError::ZeroAmount("counterpartyExpectedAmount"));
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// How flows talk to the ledger. Read from `escrow.json` when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub commitment: Commitment,
    pub skip_preflight: bool,
    /// Pause between submitting and re-reading state.
    pub settle_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            commitment: Commitment::Confirmed,
            skip_preflight: false,
            settle_delay_ms: 1000,
        }
    }
}

impl ClientConfig {
    /// Falls back to defaults if the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        read_json(path)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Fixed local paths the CLI reads from, relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    root: PathBuf,
}

impl Settings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$ESCROW_WORKDIR`, or the current directory.
    pub fn from_env() -> Self {
        let root = std::env::var_os(WORKDIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    pub fn terms_path(&self) -> PathBuf {
        self.root.join("terms.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join("ledger.json")
    }

    pub fn client_config_path(&self) -> PathBuf {
        self.root.join("escrow.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_accept_both_spellings() {
        let current: Terms =
            serde_json::from_str(r#"{"initializerExpectedAmount":100,"counterpartyExpectedAmount":50}"#)
                .unwrap();
        let legacy: Terms =
            serde_json::from_str(r#"{"aliceExpectedAmount":100,"bobExpectedAmount":50}"#).unwrap();
        assert_eq!(current, legacy);
        assert_eq!(current, Terms::default());
    }

    #[test]
    fn zero_amounts_are_rejected() {
        let terms = Terms {
            initializer_expected_amount: 0,
            counterparty_expected_amount: 50,
        };
        assert!(matches!(
            terms.validate(),
            Err(ConfigError::ZeroAmount("initializerExpectedAmount"))
        ));
    }

    #[test]
    fn client_config_fills_missing_fields() {
        let config: ClientConfig = serde_json::from_str(r#"{"skipPreflight":true}"#).unwrap();
        assert!(config.skip_preflight);
        assert_eq!(config.commitment, Commitment::Confirmed);
        assert_eq!(config.settle_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn missing_client_config_uses_defaults() {
        let dir = std::env::temp_dir().join(format!("escrow-config-{}", std::process::id()));
        let config = ClientConfig::load_or_default(dir.join("escrow.json")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn settings_resolve_under_root() {
        let settings = Settings::new("/tmp/w");
        assert_eq!(settings.keys_dir(), PathBuf::from("/tmp/w/keys"));
        assert_eq!(settings.terms_path(), PathBuf::from("/tmp/w/terms.json"));
        assert_eq!(settings.ledger_path(), PathBuf::from("/tmp/w/ledger.json"));
    }
}
