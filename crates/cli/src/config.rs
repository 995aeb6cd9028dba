//! Client configuration: where the ledger lives and which identities can call it.
//!
//! # Example
//!
//! ```toml
//! ledger = "visanet-ledger.json"
//!
//! [identities.isabella]
//! msp_id = "Org2MSP"
//! id = "x509::/CN=isabella"
//!
//! [identities.isabella.attributes]
//! DN = "CN=isabella,OU=client"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use visanet_ledger::CallerIdentity;

/// Config file used when neither `--config` nor `VISANET_CONFIG` is given.
pub(crate) const DEFAULT_CONFIG: &str = "visanet.toml";
pub(crate) const CONFIG_ENV: &str = "VISANET_CONFIG";

fn default_ledger() -> PathBuf {
    PathBuf::from("visanet-ledger.json")
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Config {
    /// Ledger file, relative to the config file's directory.
    #[serde(default = "default_ledger")]
    pub ledger: PathBuf,
    /// Calling identities, keyed by wallet label.
    #[serde(default)]
    pub identities: BTreeMap<String, IdentityConfig>,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IdentityConfig {
    pub msp_id: String,
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Config {
    /// Resolved path of the ledger file.
    pub fn ledger_path(&self) -> PathBuf {
        if self.ledger.is_absolute() {
            self.ledger.clone()
        } else {
            self.base_dir.join(&self.ledger)
        }
    }

    /// The identity registered under `name`.
    pub fn identity(&self, name: &str) -> Result<CallerIdentity, String> {
        let entry = self.identities.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.identities.keys().map(String::as_str).collect();
            format!(
                "identity '{}' not found in config (known identities: {})",
                name,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            )
        })?;
        Ok(CallerIdentity {
            msp_id: entry.msp_id.clone(),
            id: entry.id.clone(),
            attributes: entry.attributes.clone(),
        })
    }
}

/// Pick the config path: explicit flag, then environment, then the default.
pub(crate) fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG),
    }
}

/// Read and parse a config TOML file.
///
/// Returns a human-readable error string on failure.
pub(crate) fn read_config(path: &Path) -> Result<Config, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read config '{}': {}", path.display(), e))?;
    let mut config: Config = toml::from_str(&content)
        .map_err(|e| format!("could not parse config '{}': {}", path.display(), e))?;
    config.base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
ledger = "state/ledger.json"

[identities.isabella]
msp_id = "Org2MSP"
id = "x509::/CN=isabella"

[identities.officer]
msp_id = "Org1MSP"
id = "x509::/CN=officer"

[identities.officer.attributes]
DN = "CN=officer,OU=embassy"
"#;

    fn sample() -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visanet.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        read_config(&path).unwrap()
    }

    #[test]
    fn parses_identities_and_attributes() {
        let config = sample();
        let officer = config.identity("officer").unwrap();
        assert_eq!(officer.organization_id(), "Org1MSP");
        assert_eq!(officer.attribute("DN"), Some("CN=officer,OU=embassy"));
        let isabella = config.identity("isabella").unwrap();
        assert_eq!(isabella.attribute("DN"), None);
    }

    #[test]
    fn ledger_path_is_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visanet.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = read_config(&path).unwrap();
        assert_eq!(config.ledger_path(), dir.path().join("state/ledger.json"));
    }

    #[test]
    fn ledger_defaults_when_omitted() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.ledger, PathBuf::from("visanet-ledger.json"));
        assert!(config.identities.is_empty());
    }

    #[test]
    fn unknown_identity_lists_known_ones() {
        let err = sample().identity("mallory").unwrap_err();
        assert!(err.contains("mallory"), "{}", err);
        assert!(err.contains("isabella, officer"), "{}", err);
    }

    #[test]
    fn explicit_path_wins() {
        assert_eq!(
            resolve_config_path(Some(Path::new("/tmp/x.toml"))),
            PathBuf::from("/tmp/x.toml")
        );
    }

    #[test]
    fn missing_file_is_reported() {
        let err = read_config(Path::new("/nonexistent/visanet.toml")).unwrap_err();
        assert!(err.contains("could not read config"), "{}", err);
    }
}
