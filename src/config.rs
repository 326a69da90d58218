//! Runtime configuration.
//!
//! Loaded once from a JSON file and passed by reference to whatever needs
//! it. Every field has a default, so a file only has to name what differs:
//!
//! ```json
//! {
//!   "Paths": {
//!     "hactoolPath": "hactool",
//!     "keysPath": "keys.txt",
//!     "NXclientPath": "nx_tls_client_cert.pem",
//!     "certificatePath": "Certificate.cert",
//!     "ticketPath": "Ticket.tik",
//!     "outputDir": "."
//!   },
//!   "Values": {
//!     "Firmware": "5.1.0-0",
//!     "DeviceID": "0000000000000000",
//!     "Environment": "lp1"
//!   }
//! }
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// File name looked up next to the binary when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "nspkit.json";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct Config {
    pub paths: Paths,
    pub values: Values,
}

/// Files the tool reads or writes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Paths {
    /// External decryption utility.
    #[serde(rename = "hactoolPath")]
    pub hactool: PathBuf,
    /// Key database handed to the decryption utility. Empty means none.
    #[serde(rename = "keysPath")]
    pub keys: PathBuf,
    /// PEM file holding the client certificate and its private key.
    #[serde(rename = "NXclientPath")]
    pub client_cert: PathBuf,
    /// Certificate chain copied into application and add-on archives.
    #[serde(rename = "certificatePath")]
    pub certificate_template: PathBuf,
    /// Ticket patched with the title key for application and add-on archives.
    #[serde(rename = "ticketPath")]
    pub ticket_template: PathBuf,
    /// Root directory downloads are written under.
    #[serde(rename = "outputDir")]
    pub output_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            hactool: PathBuf::from("hactool"),
            keys: PathBuf::from("keys.txt"),
            client_cert: PathBuf::from("nx_tls_client_cert.pem"),
            certificate_template: PathBuf::from("Certificate.cert"),
            ticket_template: PathBuf::from("Ticket.tik"),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Identity presented to the CDN.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct Values {
    pub firmware: String,
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    pub environment: String,
}

impl Default for Values {
    fn default() -> Self {
        Self {
            firmware: "5.1.0-0".into(),
            device_id: "0000000000000000".into(),
            environment: "lp1".into(),
        }
    }
}

impl Config {
    /// Parse a configuration document without touching the filesystem.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_json(&json)?;
        if let Some(dir) = path.parent() {
            config.paths.resolve_against(dir);
        }
        Ok(config)
    }
}

impl Paths {
    fn resolve_against(&mut self, dir: &Path) {
        // A bare tool name is looked up on PATH.
        if self.hactool.components().count() > 1 {
            resolve(&mut self.hactool, dir);
        }
        for path in [
            &mut self.keys,
            &mut self.client_cert,
            &mut self.certificate_template,
            &mut self.ticket_template,
            &mut self.output_dir,
        ] {
            resolve(path, dir);
        }
    }
}

fn resolve(path: &mut PathBuf, dir: &Path) {
    // Empty means "not configured".
    if path.as_os_str().is_empty() || path.is_absolute() {
        return;
    }
    *path = dir.join(&*path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = Config::from_json(r#"{"Values": {"Environment": "dd1"}}"#).unwrap();
        assert_eq!(config.values.environment, "dd1");
        assert_eq!(config.values.firmware, "5.1.0-0");
        assert_eq!(config.paths, Paths::default());
    }

    #[test]
    fn reads_original_key_names_and_ignores_unknown() {
        let json = r#"{
            "Paths": {"hactoolPath": "/opt/hactool", "keysPath": "", "ShopNPath": "ShopN.pem"},
            "Values": {"Region": "US", "DeviceID": "0123456789abcdef"}
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.paths.hactool, PathBuf::from("/opt/hactool"));
        assert_eq!(config.paths.keys, PathBuf::new());
        assert_eq!(config.values.device_id, "0123456789abcdef");
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, r#"{"Paths": {"keysPath": "prod.keys", "outputDir": "out"}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.paths.keys, dir.path().join("prod.keys"));
        assert_eq!(config.paths.output_dir, dir.path().join("out"));
        // A bare tool name is left for PATH lookup.
        assert_eq!(config.paths.hactool, PathBuf::from("hactool"));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        assert!(matches!(Config::from_json("{"), Err(Error::Config(_))));
        assert!(matches!(
            Config::load(Path::new("/nonexistent/nspkit.json")),
            Err(Error::Config(_))
        ));
    }
}
