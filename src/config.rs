// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::cert::Role;
use crate::error::{Error, Result};
use crate::keys::KeySpec;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Current config file version. Increment when making breaking changes.
const CONFIG_VERSION: u32 = 1;

/// Name of the optional per-project configuration file.
pub const CONFIG_FILE_NAME: &str = "gimmecert.toml";

/// Name of the artifact directory inside the project directory.
pub const STORE_DIR_NAME: &str = ".gimmecert";

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Config file version for future migration support
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default = "default_cert_days")]
    pub cert_days: u32,
    #[serde(default = "default_ca_days")]
    pub ca_days: u32,
    #[serde(default = "default_key_specification")]
    pub key_specification: String,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

fn default_cert_days() -> u32 {
    365
}

fn default_ca_days() -> u32 {
    3650
}

fn default_key_specification() -> String {
    KeySpec::default().to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            cert_days: default_cert_days(),
            ca_days: default_ca_days(),
            key_specification: default_key_specification(),
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
        } else {
            Self::default()
        };

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        use crate::x509::validate_days;

        if self.config_version > CONFIG_VERSION {
            tracing::warn!(
                found = self.config_version,
                supported = CONFIG_VERSION,
                "{} is newer than this version of gimmecert understands",
                CONFIG_FILE_NAME
            );
        }

        validate_days(self.cert_days)
            .map_err(|e| Error::Config(format!("cert_days: {}", e)))?;
        validate_days(self.ca_days).map_err(|e| Error::Config(format!("ca_days: {}", e)))?;
        self.key_spec()?;

        Ok(())
    }

    pub fn key_spec(&self) -> Result<KeySpec> {
        self.key_specification.parse()
    }
}

/// Fixed artifact layout under `<project>/.gimmecert/`.
#[derive(Debug, Clone)]
pub struct Paths {
    pub project: PathBuf,
    pub base: PathBuf,
    pub ca_dir: PathBuf,
    pub full_chain: PathBuf,
    pub config: PathBuf,
}

impl Paths {
    pub fn new(project: &Path) -> Self {
        let base = project.join(STORE_DIR_NAME);
        let ca_dir = base.join("ca");
        Self {
            project: project.to_path_buf(),
            full_chain: ca_dir.join("chain-full.cert.pem"),
            config: project.join(CONFIG_FILE_NAME),
            ca_dir,
            base,
        }
    }

    pub fn ca_key(&self, level: u32) -> PathBuf {
        self.ca_dir.join(format!("level{}.key.pem", level))
    }

    pub fn ca_cert(&self, level: u32) -> PathBuf {
        self.ca_dir.join(format!("level{}.cert.pem", level))
    }

    pub fn role_dir(&self, role: Role) -> PathBuf {
        self.base.join(role.dir_name())
    }

    pub fn leaf_key(&self, role: Role, name: &str) -> PathBuf {
        self.role_dir(role).join(format!("{}.key.pem", name))
    }

    pub fn leaf_csr(&self, role: Role, name: &str) -> PathBuf {
        self.role_dir(role).join(format!("{}.csr.pem", name))
    }

    pub fn leaf_cert(&self, role: Role, name: &str) -> PathBuf {
        self.role_dir(role).join(format!("{}.cert.pem", name))
    }

    /// `path` relative to the project directory, for display.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.project)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    pub fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| Error::CreateDir {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cert_days, 365);
        assert_eq!(config.ca_days, 3650);
        assert_eq!(config.key_spec().unwrap(), KeySpec::EcdsaP256);
    }

    #[test]
    fn test_config_load_missing_file() {
        let path = PathBuf::from("/nonexistent/gimmecert.toml");
        let config =
            Config::load(&path).expect("Config should load with defaults for missing file");

        assert_eq!(config.cert_days, 365);
        assert_eq!(config.ca_days, 3650);
    }

    #[test]
    fn test_config_load_custom_values() {
        let mut file = NamedTempFile::new().expect("temp file should be created");
        writeln!(file, "cert_days = 7").expect("write cert_days should succeed");
        writeln!(file, "ca_days = 365").expect("write ca_days should succeed");
        writeln!(file, "key_specification = \"ed25519\"").expect("write key spec should succeed");

        let config = Config::load(file.path()).expect("Config should load successfully");
        assert_eq!(config.cert_days, 7);
        assert_eq!(config.ca_days, 365);
        assert_eq!(config.key_spec().unwrap(), KeySpec::Ed25519);
    }

    #[test]
    fn test_config_load_partial() {
        let mut file = NamedTempFile::new().expect("temp file should be created");
        writeln!(file, "cert_days = 30").expect("write should succeed");

        let config = Config::load(file.path()).expect("Config should load successfully");
        assert_eq!(config.cert_days, 30);
        assert_eq!(config.ca_days, 3650);
    }

    #[test]
    fn test_config_rejects_zero_days() {
        let mut file = NamedTempFile::new().expect("temp file should be created");
        writeln!(file, "cert_days = 0").expect("write should succeed");

        assert!(matches!(Config::load(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_rejects_unknown_key_spec() {
        let mut file = NamedTempFile::new().expect("temp file should be created");
        writeln!(file, "key_specification = \"rsa:512\"").expect("write should succeed");

        assert!(matches!(
            Config::load(file.path()),
            Err(Error::InvalidKeySpec(_))
        ));
    }

    #[test]
    fn test_config_rejects_invalid_toml() {
        let mut file = NamedTempFile::new().expect("temp file should be created");
        writeln!(file, "cert_days = \"many\"").expect("write should succeed");

        assert!(matches!(Config::load(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_paths_layout() {
        let paths = Paths::new(Path::new("/work/project"));

        assert_eq!(
            paths.ca_key(2),
            PathBuf::from("/work/project/.gimmecert/ca/level2.key.pem")
        );
        assert_eq!(
            paths.ca_cert(1),
            PathBuf::from("/work/project/.gimmecert/ca/level1.cert.pem")
        );
        assert_eq!(
            paths.full_chain,
            PathBuf::from("/work/project/.gimmecert/ca/chain-full.cert.pem")
        );
        assert_eq!(
            paths.leaf_csr(Role::Client, "alice"),
            PathBuf::from("/work/project/.gimmecert/client/alice.csr.pem")
        );
        assert_eq!(
            paths.relative(&paths.leaf_cert(Role::Server, "web")),
            PathBuf::from(".gimmecert/server/web.cert.pem")
        );
    }
}
