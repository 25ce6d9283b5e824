// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! On-disk layout of CA and leaf artifacts under `.gimmecert/`.

use crate::ca::{CaHierarchy, CaLevel};
use crate::cert::{LeafResult, Role};
use crate::config::Paths;
use crate::error::{Error, Result};
use crate::fs::{atomic_write, atomic_write_secret, read_to_string, remove_if_exists};
use crate::x509::{parse_cert_pem, CertInfo};
use rcgen::KeyPair;
use std::path::{Path, PathBuf};
use tracing::debug;

const CERT_SUFFIX: &str = ".cert.pem";

/// Artifact store rooted at a project directory.
#[derive(Debug, Clone)]
pub struct Store {
    paths: Paths,
}

/// A leaf certificate as found on disk.
#[derive(Debug, Clone)]
pub struct LeafRecord {
    pub role: Role,
    pub name: String,
    pub cert_path: PathBuf,
    /// Set when the private key was generated here.
    pub private_key: Option<PathBuf>,
    /// The stored CSR, if one is still present.
    pub csr: Option<PathBuf>,
    pub cert_pem: String,
    pub info: CertInfo,
}

impl LeafRecord {
    /// A leaf without a private key was issued from an external CSR.
    pub fn issued_from_csr(&self) -> bool {
        self.private_key.is_none()
    }
}

impl Store {
    pub fn open(project: &Path) -> Self {
        Self {
            paths: Paths::new(project),
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Whether a CA hierarchy exists in this store.
    pub fn is_initialised(&self) -> bool {
        self.paths.ca_dir.is_dir()
            && self.paths.ca_key(1).is_file()
            && self.paths.ca_cert(1).is_file()
    }

    /// Load CA levels 1, 2, ... up to the first missing level.
    pub fn load_hierarchy(&self) -> Result<CaHierarchy> {
        if !self.is_initialised() {
            return Err(Error::NotInitialised);
        }

        let mut levels = Vec::new();
        for level in 1u32.. {
            let key_path = self.paths.ca_key(level);
            let cert_path = self.paths.ca_cert(level);
            if !key_path.is_file() || !cert_path.is_file() {
                break;
            }

            let key_pair = KeyPair::from_pem(&read_to_string(&key_path)?)?;
            let cert_pem = read_to_string(&cert_path)?;
            levels.push(CaLevel {
                level,
                key_pair,
                cert_pem,
            });
        }

        debug!(depth = levels.len(), "Loaded CA hierarchy");
        CaHierarchy::from_levels(levels)
    }

    pub fn save_hierarchy(&self, hierarchy: &CaHierarchy) -> Result<()> {
        self.paths.ensure_dir(&self.paths.base)?;
        self.paths.ensure_dir(&self.paths.ca_dir)?;

        for level in hierarchy.levels() {
            let key_path = self.paths.ca_key(level.level);
            let cert_path = self.paths.ca_cert(level.level);
            atomic_write_secret(&key_path, level.key_pair.serialize_pem().as_bytes())?;
            atomic_write(&cert_path, level.cert_pem.as_bytes())?;
            debug!(
                level = level.level,
                cert = %cert_path.display(),
                "Wrote CA artifacts"
            );
        }

        atomic_write(
            &self.paths.full_chain,
            hierarchy.full_chain_pem().as_bytes(),
        )?;
        debug!(path = %self.paths.full_chain.display(), "Wrote full chain");

        Ok(())
    }

    /// Persist a leaf. The key (or CSR) is written before the certificate, and
    /// whichever of the two no longer applies is removed.
    pub fn save_leaf(&self, leaf: &LeafResult) -> Result<LeafRecord> {
        let dir = self.paths.role_dir(leaf.role);
        self.paths.ensure_dir(&self.paths.base)?;
        self.paths.ensure_dir(&dir)?;

        let key_path = self.paths.leaf_key(leaf.role, &leaf.name);
        let csr_path = self.paths.leaf_csr(leaf.role, &leaf.name);
        let cert_path = self.paths.leaf_cert(leaf.role, &leaf.name);

        let (private_key, csr) = match (&leaf.key_pem, &leaf.csr_pem) {
            (Some(key_pem), _) => {
                atomic_write_secret(&key_path, key_pem.as_bytes())?;
                remove_if_exists(&csr_path)?;
                (Some(key_path), None)
            }
            (None, Some(csr_pem)) => {
                atomic_write(&csr_path, csr_pem.as_bytes())?;
                remove_if_exists(&key_path)?;
                (None, Some(csr_path))
            }
            (None, None) => (None, None),
        };

        atomic_write(&cert_path, leaf.cert_pem.as_bytes())?;
        debug!(role = %leaf.role, name = %leaf.name, cert = %cert_path.display(), "Wrote leaf artifacts");

        Ok(LeafRecord {
            role: leaf.role,
            name: leaf.name.clone(),
            cert_path,
            private_key,
            csr,
            info: parse_cert_pem(&leaf.cert_pem)?,
            cert_pem: leaf.cert_pem.clone(),
        })
    }

    pub fn load_leaf(&self, role: Role, name: &str) -> Result<LeafRecord> {
        let cert_path = self.paths.leaf_cert(role, name);
        if !cert_path.is_file() {
            return Err(Error::CertificateNotFound {
                role: role.to_string(),
                name: name.to_string(),
            });
        }

        let cert_pem = read_to_string(&cert_path)?;
        let info = parse_cert_pem(&cert_pem)?;
        let key_path = self.paths.leaf_key(role, name);
        let csr_path = self.paths.leaf_csr(role, name);

        Ok(LeafRecord {
            role,
            name: name.to_string(),
            cert_path,
            private_key: key_path.is_file().then_some(key_path),
            csr: csr_path.is_file().then_some(csr_path),
            cert_pem,
            info,
        })
    }

    /// All leaves of `role`, sorted by name. A certificate file is what makes
    /// a leaf exist; stray keys or CSRs are ignored.
    pub fn load_all_leaves(&self, role: Role) -> Result<Vec<LeafRecord>> {
        let dir = self.paths.role_dir(role);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&dir).map_err(|e| Error::ReadDir {
            path: dir.clone(),
            source: e,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::ReadDir {
                path: dir.clone(),
                source: e,
            })?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(name) = file_name.strip_suffix(CERT_SUFFIX) {
                if !name.is_empty() && entry.path().is_file() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        names
            .iter()
            .map(|name| self.load_leaf(role, name))
            .collect()
    }
}
