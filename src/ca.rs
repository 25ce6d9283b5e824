// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::keys::{generate_key_pair, KeySpec};
use crate::store::Store;
use crate::x509::{
    build_identity, issue_certificate, parse_cert_pem, validate_days, CertInfo, Profile,
    Qualifier, SubjectKey, Validity,
};
use rcgen::{Issuer, KeyPair};
use tracing::info;

/// Label used for the last CA level, the only one that signs leaves.
pub const ISSUING_CA_LABEL: &str = "END ENTITY ISSUING CA";

/// One CA in the hierarchy, with its private key.
pub struct CaLevel {
    /// Position in the hierarchy, 1 being the self-signed root.
    pub level: u32,
    pub key_pair: KeyPair,
    pub cert_pem: String,
}

impl std::fmt::Debug for CaLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaLevel")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CaLevel {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level
            && self.cert_pem == other.cert_pem
            && self.key_pair.serialize_der() == other.key_pair.serialize_der()
    }
}

impl CaLevel {
    /// Create an Issuer for signing certificates
    ///
    /// Note: This recreates the KeyPair because Issuer takes ownership
    pub fn issuer(&self) -> Result<Issuer<'_, KeyPair>> {
        let key_pair = KeyPair::from_pem(&self.key_pair.serialize_pem())?;
        Issuer::from_ca_cert_pem(&self.cert_pem, key_pair).map_err(Error::CertGen)
    }

    pub fn info(&self) -> Result<CertInfo> {
        parse_cert_pem(&self.cert_pem)
    }
}

/// Ordered CA chain, root first. The last level is the end-entity issuing CA.
#[derive(Debug, PartialEq)]
pub struct CaHierarchy {
    levels: Vec<CaLevel>,
}

impl CaHierarchy {
    /// Wrap already-ordered levels. `levels` must not be empty.
    pub(crate) fn from_levels(levels: Vec<CaLevel>) -> Result<Self> {
        if levels.is_empty() {
            return Err(Error::NotInitialised);
        }
        Ok(Self { levels })
    }

    pub fn depth(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn levels(&self) -> &[CaLevel] {
        &self.levels
    }

    pub fn root(&self) -> &CaLevel {
        &self.levels[0]
    }

    /// The end-entity issuing CA.
    pub fn issuing_ca(&self) -> &CaLevel {
        &self.levels[self.levels.len() - 1]
    }

    /// All CA certificates concatenated from root to issuing CA.
    pub fn full_chain_pem(&self) -> String {
        self.levels
            .iter()
            .map(|level| level.cert_pem.as_str())
            .collect::<String>()
    }
}

/// Key and validity settings for a new hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct HierarchyOptions {
    pub key_spec: KeySpec,
    pub validity_days: u32,
}

impl Default for HierarchyOptions {
    fn default() -> Self {
        Self {
            key_spec: KeySpec::default(),
            validity_days: 3650,
        }
    }
}

/// Check that a base name can be embedded in CA subjects.
pub fn validate_base_name(base_name: &str) -> Result<()> {
    if base_name.trim().is_empty() {
        return Err(Error::InvalidName {
            name: base_name.to_string(),
            reason: "CA base name cannot be empty".into(),
        });
    }
    if base_name.chars().any(char::is_control) {
        return Err(Error::InvalidName {
            name: base_name.escape_default().to_string(),
            reason: "CA base name cannot contain control characters".into(),
        });
    }
    Ok(())
}

/// Build a chain of `depth` CAs named after `base_name`.
///
/// Level 1 is self-signed and each following level is signed by the one
/// before it. Path length constraints shrink by one per level so that the
/// last level can only sign leaves.
pub fn build_hierarchy(
    base_name: &str,
    depth: u32,
    options: &HierarchyOptions,
) -> Result<CaHierarchy> {
    validate_base_name(base_name)?;
    validate_days(options.validity_days)?;
    if depth == 0 {
        return Err(Error::InvalidDepth("depth must be at least 1".into()));
    }
    if u8::try_from(depth - 1).is_err() {
        return Err(Error::InvalidDepth(format!(
            "depth cannot exceed {}",
            u32::from(u8::MAX) + 1
        )));
    }

    let validity = Validity::starting_now(options.validity_days);
    let mut levels: Vec<CaLevel> = Vec::with_capacity(depth as usize);

    for level in 1..=depth {
        let key_pair = generate_key_pair(options.key_spec)?;
        let identity = build_identity(base_name, Qualifier::CaLevel(level));
        let path_len = (depth - level) as u8;
        let profile = Profile::Ca { path_len };

        let cert = match levels.last() {
            None => issue_certificate(
                &identity,
                SubjectKey::Generated(&key_pair),
                None,
                validity,
                &profile,
            )?,
            Some(parent) => {
                let issuer = parent.issuer()?;
                issue_certificate(
                    &identity,
                    SubjectKey::Generated(&key_pair),
                    Some(&issuer),
                    validity,
                    &profile,
                )?
            }
        };

        info!(level, subject = %identity, path_len, "Generated CA certificate");

        levels.push(CaLevel {
            level,
            key_pair,
            cert_pem: cert.pem(),
        });
    }

    CaHierarchy::from_levels(levels)
}

/// Build a new hierarchy and persist it in `store`.
///
/// Refuses to touch a store that is already initialised. A failure part-way
/// through persisting leaves a partial store behind; remove the artifact
/// directory before trying again.
pub fn init(
    store: &Store,
    base_name: &str,
    depth: u32,
    options: &HierarchyOptions,
) -> Result<CaHierarchy> {
    if store.is_initialised() {
        return Err(Error::AlreadyInitialised(store.paths().base.clone()));
    }

    let hierarchy = build_hierarchy(base_name, depth, options)?;
    store.save_hierarchy(&hierarchy)?;

    info!(
        depth,
        base_name,
        directory = %store.paths().base.display(),
        "Initialised CA hierarchy"
    );

    Ok(hierarchy)
}
