// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::ca::CaLevel;
use crate::error::{Error, Result};
use crate::fs::read_to_string;
use crate::keys::{generate_key_pair, KeySpec};
use crate::store::Store;
use crate::x509::{
    build_identity, issue_certificate, parse_csr, validate_days, Profile, Qualifier, SubjectKey,
    Validity,
};
use once_cell::sync::Lazy;
use rcgen::KeyPair;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// A single DNS label: alphanumerics and inner hyphens, 1-63 characters.
static DNS_LABEL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("invalid DNS label regex")
});

/// Maximum DNS name length per RFC 1035
const MAX_DNS_NAME_LENGTH: usize = 253;

/// Leaf certificate role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Server, Role::Client];

    /// Directory under the artifact store holding this role's leaves.
    pub fn dir_name(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "server" => Ok(Role::Server),
            "client" => Ok(Role::Client),
            _ => Err(Error::InvalidName {
                name: s.to_string(),
                reason: "role must be 'server' or 'client'".into(),
            }),
        }
    }
}

/// Validate a DNS name: dot-separated labels, no wildcards, no trailing dot.
pub fn validate_dns_name(name: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty".into()));
    }

    if name.len() > MAX_DNS_NAME_LENGTH {
        return Err(invalid(format!(
            "DNS name exceeds maximum length of {} characters",
            MAX_DNS_NAME_LENGTH
        )));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(invalid("DNS name contains an empty label".into()));
        }
        if !DNS_LABEL_REGEX.is_match(label) {
            return Err(invalid(format!(
                "'{}' is not a valid DNS label (letters, digits and inner hyphens, at most 63 characters)",
                label
            )));
        }
    }

    Ok(())
}

/// Key and validity settings for leaf issuance.
#[derive(Debug, Clone, Copy)]
pub struct LeafOptions {
    pub key_spec: KeySpec,
    pub validity_days: u32,
}

impl Default for LeafOptions {
    fn default() -> Self {
        Self {
            key_spec: KeySpec::default(),
            validity_days: 365,
        }
    }
}

/// A freshly issued leaf certificate, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafResult {
    pub role: Role,
    pub name: String,
    /// SAN DNS names in certificate order (empty for clients).
    pub dns_names: Vec<String>,
    pub cert_pem: String,
    /// Generated private key, absent when issued from a CSR.
    pub key_pem: Option<String>,
    /// The CSR the certificate was issued for, if any.
    pub csr_pem: Option<String>,
}

impl LeafResult {
    pub fn issued_from_csr(&self) -> bool {
        self.key_pem.is_none()
    }
}

/// Where the public key of a new leaf comes from.
enum LeafKey<'a> {
    Generate,
    Existing(&'a KeyPair),
    Csr(&'a str),
}

fn check_names(role: Role, entity_name: &str, extra_dns_names: &[String]) -> Result<()> {
    validate_dns_name(entity_name)?;
    if role == Role::Client && !extra_dns_names.is_empty() {
        return Err(Error::InvalidName {
            name: extra_dns_names.join(","),
            reason: "client certificates do not carry DNS names".into(),
        });
    }
    for name in extra_dns_names {
        validate_dns_name(name)?;
    }
    Ok(())
}

/// Issue a server or client certificate signed by `issuing_ca`.
///
/// Without a CSR a new private key is generated and returned. With a CSR only
/// its public key is used; the subject and SANs always come from
/// `entity_name` and `extra_dns_names`, never from the request.
pub fn issue_leaf(
    role: Role,
    entity_name: &str,
    extra_dns_names: &[String],
    csr_pem: Option<&str>,
    issuing_ca: &CaLevel,
    options: &LeafOptions,
) -> Result<LeafResult> {
    let key = match csr_pem {
        Some(pem) => LeafKey::Csr(pem),
        None => LeafKey::Generate,
    };
    sign_leaf(role, entity_name, extra_dns_names, key, issuing_ca, options)
}

fn sign_leaf(
    role: Role,
    entity_name: &str,
    extra_dns_names: &[String],
    key: LeafKey<'_>,
    issuing_ca: &CaLevel,
    options: &LeafOptions,
) -> Result<LeafResult> {
    check_names(role, entity_name, extra_dns_names)?;
    validate_days(options.validity_days)?;

    let ca_info = issuing_ca.info()?;
    let validity =
        Validity::starting_now(options.validity_days).clamp_to(ca_info.validity.not_after);

    let dns_names: Vec<String> = match role {
        Role::Server => std::iter::once(entity_name.to_string())
            .chain(extra_dns_names.iter().cloned())
            .collect(),
        Role::Client => Vec::new(),
    };
    let profile = match role {
        Role::Server => Profile::Server {
            dns_names: dns_names.clone(),
        },
        Role::Client => Profile::Client,
    };

    let identity = build_identity("", Qualifier::Entity(entity_name));
    let issuer = issuing_ca.issuer()?;

    let (cert, key_pem, csr_pem) = match key {
        LeafKey::Generate => {
            let key_pair = generate_key_pair(options.key_spec)?;
            let cert = issue_certificate(
                &identity,
                SubjectKey::Generated(&key_pair),
                Some(&issuer),
                validity,
                &profile,
            )?;
            (cert, Some(key_pair.serialize_pem()), None)
        }
        LeafKey::Existing(key_pair) => {
            let cert = issue_certificate(
                &identity,
                SubjectKey::Generated(key_pair),
                Some(&issuer),
                validity,
                &profile,
            )?;
            (cert, Some(key_pair.serialize_pem()), None)
        }
        LeafKey::Csr(pem) => {
            let csr = parse_csr(pem)?;
            debug!(
                requested_subject = csr.requested_subject(),
                issued_subject = %identity,
                "Ignoring subject and extensions requested in CSR"
            );
            let csr_pem = csr.pem().to_string();
            let cert = issue_certificate(
                &identity,
                SubjectKey::Csr(csr),
                Some(&issuer),
                validity,
                &profile,
            )?;
            (cert, None, Some(csr_pem))
        }
    };

    Ok(LeafResult {
        role,
        name: entity_name.to_string(),
        dns_names,
        cert_pem: cert.pem(),
        key_pem,
        csr_pem,
    })
}

/// Issue a leaf from the store's issuing CA and persist it.
///
/// Names are validated before the hierarchy is even loaded, so an invalid
/// request never produces key material or files.
pub fn issue(
    store: &Store,
    role: Role,
    entity_name: &str,
    extra_dns_names: &[String],
    csr_pem: Option<&str>,
    options: &LeafOptions,
) -> Result<LeafResult> {
    check_names(role, entity_name, extra_dns_names)?;

    let hierarchy = store.load_hierarchy()?;
    let result = issue_leaf(
        role,
        entity_name,
        extra_dns_names,
        csr_pem,
        hierarchy.issuing_ca(),
        options,
    )?;
    store.save_leaf(&result)?;

    info!(
        %role,
        name = entity_name,
        from_csr = result.issued_from_csr(),
        "Issued certificate"
    );

    Ok(result)
}

/// How [`renew`] should treat the key and DNS names of an existing leaf.
#[derive(Debug, Clone, Default)]
pub struct RenewOptions {
    /// Replace the existing key (or CSR) with a freshly generated key.
    pub new_private_key: bool,
    /// Replace the extra DNS names. `None` keeps those of the current certificate.
    pub dns_names: Option<Vec<String>>,
}

/// Re-issue an existing leaf with a new serial number and validity window.
pub fn renew(
    store: &Store,
    role: Role,
    entity_name: &str,
    renew_options: &RenewOptions,
    options: &LeafOptions,
) -> Result<LeafResult> {
    validate_dns_name(entity_name)?;

    let hierarchy = store.load_hierarchy()?;
    let record = store.load_leaf(role, entity_name)?;

    let extra_dns_names = match &renew_options.dns_names {
        Some(names) => names.clone(),
        None => record.info.dns_names.iter().skip(1).cloned().collect(),
    };

    let existing_key;
    let csr_pem;
    let key = if renew_options.new_private_key {
        LeafKey::Generate
    } else if let Some(key_path) = &record.private_key {
        existing_key = KeyPair::from_pem(&read_to_string(key_path)?)?;
        LeafKey::Existing(&existing_key)
    } else if let Some(csr_path) = &record.csr {
        csr_pem = read_to_string(csr_path)?;
        LeafKey::Csr(&csr_pem)
    } else {
        LeafKey::Generate
    };

    let result = sign_leaf(
        role,
        entity_name,
        &extra_dns_names,
        key,
        hierarchy.issuing_ca(),
        options,
    )?;
    store.save_leaf(&result)?;

    info!(
        %role,
        name = entity_name,
        new_private_key = renew_options.new_private_key,
        "Renewed certificate"
    );

    Ok(result)
}
