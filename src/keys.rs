// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Private key generation policy.

use crate::error::{Error, Result};
use rcgen::{KeyPair, SignatureAlgorithm};
use std::fmt;
use std::str::FromStr;

/// Key algorithm used for newly generated CA and leaf keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeySpec {
    /// ECDSA over NIST P-256 with SHA-256.
    #[default]
    EcdsaP256,
    /// ECDSA over NIST P-384 with SHA-384.
    EcdsaP384,
    Ed25519,
}

impl KeySpec {
    /// All supported specifications, in the order they are listed to users.
    pub const ALL: [KeySpec; 3] = [KeySpec::EcdsaP256, KeySpec::EcdsaP384, KeySpec::Ed25519];

    fn algorithm(self) -> &'static SignatureAlgorithm {
        match self {
            KeySpec::EcdsaP256 => &rcgen::PKCS_ECDSA_P256_SHA256,
            KeySpec::EcdsaP384 => &rcgen::PKCS_ECDSA_P384_SHA384,
            KeySpec::Ed25519 => &rcgen::PKCS_ED25519,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeySpec::EcdsaP256 => "ecdsa:secp256r1",
            KeySpec::EcdsaP384 => "ecdsa:secp384r1",
            KeySpec::Ed25519 => "ed25519",
        }
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeySpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "ecdsa:secp256r1" | "ecdsa:prime256v1" | "ecdsa:p256" => Ok(KeySpec::EcdsaP256),
            "ecdsa:secp384r1" | "ecdsa:p384" => Ok(KeySpec::EcdsaP384),
            "ed25519" => Ok(KeySpec::Ed25519),
            _ => Err(Error::InvalidKeySpec(s.to_string())),
        }
    }
}

/// Generate a fresh key pair according to `spec`.
pub fn generate_key_pair(spec: KeySpec) -> Result<KeyPair> {
    Ok(KeyPair::generate_for(spec.algorithm())?)
}
