// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("CA hierarchy has not been initialised in this directory. Run 'gimmecert init' first.")]
    NotInitialised,

    #[error("CA hierarchy has already been initialised at {0}. Remove it to start over.")]
    AlreadyInitialised(PathBuf),

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Certificate generation failed: {0}")]
    CertGen(#[from] rcgen::Error),

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid CA hierarchy depth: {0}")]
    InvalidDepth(String),

    #[error("Invalid validity period: {0}")]
    InvalidDays(String),

    #[error("Invalid key specification '{0}'. Supported: ecdsa:secp256r1, ecdsa:secp384r1, ed25519")]
    InvalidKeySpec(String),

    #[error("No {role} certificate named '{name}' has been issued.")]
    CertificateNotFound { role: String, name: String },

    #[error("Invalid certificate signing request: {0}")]
    MalformedCsr(String),

    #[error("Failed to parse certificate: {0}")]
    CertParse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
