// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Private CA hierarchies and leaf certificates for test environments.
//!
//! ```rust,no_run
//! use gimmecert::{ca, cert, render_status, HierarchyOptions, LeafOptions, Role, Store};
//! use std::path::Path;
//!
//! let store = Store::open(Path::new("."));
//! ca::init(&store, "My Project", 2, &HierarchyOptions::default())?;
//!
//! let extra = vec!["www.example.com".to_string()];
//! cert::issue(&store, Role::Server, "myserver", &extra, None, &LeafOptions::default())?;
//!
//! println!("{}", render_status(&store)?);
//! # Ok::<(), gimmecert::Error>(())
//! ```

/// CA hierarchy construction.
pub mod ca;
/// Server and client certificate issuance.
pub mod cert;
/// Configuration and artifact paths.
pub mod config;
/// Error types.
pub mod error;
/// Filesystem utilities.
pub mod fs;
/// Private key generation.
pub mod keys;
/// Status reporting.
pub mod status;
/// Artifact storage.
pub mod store;
/// X.509 building blocks and parsing.
pub mod x509;

pub use ca::{build_hierarchy, CaHierarchy, CaLevel, HierarchyOptions, ISSUING_CA_LABEL};
pub use cert::{issue_leaf, validate_dns_name, LeafOptions, LeafResult, RenewOptions, Role};
pub use config::{Config, Paths, CONFIG_FILE_NAME, STORE_DIR_NAME};
pub use error::{Error, Result};
pub use keys::{generate_key_pair, KeySpec};
pub use status::{render_status, Status, StatusReport};
pub use store::{LeafRecord, Store};
pub use x509::{parse_cert_file, parse_cert_pem, CertInfo, CertType, Validity, MAX_CERT_DAYS};
