// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Human-readable view of everything issued, rebuilt from the store.

use crate::ca::ISSUING_CA_LABEL;
use crate::cert::Role;
use crate::error::Result;
use crate::store::{LeafRecord, Store};
use crate::x509::{Validity, ValidityState};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum Status {
    /// No CA hierarchy exists yet. Not an error.
    NotInitialised,
    Initialised(StatusReport),
}

#[derive(Debug, Clone)]
pub struct CaStatus {
    pub subject: String,
    pub validity: Validity,
    pub certificate: PathBuf,
    /// Set on the last level, the one that signs leaves.
    pub issuing: bool,
}

#[derive(Debug, Clone)]
pub struct LeafStatus {
    pub name: String,
    pub subject: String,
    pub validity: Validity,
    pub dns_names: Vec<String>,
    pub private_key: Option<PathBuf>,
    /// Set exactly when `private_key` is not.
    pub csr: Option<PathBuf>,
    pub certificate: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub ca_levels: Vec<CaStatus>,
    pub full_chain: PathBuf,
    pub servers: Vec<LeafStatus>,
    pub clients: Vec<LeafStatus>,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::NotInitialised => {
                writeln!(f, "CA hierarchy has not been initialised in current directory.")
            }
            Status::Initialised(report) => write!(f, "{}", report),
        }
    }
}

fn heading(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "{}", title)?;
    writeln!(f, "{}", "=".repeat(title.len()))?;
    writeln!(f)
}

fn validity_line(f: &mut fmt::Formatter<'_>, validity: &Validity) -> fmt::Result {
    let marker = match validity.state() {
        ValidityState::Valid => "",
        ValidityState::Expired => " [EXPIRED]",
        ValidityState::NotYetValid => " [NOT YET VALID]",
    };
    writeln!(f, "    Validity: {}{}", validity, marker)
}

fn leaf_section(f: &mut fmt::Formatter<'_>, role: Role, leaves: &[LeafStatus]) -> fmt::Result {
    let title = match role {
        Role::Server => "Server certificates",
        Role::Client => "Client certificates",
    };
    heading(f, title)?;

    if leaves.is_empty() {
        return writeln!(f, "No {} certificates have been issued.", role);
    }

    for (index, leaf) in leaves.iter().enumerate() {
        if index > 0 {
            writeln!(f)?;
        }
        writeln!(f, "{}", leaf.subject)?;
        validity_line(f, &leaf.validity)?;
        if role == Role::Server {
            writeln!(f, "    DNS: {}", leaf.dns_names.join(", "))?;
        }
        match (&leaf.private_key, &leaf.csr) {
            (Some(key), _) => writeln!(f, "    Private key: {}", key.display())?,
            (None, Some(csr)) => writeln!(f, "    CSR: {}", csr.display())?,
            (None, None) => {}
        }
        writeln!(f, "    Certificate: {}", leaf.certificate.display())?;
    }
    Ok(())
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        heading(f, "CA hierarchy")?;
        for ca in &self.ca_levels {
            if ca.issuing {
                writeln!(f, "{} [{}]", ca.subject, ISSUING_CA_LABEL)?;
            } else {
                writeln!(f, "{}", ca.subject)?;
            }
            validity_line(f, &ca.validity)?;
            writeln!(f, "    Certificate: {}", ca.certificate.display())?;
        }
        writeln!(f)?;
        writeln!(f, "Full certificate chain: {}", self.full_chain.display())?;
        writeln!(f)?;
        writeln!(f)?;

        leaf_section(f, Role::Server, &self.servers)?;
        writeln!(f)?;
        writeln!(f)?;
        leaf_section(f, Role::Client, &self.clients)
    }
}

fn leaf_status(store: &Store, record: LeafRecord) -> LeafStatus {
    let paths = store.paths();
    // Keyless leaves always list their CSR path.
    let csr = record
        .issued_from_csr()
        .then(|| paths.relative(&paths.leaf_csr(record.role, &record.name)));
    LeafStatus {
        subject: record.info.subject,
        validity: record.info.validity,
        dns_names: record.info.dns_names,
        private_key: record.private_key.map(|p| paths.relative(&p)),
        csr,
        certificate: paths.relative(&record.cert_path),
        name: record.name,
    }
}

/// Build the status report from what is on disk right now.
pub fn render_status(store: &Store) -> Result<Status> {
    if !store.is_initialised() {
        return Ok(Status::NotInitialised);
    }

    let paths = store.paths();
    let hierarchy = store.load_hierarchy()?;
    let depth = hierarchy.depth();

    let ca_levels = hierarchy
        .levels()
        .iter()
        .map(|level| {
            let info = level.info()?;
            Ok(CaStatus {
                subject: info.subject,
                validity: info.validity,
                certificate: paths.relative(&paths.ca_cert(level.level)),
                issuing: level.level == depth,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let servers = store
        .load_all_leaves(Role::Server)?
        .into_iter()
        .map(|record| leaf_status(store, record))
        .collect();
    let clients = store
        .load_all_leaves(Role::Client)?
        .into_iter()
        .map(|record| leaf_status(store, record))
        .collect();

    Ok(Status::Initialised(StatusReport {
        ca_levels,
        full_chain: paths.relative(&paths.full_chain),
        servers,
        clients,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::{init, HierarchyOptions};
    use crate::cert::{issue, LeafOptions};

    fn initialised(depth: u32) -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        init(&store, "My Project", depth, &HierarchyOptions::default()).unwrap();
        (dir, store)
    }

    fn report(store: &Store) -> StatusReport {
        match render_status(store).unwrap() {
            Status::Initialised(report) => report,
            Status::NotInitialised => panic!("store should be initialised"),
        }
    }

    #[test]
    fn test_not_initialised() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());

        let status = render_status(&store).unwrap();
        assert!(matches!(status, Status::NotInitialised));
        assert_eq!(
            status.to_string(),
            "CA hierarchy has not been initialised in current directory.\n"
        );
    }

    #[test]
    fn test_empty_hierarchy_report() {
        let (_dir, store) = initialised(3);
        let report = report(&store);

        assert_eq!(report.ca_levels.len(), 3);
        assert_eq!(
            report
                .ca_levels
                .iter()
                .map(|ca| ca.issuing)
                .collect::<Vec<_>>(),
            vec![false, false, true]
        );
        assert_eq!(
            report.full_chain,
            PathBuf::from(".gimmecert/ca/chain-full.cert.pem")
        );

        let text = report.to_string();
        assert!(text.contains("CN=My Project Level 1 CA\n"));
        assert!(text.contains("CN=My Project Level 3 CA [END ENTITY ISSUING CA]\n"));
        assert!(text.contains("Full certificate chain: .gimmecert/ca/chain-full.cert.pem"));
        assert!(text.contains("No server certificates have been issued."));
        assert!(text.contains("No client certificates have been issued."));
        assert!(!text.contains("[EXPIRED]"));
    }

    #[test]
    fn test_report_lists_leaves() {
        let (_dir, store) = initialised(1);
        let csr_key = crate::keys::generate_key_pair(Default::default()).unwrap();
        let csr_pem = rcgen::CertificateParams::default()
            .serialize_request(&csr_key)
            .unwrap()
            .pem()
            .unwrap();

        issue(
            &store,
            Role::Server,
            "myserver",
            &["extra.example.com".to_string()],
            None,
            &LeafOptions::default(),
        )
        .unwrap();
        issue(
            &store,
            Role::Client,
            "bob",
            &[],
            Some(&csr_pem),
            &LeafOptions::default(),
        )
        .unwrap();
        issue(
            &store,
            Role::Client,
            "alice",
            &[],
            None,
            &LeafOptions::default(),
        )
        .unwrap();

        let report = report(&store);
        assert_eq!(report.servers.len(), 1);
        assert_eq!(
            report.servers[0].dns_names,
            vec!["myserver", "extra.example.com"]
        );
        let clients: Vec<&str> = report.clients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(clients, vec!["alice", "bob"]);
        assert_eq!(
            report.clients[1].csr,
            Some(PathBuf::from(".gimmecert/client/bob.csr.pem"))
        );
        assert!(report.clients[1].private_key.is_none());

        let text = report.to_string();
        let validity = text.find("    Validity:").unwrap();
        let key = text.find("    Private key: .gimmecert/server/myserver.key.pem").unwrap();
        let cert = text
            .find("    Certificate: .gimmecert/server/myserver.cert.pem")
            .unwrap();
        assert!(validity < key && key < cert);
        assert!(text.contains("    DNS: myserver, extra.example.com"));
        assert!(text.contains("    CSR: .gimmecert/client/bob.csr.pem"));
    }

    #[test]
    fn test_missing_key_reported_as_csr() {
        let (_dir, store) = initialised(1);
        issue(
            &store,
            Role::Server,
            "web",
            &[],
            None,
            &LeafOptions::default(),
        )
        .unwrap();

        std::fs::remove_file(store.paths().leaf_key(Role::Server, "web")).unwrap();

        let report = report(&store);
        assert!(report.servers[0].private_key.is_none());
        assert_eq!(
            report.servers[0].csr,
            Some(PathBuf::from(".gimmecert/server/web.csr.pem"))
        );

        let text = report.to_string();
        let entry = &text[text.find("CN=web\n").unwrap()..];
        let csr = entry.find("    CSR: .gimmecert/server/web.csr.pem").unwrap();
        let cert = entry
            .find("    Certificate: .gimmecert/server/web.cert.pem")
            .unwrap();
        assert!(csr < cert);
        assert!(!entry.contains("Private key:"));
    }

    #[test]
    fn test_deleted_certificate_disappears() {
        let (_dir, store) = initialised(1);
        issue(
            &store,
            Role::Server,
            "gone",
            &[],
            None,
            &LeafOptions::default(),
        )
        .unwrap();
        assert_eq!(report(&store).servers.len(), 1);

        std::fs::remove_file(store.paths().leaf_cert(Role::Server, "gone")).unwrap();

        let report = report(&store);
        assert!(report.servers.is_empty());
        assert!(report
            .to_string()
            .contains("No server certificates have been issued."));
    }
}
