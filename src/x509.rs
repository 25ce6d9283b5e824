// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! X.509 building blocks: subject names, validity windows, signing and
//! reading certificates and CSRs back without shelling out to openssl.

use crate::error::{Error, Result};
use rand::RngCore;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams,
    DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose,
    SanType, SerialNumber,
};
use std::fmt;
use std::path::Path;
use ::time::{Duration, OffsetDateTime};
use tracing::warn;
use x509_parser::prelude::*;

/// Maximum certificate validity period (10 years).
pub const MAX_CERT_DAYS: u32 = 3650;

/// How far in the past `not_before` is placed to tolerate clock skew.
pub const CLOCK_SKEW_MINUTES: i64 = 15;

/// Validate that the validity period is within allowed bounds.
///
/// # Errors
/// Returns an error if `days` is 0 or exceeds [`MAX_CERT_DAYS`].
pub fn validate_days(days: u32) -> Result<()> {
    if days == 0 {
        return Err(Error::InvalidDays("days cannot be 0".into()));
    }
    if days > MAX_CERT_DAYS {
        return Err(Error::InvalidDays(format!(
            "days cannot exceed {} (10 years)",
            MAX_CERT_DAYS
        )));
    }
    Ok(())
}

// ============================================================================
// Identity
// ============================================================================

/// Subject identity of a CA level or a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    common_name: String,
}

/// Role-specific part of an [`Identity`].
#[derive(Debug, Clone, Copy)]
pub enum Qualifier<'a> {
    /// A CA level, counted from 1 at the root.
    CaLevel(u32),
    /// A server or client entity name.
    Entity(&'a str),
}

/// Build the subject identity for a CA level or leaf entity.
///
/// CA levels are named `<base_name> Level <n> CA`. Leaves are named after the
/// entity alone, so `base_name` does not appear in their subject.
pub fn build_identity(base_name: &str, qualifier: Qualifier<'_>) -> Identity {
    let common_name = match qualifier {
        Qualifier::CaLevel(level) => format!("{} Level {} CA", base_name, level),
        Qualifier::Entity(name) => name.to_string(),
    };
    Identity { common_name }
}

impl Identity {
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn distinguished_name(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, self.common_name.as_str());
        dn
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CN={}", self.common_name)
    }
}

// ============================================================================
// Validity
// ============================================================================

/// A certificate validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// Where "now" falls relative to a [`Validity`] window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityState {
    NotYetValid,
    Valid,
    Expired,
}

impl Validity {
    /// Window starting slightly before now (see [`CLOCK_SKEW_MINUTES`]) and
    /// lasting `days` days from that start.
    pub fn starting_now(days: u32) -> Self {
        let now = OffsetDateTime::now_utc();
        // Certificates only carry whole seconds.
        let now = now.replace_nanosecond(0).unwrap_or(now);
        let not_before = now - Duration::minutes(CLOCK_SKEW_MINUTES);
        Self {
            not_before,
            not_after: not_before + Duration::days(days as i64),
        }
    }

    /// Shorten the window so it ends no later than `limit`.
    pub fn clamp_to(self, limit: OffsetDateTime) -> Self {
        if self.not_after <= limit {
            return self;
        }
        warn!(
            requested = %format_time(self.not_after),
            limit = %format_time(limit),
            "Certificate validity truncated to the issuing CA's expiry"
        );
        Self {
            not_after: limit,
            ..self
        }
    }

    fn from_timestamps(not_before: i64, not_after: i64) -> Result<Self> {
        let convert = |ts: i64| {
            OffsetDateTime::from_unix_timestamp(ts)
                .map_err(|e| Error::CertParse(format!("Invalid validity timestamp: {}", e)))
        };
        Ok(Self {
            not_before: convert(not_before)?,
            not_after: convert(not_after)?,
        })
    }

    pub fn state_at(&self, now: OffsetDateTime) -> ValidityState {
        if now < self.not_before {
            ValidityState::NotYetValid
        } else if now > self.not_after {
            ValidityState::Expired
        } else {
            ValidityState::Valid
        }
    }

    pub fn state(&self) -> ValidityState {
        self.state_at(OffsetDateTime::now_utc())
    }

    pub fn days_remaining(&self) -> i64 {
        (self.not_after - OffsetDateTime::now_utc()).whole_days()
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            format_time(self.not_before),
            format_time(self.not_after)
        )
    }
}

fn format_time(dt: OffsetDateTime) -> String {
    format!(
        "{}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
        dt.year(),
        dt.month() as u8,
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}

// ============================================================================
// CSR
// ============================================================================

/// A parsed and signature-checked certificate signing request.
///
/// Only the public key is used for issuance. The subject the requester asked
/// for is kept for logging.
pub struct Csr {
    pem: String,
    requested_subject: String,
    params: CertificateSigningRequestParams,
}

impl fmt::Debug for Csr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Csr")
            .field("requested_subject", &self.requested_subject)
            .finish_non_exhaustive()
    }
}

impl Csr {
    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn requested_subject(&self) -> &str {
        &self.requested_subject
    }
}

/// Parse a PEM-encoded CSR and check its self-signature.
pub fn parse_csr(pem_str: &str) -> Result<Csr> {
    let pem = ::pem::parse(pem_str)
        .map_err(|e| Error::MalformedCsr(format!("Failed to parse PEM: {}", e)))?;

    if pem.tag() != "CERTIFICATE REQUEST" && pem.tag() != "NEW CERTIFICATE REQUEST" {
        return Err(Error::MalformedCsr(format!(
            "Expected CERTIFICATE REQUEST, got {}",
            pem.tag()
        )));
    }

    let (_, request) = X509CertificationRequest::from_der(pem.contents())
        .map_err(|e| Error::MalformedCsr(format!("Invalid PKCS#10 structure: {}", e)))?;
    request
        .verify_signature()
        .map_err(|e| Error::MalformedCsr(format!("Signature verification failed: {}", e)))?;
    let requested_subject = request.certification_request_info.subject.to_string();

    let params = CertificateSigningRequestParams::from_pem(pem_str)
        .map_err(|e| Error::MalformedCsr(format!("Unsupported public key: {}", e)))?;

    Ok(Csr {
        pem: pem_str.to_string(),
        requested_subject,
        params,
    })
}

// ============================================================================
// Issuance
// ============================================================================

/// Extensions profile applied to a new certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    /// CA certificate allowed to sign `path_len` further CA levels below it.
    Ca { path_len: u8 },
    /// TLS server leaf. `dns_names` become the SAN list, in order.
    Server { dns_names: Vec<String> },
    /// TLS client leaf, without SANs.
    Client,
}

/// Source of the public key bound into a new certificate.
pub enum SubjectKey<'a> {
    Generated(&'a KeyPair),
    Csr(Csr),
}

/// Sign a new certificate for `subject`.
///
/// With `issuer` set to `None` the certificate is self-signed by the
/// generated key, which is only meaningful for the root CA.
pub fn issue_certificate(
    subject: &Identity,
    subject_key: SubjectKey<'_>,
    issuer: Option<&Issuer<'_, KeyPair>>,
    validity: Validity,
    profile: &Profile,
) -> Result<Certificate> {
    let mut params = CertificateParams::default();
    params.distinguished_name = subject.distinguished_name();
    params.serial_number = Some(random_serial());
    params.not_before = validity.not_before;
    params.not_after = validity.not_after;
    params.use_authority_key_identifier_extension = issuer.is_some();

    match profile {
        Profile::Ca { path_len } => {
            params.is_ca = IsCa::Ca(BasicConstraints::Constrained(*path_len));
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyCertSign,
                KeyUsagePurpose::CrlSign,
            ];
        }
        Profile::Server { dns_names } => {
            params.is_ca = IsCa::ExplicitNoCa;
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ];
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
            for name in dns_names {
                params.subject_alt_names.push(SanType::DnsName(
                    name.clone().try_into().map_err(|_| Error::InvalidName {
                        name: name.clone(),
                        reason: "not representable as a DNS name".into(),
                    })?,
                ));
            }
        }
        Profile::Client => {
            params.is_ca = IsCa::ExplicitNoCa;
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ];
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        }
    }

    let cert = match (subject_key, issuer) {
        (SubjectKey::Generated(key_pair), None) => params.self_signed(key_pair)?,
        (SubjectKey::Generated(key_pair), Some(issuer)) => params.signed_by(key_pair, issuer)?,
        (SubjectKey::Csr(csr), Some(issuer)) => {
            // Keep the requester's public key, replace everything else.
            let mut request = csr.params;
            request.params = params;
            request.signed_by(issuer)?
        }
        (SubjectKey::Csr(_), None) => {
            return Err(Error::MalformedCsr(
                "a certificate for a CSR cannot be self-signed".into(),
            ))
        }
    };

    Ok(cert)
}

/// Random positive 16-byte serial number.
fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes[0] = (bytes[0] & 0x7f) | 0x40;
    SerialNumber::from_slice(&bytes)
}

// ============================================================================
// Parsing
// ============================================================================

/// Certificate type based on Extended Key Usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertType {
    /// TLS server authentication (OID 1.3.6.1.5.5.7.3.1)
    Server,
    /// TLS client authentication (OID 1.3.6.1.5.5.7.3.2)
    Client,
    /// Unknown or no EKU
    Unknown,
}

#[derive(Debug, Clone)]
pub struct CertInfo {
    pub subject: String,
    pub issuer: String,
    pub common_name: Option<String>,
    pub dns_names: Vec<String>,
    pub is_ca: bool,
    pub path_len: Option<u32>,
    pub cert_type: CertType,
    pub validity: Validity,
    /// Serial number as colon-separated hex.
    pub serial: String,
}

pub fn parse_cert_file(path: &Path) -> Result<CertInfo> {
    parse_cert_pem(&crate::fs::read_to_string(path)?)
}

pub fn parse_cert_pem(pem_str: &str) -> Result<CertInfo> {
    let pem = ::pem::parse(pem_str)
        .map_err(|e| Error::CertParse(format!("Failed to parse PEM: {}", e)))?;

    if pem.tag() != "CERTIFICATE" {
        return Err(Error::CertParse(format!(
            "Expected CERTIFICATE, got {}",
            pem.tag()
        )));
    }

    let (_, cert) = X509Certificate::from_der(pem.contents())
        .map_err(|e| Error::CertParse(format!("Invalid X.509: {}", e)))?;

    let validity = Validity::from_timestamps(
        cert.validity().not_before.timestamp(),
        cert.validity().not_after.timestamp(),
    )?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);

    let mut dns_names = Vec::new();
    let mut is_ca = false;
    let mut path_len = None;
    let mut cert_type = CertType::Unknown;

    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => {
                for name in &san.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        dns_names.push(dns.to_string());
                    }
                }
            }
            ParsedExtension::BasicConstraints(bc) => {
                is_ca = bc.ca;
                path_len = bc.path_len_constraint;
            }
            ParsedExtension::ExtendedKeyUsage(eku) => {
                if eku.client_auth {
                    cert_type = CertType::Client;
                } else if eku.server_auth {
                    cert_type = CertType::Server;
                }
            }
            _ => {}
        }
    }

    Ok(CertInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        common_name,
        dns_names,
        is_ca,
        path_len,
        cert_type,
        validity,
        serial: cert.raw_serial_as_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_key_pair, KeySpec};

    fn verify_signed_by(cert_pem: &str, issuer_pem: &str) -> bool {
        let cert_der = ::pem::parse(cert_pem).unwrap().into_contents();
        let issuer_der = ::pem::parse(issuer_pem).unwrap().into_contents();
        let (_, cert) = X509Certificate::from_der(&cert_der).unwrap();
        let (_, issuer) = X509Certificate::from_der(&issuer_der).unwrap();
        cert.verify_signature(Some(issuer.public_key())).is_ok()
    }

    fn root() -> (KeyPair, Certificate) {
        let key = generate_key_pair(KeySpec::default()).unwrap();
        let identity = build_identity("Test", Qualifier::CaLevel(1));
        let cert = issue_certificate(
            &identity,
            SubjectKey::Generated(&key),
            None,
            Validity::starting_now(30),
            &Profile::Ca { path_len: 0 },
        )
        .unwrap();
        (key, cert)
    }

    #[test]
    fn test_validate_days() {
        assert!(matches!(validate_days(0), Err(Error::InvalidDays(_))));
        assert!(validate_days(MAX_CERT_DAYS + 1).is_err());
        assert!(validate_days(1).is_ok());
        assert!(validate_days(MAX_CERT_DAYS).is_ok());
    }

    #[test]
    fn test_build_identity() {
        let ca = build_identity("My Project", Qualifier::CaLevel(3));
        assert_eq!(ca.common_name(), "My Project Level 3 CA");
        assert_eq!(ca.to_string(), "CN=My Project Level 3 CA");

        let leaf = build_identity("My Project", Qualifier::Entity("myserver"));
        assert_eq!(leaf.to_string(), "CN=myserver");
    }

    #[test]
    fn test_validity_starting_now() {
        let validity = Validity::starting_now(30);
        let now = OffsetDateTime::now_utc();

        assert!(validity.not_before < now);
        assert!(now - validity.not_before >= Duration::minutes(CLOCK_SKEW_MINUTES));
        assert_eq!(validity.not_after - validity.not_before, Duration::days(30));
        assert_eq!(validity.not_before.nanosecond(), 0);
        assert_eq!(validity.state(), ValidityState::Valid);
    }

    #[test]
    fn test_validity_clamp() {
        let validity = Validity::starting_now(30);
        let limit = validity.not_before + Duration::days(10);

        let clamped = validity.clamp_to(limit);
        assert_eq!(clamped.not_after, limit);
        assert_eq!(clamped.not_before, validity.not_before);

        let untouched = validity.clamp_to(validity.not_after + Duration::days(1));
        assert_eq!(untouched, validity);
    }

    #[test]
    fn test_validity_state() {
        let validity = Validity::starting_now(1);
        assert_eq!(
            validity.state_at(validity.not_before - Duration::seconds(1)),
            ValidityState::NotYetValid
        );
        assert_eq!(
            validity.state_at(validity.not_after + Duration::seconds(1)),
            ValidityState::Expired
        );
    }

    #[test]
    fn test_validity_display() {
        let validity = Validity::from_timestamps(1_514_764_800, 1_546_300_800).unwrap();
        assert_eq!(
            validity.to_string(),
            "2018-01-01 00:00:00 UTC - 2019-01-01 00:00:00 UTC"
        );
    }

    #[test]
    fn test_self_signed_ca() {
        let (_, cert) = root();
        let info = parse_cert_pem(&cert.pem()).unwrap();

        assert_eq!(info.subject, "CN=Test Level 1 CA");
        assert_eq!(info.issuer, info.subject);
        assert!(info.is_ca);
        assert_eq!(info.path_len, Some(0));
        assert!(verify_signed_by(&cert.pem(), &cert.pem()));
    }

    #[test]
    fn test_server_cert_signed_by_ca() {
        let (ca_key, ca_cert) = root();
        let issuer = Issuer::from_ca_cert_pem(&ca_cert.pem(), ca_key).unwrap();

        let key = generate_key_pair(KeySpec::default()).unwrap();
        let cert = issue_certificate(
            &build_identity("Test", Qualifier::Entity("web")),
            SubjectKey::Generated(&key),
            Some(&issuer),
            Validity::starting_now(10),
            &Profile::Server {
                dns_names: vec!["web".into(), "web.example.com".into()],
            },
        )
        .unwrap();

        let info = parse_cert_pem(&cert.pem()).unwrap();
        assert_eq!(info.subject, "CN=web");
        assert_eq!(info.issuer, "CN=Test Level 1 CA");
        assert_eq!(info.dns_names, vec!["web", "web.example.com"]);
        assert!(!info.is_ca);
        assert_eq!(info.cert_type, CertType::Server);
        assert!(verify_signed_by(&cert.pem(), &ca_cert.pem()));
    }

    #[test]
    fn test_client_cert_has_no_san() {
        let (ca_key, ca_cert) = root();
        let issuer = Issuer::from_ca_cert_pem(&ca_cert.pem(), ca_key).unwrap();

        let key = generate_key_pair(KeySpec::default()).unwrap();
        let cert = issue_certificate(
            &build_identity("Test", Qualifier::Entity("alice")),
            SubjectKey::Generated(&key),
            Some(&issuer),
            Validity::starting_now(10),
            &Profile::Client,
        )
        .unwrap();

        let info = parse_cert_pem(&cert.pem()).unwrap();
        assert!(info.dns_names.is_empty());
        assert_eq!(info.cert_type, CertType::Client);
    }

    #[test]
    fn test_serial_numbers_unique() {
        let (a_key, a) = root();
        let b = issue_certificate(
            &build_identity("Test", Qualifier::CaLevel(1)),
            SubjectKey::Generated(&a_key),
            None,
            Validity::starting_now(30),
            &Profile::Ca { path_len: 0 },
        )
        .unwrap();

        let a_info = parse_cert_pem(&a.pem()).unwrap();
        let b_info = parse_cert_pem(&b.pem()).unwrap();
        assert_ne!(a_info.serial, b_info.serial);
    }

    #[test]
    fn test_parse_csr_valid() {
        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, "whatever-the-csr-said");
        let key = generate_key_pair(KeySpec::default()).unwrap();
        let csr_pem = params.serialize_request(&key).unwrap().pem().unwrap();

        let csr = parse_csr(&csr_pem).unwrap();
        assert_eq!(csr.requested_subject(), "CN=whatever-the-csr-said");
        assert_eq!(csr.pem(), csr_pem);
    }

    #[test]
    fn test_parse_csr_garbage() {
        assert!(matches!(
            parse_csr("not a csr"),
            Err(Error::MalformedCsr(_))
        ));
    }

    #[test]
    fn test_parse_csr_rejects_certificate() {
        let (_, cert) = root();
        assert!(matches!(
            parse_csr(&cert.pem()),
            Err(Error::MalformedCsr(_))
        ));
    }

    #[test]
    fn test_parse_csr_rejects_tampered_signature() {
        let params = CertificateParams::new(vec!["tampered".to_string()]).unwrap();
        let key = generate_key_pair(KeySpec::default()).unwrap();
        let csr_pem = params.serialize_request(&key).unwrap().pem().unwrap();

        let mut der = ::pem::parse(&csr_pem).unwrap().into_contents();
        // The signature BIT STRING ends the structure.
        let last = der.len() - 1;
        der[last] ^= 0xff;
        let tampered = ::pem::encode(&::pem::Pem::new("CERTIFICATE REQUEST", der));

        assert!(matches!(
            parse_csr(&tampered),
            Err(Error::MalformedCsr(_))
        ));
    }

    #[test]
    fn test_parse_cert_pem_rejects_wrong_tag() {
        let key = generate_key_pair(KeySpec::default()).unwrap();
        let result = parse_cert_pem(&key.serialize_pem());
        assert!(matches!(result, Err(Error::CertParse(_))));
    }
}
