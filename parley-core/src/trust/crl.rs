// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! CRL-Validating Trust Chain
//!
//! Checks every non-root certificate of a peer chain against the CRLs named
//! in its CRL Distribution Points extension. Fetch failures fail the check;
//! a certificate without distribution points cannot be revoked and passes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rustls::pki_types::CertificateDer;
use tracing::{debug, warn};
use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};
use x509_parser::prelude::{parse_x509_certificate, parse_x509_crl, X509Certificate};
use x509_parser::time::ASN1Time;

use super::cache::CrlCache;
use super::error::TrustError;

/// A parsed certificate revocation list.
#[derive(Debug, Clone)]
pub struct Crl {
    url: String,
    der: Vec<u8>,
    next_update: Option<SystemTime>,
    revoked: HashSet<Vec<u8>>,
}

impl Crl {
    /// Parses a DER-encoded CRL fetched from `url`.
    pub fn from_der(url: &str, der: Vec<u8>) -> Result<Self, TrustError> {
        let (next_update, revoked) = {
            let (_, crl) = parse_x509_crl(&der).map_err(|e| TrustError::InvalidCrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            let next_update = crl.next_update().map(asn1_to_system_time);
            let revoked = crl
                .iter_revoked_certificates()
                .map(|entry| normalize_serial(entry.raw_serial()).to_vec())
                .collect::<HashSet<_>>();
            (next_update, revoked)
        };

        Ok(Crl {
            url: url.to_string(),
            der,
            next_update,
            revoked,
        })
    }

    /// Distribution point this CRL was fetched from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw DER bytes.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The CRL's `nextUpdate`, if present.
    pub fn next_update(&self) -> Option<SystemTime> {
        self.next_update
    }

    /// Returns true once `nextUpdate` has passed.
    ///
    /// A CRL without `nextUpdate` is always stale.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        match self.next_update {
            Some(next_update) => now >= next_update,
            None => true,
        }
    }

    /// Returns true if `serial` (DER integer content bytes) is listed.
    pub fn is_revoked(&self, serial: &[u8]) -> bool {
        self.revoked.contains(normalize_serial(serial))
    }

    /// Number of revoked entries.
    pub fn revoked_count(&self) -> usize {
        self.revoked.len()
    }

    /// Verifies this CRL was signed by the key of `issuer`.
    fn verify_signed_by(&self, issuer: &X509Certificate<'_>) -> Result<(), String> {
        let (_, crl) = parse_x509_crl(&self.der).map_err(|e| e.to_string())?;
        crl.verify_signature(issuer.public_key())
            .map_err(|e| e.to_string())
    }
}

/// Validates peer chains against the pinned root and the shared CRL cache.
#[derive(Clone)]
pub struct CrlValidator {
    root: CertificateDer<'static>,
    cache: Arc<CrlCache>,
}

impl CrlValidator {
    pub fn new(root: CertificateDer<'static>, cache: Arc<CrlCache>) -> Self {
        CrlValidator { root, cache }
    }

    /// The pinned root CA.
    pub fn root(&self) -> &CertificateDer<'static> {
        &self.root
    }

    /// Runs [`validate_chain_crls`] with this validator's root and cache.
    pub async fn validate_chain(&self, chain: &[CertificateDer<'_>]) -> Result<(), TrustError> {
        validate_chain_crls(chain, &self.root, &self.cache).await
    }
}

/// Owned facts about one chain certificate.
struct ChainEntry {
    subject: String,
    serial: Vec<u8>,
    crl_urls: Vec<String>,
}

impl ChainEntry {
    fn parse(der: &[u8]) -> Result<Self, TrustError> {
        let (_, cert) = parse_x509_certificate(der)
            .map_err(|e| TrustError::InvalidCertificate(e.to_string()))?;

        Ok(ChainEntry {
            subject: cert.subject().to_string(),
            serial: normalize_serial(cert.raw_serial()).to_vec(),
            crl_urls: crl_distribution_urls(&cert),
        })
    }
}

/// Checks that no non-root certificate in `chain` is revoked.
///
/// `chain` is ordered leaf first; each certificate's issuer is the next
/// certificate, or `root` for the last one. Certificates equal to `root` are
/// skipped.
pub async fn validate_chain_crls(
    chain: &[CertificateDer<'_>],
    root: &CertificateDer<'_>,
    cache: &CrlCache,
) -> Result<(), TrustError> {
    if chain.is_empty() {
        return Err(TrustError::EmptyChain);
    }

    for (index, cert) in chain.iter().enumerate() {
        if cert.as_ref() == root.as_ref() {
            continue;
        }

        let entry = ChainEntry::parse(cert.as_ref())?;
        if entry.crl_urls.is_empty() {
            debug!(subject = %entry.subject, "no CRL distribution points, skipping");
            continue;
        }

        let issuer_der: &[u8] = chain
            .get(index + 1)
            .map(|c| c.as_ref())
            .unwrap_or(root.as_ref());

        for url in &entry.crl_urls {
            let crl = cache.get(url).await?;
            check_crl_issuer(&crl, issuer_der, &entry)?;

            if crl.is_revoked(&entry.serial) {
                let serial = hex::encode(&entry.serial);
                warn!(subject = %entry.subject, %serial, %url, "certificate revoked");
                return Err(TrustError::CertificateRevoked {
                    subject: entry.subject,
                    serial,
                });
            }
        }
        debug!(subject = %entry.subject, "certificate not revoked");
    }

    Ok(())
}

fn check_crl_issuer(crl: &Crl, issuer_der: &[u8], entry: &ChainEntry) -> Result<(), TrustError> {
    let (_, issuer) = parse_x509_certificate(issuer_der)
        .map_err(|e| TrustError::InvalidCertificate(e.to_string()))?;

    crl.verify_signed_by(&issuer).map_err(|reason| {
        warn!(url = crl.url(), subject = %entry.subject, %reason, "CRL signature rejected");
        TrustError::CrlSignature {
            url: crl.url().to_string(),
            subject: entry.subject.clone(),
        }
    })
}

/// Extracts URI distribution points from a certificate.
fn crl_distribution_urls(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut urls = Vec::new();
    for extension in cert.extensions() {
        let ParsedExtension::CRLDistributionPoints(points) = extension.parsed_extension() else {
            continue;
        };
        for point in points.iter() {
            let Some(DistributionPointName::FullName(names)) = &point.distribution_point else {
                continue;
            };
            for name in names {
                if let GeneralName::URI(uri) = name {
                    urls.push(uri.to_string());
                }
            }
        }
    }
    urls
}

/// Strips DER sign-padding zeros so serials compare by value.
fn normalize_serial(serial: &[u8]) -> &[u8] {
    let start = serial
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(serial.len().saturating_sub(1));
    &serial[start..]
}

fn asn1_to_system_time(time: ASN1Time) -> SystemTime {
    let secs = time.timestamp();
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}
