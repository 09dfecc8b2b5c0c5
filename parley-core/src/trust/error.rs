// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Trust Error Types

use thiserror::Error;

/// Certificate chain and revocation check failures.
///
/// Every variant is fatal for the TLS handshake that triggered the check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustError {
    #[error("Empty certificate chain")]
    EmptyChain,

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Invalid CRL from {url}: {reason}")]
    InvalidCrl { url: String, reason: String },

    #[error("CRL fetch from {url} failed: {reason}")]
    CrlFetch { url: String, reason: String },

    #[error("CRL from {url} is not signed by the issuer of {subject}")]
    CrlSignature { url: String, subject: String },

    #[error("Certificate revoked: {subject} (serial {serial})")]
    CertificateRevoked { subject: String, serial: String },
}

impl TrustError {
    /// Returns true if this error means a certificate was found revoked.
    pub fn is_revoked(&self) -> bool {
        matches!(self, TrustError::CertificateRevoked { .. })
    }
}
