// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Certificate Fixtures
//!
//! Real certificate chains and CRLs minted with rcgen.

use rcgen::{
    date_time_ymd, BasicConstraints, Certificate, CertificateParams,
    CertificateRevocationListParams, CrlDistributionPoint, DistinguishedName, DnType, IsCa,
    KeyIdMethod, KeyPair, KeyUsagePurpose, RevokedCertParams, SerialNumber,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

/// A CA certificate together with its signing key.
pub struct Authority {
    pub cert: Certificate,
    pub key: KeyPair,
}

fn params(common_name: &str, crl_url: Option<&str>) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("empty SAN list");
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    params.distinguished_name = name;
    if let Some(url) = crl_url {
        params.crl_distribution_points = vec![CrlDistributionPoint {
            uris: vec![url.to_string()],
        }];
    }
    params
}

fn ca_params(common_name: &str, crl_url: Option<&str>) -> CertificateParams {
    let mut params = params(common_name, crl_url);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params
}

impl Authority {
    /// Self-signed root CA.
    pub fn root(common_name: &str) -> Self {
        let key = KeyPair::generate().expect("key generation");
        let cert = ca_params(common_name, None)
            .self_signed(&key)
            .expect("self-signed root");
        Authority { cert, key }
    }

    /// Intermediate CA issued by this authority.
    pub fn intermediate(&self, common_name: &str, crl_url: Option<&str>) -> Self {
        let key = KeyPair::generate().expect("key generation");
        let cert = ca_params(common_name, crl_url)
            .signed_by(&key, &self.cert, &self.key)
            .expect("intermediate");
        Authority { cert, key }
    }

    /// End-entity certificate issued by this authority.
    pub fn leaf(
        &self,
        common_name: &str,
        serial: &[u8],
        crl_url: Option<&str>,
    ) -> CertificateDer<'static> {
        let key = KeyPair::generate().expect("key generation");
        let mut params = params(common_name, crl_url);
        // rcgen 0.13 omits all extensions (including CRL distribution points)
        // unless one of a few triggers is set; an explicit non-CA basic
        // constraint is one of them.
        params.is_ca = IsCa::ExplicitNoCa;
        params.serial_number = Some(SerialNumber::from_slice(serial));
        params
            .signed_by(&key, &self.cert, &self.key)
            .expect("leaf")
            .der()
            .clone()
    }

    /// Server certificate for `host` (DNS name or IP) and its private key.
    pub fn server(
        &self,
        host: &str,
        serial: &[u8],
        crl_url: Option<&str>,
    ) -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
        let key = KeyPair::generate().expect("key generation");
        let mut params = CertificateParams::new(vec![host.to_string()]).expect("SAN");
        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, host);
        params.distinguished_name = name;
        params.serial_number = Some(SerialNumber::from_slice(serial));
        if let Some(url) = crl_url {
            params.crl_distribution_points = vec![CrlDistributionPoint {
                uris: vec![url.to_string()],
            }];
        }
        let cert = params
            .signed_by(&key, &self.cert, &self.key)
            .expect("server certificate");
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()));
        (cert.der().clone(), key)
    }

    /// DER of this authority's certificate.
    pub fn der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    /// DER CRL signed by this authority listing `revoked` serials.
    ///
    /// `next_update` is `(year, month, day)`.
    pub fn crl(&self, revoked: &[&[u8]], next_update: (i32, u8, u8)) -> Vec<u8> {
        let (year, month, day) = next_update;
        let revoked_certs = revoked
            .iter()
            .map(|serial| RevokedCertParams {
                serial_number: SerialNumber::from_slice(serial),
                revocation_time: date_time_ymd(2025, 1, 1),
                reason_code: None,
                invalidity_date: None,
            })
            .collect();

        let params = CertificateRevocationListParams {
            this_update: date_time_ymd(2025, 1, 1),
            next_update: date_time_ymd(year, month, day),
            crl_number: SerialNumber::from_slice(&[0x01]),
            issuing_distribution_point: None,
            revoked_certs,
            key_identifier_method: KeyIdMethod::Sha256,
        };
        params
            .signed_by(&self.cert, &self.key)
            .expect("CRL")
            .der()
            .as_ref()
            .to_vec()
    }
}
