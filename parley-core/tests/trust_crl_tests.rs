// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! CRL Chain Validation Tests
//!
//! Real rcgen-minted chains checked against in-memory CRLs.

mod common;

use std::sync::Arc;

use common::doubles::MemoryCrlFetcher;
use common::pki::Authority;
use parley_core::trust::{validate_chain_crls, CrlCache, CrlValidator, TrustError};

const LEAF_CRL: &str = "http://crl.parley.test/intermediate.crl";
const INTERMEDIATE_CRL: &str = "http://crl.parley.test/root.crl";
const LEAF_SERIAL: &[u8] = &[0x10, 0x01];
const FAR_FUTURE: (i32, u8, u8) = (2040, 1, 1);

struct Pki {
    root: Authority,
    intermediate: Authority,
}

fn pki() -> Pki {
    common::init_tracing();
    let root = Authority::root("Parley Test Root");
    let intermediate = root.intermediate("Parley Test Intermediate", Some(INTERMEDIATE_CRL));
    Pki { root, intermediate }
}

fn cache_with(fetcher: &Arc<MemoryCrlFetcher>) -> CrlCache {
    CrlCache::new(fetcher.clone())
}

// =============================================================================
// Revocation
// =============================================================================

/// Scenario: leaf serial is listed in its issuer's CRL
#[tokio::test]
async fn test_revoked_leaf_rejected() {
    let pki = pki();
    let leaf = pki
        .intermediate
        .leaf("relay.parley.test", LEAF_SERIAL, Some(LEAF_CRL));

    let fetcher = MemoryCrlFetcher::new();
    fetcher.serve(LEAF_CRL, pki.intermediate.crl(&[LEAF_SERIAL], FAR_FUTURE));
    fetcher.serve(INTERMEDIATE_CRL, pki.root.crl(&[], FAR_FUTURE));
    let cache = cache_with(&fetcher);

    let chain = vec![leaf, pki.intermediate.der()];
    let err = validate_chain_crls(&chain, &pki.root.der(), &cache)
        .await
        .unwrap_err();

    match err {
        TrustError::CertificateRevoked { subject, serial } => {
            assert!(subject.contains("relay.parley.test"));
            assert_eq!(serial, "1001");
        }
        other => panic!("expected revocation, got {:?}", other),
    }
}

/// Scenario: nothing in the chain is revoked
#[tokio::test]
async fn test_clean_chain_passes() {
    let pki = pki();
    let leaf = pki
        .intermediate
        .leaf("relay.parley.test", LEAF_SERIAL, Some(LEAF_CRL));

    let fetcher = MemoryCrlFetcher::new();
    // another certificate is revoked, not ours
    fetcher.serve(LEAF_CRL, pki.intermediate.crl(&[&[0x7f, 0x7f]], FAR_FUTURE));
    fetcher.serve(INTERMEDIATE_CRL, pki.root.crl(&[], FAR_FUTURE));
    let cache = cache_with(&fetcher);

    let chain = vec![leaf, pki.intermediate.der()];
    validate_chain_crls(&chain, &pki.root.der(), &cache)
        .await
        .unwrap();

    assert_eq!(fetcher.fetch_count(LEAF_CRL), 1);
    assert_eq!(fetcher.fetch_count(INTERMEDIATE_CRL), 1);
}

/// Scenario: revoked intermediate fails the chain even with a clean leaf
#[tokio::test]
async fn test_revoked_intermediate_rejected() {
    let root = Authority::root("Parley Test Root");
    let intermediate = {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params.key_usages = vec![
            rcgen::KeyUsagePurpose::KeyCertSign,
            rcgen::KeyUsagePurpose::CrlSign,
        ];
        params.serial_number = Some(rcgen::SerialNumber::from_slice(&[0x42]));
        params.crl_distribution_points = vec![rcgen::CrlDistributionPoint {
            uris: vec![INTERMEDIATE_CRL.to_string()],
        }];
        let cert = params.signed_by(&key, &root.cert, &root.key).unwrap();
        Authority { cert, key }
    };
    let leaf = intermediate.leaf("relay.parley.test", LEAF_SERIAL, Some(LEAF_CRL));

    let fetcher = MemoryCrlFetcher::new();
    fetcher.serve(LEAF_CRL, intermediate.crl(&[], FAR_FUTURE));
    fetcher.serve(INTERMEDIATE_CRL, root.crl(&[&[0x42]], FAR_FUTURE));
    let cache = cache_with(&fetcher);

    let chain = vec![leaf, intermediate.der()];
    let err = validate_chain_crls(&chain, &root.der(), &cache)
        .await
        .unwrap_err();
    assert!(err.is_revoked());
    assert!(matches!(err, TrustError::CertificateRevoked { ref serial, .. } if serial == "42"));
}

// =============================================================================
// Unrevocable and Root Certificates
// =============================================================================

/// Scenario: certificates without distribution points pass without fetching
#[tokio::test]
async fn test_no_distribution_points_passes() {
    let root = Authority::root("Parley Test Root");
    let intermediate = root.intermediate("Parley Test Intermediate", None);
    let leaf = intermediate.leaf("relay.parley.test", LEAF_SERIAL, None);

    let fetcher = MemoryCrlFetcher::new();
    let cache = cache_with(&fetcher);

    let chain = vec![leaf, intermediate.der(), root.der()];
    validate_chain_crls(&chain, &root.der(), &cache)
        .await
        .unwrap();
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_empty_chain_rejected() {
    let root = Authority::root("Parley Test Root");
    let cache = cache_with(&MemoryCrlFetcher::new());

    let err = validate_chain_crls(&[], &root.der(), &cache).await.unwrap_err();
    assert_eq!(err, TrustError::EmptyChain);
}

// =============================================================================
// Fail-Closed
// =============================================================================

/// Scenario: the CRL cannot be fetched
#[tokio::test]
async fn test_fetch_failure_fails_closed() {
    let pki = pki();
    let leaf = pki
        .intermediate
        .leaf("relay.parley.test", LEAF_SERIAL, Some(LEAF_CRL));

    let fetcher = MemoryCrlFetcher::new();
    let cache = cache_with(&fetcher);

    let chain = vec![leaf, pki.intermediate.der()];
    let err = validate_chain_crls(&chain, &pki.root.der(), &cache)
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::CrlFetch { ref url, .. } if url == LEAF_CRL));
}

/// Scenario: the CRL was signed by someone other than the issuer
#[tokio::test]
async fn test_crl_from_wrong_issuer_rejected() {
    let pki = pki();
    let impostor = Authority::root("Impostor CA");
    let leaf = pki
        .intermediate
        .leaf("relay.parley.test", LEAF_SERIAL, Some(LEAF_CRL));

    let fetcher = MemoryCrlFetcher::new();
    fetcher.serve(LEAF_CRL, impostor.crl(&[], FAR_FUTURE));
    let cache = cache_with(&fetcher);

    let chain = vec![leaf, pki.intermediate.der()];
    let err = validate_chain_crls(&chain, &pki.root.der(), &cache)
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::CrlSignature { ref url, .. } if url == LEAF_CRL));
}

/// Scenario: the distribution point serves garbage
#[tokio::test]
async fn test_unparsable_crl_rejected() {
    let pki = pki();
    let leaf = pki
        .intermediate
        .leaf("relay.parley.test", LEAF_SERIAL, Some(LEAF_CRL));

    let fetcher = MemoryCrlFetcher::new();
    fetcher.serve(LEAF_CRL, b"<html>maintenance</html>".to_vec());
    let cache = cache_with(&fetcher);

    let err = validate_chain_crls(&[leaf], &pki.intermediate.der(), &cache)
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::InvalidCrl { .. }));
}

// =============================================================================
// Validator
// =============================================================================

#[tokio::test]
async fn test_validator_shares_cache_across_handshakes() {
    let pki = pki();
    let leaf = pki
        .intermediate
        .leaf("relay.parley.test", LEAF_SERIAL, Some(LEAF_CRL));

    let fetcher = MemoryCrlFetcher::new();
    fetcher.serve(LEAF_CRL, pki.intermediate.crl(&[], FAR_FUTURE));
    fetcher.serve(INTERMEDIATE_CRL, pki.root.crl(&[], FAR_FUTURE));
    let validator = CrlValidator::new(pki.root.der(), Arc::new(cache_with(&fetcher)));

    let chain = vec![leaf, pki.intermediate.der()];
    for _ in 0..3 {
        validator.validate_chain(&chain).await.unwrap();
    }

    assert_eq!(fetcher.fetch_count(LEAF_CRL), 1);
    assert_eq!(fetcher.fetch_count(INTERMEDIATE_CRL), 1);
}
