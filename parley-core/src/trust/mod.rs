// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Trust Layer
//!
//! Revocation checking for relay TLS chains.
//!
//! # Architecture
//!
//! - **Fetcher**: pluggable CRL retrieval, HTTP in production
//! - **Cache**: URL-keyed CRLs reused until their `nextUpdate`
//! - **Validator**: walks a peer chain and rejects revoked certificates
//!
//! Every failure is fail-closed: a CRL that cannot be fetched, parsed or
//! verified rejects the chain.

mod cache;
mod crl;
mod error;
mod fetcher;

pub use cache::CrlCache;
pub use crl::{validate_chain_crls, Crl, CrlValidator};
pub use error::TrustError;
pub use fetcher::{CrlFetcher, HttpCrlFetcher, MAX_CRL_SIZE};
