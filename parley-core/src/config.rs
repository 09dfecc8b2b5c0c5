// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay Client Configuration
//!
//! Defaults, environment overrides and pinned root CA loading.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rustls::pki_types::CertificateDer;
use thiserror::Error;

use crate::auth::MAX_AUTH_RETRIES;
use crate::network::{RelayAddress, MAX_MESSAGE_SIZE};

/// Default relay host.
pub const DEFAULT_RELAY_HOST: &str = "relay.parley.chat";

/// Default relay port.
pub const DEFAULT_RELAY_PORT: u16 = 443;

/// Default timeout for one CRL download.
pub const DEFAULT_CRL_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of a connection's event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("No root certificate configured")]
    MissingRootCertificate,

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("No certificates found in {0}")]
    NoCertificates(String),

    #[error("Client setup failed: {0}")]
    Setup(String),
}

/// Relay client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayClientConfig {
    /// Relay server to connect to.
    pub relay: RelayAddress,
    /// PEM file holding the pinned root CA.
    pub root_certificate_path: Option<PathBuf>,
    /// Retries after an unauthorized response before giving up.
    pub max_auth_retries: u32,
    /// Largest accepted frame content in bytes.
    pub max_content_length: usize,
    /// Timeout for one CRL download.
    pub crl_fetch_timeout: Duration,
    /// Capacity of a connection's event channel.
    pub event_channel_capacity: usize,
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        RelayClientConfig {
            relay: RelayAddress::new(DEFAULT_RELAY_HOST, DEFAULT_RELAY_PORT),
            root_certificate_path: None,
            max_auth_retries: MAX_AUTH_RETRIES,
            max_content_length: MAX_MESSAGE_SIZE,
            crl_fetch_timeout: DEFAULT_CRL_FETCH_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl RelayClientConfig {
    /// Loads configuration from environment variables over the defaults.
    ///
    /// Recognised: `PARLEY_RELAY_HOST`, `PARLEY_RELAY_PORT`, `PARLEY_ROOT_CA`,
    /// `PARLEY_MAX_AUTH_RETRIES`, `PARLEY_MAX_CONTENT_LENGTH`,
    /// `PARLEY_CRL_FETCH_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`RelayClientConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("PARLEY_RELAY_HOST") {
            if host.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    name: "PARLEY_RELAY_HOST",
                    value: host,
                });
            }
            config.relay.host = host.trim().to_string();
        }

        if let Some(port) = parse_var(&lookup, "PARLEY_RELAY_PORT")? {
            config.relay.port = port;
        }

        if let Some(path) = lookup("PARLEY_ROOT_CA") {
            config.root_certificate_path = Some(PathBuf::from(path));
        }

        if let Some(retries) = parse_var(&lookup, "PARLEY_MAX_AUTH_RETRIES")? {
            config.max_auth_retries = retries;
        }

        if let Some(max) = parse_var(&lookup, "PARLEY_MAX_CONTENT_LENGTH")? {
            config.max_content_length = max;
        }

        if let Some(secs) = parse_var(&lookup, "PARLEY_CRL_FETCH_TIMEOUT_SECS")? {
            config.crl_fetch_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Loads the configured pinned root CA.
    pub fn root_certificate(&self) -> Result<CertificateDer<'static>, ConfigError> {
        match &self.root_certificate_path {
            Some(path) => load_root_certificate(path),
            None => Err(ConfigError::MissingRootCertificate),
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(None),
    }
}

/// Reads the first certificate from a PEM file.
pub fn load_root_certificate(path: &Path) -> Result<CertificateDer<'static>, ConfigError> {
    let io_error = |reason: String| ConfigError::Io {
        path: path.display().to_string(),
        reason,
    };

    let file = std::fs::File::open(path).map_err(|e| io_error(e.to_string()))?;
    let mut reader = BufReader::new(file);

    let mut certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| io_error(e.to_string()))?;

    if certs.is_empty() {
        return Err(ConfigError::NoCertificates(path.display().to_string()));
    }
    Ok(certs.swap_remove(0))
}
