// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use url::Url;

pub const BIND_ANY: &str = "0.0.0.0";
const DEFAULT_PROTOCOL: &str = "dns";
const DEFAULT_SCHEME: &str = "http";
const TRANSPORT: &str = "tcp";
const HOST_PROTOCOLS: &[&str] = &["dns", "dns4", "dns6", "ip4", "ip6"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Invalid multi-address {address}: {reason}")]
pub struct MultiaddrError {
    pub address: String,
    pub reason: &'static str,
}

/// A network address in segment form, `/<protocol>/<host>/tcp/<port>[/<scheme>]`.
/// Segments other than the host are kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Multiaddr {
    segments: Vec<String>,
}

impl Multiaddr {
    const HOST: usize = 1;
    const PORT: usize = 3;
    const SCHEME: usize = 4;

    pub fn new(host: &str, port: u16) -> Self {
        Self {
            segments: vec![
                DEFAULT_PROTOCOL.to_string(),
                host.to_string(),
                TRANSPORT.to_string(),
                port.to_string(),
                DEFAULT_SCHEME.to_string(),
            ],
        }
    }

    pub fn host(&self) -> &str {
        &self.segments[Self::HOST]
    }

    pub fn port(&self) -> u16 {
        // Checked when the address was built.
        self.segments[Self::PORT].parse().unwrap_or_default()
    }

    pub fn scheme(&self) -> &str {
        self.segments
            .get(Self::SCHEME)
            .map(String::as_str)
            .unwrap_or(DEFAULT_SCHEME)
    }

    /// Same address with the host segment replaced.
    pub fn with_host(&self, host: &str) -> Self {
        let mut segments = self.segments.clone();
        segments[Self::HOST] = host.to_string();
        Self { segments }
    }

    /// The address a process binds to: every interface, same port and scheme.
    pub fn bind_any(&self) -> Self {
        self.with_host(BIND_ANY)
    }

    /// `scheme://host:port`, the form clients expect.
    pub fn to_url_data(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host(), self.port())
    }

    pub fn to_url(&self) -> Result<Url, MultiaddrError> {
        Url::parse(&self.to_url_data()).map_err(|_| MultiaddrError {
            address: self.to_string(),
            reason: "not representable as a url",
        })
    }
}

/// Extracts the bare host from a multi-address string.
pub fn ip_from_multi_address(address: &str) -> Result<String, MultiaddrError> {
    address.parse::<Multiaddr>().map(|address| address.host().to_string())
}

impl FromStr for Multiaddr {
    type Err = MultiaddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = |reason| MultiaddrError {
            address: s.to_string(),
            reason,
        };
        let Some(rest) = s.strip_prefix('/') else {
            return Err(error("must start with '/'"));
        };
        let segments: Vec<String> = rest.split('/').map(str::to_string).collect();
        if segments.len() < Self::SCHEME {
            return Err(error("expected /<protocol>/<host>/tcp/<port>"));
        }
        if !HOST_PROTOCOLS.contains(&segments[0].as_str()) {
            return Err(error("unknown host protocol"));
        }
        if segments[Self::HOST].is_empty() {
            return Err(error("empty host"));
        }
        if segments[2] != TRANSPORT {
            return Err(error("only tcp transports are supported"));
        }
        if segments[Self::PORT].parse::<u16>().is_err() {
            return Err(error("invalid port"));
        }
        if segments.iter().skip(Self::SCHEME).any(String::is_empty) {
            return Err(error("empty segment"));
        }
        Ok(Self { segments })
    }
}

impl TryFrom<String> for Multiaddr {
    type Error = MultiaddrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Multiaddr> for String {
    fn from(address: Multiaddr) -> Self {
        address.to_string()
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}
