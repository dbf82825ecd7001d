//! URL decomposition for device locations
//!
//! Only absolute `scheme://host[:port]/path` URLs are recognised. The host is
//! not validated and the path is kept without its leading slash, the form
//! SSDP `LOCATION` headers are matched and printed in.

use crate::types::MappingError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Port assumed when a URL carries none
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Components of an absolute HTTP URL, plus the control endpoint once the
/// device has been confirmed as an Internet Gateway Device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UrlComponents {
    /// URL scheme (e.g. "http")
    pub scheme: String,
    /// Host name or address, unvalidated
    pub host: String,
    /// Port, `DEFAULT_HTTP_PORT` when absent
    pub port: u16,
    /// Path without the leading slash
    pub path: String,
    /// WANIPConnection control URL, set only for confirmed IGDs
    pub control_url: Option<String>,
}

impl UrlComponents {
    /// Parse an absolute URL such as `http://192.168.1.1:53055/rootDesc.xml`
    pub fn parse(url: &str) -> Result<Self, MappingError> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| MappingError::InvalidUrl(url.to_string()))?;

        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));

        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| MappingError::InvalidUrl(url.to_string()))?;
                (host, port)
            }
            None => (authority, DEFAULT_HTTP_PORT),
        };

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
            control_url: None,
        })
    }

    /// Whether both records point at the same device description
    ///
    /// Identity is (host, path, port); scheme and control URL are ignored.
    pub fn same_location(&self, other: &UrlComponents) -> bool {
        self.host == other.host && self.path == other.path && self.port == other.port
    }
}

impl fmt::Display for UrlComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}/{}", self.scheme, self.host, self.port, self.path)
    }
}
