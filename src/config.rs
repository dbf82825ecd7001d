//! Runtime configuration passed into every operation
//!
//! There is no process-wide state: timeouts, the gateway ports and the
//! wire-dump switch all travel with the `PmapConfig` value handed to each call.

use crate::{MappingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tracing::{info, trace};

/// SSDP multicast group
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// SSDP port
pub const SSDP_PORT: u16 = 1900;

/// NAT-PMP server port (IANA assigned)
pub const NATPMP_SERVER_PORT: u16 = 5351;

/// Port mapping configuration
///
/// # Example
/// ```rust,no_run
/// use pmap::config::PmapConfig;
///
/// // Load configuration (returns default if file doesn't exist)
/// let mut config = PmapConfig::load("pmap.json").expect("Failed to load");
/// config.verbose = true;
/// config.save("pmap.json").expect("Failed to save");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PmapConfig {
    /// Dump raw requests and responses at info level
    pub verbose: bool,
    /// Silence window that ends SSDP discovery, in milliseconds
    pub discovery_timeout_ms: u64,
    /// HTTP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// HTTP idle-read timeout in milliseconds
    pub read_idle_timeout_ms: u64,
    /// NAT-PMP receive timeout per attempt in milliseconds
    pub natpmp_timeout_ms: u64,
    /// NAT-PMP receive attempts
    pub natpmp_attempts: u32,
    /// NAT-PMP server port on the gateway
    pub natpmp_port: u16,
    /// Destination of the SSDP M-SEARCH datagram
    pub ssdp_addr: SocketAddrV4,
    /// Capacity of HTTP response buffers in bytes
    pub http_response_capacity: usize,
}

impl Default for PmapConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            discovery_timeout_ms: 4000,
            connect_timeout_ms: 4000,
            read_idle_timeout_ms: 2100,
            natpmp_timeout_ms: 250,
            natpmp_attempts: 2,
            natpmp_port: NATPMP_SERVER_PORT,
            ssdp_addr: SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT),
            http_response_capacity: 64 * 1024,
        }
    }
}

impl PmapConfig {
    /// Load configuration from a JSON file
    ///
    /// Missing fields take their defaults; a missing or empty file yields the
    /// default configuration. Zero timeouts are rejected (see [`validate`]).
    ///
    /// [`validate`]: PmapConfig::validate
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| MappingError::Config(format!("Failed to read config: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_json::from_str(&data)
            .map_err(|e| MappingError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check that every timeout and the attempt budget are non-zero
    ///
    /// Sockets refuse a zero timeout, so such a configuration would fail every
    /// operation.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("discovery_timeout_ms", self.discovery_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("read_idle_timeout_ms", self.read_idle_timeout_ms),
            ("natpmp_timeout_ms", self.natpmp_timeout_ms),
        ];

        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(MappingError::Config(format!("{} must be greater than 0", name)));
        }

        if self.natpmp_attempts == 0 {
            return Err(MappingError::Config(
                "natpmp_attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MappingError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MappingError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, json)
            .map_err(|e| MappingError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub(crate) fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub(crate) fn read_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.read_idle_timeout_ms)
    }

    pub(crate) fn natpmp_timeout(&self) -> Duration {
        Duration::from_millis(self.natpmp_timeout_ms)
    }

    /// Log a raw request or response
    pub(crate) fn dump(&self, label: &str, payload: impl Display) {
        if self.verbose {
            info!("{}: =>>>\n{}", label, payload);
        } else {
            trace!("{}: =>>>\n{}", label, payload);
        }
    }
}
