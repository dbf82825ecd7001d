//! Common types shared by both port mapping protocols

use crate::buffer::BufferError;
use crate::text::ExtractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Stable code for [`MappingError::InvalidUrl`]
pub const CODE_INVALID_URL: i32 = 200;
/// Stable code for [`MappingError::InvalidProtocol`]
pub const CODE_INVALID_PROTOCOL: i32 = 201;
/// Stable code for [`MappingError::NoResponse`] (ETIMEDOUT)
pub const CODE_NO_RESPONSE: i32 = 110;
/// Code for every other failure
pub const CODE_GENERIC: i32 = 1;

/// A port mapping as requested by the caller
///
/// For NAT-PMP the gateway may grant a different external port or lifetime;
/// the granted values come back in the returned copy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMappingRequest {
    /// Port opened on the gateway's external interface
    pub external_port: u16,
    /// Port on the internal host traffic is forwarded to
    pub internal_port: u16,
    /// Transport protocol of the mapping
    pub protocol: IpProtocol,
    /// Address of the internal host
    pub internal_ip: Ipv4Addr,
    /// Address of the gateway handling the request
    pub gateway_ip: Ipv4Addr,
    /// Requested lifetime in seconds (0 = no expiration for UPnP, delete for NAT-PMP)
    pub lifetime_secs: u32,
}

impl PortMappingRequest {
    /// Build a request mapping `port` to the same port on `internal_ip`
    pub fn new(
        port: u16,
        protocol: IpProtocol,
        internal_ip: Ipv4Addr,
        gateway_ip: Ipv4Addr,
        lifetime_secs: u32,
    ) -> Self {
        Self {
            external_port: port,
            internal_port: port,
            protocol,
            internal_ip,
            gateway_ip,
            lifetime_secs,
        }
    }

    /// Request that only identifies a gateway (external IP queries)
    pub fn for_gateway(gateway_ip: Ipv4Addr) -> Self {
        Self::new(0, IpProtocol::TCP, Ipv4Addr::UNSPECIFIED, gateway_ip, 0)
    }
}

/// Transport protocols a mapping can be created for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IpProtocol {
    /// TCP protocol
    TCP,
    /// UDP protocol
    UDP,
}

impl IpProtocol {
    /// Protocol name as carried in SOAP envelopes
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TCP => "TCP",
            Self::UDP => "UDP",
        }
    }
}

impl FromStr for IpProtocol {
    type Err = MappingError;

    /// Accepts exactly `"TCP"` or `"UDP"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TCP" => Ok(Self::TCP),
            "UDP" => Ok(Self::UDP),
            other => Err(MappingError::InvalidProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocols available for port mapping
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MappingProtocol {
    /// NAT Port Mapping Protocol (RFC 6886)
    NATPMP,
    /// UPnP Internet Gateway Device control
    UPnP,
}

/// Errors that can occur during port mapping
#[derive(Debug, Error)]
pub enum MappingError {
    /// Allocation failure
    #[error("Out of memory")]
    OutOfMemory,

    /// A write would have moved a buffer past its capacity
    #[error("Buffer overflow: {requested} bytes requested, {remaining} remaining")]
    BufferOverflow {
        /// Bytes the write needed
        requested: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Socket create/bind/setsockopt/send/recv failure
    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// TCP connect did not complete in time
    #[error("Connection timed out")]
    ConnectTimeout,

    /// Nothing was read before the idle timeout
    #[error("Read timed out")]
    ReadTimeout,

    /// URL could not be decomposed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Text extraction marker missing
    #[error("Marker not found")]
    NotFound,

    /// Text extraction result exceeds the allowed length
    #[error("Extracted value too long: {len} bytes (max {max})")]
    TooLong {
        /// Length of the extracted value
        len: usize,
        /// Allowed length
        max: usize,
    },

    /// Device is not an InternetGatewayDevice or exposes no WANIPConnection
    #[error("Device is not an Internet Gateway Device")]
    NotIgd,

    /// HTTP exchange completed with an unexpected status
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Protocol string other than TCP or UDP
    #[error("Invalid protocol: {0} (expected TCP or UDP)")]
    InvalidProtocol(String),

    /// Gateway explicitly refused the request
    #[error("Gateway error {code}: {description}")]
    RemoteError {
        /// Gateway-reported code (NAT-PMP result code, UPnP error code or HTTP status)
        code: u16,
        /// Gateway-reported or table description
        description: String,
    },

    /// Gateway answered with something unusable
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Gateway did not reply within the retry budget
    #[error("No response obtained from gateway")]
    NoResponse,

    /// Configuration could not be loaded or saved
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MappingError {
    /// Human-readable description for reports
    ///
    /// Gateway refusals report the gateway's own wording.
    pub fn description(&self) -> String {
        match self {
            Self::RemoteError { description, .. } => description.clone(),
            other => other.to_string(),
        }
    }

    /// Stable numeric code, suitable for process exit statuses
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidUrl(_) => CODE_INVALID_URL,
            Self::InvalidProtocol(_) => CODE_INVALID_PROTOCOL,
            Self::NoResponse | Self::ConnectTimeout => CODE_NO_RESPONSE,
            Self::RemoteError { code, .. } => i32::from(*code),
            Self::Socket(e) => e.raw_os_error().unwrap_or(CODE_GENERIC),
            _ => CODE_GENERIC,
        }
    }

    /// Whether the gateway itself refused the request
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteError { .. })
    }
}

impl From<BufferError> for MappingError {
    fn from(e: BufferError) -> Self {
        match e {
            BufferError::OutOfMemory => Self::OutOfMemory,
            BufferError::Overflow {
                requested,
                remaining,
            } => Self::BufferOverflow {
                requested,
                remaining,
            },
        }
    }
}

impl From<ExtractError> for MappingError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::NotFound => Self::NotFound,
            ExtractError::TooLong { len, max } => Self::TooLong { len, max },
        }
    }
}

/// `(success, error_description)` pair reported for a facade operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationReport {
    /// Whether the operation succeeded
    pub success: bool,
    /// Error description when it did not
    pub error_description: Option<String>,
    /// Numeric error code when it did not
    pub error_code: Option<i32>,
}

impl OperationReport {
    /// Report for a successful operation
    pub fn ok() -> Self {
        Self {
            success: true,
            error_description: None,
            error_code: None,
        }
    }

    /// Report for a failed operation
    pub fn failed(error: &MappingError) -> Self {
        Self {
            success: false,
            error_description: Some(error.description()),
            error_code: Some(error.code()),
        }
    }
}

impl<T> From<&Result<T, MappingError>> for OperationReport {
    fn from(result: &Result<T, MappingError>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::failed(e),
        }
    }
}
