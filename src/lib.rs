//! pmap - port mapping client for NAT gateways
//!
//! This library negotiates inbound port mappings and discovers the external
//! address of a local gateway over two independent protocols:
//! - NAT-PMP (RFC 6886), a binary UDP exchange with the gateway
//! - UPnP IGD, SSDP discovery followed by SOAP actions over HTTP
//!
//! [`PortMapper`] is the protocol-agnostic entry point.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod config;
pub mod facade;
pub mod http;
pub mod natpmp;
pub mod text;
pub mod types;
pub mod upnp;
pub mod url;

pub use config::PmapConfig;
pub use facade::PortMapper;
pub use types::{IpProtocol, MappingError, MappingProtocol, OperationReport, PortMappingRequest};
pub use url::UrlComponents;

/// Result type alias for pmap operations
pub type Result<T> = std::result::Result<T, MappingError>;

/// Initialize logging with the default `tracing` subscriber
pub fn init() {
    tracing_subscriber::fmt::init();
}

/// Initialize logging filtered by an `EnvFilter` directive such as `"pmap=debug"`
pub fn init_with_filter(directives: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(directives))
        .init();
}

#[cfg(test)]
mod tests;
