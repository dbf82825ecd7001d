//! Protocol-agnostic port mapping operations
//!
//! `PortMapper` dispatches each operation to NAT-PMP or UPnP. The blocking
//! methods run on the calling thread; the async methods move the same work
//! onto tokio's blocking pool.
//!
//! # Example
//!
//! ```no_run
//! use pmap::{MappingProtocol, PmapConfig, PortMapper};
//! use pmap::types::{IpProtocol, PortMappingRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mapper = PortMapper::new(MappingProtocol::UPnP, PmapConfig::default());
//! let request = PortMappingRequest::new(
//!     6568,
//!     IpProtocol::TCP,
//!     "192.168.1.7".parse()?,
//!     "192.168.1.1".parse()?,
//!     7200,
//! );
//!
//! let granted = mapper.add_port_mapping(request).await?;
//! println!("Mapped external port {}", granted.external_port);
//! # Ok(())
//! # }
//! ```

use crate::config::PmapConfig;
use crate::types::{MappingProtocol, OperationReport, PortMappingRequest};
use crate::url::UrlComponents;
use crate::{natpmp, upnp, MappingError, Result};
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// Port mapping operations over one protocol
#[derive(Debug, Clone)]
pub struct PortMapper {
    protocol: MappingProtocol,
    config: PmapConfig,
}

impl PortMapper {
    /// Create a mapper for `protocol`
    pub fn new(protocol: MappingProtocol, config: PmapConfig) -> Self {
        Self { protocol, config }
    }

    /// Protocol this mapper speaks
    pub fn protocol(&self) -> MappingProtocol {
        self.protocol
    }

    /// Configuration passed to every operation
    pub fn config(&self) -> &PmapConfig {
        &self.config
    }

    /// Create a port mapping
    ///
    /// Returns the mapping as granted: NAT-PMP gateways may assign a different
    /// external port or lifetime; UPnP mappings are granted as requested.
    pub fn add_port_mapping_blocking(&self, request: &PortMappingRequest) -> Result<PortMappingRequest> {
        debug!("add_port_mapping via {:?}", self.protocol);

        match self.protocol {
            MappingProtocol::NATPMP => natpmp::add_mapping(request, &self.config),
            MappingProtocol::UPnP => {
                upnp::add_port_mapping(request, &self.config)?;
                Ok(*request)
            }
        }
    }

    /// Remove a port mapping
    pub fn delete_port_mapping_blocking(&self, request: &PortMappingRequest) -> Result<PortMappingRequest> {
        debug!("delete_port_mapping via {:?}", self.protocol);

        match self.protocol {
            MappingProtocol::NATPMP => natpmp::delete_mapping(request, &self.config),
            MappingProtocol::UPnP => {
                upnp::delete_port_mapping(request, &self.config)?;
                Ok(*request)
            }
        }
    }

    /// Query the external address of `gateway_ip`
    pub fn external_ip_blocking(&self, gateway_ip: Ipv4Addr) -> Result<Ipv4Addr> {
        debug!("external_ip via {:?}", self.protocol);

        match self.protocol {
            MappingProtocol::NATPMP => natpmp::get_external_ip(gateway_ip, &self.config),
            MappingProtocol::UPnP => upnp::get_external_ip(gateway_ip, &self.config),
        }
    }

    /// List UPnP devices, optionally only confirmed IGDs
    ///
    /// Listing is always done over SSDP, whatever the mapper's protocol.
    pub fn list_devices_blocking(&self, igd_only: bool) -> Result<Vec<UrlComponents>> {
        upnp::discover(igd_only, &self.config)
    }

    /// Create a port mapping on the blocking pool
    pub async fn add_port_mapping(&self, request: PortMappingRequest) -> Result<PortMappingRequest> {
        let mapper = self.clone();
        spawn(move || mapper.add_port_mapping_blocking(&request)).await
    }

    /// Remove a port mapping on the blocking pool
    pub async fn delete_port_mapping(&self, request: PortMappingRequest) -> Result<PortMappingRequest> {
        let mapper = self.clone();
        spawn(move || mapper.delete_port_mapping_blocking(&request)).await
    }

    /// Query the external address on the blocking pool
    pub async fn external_ip(&self, gateway_ip: Ipv4Addr) -> Result<Ipv4Addr> {
        let mapper = self.clone();
        spawn(move || mapper.external_ip_blocking(gateway_ip)).await
    }

    /// List UPnP devices on the blocking pool
    pub async fn list_devices(&self, igd_only: bool) -> Result<Vec<UrlComponents>> {
        let mapper = self.clone();
        spawn(move || mapper.list_devices_blocking(igd_only)).await
    }

    /// Reduce an operation outcome to `(success, error_description)`
    pub fn report<T>(&self, result: &Result<T>) -> OperationReport {
        let report = OperationReport::from(result);
        if !report.success {
            info!(
                "{:?} operation failed: {}",
                self.protocol,
                report.error_description.as_deref().unwrap_or_default()
            );
        }
        report
    }
}

async fn spawn<T, F>(operation: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|e| MappingError::Internal(format!("Task join error: {}", e)))?
}
