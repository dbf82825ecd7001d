//! SOAP actions against the WANIPConnection service

use super::device::fetch_control_url;
use super::discovery::discover;
use super::WAN_IP_CONNECTION_SERVICE;
use crate::buffer::ByteBuffer;
use crate::config::PmapConfig;
use crate::http::{self, HttpResponse};
use crate::text::extract_element;
use crate::types::PortMappingRequest;
use crate::url::UrlComponents;
use crate::{MappingError, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// Capacity of SOAP envelope buffers
const ENVELOPE_CAPACITY: usize = 1024;

/// Longest error description / external address accepted
const VALUE_CAPACITY: usize = 128;

/// Description attached to every mapping created through UPnP
pub const MAPPING_DESCRIPTION: &str = "pMAP";

const ENVELOPE_HEAD: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\r\n\
    <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
    s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\r\n  <s:Body>\r\n";

const ENVELOPE_TAIL: &str = "  </s:Body>\r\n</s:Envelope>\r\n";

/// WANIPConnection actions the engine can invoke
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SoapAction {
    /// Create a port mapping
    AddPortMapping,
    /// Remove a port mapping
    DeletePortMapping,
    /// Query the gateway's external address
    GetExternalIPAddress,
}

impl SoapAction {
    /// Action name as used in the envelope and the SOAPAction header
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddPortMapping => "AddPortMapping",
            Self::DeletePortMapping => "DeletePortMapping",
            Self::GetExternalIPAddress => "GetExternalIPAddress",
        }
    }

    /// Complete `SOAPAction` header line, CRLF included
    pub fn header(&self) -> String {
        format!(
            "SOAPAction: \"{}#{}\"\r\n",
            WAN_IP_CONNECTION_SERVICE,
            self.name()
        )
    }

    /// Build the SOAP envelope for this action from `fields`
    pub fn envelope(&self, fields: &PortMappingRequest) -> Result<ByteBuffer> {
        let mut body = ByteBuffer::with_capacity(ENVELOPE_CAPACITY)?;

        body.append_bytes(ENVELOPE_HEAD.as_bytes())?;
        body.append_fmt(format_args!(
            "    <u:{}       xmlns:u=\"{}\">\r\n",
            self.name(),
            WAN_IP_CONNECTION_SERVICE
        ))?;

        match self {
            Self::AddPortMapping => {
                body.append_fmt(format_args!(
                    "      <NewRemoteHost></NewRemoteHost>\r\n\
                     \x20     <NewExternalPort>{}</NewExternalPort>\r\n\
                     \x20     <NewProtocol>{}</NewProtocol>\r\n\
                     \x20     <NewInternalPort>{}</NewInternalPort>\r\n\
                     \x20     <NewInternalClient>{}</NewInternalClient>\r\n\
                     \x20     <NewEnabled>True</NewEnabled>\r\n\
                     \x20     <NewPortMappingDescription>{}</NewPortMappingDescription>\r\n\
                     \x20     <NewLeaseDuration>{}</NewLeaseDuration>\r\n",
                    fields.external_port,
                    fields.protocol,
                    fields.internal_port,
                    fields.internal_ip,
                    MAPPING_DESCRIPTION,
                    fields.lifetime_secs
                ))?;
            }
            Self::DeletePortMapping => {
                body.append_fmt(format_args!(
                    "      <NewRemoteHost></NewRemoteHost>\r\n\
                     \x20     <NewExternalPort>{}</NewExternalPort>\r\n\
                     \x20     <NewProtocol>{}</NewProtocol>\r\n",
                    fields.external_port, fields.protocol
                ))?;
            }
            Self::GetExternalIPAddress => {}
        }

        body.append_fmt(format_args!("    </u:{}>\r\n", self.name()))?;
        body.append_bytes(ENVELOPE_TAIL.as_bytes())?;

        Ok(body)
    }
}

/// Invoke `action` on the gateway named by `fields.gateway_ip`
///
/// Runs a fresh discovery, takes the discovered devices whose host is the
/// gateway address in discovery order, and POSTs the envelope to the control
/// URL of the first one that probes as an IGD. The raw response is returned
/// whatever its status; `NoResponse` means no device at the gateway address
/// could be driven.
pub fn invoke(
    action: SoapAction,
    fields: &PortMappingRequest,
    config: &PmapConfig,
) -> Result<HttpResponse> {
    let gateway = fields.gateway_ip.to_string();
    let devices = discover(false, config)?;

    for device in devices.iter().filter(|device| device.host == gateway) {
        let control_url = match fetch_control_url(device, config) {
            Ok(control_url) => control_url,
            Err(e) => {
                debug!("Skipping {}: {}", device, e);
                continue;
            }
        };

        let (host, port, path) = control_endpoint(device, &control_url)?;
        let body = action.envelope(fields)?;

        debug!("Invoking {} on {}:{}{}", action.name(), host, port, path);
        let response = http::post(&host, port, &path, &action.header(), &body, config)?;
        debug!("{} returned HTTP status {}", action.name(), response.status());

        return Ok(response);
    }

    warn!("No UPnP gateway found at {}", gateway);
    Err(MappingError::NoResponse)
}

/// Create a port mapping on the gateway
pub fn add_port_mapping(fields: &PortMappingRequest, config: &PmapConfig) -> Result<()> {
    info!(
        "Adding UPnP mapping {} {} -> {}:{} (lifetime: {}s) on {}",
        fields.protocol,
        fields.external_port,
        fields.internal_ip,
        fields.internal_port,
        fields.lifetime_secs,
        fields.gateway_ip
    );

    let response = invoke(SoapAction::AddPortMapping, fields, config)?;
    ensure_success(&response)
}

/// Remove a port mapping from the gateway
pub fn delete_port_mapping(fields: &PortMappingRequest, config: &PmapConfig) -> Result<()> {
    info!(
        "Deleting UPnP mapping {} {} on {}",
        fields.protocol, fields.external_port, fields.gateway_ip
    );

    let response = invoke(SoapAction::DeletePortMapping, fields, config)?;
    ensure_success(&response)
}

/// Query the gateway's external IPv4 address
pub fn get_external_ip(gateway_ip: Ipv4Addr, config: &PmapConfig) -> Result<Ipv4Addr> {
    info!("Requesting external address from UPnP gateway {}", gateway_ip);

    let fields = PortMappingRequest::for_gateway(gateway_ip);
    let response = invoke(SoapAction::GetExternalIPAddress, &fields, config)?;
    ensure_success(&response)?;

    let body = response.text();
    let address = extract_element("NewExternalIPAddress", &body, VALUE_CAPACITY)?;

    address
        .trim_end()
        .parse()
        .map_err(|_| MappingError::InvalidResponse(format!("Invalid external address: {}", address)))
}

/// Map a non-200 response to the gateway's `errorDescription`
pub(crate) fn ensure_success(response: &HttpResponse) -> Result<()> {
    if response.is_ok() {
        return Ok(());
    }

    let body = response.text();
    match extract_element("errorDescription", &body, VALUE_CAPACITY) {
        Ok(description) => {
            let code = extract_element("errorCode", &body, VALUE_CAPACITY)
                .ok()
                .and_then(|code| code.trim_end().parse().ok())
                .unwrap_or(response.status());

            Err(MappingError::RemoteError {
                code,
                description: description.to_string(),
            })
        }
        Err(_) => Err(MappingError::HttpStatus(response.status())),
    }
}

/// Host, port and path a control URL points at
///
/// Absolute control URLs name their own endpoint; relative ones live on the
/// device's host and port.
fn control_endpoint(device: &UrlComponents, control_url: &str) -> Result<(String, u16, String)> {
    if control_url.contains("://") {
        let url = UrlComponents::parse(control_url)?;
        return Ok((url.host, url.port, url.path));
    }

    Ok((device.host.clone(), device.port, control_url.to_string()))
}
