//! Device description probing

use super::{IGD_DEVICE_TYPE, WAN_IP_CONNECTION_SERVICE};
use crate::config::PmapConfig;
use crate::http;
use crate::text::extract_element;
use crate::url::UrlComponents;
use crate::{MappingError, Result};
use tracing::debug;

/// Longest `deviceType` / `controlURL` value accepted
const FIELD_CAPACITY: usize = 256;

/// Fetch the device description and return its WANIPConnection control URL
///
/// The description must be served with status 200, declare the
/// InternetGatewayDevice:1 device type, and list a `controlURL` somewhere
/// after the WANIPConnection:1 service type.
pub fn fetch_control_url(device: &UrlComponents, config: &PmapConfig) -> Result<String> {
    let response = http::get(&device.host, device.port, &device.path, config)?;
    if !response.is_ok() {
        debug!("Description of {} returned status {}", device, response.status());
        return Err(MappingError::HttpStatus(response.status()));
    }

    let body = response.text();

    let device_type = extract_element("deviceType", &body, FIELD_CAPACITY).map_err(|e| {
        debug!("No deviceType in description of {}: {}", device, e);
        MappingError::NotIgd
    })?;

    if device_type != IGD_DEVICE_TYPE {
        debug!("{} is a {}", device, device_type);
        return Err(MappingError::NotIgd);
    }

    debug!("InternetGatewayDevice at {}", device);

    let service = body
        .find(WAN_IP_CONNECTION_SERVICE)
        .ok_or(MappingError::NotIgd)?;

    let control_url = extract_element("controlURL", &body[service..], FIELD_CAPACITY)
        .map_err(|_| MappingError::NotIgd)?;

    if control_url.is_empty() {
        return Err(MappingError::NotIgd);
    }

    debug!("controlURL={}", control_url);
    Ok(control_url.to_string())
}

/// Confirm `device` is an IGD and record its control URL on it
pub fn probe(device: &mut UrlComponents, config: &PmapConfig) -> Result<String> {
    let control_url = fetch_control_url(device, config)?;
    device.control_url = Some(control_url.clone());
    Ok(control_url)
}
