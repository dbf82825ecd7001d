//! SSDP discovery of UPnP root devices

use super::device::probe;
use crate::config::PmapConfig;
use crate::text::extract_between;
use crate::url::UrlComponents;
use crate::Result;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use tracing::{debug, info, warn};

/// M-SEARCH datagram sent to the SSDP multicast group
pub const M_SEARCH: &str = "M-SEARCH * HTTP/1.1\r\n\
                            HOST: 239.255.255.250:1900\r\n\
                            MAN: \"ssdp:discover\"\r\n\
                            MX: 5\r\n\
                            ST: upnp:rootdevice\r\n\
                            \r\n";

/// Largest SSDP datagram kept
const DATAGRAM_CAPACITY: usize = 2048;

/// Longest LOCATION value accepted
const LOCATION_CAPACITY: usize = 256;

/// Discover UPnP root devices on the local network
///
/// Responses are collected until the socket stays silent for the discovery
/// timeout; a steady trickle of answers keeps the call going. Devices are
/// returned in discovery order with duplicates (same host, path and port)
/// dropped. With `filter_igd_only`, every new device is probed once and kept
/// only when it is an Internet Gateway Device, with its control URL filled in.
///
/// Fails only when the socket cannot be set up or the M-SEARCH cannot be sent.
pub fn discover(filter_igd_only: bool, config: &PmapConfig) -> Result<Vec<UrlComponents>> {
    info!(
        "Searching for UPnP devices via {} (IGD only: {})",
        config.ssdp_addr, filter_igd_only
    );

    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
    socket.set_read_timeout(Some(config.discovery_timeout()))?;

    config.dump("M-SEARCH REQUEST", M_SEARCH);
    socket.send_to(M_SEARCH.as_bytes(), config.ssdp_addr)?;

    let mut devices: Vec<UrlComponents> = Vec::new();
    // Every location answered so far, rejected ones included
    let mut seen: Vec<UrlComponents> = Vec::new();
    let mut buf = [0u8; DATAGRAM_CAPACITY];

    loop {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                debug!("SSDP discovery finished, no response within timeout");
                break;
            }
            Err(e) => {
                warn!("SSDP receive failed: {}", e);
                break;
            }
        };

        let datagram = String::from_utf8_lossy(&buf[..len]);
        config.dump("M-SEARCH RESPONSE", &datagram);

        let Some(location) = location_of(&datagram) else {
            debug!("SSDP response from {} carries no LOCATION", from);
            continue;
        };

        let mut device = match UrlComponents::parse(location) {
            Ok(device) => device,
            Err(e) => {
                warn!("Skipping SSDP response from {}: {}", from, e);
                continue;
            }
        };

        if seen.iter().any(|known| known.same_location(&device)) {
            debug!("Duplicate device {}", device);
            continue;
        }
        seen.push(device.clone());

        if filter_igd_only {
            if let Err(e) = probe(&mut device, config) {
                debug!("Skipping {}: {}", device, e);
                continue;
            }
        }

        debug!("Discovered device {}", device);
        devices.push(device);
    }

    info!("Discovered {} UPnP device(s)", devices.len());
    Ok(devices)
}

/// All UPnP root devices answering the M-SEARCH
pub fn list_devices(config: &PmapConfig) -> Result<Vec<UrlComponents>> {
    discover(false, config)
}

/// Internet Gateway Devices only, each with its control URL
pub fn list_igds(config: &PmapConfig) -> Result<Vec<UrlComponents>> {
    discover(true, config)
}

/// Value of the `LOCATION:` header, up to its CRLF
pub(crate) fn location_of(datagram: &str) -> Option<&str> {
    extract_between("LOCATION:", "\r\n", datagram, LOCATION_CAPACITY)
        .ok()
        .map(str::trim_end)
        .filter(|location| !location.is_empty())
}
