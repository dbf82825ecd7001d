//! UPnP IGD (Internet Gateway Device) port mapping
//!
//! Devices are found with an SSDP M-SEARCH, confirmed as Internet Gateway
//! Devices by fetching their description document, and driven through SOAP
//! actions POSTed to their WANIPConnection control URL.
//!
//! The control endpoint is re-resolved on every action; nothing is cached
//! between calls.

pub mod device;
pub mod discovery;
pub mod soap;

/// Device type every accepted gateway must advertise
pub const IGD_DEVICE_TYPE: &str = "urn:schemas-upnp-org:device:InternetGatewayDevice:1";

/// Service whose control URL receives the port mapping actions
pub const WAN_IP_CONNECTION_SERVICE: &str = "urn:schemas-upnp-org:service:WANIPConnection:1";

pub use device::{fetch_control_url, probe};
pub use discovery::{discover, list_devices, list_igds, M_SEARCH};
pub use soap::{add_port_mapping, delete_port_mapping, get_external_ip, invoke, SoapAction};
