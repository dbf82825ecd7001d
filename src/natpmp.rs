//! NAT-PMP (NAT Port Mapping Protocol) client - RFC 6886
//!
//! NAT-PMP is a binary protocol spoken over UDP with the gateway on port 5351.
//! It supports:
//! - External IP address requests (opcode 0)
//! - UDP port mappings (opcode 1)
//! - TCP port mappings (opcode 2)
//!
//! Every operation opens one socket, sends its request once and then polls for
//! a reply a bounded number of times. Replies are only accepted from the
//! gateway address and only when their opcode is the request opcode + 128.
//! RFC 6886 recommends retransmitting with exponential backoff; this client
//! deliberately does not.
//!
//! # Example
//!
//! ```no_run
//! use pmap::config::PmapConfig;
//! use pmap::natpmp;
//! use pmap::types::{IpProtocol, PortMappingRequest};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PmapConfig::default();
//! let request = PortMappingRequest::new(
//!     6568,
//!     IpProtocol::TCP,
//!     "192.168.1.7".parse()?,
//!     "192.168.1.1".parse()?,
//!     7200,
//! );
//! let granted = natpmp::add_mapping(&request, &config)?;
//! println!("External port: {} for {}s", granted.external_port, granted.lifetime_secs);
//! # Ok(())
//! # }
//! ```

use crate::config::PmapConfig;
use crate::types::{IpProtocol, PortMappingRequest};
use crate::{MappingError, Result};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use tracing::{debug, info};

/// NAT-PMP protocol version
pub const NATPMP_VERSION: u8 = 0;

/// Offset added to the request opcode in responses
pub const RESPONSE_OPCODE_OFFSET: u8 = 128;

/// Description used for result codes outside the known table (RFC 6886 §3.5)
pub const FATAL_ERROR_DESCRIPTION: &str = "Fatal Error";

/// Largest datagram the client will accept
const MAX_RESPONSE_LEN: usize = 64;

/// Header plus result code, the part every reply carries
const RESULT_PREFIX_LEN: usize = 4;

/// NAT-PMP opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NatPmpOpcode {
    /// External address request
    ExternalAddress = 0,
    /// UDP port mapping
    MapUdp = 1,
    /// TCP port mapping
    MapTcp = 2,
}

impl NatPmpOpcode {
    /// Mapping opcode for a transport protocol
    pub fn for_protocol(protocol: IpProtocol) -> Self {
        match protocol {
            IpProtocol::UDP => Self::MapUdp,
            IpProtocol::TCP => Self::MapTcp,
        }
    }

    /// Opcode a matching response carries
    pub fn response(self) -> u8 {
        self as u8 + RESPONSE_OPCODE_OFFSET
    }
}

/// NAT-PMP result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum NatPmpResultCode {
    /// Request granted
    Success = 0,
    /// Gateway does not speak this protocol version
    UnsupportedVersion = 1,
    /// Mapping refused by the gateway's policy
    NotAuthorized = 2,
    /// Gateway has no external connectivity
    NetworkFailure = 3,
    /// Gateway cannot create more mappings
    OutOfResources = 4,
    /// Opcode unknown to the gateway
    UnsupportedOpcode = 5,
}

impl NatPmpResultCode {
    /// Known result code, `None` outside the RFC 6886 table
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::UnsupportedVersion),
            2 => Some(Self::NotAuthorized),
            3 => Some(Self::NetworkFailure),
            4 => Some(Self::OutOfResources),
            5 => Some(Self::UnsupportedOpcode),
            _ => None,
        }
    }

    /// Description reported for this result
    pub fn to_error_message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::UnsupportedVersion => "Unsupported Version",
            Self::NotAuthorized => "Not Authorized/Refused",
            Self::NetworkFailure => "Network Failure",
            Self::OutOfResources => "Out of resources",
            Self::UnsupportedOpcode => "Unsupported opcode",
        }
    }
}

/// Description for any result code; unknown codes are fatal
pub fn describe_result_code(code: u16) -> &'static str {
    NatPmpResultCode::from_u16(code)
        .map(|result| result.to_error_message())
        .unwrap_or(FATAL_ERROR_DESCRIPTION)
}

/// Common two-byte header of every packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version, always 0
    pub version: u8,
    /// Request opcode, or request opcode + 128 in responses
    pub opcode: u8,
}

impl Header {
    /// Wire length
    pub const LEN: usize = 2;

    /// Network byte order encoding
    pub fn encode(&self) -> [u8; Self::LEN] {
        [self.version, self.opcode]
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            version: buf[0],
            opcode: buf[1],
        }
    }
}

/// MAP request (12 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct MapRequest {
    pub header: Header,
    pub reserved: u16,
    pub internal_port: u16,
    /// Suggested external port
    pub external_port: u16,
    pub lifetime_secs: u32,
}

impl MapRequest {
    /// Wire length
    pub const LEN: usize = 12;

    /// MAP request for `request`, using its protocol's opcode
    pub fn from_request(request: &PortMappingRequest) -> Self {
        Self {
            header: Header {
                version: NATPMP_VERSION,
                opcode: NatPmpOpcode::for_protocol(request.protocol) as u8,
            },
            reserved: 0,
            internal_port: request.internal_port,
            external_port: request.external_port,
            lifetime_secs: request.lifetime_secs,
        }
    }

    /// Network byte order encoding
    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0..2].copy_from_slice(&self.header.encode());
        buf[2..4].copy_from_slice(&self.reserved.to_be_bytes());
        buf[4..6].copy_from_slice(&self.internal_port.to_be_bytes());
        buf[6..8].copy_from_slice(&self.external_port.to_be_bytes());
        buf[8..12].copy_from_slice(&self.lifetime_secs.to_be_bytes());
        buf
    }
}

/// External address response (12 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ExternalIpResponse {
    pub header: Header,
    pub result_code: u16,
    pub seconds_since_start: u32,
    pub external_ip: Ipv4Addr,
}

/// MAP response (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct MapResponse {
    pub header: Header,
    pub result_code: u16,
    pub seconds_since_start: u32,
    pub internal_port: u16,
    pub external_port: u16,
    pub lifetime_secs: u32,
}

/// Fixed-layout response record
pub trait NatPmpResponse: Sized {
    /// Wire length of the record
    const LEN: usize;

    /// Decode the record, `None` when `buf` is shorter than `LEN`
    fn decode(buf: &[u8]) -> Option<Self>;

    /// Packet header
    fn header(&self) -> Header;

    /// Host byte order result code
    fn result_code(&self) -> u16;
}

impl NatPmpResponse for ExternalIpResponse {
    const LEN: usize = 12;

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }

        Some(Self {
            header: Header::decode(buf),
            result_code: u16::from_be_bytes([buf[2], buf[3]]),
            seconds_since_start: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            external_ip: Ipv4Addr::new(buf[8], buf[9], buf[10], buf[11]),
        })
    }

    fn header(&self) -> Header {
        self.header
    }

    fn result_code(&self) -> u16 {
        self.result_code
    }
}

impl NatPmpResponse for MapResponse {
    const LEN: usize = 16;

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }

        Some(Self {
            header: Header::decode(buf),
            result_code: u16::from_be_bytes([buf[2], buf[3]]),
            seconds_since_start: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            internal_port: u16::from_be_bytes([buf[8], buf[9]]),
            external_port: u16::from_be_bytes([buf[10], buf[11]]),
            lifetime_secs: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    fn header(&self) -> Header {
        self.header
    }

    fn result_code(&self) -> u16 {
        self.result_code
    }
}

/// Ask the gateway for its external IPv4 address
pub fn get_external_ip(gateway_ip: Ipv4Addr, config: &PmapConfig) -> Result<Ipv4Addr> {
    info!("Requesting external address from NAT-PMP gateway {}", gateway_ip);

    let opcode = NatPmpOpcode::ExternalAddress;
    let request = Header {
        version: NATPMP_VERSION,
        opcode: opcode as u8,
    };

    let response: ExternalIpResponse =
        exchange(gateway_ip, &request.encode(), opcode.response(), config)?;

    info!("NAT-PMP external address: {}", response.external_ip);
    Ok(response.external_ip)
}

/// Create (or renew) a mapping
///
/// Returns a copy of `request` carrying the ports and lifetime the gateway
/// actually granted.
pub fn add_mapping(request: &PortMappingRequest, config: &PmapConfig) -> Result<PortMappingRequest> {
    info!(
        "Requesting NAT-PMP mapping {} {} -> {}:{} (lifetime: {}s) from {}",
        request.protocol,
        request.external_port,
        request.internal_ip,
        request.internal_port,
        request.lifetime_secs,
        request.gateway_ip
    );

    let map_request = MapRequest::from_request(request);
    let opcode = NatPmpOpcode::for_protocol(request.protocol);

    let response: MapResponse =
        exchange(request.gateway_ip, &map_request.encode(), opcode.response(), config)?;

    let granted = PortMappingRequest {
        external_port: response.external_port,
        internal_port: response.internal_port,
        lifetime_secs: response.lifetime_secs,
        ..*request
    };

    info!(
        "NAT-PMP mapping granted: external port {} -> internal port {} (lifetime: {}s)",
        granted.external_port, granted.internal_port, granted.lifetime_secs
    );

    Ok(granted)
}

/// Remove a mapping by requesting it with a zero lifetime
pub fn delete_mapping(request: &PortMappingRequest, config: &PmapConfig) -> Result<PortMappingRequest> {
    let request = PortMappingRequest {
        lifetime_secs: 0,
        ..*request
    };
    add_mapping(&request, config)
}

/// Send `packet` once and wait for a matching response
fn exchange<R: NatPmpResponse>(
    gateway_ip: Ipv4Addr,
    packet: &[u8],
    expected_opcode: u8,
    config: &PmapConfig,
) -> Result<R> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
    socket.set_read_timeout(Some(config.natpmp_timeout()))?;

    let server_addr = SocketAddrV4::new(gateway_ip, config.natpmp_port);
    config.dump("NAT-PMP REQUEST", hex::encode(packet));
    socket.send_to(packet, server_addr)?;
    debug!("Sent {} byte NAT-PMP request to {}", packet.len(), server_addr);

    let mut buf = [0u8; MAX_RESPONSE_LEN];

    for attempt in 1..=config.natpmp_attempts {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                debug!("No NAT-PMP response (attempt {}/{})", attempt, config.natpmp_attempts);
                continue;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(MappingError::Socket(e)),
        };

        config.dump("NAT-PMP RESPONSE", hex::encode(&buf[..len]));

        match accept_response::<R>(&buf[..len], from, gateway_ip, expected_opcode) {
            Some(Ok(response)) => return Ok(response),
            Some(Err(e)) => return Err(e),
            None => continue,
        }
    }

    debug!("NAT-PMP gateway {} did not respond", gateway_ip);
    Err(MappingError::NoResponse)
}

/// Correlate a datagram with the outstanding request
///
/// `None` means the datagram is not a reply to this request and is ignored.
pub(crate) fn accept_response<R: NatPmpResponse>(
    datagram: &[u8],
    from: SocketAddr,
    gateway_ip: Ipv4Addr,
    expected_opcode: u8,
) -> Option<Result<R>> {
    if from.ip() != IpAddr::V4(gateway_ip) {
        debug!("Ignoring NAT-PMP datagram from {} (expected {})", from, gateway_ip);
        return None;
    }

    // Error replies may carry only the header and result code
    if datagram.len() < RESULT_PREFIX_LEN {
        debug!("Ignoring short NAT-PMP datagram ({} bytes)", datagram.len());
        return None;
    }

    let header = Header::decode(datagram);
    if header.opcode != expected_opcode {
        debug!(
            "Ignoring NAT-PMP response with opcode {} (expected {})",
            header.opcode, expected_opcode
        );
        return None;
    }

    let code = u16::from_be_bytes([datagram[2], datagram[3]]);
    if code != NatPmpResultCode::Success as u16 {
        let description = describe_result_code(code);
        debug!("NAT-PMP gateway refused request: {} ({})", description, code);
        return Some(Err(MappingError::RemoteError {
            code,
            description: description.to_string(),
        }));
    }

    match R::decode(datagram) {
        Some(response) => Some(Ok(response)),
        None => {
            debug!("Ignoring truncated NAT-PMP success reply ({} bytes)", datagram.len());
            None
        }
    }
}
