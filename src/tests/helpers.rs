//! Simulated gateways on loopback shared by the network tests

use crate::config::PmapConfig;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const LOOPBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Address decoy responders send from
pub const DECOY_ADDR: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 2);

pub const IGD_DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
<specVersion><major>1</major><minor>0</minor></specVersion>
<device>
<deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
<friendlyName>Test Router</friendlyName>
<serviceList>
<service>
<serviceType>urn:schemas-upnp-org:service:Layer3Forwarding:1</serviceType>
<serviceId>urn:upnp-org:serviceId:L3Forwarding1</serviceId>
<controlURL>/ctl/L3F</controlURL>
</service>
</serviceList>
<deviceList>
<device>
<deviceType>urn:schemas-upnp-org:device:WANDevice:1</deviceType>
<deviceList>
<device>
<deviceType>urn:schemas-upnp-org:device:WANConnectionDevice:1</deviceType>
<serviceList>
<service>
<serviceType>urn:schemas-upnp-org:service:WANIPConnection:1</serviceType>
<serviceId>urn:upnp-org:serviceId:WANIPConn1</serviceId>
<controlURL>/upnp/control/WANIPConn1</controlURL>
<eventSubURL>/upnp/event/WANIPConn1</eventSubURL>
</service>
</serviceList>
</device>
</deviceList>
</device>
</deviceList>
</device>
</root>
"#;

pub const MEDIA_SERVER_DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
<device>
<deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
<friendlyName>Living Room</friendlyName>
</device>
</root>
"#;

/// Configuration with short timeouts for loopback tests
pub fn test_config() -> PmapConfig {
    PmapConfig {
        discovery_timeout_ms: 300,
        connect_timeout_ms: 1000,
        read_idle_timeout_ms: 500,
        natpmp_timeout_ms: 200,
        ..PmapConfig::default()
    }
}

/// SOAP fault body as gateways send it on refusal
pub fn soap_fault(code: u16, description: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\r\n\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\">\
         <s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring>\
         <detail><UPnPError xmlns=\"urn:schemas-upnp-org:control-1-0\">\
         <errorCode>{}</errorCode><errorDescription>{}</errorDescription>\
         </UPnPError></detail></s:Fault></s:Body></s:Envelope>\r\n",
        code, description
    )
}

/// SSDP search response pointing at `location`
pub fn ssdp_response(location: &str, usn: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age=120\r\n\
         ST: upnp:rootdevice\r\n\
         USN: {}::upnp:rootdevice\r\n\
         EXT:\r\n\
         SERVER: Test/1.0 UPnP/1.1 Router/1.0\r\n\
         LOCATION: {}\r\n\
         \r\n",
        usn, location
    )
}

/// HTTP device answering `connections` requests, one per connection
///
/// `handler` receives the raw request and returns the status and body. The
/// thread yields the requests it served.
pub fn spawn_http_device<F>(connections: usize, handler: F) -> (u16, JoinHandle<Vec<String>>)
where
    F: Fn(&str) -> (u16, String) + Send + 'static,
{
    let listener = TcpListener::bind((LOOPBACK, 0)).expect("bind http device");
    let port = listener.local_addr().expect("local addr").port();

    let handle = thread::spawn(move || {
        let mut requests = Vec::new();

        for stream in listener.incoming().take(connections) {
            let mut stream = stream.expect("accept");
            stream
                .set_read_timeout(Some(Duration::from_secs(2)))
                .expect("read timeout");

            let request = read_http_request(&mut stream);
            let (status, body) = handler(&request);
            let reason = if status == 200 { "OK" } else { "Internal Server Error" };

            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                reason,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).expect("write response");
            requests.push(request);
        }

        requests
    });

    (port, handle)
}

/// TCP peer that writes `payload` (possibly nothing) and holds the
/// connection open for `hold` without closing it
pub fn spawn_silent_peer(payload: &'static [u8], hold: Duration) -> u16 {
    let listener = TcpListener::bind((LOOPBACK, 0)).expect("bind silent peer");
    let port = listener.local_addr().expect("local addr").port();

    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let _ = stream.write_all(payload);
            thread::sleep(hold);
        }
    });

    port
}

fn read_http_request(stream: &mut impl Read) -> String {
    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        data.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&data);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);

            if data.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&data).into_owned()
}

/// SSDP responder answering the first M-SEARCH with `responses`
///
/// The thread yields the search datagram it received.
pub fn spawn_ssdp_responder(responses: Vec<String>) -> (SocketAddrV4, JoinHandle<String>) {
    let socket = UdpSocket::bind((LOOPBACK, 0)).expect("bind ssdp responder");
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    let port = socket.local_addr().expect("local addr").port();

    let handle = thread::spawn(move || {
        let mut buf = [0u8; 2048];
        let (len, client) = socket.recv_from(&mut buf).expect("m-search");

        for response in &responses {
            socket.send_to(response.as_bytes(), client).expect("ssdp reply");
        }

        String::from_utf8_lossy(&buf[..len]).into_owned()
    });

    (SocketAddrV4::new(LOOPBACK, port), handle)
}

/// NAT-PMP gateway on loopback
///
/// On receiving a request it first sends `decoy` (if any) from
/// `DECOY_ADDR`, then whatever `reply` builds from the request. The thread
/// yields the request bytes.
pub fn spawn_natpmp_gateway<F>(decoy: Option<Vec<u8>>, reply: F) -> (u16, JoinHandle<Vec<u8>>)
where
    F: Fn(&[u8]) -> Option<Vec<u8>> + Send + 'static,
{
    let socket = UdpSocket::bind((LOOPBACK, 0)).expect("bind natpmp gateway");
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    let port = socket.local_addr().expect("local addr").port();

    let handle = thread::spawn(move || {
        let mut buf = [0u8; 64];
        let (len, client) = socket.recv_from(&mut buf).expect("natpmp request");
        let request = buf[..len].to_vec();

        if let Some(decoy) = decoy {
            let spoofer = UdpSocket::bind((DECOY_ADDR, 0)).expect("bind decoy");
            spoofer.send_to(&decoy, client).expect("decoy reply");
        }

        if let Some(response) = reply(&request) {
            thread::sleep(Duration::from_millis(20));
            socket.send_to(&response, client).expect("natpmp reply");
        }

        request
    });

    (port, handle)
}

/// MAP response bytes
pub fn map_response(
    opcode: u8,
    result_code: u16,
    internal_port: u16,
    external_port: u16,
    lifetime_secs: u32,
) -> Vec<u8> {
    let mut response = Vec::with_capacity(16);
    response.push(0);
    response.push(opcode);
    response.extend_from_slice(&result_code.to_be_bytes());
    response.extend_from_slice(&86_400u32.to_be_bytes());
    response.extend_from_slice(&internal_port.to_be_bytes());
    response.extend_from_slice(&external_port.to_be_bytes());
    response.extend_from_slice(&lifetime_secs.to_be_bytes());
    response
}

/// External address response bytes
pub fn external_ip_response(result_code: u16, external_ip: Ipv4Addr) -> Vec<u8> {
    let mut response = Vec::with_capacity(12);
    response.push(0);
    response.push(128);
    response.extend_from_slice(&result_code.to_be_bytes());
    response.extend_from_slice(&86_400u32.to_be_bytes());
    response.extend_from_slice(&external_ip.octets());
    response
}
