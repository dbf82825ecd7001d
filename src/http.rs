//! Minimal HTTP/1.1 exchange over a blocking TCP stream
//!
//! One request per connection: connect with a bounded timeout, write the
//! request, then read until the peer closes or stays silent for the idle
//! window. The stream is dropped (closed) before every return.

use crate::buffer::{ByteBuffer, DEFAULT_CAPACITY};
use crate::config::PmapConfig;
use crate::text::extract_between;
use crate::{MappingError, Result};
use bytes::Bytes;
use std::borrow::Cow;
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP status code for success
pub const HTTP_OK: u16 = 200;

/// Longest status code token accepted from the status line
const STATUS_FIELD_CAPACITY: usize = 16;

/// Response collected from a single exchange
#[derive(Debug, Clone)]
pub struct HttpResponse {
    raw: Bytes,
    status: u16,
}

impl HttpResponse {
    /// Numeric status from the status line, 0 when it could not be parsed
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is exactly 200
    pub fn is_ok(&self) -> bool {
        self.status == HTTP_OK
    }

    /// Raw response bytes, headers included
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Response decoded as text, replacing invalid UTF-8
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }
}

/// Parse the status code from the first line (`HTTP/1.1 <code> ...`)
///
/// The code is the text between the first two spaces.
pub fn parse_status(text: &str) -> Option<u16> {
    extract_between(" ", " ", text, STATUS_FIELD_CAPACITY)
        .ok()
        .and_then(|code| code.trim_end().parse().ok())
}

/// Open a TCP connection, failing with `ConnectTimeout` when it does not
/// complete within `timeout`
pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addr = (host, port)
        .to_socket_addrs()?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| {
            MappingError::Socket(std::io::Error::new(
                ErrorKind::NotFound,
                format!("Host not found: {}", host),
            ))
        })?;

    TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
        if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock {
            debug!("Connection to {} timed out", addr);
            MappingError::ConnectTimeout
        } else {
            debug!("Connection to {} failed: {}", addr, e);
            MappingError::Socket(e)
        }
    })
}

/// Send `request` to `host:port` and collect the response
///
/// Reading stops when the peer closes the connection, when no data arrives
/// within the idle window, or when the response buffer is full. Whatever was
/// read is returned even if the status line is unparsable. An exchange that
/// yields no bytes at all fails with `ReadTimeout`.
pub fn request(
    host: &str,
    port: u16,
    request: &ByteBuffer,
    config: &PmapConfig,
) -> Result<HttpResponse> {
    let mut stream = connect(host, port, config.connect_timeout())?;

    config.dump("REQUEST", String::from_utf8_lossy(request.as_slice()));

    stream.write_all(request.as_slice())?;
    stream.set_read_timeout(Some(config.read_idle_timeout()))?;

    let mut response = ByteBuffer::with_capacity(config.http_response_capacity)?;
    let mut idle_timeout = false;

    loop {
        if response.is_full() {
            warn!(
                "HTTP response from {}:{} truncated at {} bytes",
                host,
                port,
                response.capacity()
            );
            break;
        }

        match response.read_from(&mut stream) {
            Ok(0) => break,
            Ok(n) => debug!("Received {} bytes from {}:{}", n, host, port),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                debug!("No data available from {}:{}", host, port);
                idle_timeout = true;
                break;
            }
            Err(e) => {
                if response.is_empty() {
                    return Err(e.into());
                }
                debug!("Read from {}:{} ended with error: {}", host, port, e);
                break;
            }
        }
    }

    drop(stream);

    if response.is_empty() && idle_timeout {
        return Err(MappingError::ReadTimeout);
    }

    let text = response.to_text();
    config.dump("RESPONSE", &text);
    let status = parse_status(&text).unwrap_or(0);

    Ok(HttpResponse {
        raw: response.freeze(),
        status,
    })
}

/// Start a request: request line and `Host` header
///
/// A leading `/` is added to `path` when it has none.
pub fn build_request(method: &str, host: &str, port: u16, path: &str) -> Result<ByteBuffer> {
    let mut buffer = ByteBuffer::with_capacity(DEFAULT_CAPACITY)?;

    if path.starts_with('/') {
        buffer.append_fmt(format_args!("{} {} HTTP/1.1\r\n", method, path))?;
    } else {
        buffer.append_fmt(format_args!("{} /{} HTTP/1.1\r\n", method, path))?;
    }
    buffer.append_fmt(format_args!("Host: {}:{}\r\n", host, port))?;

    Ok(buffer)
}

/// HTTP GET `path` from `host:port`
pub fn get(host: &str, port: u16, path: &str, config: &PmapConfig) -> Result<HttpResponse> {
    let mut buffer = build_request("GET", host, port, path)?;
    buffer.append_fmt(format_args!("Connection: close\r\n\r\n"))?;

    request(host, port, &buffer, config)
}

/// HTTP POST an XML `body` to `host:port/path`
///
/// `extra_header` must be a complete header line including its CRLF.
pub fn post(
    host: &str,
    port: u16,
    path: &str,
    extra_header: &str,
    body: &ByteBuffer,
    config: &PmapConfig,
) -> Result<HttpResponse> {
    let mut buffer = build_request("POST", host, port, path)?;
    buffer.append_bytes(extra_header.as_bytes())?;
    buffer.append_fmt(format_args!(
        "Content-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.offset()
    ))?;
    buffer.append_buffer(body)?;

    request(host, port, &buffer, config)
}
