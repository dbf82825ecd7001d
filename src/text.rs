//! Marker-delimited text extraction
//!
//! The engine never parses XML or HTTP properly. It pulls single values out of
//! device descriptions, SOAP responses and status lines by locating a start
//! marker and the first end marker after it. This holds up only because the
//! documents gateways serve are well-formed and the markers are unique enough
//! in practice; nested or repeated elements, namespace prefixes and attributes
//! all defeat it. Callers go through [`extract_element`] so a real XML parser
//! can replace the scan without touching them.

use thiserror::Error;

/// Errors raised by text extraction
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// A marker is missing, or the end marker does not follow the start marker
    #[error("Marker not found")]
    NotFound,

    /// The extracted value does not fit the caller's capacity
    #[error("Extracted value too long: {len} bytes (max {max})")]
    TooLong {
        /// Length of the extracted value
        len: usize,
        /// Capacity the caller allowed
        max: usize,
    },
}

/// Extract the text strictly between `start_marker` and the first
/// `end_marker` that follows it
///
/// Leading whitespace of the value is trimmed; trailing whitespace is kept.
/// Fails with [`ExtractError::TooLong`] when the value exceeds `max_len` bytes.
///
/// ```
/// use pmap::text::extract_between;
///
/// let value = extract_between("<a>", "</a>", "x<a> hi</a>y", 16).unwrap();
/// assert_eq!(value, "hi");
/// ```
pub fn extract_between<'a>(
    start_marker: &str,
    end_marker: &str,
    text: &'a str,
    max_len: usize,
) -> Result<&'a str, ExtractError> {
    let start = text.find(start_marker).ok_or(ExtractError::NotFound)? + start_marker.len();
    let end = text[start..]
        .find(end_marker)
        .map(|offset| start + offset)
        .ok_or(ExtractError::NotFound)?;

    let value = text[start..end].trim_start();
    if value.len() > max_len {
        return Err(ExtractError::TooLong {
            len: value.len(),
            max: max_len,
        });
    }

    Ok(value)
}

/// Extract the content of the first `<tag>...</tag>` element in `text`
pub fn extract_element<'a>(tag: &str, text: &'a str, max_len: usize) -> Result<&'a str, ExtractError> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    extract_between(&open, &close, text, max_len)
}
