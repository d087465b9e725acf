//! Part header blocks.
//!
//! Each batch part carries a MIME header block, and each `application/http`
//! part embeds a second block belonging to the HTTP message it wraps. Both
//! are decoded with the configured [`HeaderEncoding`] and stored in wire
//! order.

use crate::{encoding::HeaderEncoding, error::MalformedPayload};

/// `Content-Type` header name.
pub const CONTENT_TYPE: &str = "Content-Type";
/// `Content-Length` header name.
pub const CONTENT_LENGTH: &str = "Content-Length";
/// `Content-ID` header name.
pub const CONTENT_ID: &str = "Content-ID";
/// `Content-Transfer-Encoding` header name.
pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
/// `Host` header name.
pub const HOST: &str = "Host";

/// Media type of a part wrapping one HTTP message.
pub const APPLICATION_HTTP: &str = "application/http";
/// Media type of a change-set envelope.
pub const MULTIPART_MIXED: &str = "multipart/mixed";

/// Ordered header list with case-insensitive lookup.
///
/// # Examples
///
/// ```
/// use batchframe::PartHeaders;
///
/// let mut headers = PartHeaders::new();
/// headers.append("Content-Type", "application/http");
/// assert_eq!(headers.get("content-type"), Some("application/http"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartHeaders {
    entries: Vec<(String, String)>,
}

impl PartHeaders {
    /// Create an empty header list.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append a header, keeping any existing entries with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether a header named `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool { self.get(name).is_some() }

    /// Iterate over `(name, value)` pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of header entries.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Returns true if no headers are present.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// The `Content-Type` value, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> { self.get(CONTENT_TYPE) }

    /// The `Content-ID` value, if any.
    #[must_use]
    pub fn content_id(&self) -> Option<&str> { self.get(CONTENT_ID) }

    /// Parsed `Content-Length`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload::InvalidContentLength`] when the value is
    /// not a non-negative integer.
    pub fn content_length(&self) -> Result<Option<u64>, MalformedPayload> {
        self.get(CONTENT_LENGTH)
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| MalformedPayload::InvalidContentLength {
                        value: value.to_owned(),
                    })
            })
            .transpose()
    }
}

impl<K, V> FromIterator<(K, V)> for PartHeaders
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// Media type portion of a `Content-Type` value, without parameters.
///
/// # Examples
///
/// ```
/// use batchframe::headers::media_type;
///
/// assert_eq!(media_type("multipart/mixed; boundary=cs_1"), "multipart/mixed");
/// ```
#[must_use]
pub fn media_type(content_type: &str) -> &str {
    content_type
        .split_once(';')
        .map_or(content_type, |(media, _)| media)
        .trim()
}

/// `boundary` parameter of a `Content-Type` value, with quotes removed.
///
/// # Examples
///
/// ```
/// use batchframe::headers::boundary_parameter;
///
/// assert_eq!(
///     boundary_parameter("multipart/mixed; boundary=\"cs_1\"").as_deref(),
///     Some("cs_1")
/// );
/// assert_eq!(boundary_parameter("application/http"), None);
/// ```
#[must_use]
pub fn boundary_parameter(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|parameter| {
        let (name, value) = parameter.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_owned())
    })
}

/// Decode a raw header block and split it into lines.
///
/// The block is expected to end with the empty line that terminated it;
/// that line and every line terminator are dropped.
pub(crate) fn decode_lines(
    block: &[u8],
    encoding: HeaderEncoding,
) -> Result<Vec<String>, MalformedPayload> {
    let text = encoding.decode(block)?;
    Ok(text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Parse `name: value` lines into a header list.
pub(crate) fn parse_header_lines<I, S>(lines: I) -> Result<PartHeaders, MalformedPayload>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|line| {
            let line = line.as_ref();
            match line.split_once(':') {
                Some((name, value)) if is_token(name) => {
                    Ok((name.to_owned(), value.trim().to_owned()))
                }
                _ => Err(MalformedPayload::InvalidHeader {
                    line: line.to_owned(),
                }),
            }
        })
        .collect()
}

fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !matches!(b, b':' | b'(' | b')' | b'"' | b'/'))
}
