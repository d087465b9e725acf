//! Descriptors for the HTTP messages carried by batch operations.
//!
//! The reader surfaces an [`OperationMessage`] for every `Operation` state;
//! the writer accepts [`OperationRequest`] and [`OperationResponse`] values
//! describing what to frame.

use std::{fmt, str::FromStr};

use url::Url;

use crate::{error::MalformedPayload, headers::PartHeaders};

/// HTTP version written on request and status lines.
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// Whether a batch carries requests or responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessageKind {
    /// Parts start with a request line.
    #[default]
    Request,
    /// Parts start with a status line.
    Response,
}

/// `METHOD target VERSION` line of an embedded request.
///
/// # Examples
///
/// ```
/// use batchframe::RequestLine;
///
/// let line: RequestLine = "GET /Customers(1) HTTP/1.1".parse().expect("valid request line");
/// assert_eq!(line.method(), "GET");
/// assert_eq!(line.target(), "/Customers(1)");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestLine {
    method: String,
    target: String,
    version: String,
}

impl RequestLine {
    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &str { &self.method }

    /// Request target exactly as framed on the wire.
    #[must_use]
    pub fn target(&self) -> &str { &self.target }

    /// Protocol version.
    #[must_use]
    pub fn version(&self) -> &str { &self.version }
}

impl FromStr for RequestLine {
    type Err = MalformedPayload;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let invalid = || MalformedPayload::InvalidRequestLine {
            line: line.to_owned(),
        };
        let mut fields = line.split(' ').filter(|field| !field.is_empty());
        let (Some(method), Some(target), Some(version), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(invalid());
        };
        if !version.starts_with("HTTP/") || !method.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(invalid());
        }
        Ok(Self {
            method: method.to_owned(),
            target: target.to_owned(),
            version: version.to_owned(),
        })
    }
}

impl fmt::Display for RequestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.target)
    }
}

/// `VERSION status reason` line of an embedded response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusLine {
    version: String,
    status: u16,
    reason: String,
}

impl StatusLine {
    /// Protocol version.
    #[must_use]
    pub fn version(&self) -> &str { &self.version }

    /// Numeric status code.
    #[must_use]
    pub fn status(&self) -> u16 { self.status }

    /// Reason phrase, possibly empty.
    #[must_use]
    pub fn reason(&self) -> &str { &self.reason }
}

impl FromStr for StatusLine {
    type Err = MalformedPayload;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let invalid = || MalformedPayload::InvalidStatusLine {
            line: line.to_owned(),
        };
        let (version, rest) = line.split_once(' ').ok_or_else(invalid)?;
        let (code, reason) = rest.split_once(' ').unwrap_or((rest, ""));
        if !version.starts_with("HTTP/") || code.len() != 3 {
            return Err(invalid());
        }
        let status = code.parse::<u16>().map_err(|_| invalid())?;
        if !(100..=599).contains(&status) {
            return Err(invalid());
        }
        Ok(Self {
            version: version.to_owned(),
            status,
            reason: reason.trim().to_owned(),
        })
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.status)
        } else {
            write!(f, "{} {}", self.status, self.reason)
        }
    }
}

/// First line of an embedded message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageHead {
    /// A request line.
    Request(RequestLine),
    /// A status line.
    Response(StatusLine),
}

impl fmt::Display for MessageHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(line) => line.fmt(f),
            Self::Response(line) => line.fmt(f),
        }
    }
}

/// How an operation body is delimited on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyFraming {
    /// Body runs until the next boundary delimiter.
    Delimited,
    /// Body has exactly this many bytes, taken from `Content-Length`.
    Length(u64),
}

/// Parsed metadata of the operation the reader is positioned on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationMessage {
    pub(crate) part_headers: PartHeaders,
    pub(crate) head: MessageHead,
    pub(crate) headers: PartHeaders,
    pub(crate) uri: Option<Url>,
    pub(crate) content_id: Option<String>,
    pub(crate) changeset: Option<String>,
    pub(crate) framing: BodyFraming,
}

impl OperationMessage {
    /// MIME headers of the batch part.
    #[must_use]
    pub fn part_headers(&self) -> &PartHeaders { &self.part_headers }

    /// Request or status line.
    #[must_use]
    pub fn head(&self) -> &MessageHead { &self.head }

    /// Request line, for request batches.
    #[must_use]
    pub fn request(&self) -> Option<&RequestLine> {
        match &self.head {
            MessageHead::Request(line) => Some(line),
            MessageHead::Response(_) => None,
        }
    }

    /// Status line, for response batches.
    #[must_use]
    pub fn response(&self) -> Option<&StatusLine> {
        match &self.head {
            MessageHead::Response(line) => Some(line),
            MessageHead::Request(_) => None,
        }
    }

    /// Headers of the embedded HTTP message.
    #[must_use]
    pub fn headers(&self) -> &PartHeaders { &self.headers }

    /// Resolved request URI, when the target could be resolved.
    #[must_use]
    pub fn uri(&self) -> Option<&Url> { self.uri.as_ref() }

    /// `Content-ID` of the operation.
    #[must_use]
    pub fn content_id(&self) -> Option<&str> { self.content_id.as_deref() }

    /// Boundary of the enclosing change set, if any.
    #[must_use]
    pub fn changeset(&self) -> Option<&str> { self.changeset.as_deref() }

    /// Framing of the body.
    #[must_use]
    pub fn framing(&self) -> BodyFraming { self.framing }
}

impl fmt::Display for OperationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.head.fmt(f) }
}

/// Request to be framed by the writer.
///
/// # Examples
///
/// ```
/// use batchframe::OperationRequest;
/// use url::Url;
///
/// let uri = Url::parse("http://host/service/Customers(1)").expect("valid url");
/// let request = OperationRequest::new("GET", uri)
///     .header("Accept", "application/json")
///     .content_id("1");
/// assert_eq!(request.method(), "GET");
/// ```
#[derive(Clone, Debug)]
pub struct OperationRequest {
    pub(crate) method: String,
    pub(crate) uri: Url,
    pub(crate) headers: PartHeaders,
    pub(crate) content_id: Option<String>,
}

impl OperationRequest {
    /// Describe a request for `method` on the absolute `uri`.
    #[must_use]
    pub fn new(method: impl Into<String>, uri: Url) -> Self {
        Self {
            method: method.into(),
            uri,
            headers: PartHeaders::new(),
            content_id: None,
        }
    }

    /// Add a header to the embedded request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the part's `Content-ID`.
    #[must_use]
    pub fn content_id(mut self, id: impl Into<String>) -> Self {
        self.content_id = Some(id.into());
        self
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &str { &self.method }

    /// Absolute request URI.
    #[must_use]
    pub fn uri(&self) -> &Url { &self.uri }
}

/// Response to be framed by the writer.
#[derive(Clone, Debug)]
pub struct OperationResponse {
    pub(crate) status: u16,
    pub(crate) reason: String,
    pub(crate) headers: PartHeaders,
    pub(crate) content_id: Option<String>,
}

impl OperationResponse {
    /// Describe a response with `status` and an empty reason phrase.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: String::new(),
            headers: PartHeaders::new(),
            content_id: None,
        }
    }

    /// Set the reason phrase.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Add a header to the embedded response.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the part's `Content-ID`.
    #[must_use]
    pub fn content_id(mut self, id: impl Into<String>) -> Self {
        self.content_id = Some(id.into());
        self
    }

    /// Numeric status code.
    #[must_use]
    pub fn status(&self) -> u16 { self.status }
}
