//! Request-line URI framing policy.
//!
//! [`PayloadUriOption`] only decides how the target on one request line is
//! written (and which `Host` header accompanies it). Framing is unaffected.

use url::Url;

use crate::error::MalformedPayload;

/// How request targets are written inside a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadUriOption {
    /// `GET http://host:port/service/Customers HTTP/1.1`
    #[default]
    AbsoluteUri,
    /// `GET /service/Customers HTTP/1.1` plus `Host: host:port`.
    AbsoluteUriUsingHostHeader,
    /// `GET Customers HTTP/1.1`, relative to the batch request URI.
    RelativeUri,
}

/// Request target as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestTarget {
    /// Text written between the method and the version.
    pub target: String,
    /// Value of the `Host` header to emit, if the option calls for one.
    pub host: Option<String>,
}

/// Format `uri` for a request line under `option`.
///
/// A relative target that cannot be expressed against `base` (different
/// origin, or no base at all) falls back to the absolute form.
///
/// # Examples
///
/// ```
/// use batchframe::{PayloadUriOption, uri::format_request_target};
/// use url::Url;
///
/// let base = Url::parse("http://host/service/$batch").expect("valid base");
/// let uri = Url::parse("http://host/service/Customers(1)").expect("valid uri");
///
/// let relative = format_request_target(&uri, Some(&base), PayloadUriOption::RelativeUri);
/// assert_eq!(relative.target, "Customers(1)");
///
/// let hosted = format_request_target(&uri, None, PayloadUriOption::AbsoluteUriUsingHostHeader);
/// assert_eq!(hosted.target, "/service/Customers(1)");
/// assert_eq!(hosted.host.as_deref(), Some("host"));
/// ```
#[must_use]
pub fn format_request_target(
    uri: &Url,
    base: Option<&Url>,
    option: PayloadUriOption,
) -> RequestTarget {
    let absolute = || RequestTarget {
        target: uri.as_str().to_owned(),
        host: None,
    };
    match option {
        PayloadUriOption::AbsoluteUri => absolute(),
        PayloadUriOption::AbsoluteUriUsingHostHeader => match authority(uri) {
            Some(host) => RequestTarget {
                target: path_and_query(uri),
                host: Some(host),
            },
            None => absolute(),
        },
        PayloadUriOption::RelativeUri => base
            .filter(|base| base.origin() == uri.origin())
            .and_then(|base| base.make_relative(uri))
            .filter(|relative| !relative.is_empty())
            .map_or_else(absolute, |target| RequestTarget { target, host: None }),
    }
}

/// Resolve a request target read from the wire.
///
/// Absolute targets are taken as they are. An absolute path is combined
/// with the `Host` header when present, otherwise with `base`. Any other
/// relative reference is joined onto `base`. Without enough context the
/// target stays unresolved and `Ok(None)` is returned, except under
/// [`PayloadUriOption::AbsoluteUriUsingHostHeader`], where an absolute path
/// without a `Host` header is malformed.
///
/// # Errors
///
/// Returns [`MalformedPayload::InvalidUri`] when the target does not parse,
/// or [`MalformedPayload::MissingHeader`] for the host-header case above.
pub fn resolve_request_target(
    target: &str,
    host: Option<&str>,
    base: Option<&Url>,
    option: PayloadUriOption,
) -> Result<Option<Url>, MalformedPayload> {
    let invalid = |err: url::ParseError| MalformedPayload::InvalidUri {
        uri: target.to_owned(),
        reason: err.to_string(),
    };

    match Url::parse(target) {
        Ok(uri) => return Ok(Some(uri)),
        Err(url::ParseError::RelativeUrlWithoutBase) => {}
        Err(err) => return Err(invalid(err)),
    }

    if target.starts_with('/') {
        if let Some(host) = host {
            let scheme = base.map_or("http", Url::scheme);
            return Url::parse(&format!("{scheme}://{host}{target}"))
                .map(Some)
                .map_err(invalid);
        }
        if option == PayloadUriOption::AbsoluteUriUsingHostHeader {
            return Err(MalformedPayload::MissingHeader {
                name: crate::headers::HOST,
            });
        }
    }

    base.map(|base| base.join(target).map_err(invalid))
        .transpose()
}

fn authority(uri: &Url) -> Option<String> {
    let host = uri.host_str()?;
    Some(match uri.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    })
}

fn path_and_query(uri: &Url) -> String {
    match uri.query() {
        Some(query) => format!("{}?{query}", uri.path()),
        None => uri.path().to_owned(),
    }
}
