//! Storage-provider request/response seam.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use gnfd_transfer::TransferError;
use gnfd_types::constants::INTEGRITY_ERROR_CODES;

/// HTTP methods used against storage providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Head => "HEAD",
        }
    }
}

/// A request addressed to one storage provider.
///
/// The transport turns this into a URL (path or virtual-host style), adds
/// date, user agent and authorization, and sends it.
#[derive(Debug, Clone)]
pub struct SpRequest {
    pub method: HttpMethod,
    /// Provider endpoint with scheme, e.g. `https://sp0.example.com`.
    pub endpoint: String,
    pub bucket: String,
    pub object: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl SpRequest {
    pub fn new(method: HttpMethod, endpoint: &str, bucket: &str, object: &str) -> Self {
        Self {
            method,
            endpoint: endpoint.to_string(),
            bucket: bucket.to_string(),
            object: object.to_string(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: impl ToString) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Looks up a header by name, ignoring ASCII case.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A provider response.
#[derive(Debug, Clone, Default)]
pub struct SpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl SpResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body,
        }
    }

    /// A provider error response with an XML body.
    pub fn error(status: u16, code: &str, message: &str) -> Self {
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{code}</Code><Message>{message}</Message></Error>"
        );
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Boxed future returned by [`SpTransport::send`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<SpResponse, TransferError>> + Send + 'a>>;

/// Sends requests to storage providers.
///
/// Connection failures map to [`TransferError::Network`]. Non-2xx responses
/// are returned as-is; [`check_response`] classifies them.
pub trait SpTransport: Send + Sync {
    fn send(&self, request: SpRequest) -> TransportFuture<'_>;
}

/// Converts a non-2xx response into a [`TransferError`].
///
/// Hash-related error codes become [`TransferError::IntegrityMismatch`],
/// everything else [`TransferError::Provider`].
pub fn check_response(resp: SpResponse, segment: u64) -> Result<SpResponse, TransferError> {
    if resp.is_success() {
        return Ok(resp);
    }
    let body = String::from_utf8_lossy(&resp.body);
    let error = child_element(&body, "Error");
    let code = error
        .and_then(|e| child_text(e, "Code"))
        .unwrap_or_else(|| status_code_name(resp.status).into());
    let message = error
        .and_then(|e| child_text(e, "Message"))
        .unwrap_or_default();

    if INTEGRITY_ERROR_CODES.contains(&code.as_str()) {
        return Err(TransferError::IntegrityMismatch {
            segment,
            detail: format!("{code}: {message}"),
        });
    }
    Err(TransferError::Provider {
        status: resp.status,
        code,
        message,
    })
}

/// Inner markup of the first direct child element named `tag`.
///
/// Declarations, comments and self-closing elements are skipped, and other
/// children are stepped over whole, so a nested `<tag>` never matches.
fn child_element<'b>(parent: &'b str, tag: &str) -> Option<&'b str> {
    let mut rest = parent;
    loop {
        let open = rest.find('<')?;
        rest = &rest[open + 1..];
        let end = rest.find('>')?;
        let head = &rest[..end];
        rest = &rest[end + 1..];
        if head.starts_with(['/', '?', '!']) || head.ends_with('/') {
            continue;
        }
        let name = head.split_whitespace().next()?;
        let close = format!("</{name}>");
        let inner_len = rest.find(&close)?;
        if name == tag {
            return Some(&rest[..inner_len]);
        }
        rest = &rest[inner_len + close.len()..];
    }
}

fn child_text(parent: &str, tag: &str) -> Option<String> {
    child_element(parent, tag).map(|text| unescape(text.trim()))
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn status_code_name(status: u16) -> &'static str {
    match status {
        400 => "BadRequest",
        401 => "Unauthorized",
        403 => "AccessDenied",
        404 => "NoSuchKey",
        408 => "RequestTimeout",
        429 => "TooManyRequests",
        500..=599 => "InternalError",
        _ => "Unknown",
    }
}
