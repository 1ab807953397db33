//! `reqwest`-backed storage-provider transport.

use std::net::Ipv4Addr;

use chrono::Utc;
use gnfd_transfer::TransferError;
use gnfd_types::constants::{
    CONTENT_DEFAULT, DATE_FORMAT, HEADER_AUTHORIZATION, HEADER_CONTENT_SHA256,
    HEADER_CONTENT_TYPE, HEADER_DATE, HEADER_USER_ADDRESS, USER_AGENT,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::error::ClientError;
use crate::signer::{AuthInfo, canonical_request, encode_path, encode_query};
use crate::transport::{HttpMethod, SpRequest, SpResponse, SpTransport, TransportFuture};

/// Where a request goes and what it is signed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub url: String,
    /// Host as sent (and signed), including a non-default port.
    pub host: String,
    /// Encoded path.
    pub path: String,
}

/// Returns `true` if `bucket` should be addressed as `bucket.host`.
///
/// Requires the host to be a domain name (not an IP). HTTPS buckets with
/// dots stay path-style since they would not match a wildcard certificate.
pub fn is_virtual_host_style(scheme: &str, host: &str, bucket: &str) -> bool {
    if bucket.is_empty() || !is_valid_domain(host) {
        return false;
    }
    !(scheme == "https" && bucket.contains('.'))
}

fn is_valid_domain(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 || host.starts_with('[') {
        return false;
    }
    if host.parse::<Ipv4Addr>().is_ok() {
        return false;
    }
    let labels: Vec<&str> = host.trim_end_matches('.').split('.').collect();
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    });
    let tld_ok = labels
        .last()
        .is_some_and(|tld| !tld.bytes().all(|b| b.is_ascii_digit()));
    labels_ok && tld_ok
}

fn parse_endpoint(endpoint: &str) -> Result<reqwest::Url, TransferError> {
    let url = reqwest::Url::parse(endpoint).map_err(|e| {
        TransferError::InvalidConfiguration(format!("invalid endpoint {endpoint:?}: {e}"))
    })?;
    if url.host_str().is_none() {
        return Err(TransferError::InvalidConfiguration(format!(
            "endpoint {endpoint:?} has no host"
        )));
    }
    Ok(url)
}

/// Adds a scheme to a registered endpoint and drops default ports.
pub fn normalize_endpoint(endpoint: &str, secure: bool) -> Result<String, TransferError> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else if secure {
        format!("https://{endpoint}")
    } else {
        format!("http://{endpoint}")
    };
    let url = parse_endpoint(&with_scheme)?;
    let host = url.host_str().unwrap_or_default();
    Ok(match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    })
}

/// Builds the URL for a bucket/object request.
pub fn request_target(
    endpoint: &str,
    bucket: &str,
    object: &str,
    query: &[(String, String)],
) -> Result<RequestTarget, TransferError> {
    let url = parse_endpoint(endpoint)?;
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or_default();
    // `port()` is `None` for the scheme's default port.
    let host_port = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let (host, path) = if bucket.is_empty() {
        (host_port, "/".to_string())
    } else if is_virtual_host_style(scheme, host, bucket) {
        (format!("{bucket}.{host_port}"), format!("/{}", encode_path(object)))
    } else {
        (host_port, format!("/{bucket}/{}", encode_path(object)))
    };

    let query = encode_query(query);
    let url = if query.is_empty() {
        format!("{scheme}://{host}{path}")
    } else {
        format!("{scheme}://{host}{path}?{query}")
    };
    Ok(RequestTarget { url, host, path })
}

/// Sends signed requests over HTTP(S).
pub struct HttpTransport {
    http: reqwest::Client,
    auth: AuthInfo,
    user_address: Option<String>,
}

impl HttpTransport {
    pub fn new(auth: AuthInfo) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            auth,
            user_address: None,
        })
    }

    /// Sends `X-Gnfd-User-Address` with every request.
    pub fn with_user_address(mut self, address: &str) -> Self {
        self.user_address = Some(address.to_string());
        self
    }

    async fn execute(&self, request: SpRequest) -> Result<SpResponse, TransferError> {
        let SpRequest {
            method,
            endpoint,
            bucket,
            object,
            query,
            mut headers,
            body,
        } = request;
        let target = request_target(&endpoint, &bucket, &object, &query)?;

        headers
            .entry(HEADER_CONTENT_TYPE.to_string())
            .or_insert_with(|| CONTENT_DEFAULT.to_string());
        if !body.is_empty() {
            headers
                .entry(HEADER_CONTENT_SHA256.to_string())
                .or_insert_with(|| hex::encode(Sha256::digest(&body)));
        }
        if let Some(address) = &self.user_address {
            headers.insert(HEADER_USER_ADDRESS.to_string(), address.clone());
        }
        headers.insert(
            HEADER_DATE.to_string(),
            Utc::now().format(DATE_FORMAT).to_string(),
        );

        let canonical =
            canonical_request(method.as_str(), &target.path, &query, &headers, &target.host);
        if let Some(auth) = self.auth.authorization(&canonical)? {
            headers.insert(HEADER_AUTHORIZATION.to_string(), auth);
        }

        let mut header_map = HeaderMap::with_capacity(headers.len());
        for (name, value) in &headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransferError::InvalidConfiguration(format!("bad header name {name:?}: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                TransferError::InvalidConfiguration(format!("bad header value for {name}: {e}"))
            })?;
            header_map.insert(name, value);
        }

        let method = match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Head => reqwest::Method::HEAD,
        };
        trace!(method = %method, url = %target.url, "sending provider request");

        let resp = self
            .http
            .request(method, &target.url)
            .headers(header_map)
            .body(body)
            .send()
            .await
            .map_err(|e| TransferError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransferError::Network(e.to_string()))?
            .to_vec();

        debug!(status, url = %target.url, bytes = body.len(), "provider response");
        Ok(SpResponse {
            status,
            headers,
            body,
        })
    }
}

impl SpTransport for HttpTransport {
    fn send(&self, request: SpRequest) -> TransportFuture<'_> {
        Box::pin(self.execute(request))
    }
}
