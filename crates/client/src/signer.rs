//! Request canonicalization and the `Authorization` header.
//!
//! The canonical request is built S3-style without a payload hash:
//!
//! ```text
//! METHOD
//! /encoded/path
//! sorted=query&string
//! lowercase-name:value        (one line per signed header, sorted)
//! host                        (appended when no host header is signed)
//!
//! signed;header;names
//! ```
//!
//! The signed message is Keccak-256 over the SHA-256 of that string. Key
//! management and the signature algorithm itself belong to the caller's
//! [`RequestSigner`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use gnfd_transfer::TransferError;
use gnfd_types::constants::{AUTH_V1, AUTH_V2, SIGN_ALGORITHM};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// Unreserved characters plus `/`.
const PATH_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Headers never covered by the signature.
const UNSIGNED_HEADERS: &[&str] = &[
    "authorization",
    "user-agent",
    "accept-encoding",
    "content-length",
];

/// Signs request digests with the account key.
pub trait RequestSigner: Send + Sync {
    /// Signs a 32-byte digest and returns the raw signature bytes.
    fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>, TransferError>;
}

/// How requests are authorized.
#[derive(Clone)]
pub enum AuthInfo {
    /// Sign every request with the account key.
    V1(Arc<dyn RequestSigner>),
    /// Attach a pre-computed wallet signature.
    V2 { wallet_signature: String },
    /// Send requests unsigned (public objects, tests).
    Anonymous,
}

impl fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1(_) => f.write_str("AuthInfo::V1(..)"),
            Self::V2 { .. } => f.write_str("AuthInfo::V2 { .. }"),
            Self::Anonymous => f.write_str("AuthInfo::Anonymous"),
        }
    }
}

impl AuthInfo {
    /// Builds the `Authorization` header value for a canonical request.
    pub fn authorization(&self, canonical: &str) -> Result<Option<String>, TransferError> {
        match self {
            Self::V1(signer) => {
                let digest = message_to_sign(canonical);
                let signature = signer.sign(&digest)?;
                Ok(Some(format!(
                    "{AUTH_V1} {SIGN_ALGORITHM}, SignedMsg={}, Signature={}",
                    hex::encode(digest),
                    hex::encode(signature)
                )))
            }
            Self::V2 { wallet_signature } => {
                if wallet_signature.is_empty() {
                    return Err(TransferError::InvalidConfiguration(
                        "wallet signature must be set for auth v2".into(),
                    ));
                }
                Ok(Some(format!(
                    "{AUTH_V2} {SIGN_ALGORITHM}, Signature={wallet_signature}"
                )))
            }
            Self::Anonymous => Ok(None),
        }
    }
}

/// Percent-encodes a URL path, keeping `/` separators.
pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ENCODE).to_string()
}

/// Encodes query pairs sorted by key (then value), spaces as `%20`.
pub fn encode_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<&(String, String)> = query.iter().collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, QUERY_ENCODE),
                utf8_percent_encode(v, QUERY_ENCODE)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Builds the canonical request string.
///
/// `path` must already be encoded; `headers` may use any case.
pub fn canonical_request(
    method: &str,
    path: &str,
    query: &[(String, String)],
    headers: &BTreeMap<String, String>,
    host: &str,
) -> String {
    let mut signed: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .filter(|(k, _)| !UNSIGNED_HEADERS.contains(&k.as_str()))
        .collect();
    signed.sort();

    let mut block = String::new();
    let mut has_host = false;
    for (name, value) in &signed {
        block.push_str(name);
        block.push(':');
        if name == "host" {
            has_host = true;
            block.push_str(host);
        } else {
            block.push_str(&value.split_whitespace().collect::<Vec<_>>().join(" "));
        }
        block.push('\n');
    }
    if !has_host {
        block.push_str(host);
        block.push('\n');
    }

    let names: Vec<&str> = signed.iter().map(|(k, _)| k.as_str()).collect();
    let query = encode_query(query);
    let signed_names = names.join(";");
    let parts: [&str; 5] = [method, path, &query, &block, &signed_names];
    parts.join("\n")
}

/// Keccak-256 of the canonical request's SHA-256.
pub fn message_to_sign(canonical: &str) -> [u8; 32] {
    let sha = Sha256::digest(canonical.as_bytes());
    Keccak256::digest(sha).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns the digest reversed, so tests can check what was signed.
    struct ReverseSigner;

    impl RequestSigner for ReverseSigner {
        fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>, TransferError> {
            Ok(digest.iter().rev().copied().collect())
        }
    }

    fn headers() -> BTreeMap<String, String> {
        let mut h = BTreeMap::new();
        h.insert("X-Gnfd-Date".into(), "2024-01-02T03:04:05Z".into());
        h.insert("Content-Type".into(), "application/octet-stream".into());
        h.insert("User-Agent".into(), "gnfd-transfer/0.1.0".into());
        h.insert("X-Gnfd-Content-Sha256".into(), "  abc   def ".into());
        h
    }

    #[test]
    fn path_encoding_keeps_slashes() {
        assert_eq!(encode_path("dir/a b+c.txt"), "dir/a%20b%2Bc.txt");
        assert_eq!(encode_path("ok-_.~"), "ok-_.~");
    }

    #[test]
    fn query_is_sorted_and_space_safe() {
        let q = vec![
            ("offset".to_string(), "0".to_string()),
            ("complete".to_string(), "true".to_string()),
            ("x".to_string(), "a b".to_string()),
        ];
        assert_eq!(encode_query(&q), "complete=true&offset=0&x=a%20b");
    }

    #[test]
    fn canonical_request_layout() {
        let q = vec![("offset".to_string(), "0".to_string())];
        let canonical = canonical_request("PUT", "/bucket/obj", &q, &headers(), "sp.example.com");
        let expected = "PUT\n/bucket/obj\noffset=0\n\
            content-type:application/octet-stream\n\
            x-gnfd-content-sha256:abc def\n\
            x-gnfd-date:2024-01-02T03:04:05Z\n\
            sp.example.com\n\n\
            content-type;x-gnfd-content-sha256;x-gnfd-date";
        assert_eq!(canonical, expected);
    }

    #[test]
    fn explicit_host_header_is_signed() {
        let mut h = BTreeMap::new();
        h.insert("Host".to_string(), "ignored".to_string());
        let canonical = canonical_request("GET", "/", &[], &h, "bucket.sp.io");
        assert!(canonical.contains("host:bucket.sp.io\n"));
        assert!(canonical.ends_with("\nhost"));
    }

    #[test]
    fn signed_message_is_keccak_over_sha256() {
        assert_eq!(
            hex::encode(message_to_sign("")),
            "a332df1e58a99d8dcb0767dab2d23985ef337d59fadbe040f56e1c642b314973"
        );
        assert_eq!(
            hex::encode(message_to_sign("GET\n/\n\nhost\n\nhost")),
            "f9646b4b0c116ed321bcb5517bbb7bc8355a973b274d60012d18096de6d95fc4"
        );
    }

    #[test]
    fn v1_authorization_header() {
        let canonical = canonical_request("GET", "/b/o", &[], &headers(), "sp");
        let digest = message_to_sign(&canonical);
        let auth = AuthInfo::V1(Arc::new(ReverseSigner))
            .authorization(&canonical)
            .unwrap()
            .unwrap();
        let reversed: Vec<u8> = digest.iter().rev().copied().collect();
        assert_eq!(
            auth,
            format!(
                "authTypeV1 ECDSA-secp256k1, SignedMsg={}, Signature={}",
                hex::encode(digest),
                hex::encode(reversed)
            )
        );
    }

    #[test]
    fn v2_requires_signature() {
        let empty = AuthInfo::V2 {
            wallet_signature: String::new(),
        };
        assert!(empty.authorization("x").is_err());
        let v2 = AuthInfo::V2 {
            wallet_signature: "0xsig".into(),
        };
        assert_eq!(
            v2.authorization("x").unwrap().unwrap(),
            "authTypeV2 ECDSA-secp256k1, Signature=0xsig"
        );
        assert!(AuthInfo::Anonymous.authorization("x").unwrap().is_none());
    }

    #[test]
    fn signature_changes_with_headers() {
        let a = canonical_request("GET", "/b/o", &[], &headers(), "sp");
        let mut h = headers();
        h.insert("X-Gnfd-Date".into(), "2024-01-02T03:04:06Z".into());
        let b = canonical_request("GET", "/b/o", &[], &h, "sp");
        assert_ne!(message_to_sign(&a), message_to_sign(&b));
    }
}
