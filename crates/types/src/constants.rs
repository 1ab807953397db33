use std::time::Duration;

/// Default segment (part) size: 16 MiB.
pub const DEFAULT_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Default number of erasure-coded data shards per segment.
pub const DEFAULT_DATA_SHARDS: usize = 4;

/// Default number of erasure-coded parity shards per segment.
pub const DEFAULT_PARITY_SHARDS: usize = 2;

/// Default number of segments in flight per transfer.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Default attempt limit per segment (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Timeout for a single segment request.
///
/// Covers a full 16 MiB segment over a slow link. Expiry is retried like
/// any transient failure.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// User agent sent with every storage-provider request.
pub const USER_AGENT: &str = concat!("gnfd-transfer/", env!("CARGO_PKG_VERSION"));

/// Redundancy index used for the primary (unencoded) payload.
pub const PRIMARY_REDUNDANCY_INDEX: i32 = -1;

// ---------------------------------------------------------------------------
// HTTP headers
// ---------------------------------------------------------------------------

pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_RANGE: &str = "Range";
pub const HEADER_CONTENT_SHA256: &str = "X-Gnfd-Content-Sha256";
pub const HEADER_OBJECT_ID: &str = "X-Gnfd-Object-ID";
pub const HEADER_REDUNDANCY_INDEX: &str = "X-Gnfd-Redundancy-Index";
pub const HEADER_PIECE_INDEX: &str = "X-Gnfd-Piece-Index";
pub const HEADER_DATE: &str = "X-Gnfd-Date";
pub const HEADER_USER_ADDRESS: &str = "X-Gnfd-User-Address";

/// Default content type for object payloads.
pub const CONTENT_DEFAULT: &str = "application/octet-stream";

/// Date format used for [`HEADER_DATE`] (ISO 8601, second precision, UTC).
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ---------------------------------------------------------------------------
// Query parameters for resumable upload
// ---------------------------------------------------------------------------

/// Byte offset of the segment carried by a resumable upload request.
pub const QUERY_OFFSET: &str = "offset";

/// `true` on the request that carries the final segment.
pub const QUERY_COMPLETE: &str = "complete";

// ---------------------------------------------------------------------------
// Request authentication
// ---------------------------------------------------------------------------

/// Auth scheme for requests signed with the account key.
pub const AUTH_V1: &str = "authTypeV1";

/// Auth scheme for requests carrying an off-line wallet signature.
pub const AUTH_V2: &str = "authTypeV2";

/// Signature algorithm advertised in the `Authorization` header.
pub const SIGN_ALGORITHM: &str = "ECDSA-secp256k1";

/// Storage-provider error codes that mean the payload does not match the
/// hash the chain authorized. Retrying identical bytes cannot succeed.
pub const INTEGRITY_ERROR_CODES: &[&str] = &[
    "BadDigest",
    "InvalidContentSha256",
    "IntegrityHashMismatch",
    "ChecksumMismatch",
];
