use crate::TransferError;

const MIN_BUCKET_NAME_LEN: usize = 3;
const MAX_BUCKET_NAME_LEN: usize = 63;
const MAX_OBJECT_NAME_LEN: usize = 1024;

/// Validates a bucket name.
///
/// Rejects:
/// - Names shorter than 3 or longer than 63 characters
/// - Characters other than lowercase letters, digits, `-` and `.`
/// - A leading or trailing `-` or `.`
/// - Consecutive dots
/// - Names formatted like an IPv4 address
pub fn validate_bucket_name(name: &str) -> Result<(), TransferError> {
    let invalid = |why: &str| {
        Err(TransferError::InvalidConfiguration(format!(
            "invalid bucket name {name:?}: {why}"
        )))
    };

    if name.len() < MIN_BUCKET_NAME_LEN || name.len() > MAX_BUCKET_NAME_LEN {
        return invalid("length must be 3 to 63 characters");
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return invalid("only lowercase letters, digits, '-' and '.' are allowed");
    }
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let bytes = name.as_bytes();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return invalid("must start and end with a letter or digit");
    }
    if name.contains("..") {
        return invalid("consecutive dots are not allowed");
    }
    if name.parse::<std::net::Ipv4Addr>().is_ok() {
        return invalid("must not be formatted as an IP address");
    }
    Ok(())
}

/// Validates an object name.
///
/// Rejects:
/// - Empty names or names over 1024 bytes
/// - A leading `/`
/// - Backslashes
/// - `..` as a path segment
pub fn validate_object_name(name: &str) -> Result<(), TransferError> {
    let invalid = |why: &str| {
        Err(TransferError::InvalidConfiguration(format!(
            "invalid object name {name:?}: {why}"
        )))
    };

    if name.is_empty() || name.len() > MAX_OBJECT_NAME_LEN {
        return invalid("length must be 1 to 1024 bytes");
    }
    if name.starts_with('/') {
        return invalid("must not start with '/'");
    }
    if name.contains('\\') {
        return invalid("backslashes are not allowed");
    }
    if name.split('/').any(|segment| segment == "..") {
        return invalid("'..' path segments are not allowed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_bucket_names() {
        for name in ["abc", "my-bucket", "logs.2024.archive", "a1b2c3", &"x".repeat(63)] {
            assert!(validate_bucket_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_bucket_length() {
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn rejects_bucket_characters() {
        assert!(validate_bucket_name("MyBucket").is_err());
        assert!(validate_bucket_name("my_bucket").is_err());
        assert!(validate_bucket_name("my bucket").is_err());
    }

    #[test]
    fn rejects_bucket_edges_and_dots() {
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("bucket.").is_err());
        assert!(validate_bucket_name("my..bucket").is_err());
    }

    #[test]
    fn rejects_ip_like_bucket() {
        assert!(matches!(
            validate_bucket_name("192.168.1.1"),
            Err(TransferError::InvalidConfiguration(_))
        ));
        // Not a valid address, so allowed.
        assert!(validate_bucket_name("192.168.1.300").is_ok());
    }

    #[test]
    fn accepts_object_names() {
        assert!(validate_object_name("file.bin").is_ok());
        assert!(validate_object_name("dir/sub/file.bin").is_ok());
        assert!(validate_object_name("dir/..hidden").is_ok());
        assert!(validate_object_name(&"o".repeat(1024)).is_ok());
    }

    #[test]
    fn rejects_object_names() {
        assert!(validate_object_name("").is_err());
        assert!(validate_object_name(&"o".repeat(1025)).is_err());
        assert!(validate_object_name("/absolute").is_err());
        assert!(validate_object_name("dir\\file").is_err());
        assert!(validate_object_name("..").is_err());
        assert!(validate_object_name("a/../b").is_err());
    }
}
