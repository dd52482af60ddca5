//! Canonical construction and validation of bucket names and object keys.
//!
//! User input never reaches the store by plain string concatenation; every
//! key the gateway writes is produced here.

use crate::errors::{GatewayError, GatewayResult};

pub const DELIMITER: &str = "/";
pub const ARCHIVE_PREFIX: &str = "archive/";

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Validate a bucket name against S3 naming rules.
///
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - starts and ends with a letter or digit
/// - no consecutive dots or dot-hyphen pairs
/// - not formatted like an IPv4 address
pub fn ensure_bucket_name(name: &str) -> GatewayResult<()> {
    let invalid = |reason| {
        Err(GatewayError::InvalidBucketName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return Err(GatewayError::missing("bucket"));
    }
    if name.len() < BUCKET_NAME_MIN_LEN || name.len() > BUCKET_NAME_MAX_LEN {
        return invalid("must be between 3 and 63 characters");
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return invalid("allowed characters are lowercase letters, digits, dots, and hyphens");
    }
    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return invalid("must start and end with a lowercase letter or digit");
    }
    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return invalid("cannot contain consecutive dots or dot-hyphen combinations");
    }
    if is_ipv4_like(name) {
        return invalid("must not be formatted like an IP address");
    }
    Ok(())
}

/// Validate an object key supplied by a client.
///
/// Rejects empty or oversized keys, control characters, a leading `/`, and
/// `.`/`..` path segments.
pub fn ensure_object_key(key: &str) -> GatewayResult<()> {
    let invalid = |reason| {
        Err(GatewayError::InvalidKey {
            key: key.to_string(),
            reason,
        })
    };

    if key.is_empty() {
        return Err(GatewayError::missing("key"));
    }
    if key.len() > MAX_OBJECT_KEY_LEN {
        return invalid("longer than 1024 bytes");
    }
    if key.chars().any(char::is_control) {
        return invalid("contains control characters");
    }
    if key.starts_with(DELIMITER) {
        return invalid("must not start with a delimiter");
    }
    if key.split(DELIMITER).any(|segment| segment == "." || segment == "..") {
        return invalid("must not contain relative path segments");
    }
    Ok(())
}

/// Validate an optional key prefix (listing filter or upload prefix).
///
/// The empty prefix is allowed and means "no prefix".
pub fn ensure_prefix(prefix: &str) -> GatewayResult<()> {
    if prefix.is_empty() {
        return Ok(());
    }
    ensure_object_key(prefix)
}

/// Key of the zero-byte marker object for a folder.
///
/// Trailing delimiters are collapsed so `docs`, `docs/` and `docs//` all
/// yield `docs/`.
pub fn folder_key(folder_name: &str) -> GatewayResult<String> {
    let trimmed = folder_name.trim_end_matches(DELIMITER);
    if trimmed.is_empty() {
        return Err(GatewayError::missing("folderName"));
    }
    let key = format!("{trimmed}{DELIMITER}");
    ensure_object_key(&key)?;
    Ok(key)
}

/// Key for an uploaded file: `{prefix}{millis}_{basename}`.
///
/// Only the last path component of the client's filename is kept.
pub fn upload_key(prefix: &str, timestamp_millis: i64, filename: &str) -> GatewayResult<String> {
    ensure_prefix(prefix)?;
    let basename = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if basename.is_empty() || basename == "." || basename == ".." {
        return Err(GatewayError::InvalidKey {
            key: filename.to_string(),
            reason: "filename is empty",
        });
    }
    let key = format!("{prefix}{timestamp_millis}_{basename}");
    ensure_object_key(&key)?;
    Ok(key)
}

/// Key an archived object is moved to.
pub fn archive_key(key: &str) -> GatewayResult<String> {
    ensure_object_key(key)?;
    let archived = format!("{ARCHIVE_PREFIX}{key}");
    ensure_object_key(&archived)?;
    Ok(archived)
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
