//! `file://` URI helpers.
//!
//! All document identities on the wire are canonical file URIs. These helpers
//! round-trip local paths with minimal percent-encoding.

use std::path::{Path, PathBuf};

/// Convert a local filesystem path to a `file://` URI.
pub fn path_to_uri(path: &Path) -> String {
    let mut normalized = path.to_string_lossy().to_string();
    if cfg!(windows) {
        normalized = normalized.replace('\\', "/");
        if !normalized.starts_with('/') {
            normalized.insert(0, '/');
        }
    }
    format!("file://{}", percent_encode(&normalized))
}

/// Convert a `file://` URI back into a local path. Returns `None` for other
/// schemes.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    let mut decoded = percent_decode(rest);
    if cfg!(windows) {
        if decoded.starts_with('/') && decoded.get(2..3) == Some(":") {
            decoded.remove(0);
        }
        decoded = decoded.replace('/', "\\");
    }
    Some(PathBuf::from(decoded))
}

fn percent_encode(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for &byte in path.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn percent_decode(path: &str) -> String {
    fn hex(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2]))
        {
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_round_trip() {
        let path = Path::new("/tmp/some project/main.rs");
        let uri = path_to_uri(path);
        assert_eq!(uri, "file:///tmp/some%20project/main.rs");
        assert_eq!(uri_to_path(&uri), Some(PathBuf::from("/tmp/some project/main.rs")));
    }

    #[test]
    fn test_non_file_scheme_rejected() {
        assert_eq!(uri_to_path("https://example.com/x"), None);
    }

    #[test]
    fn test_percent_decode_handles_utf8() {
        assert_eq!(percent_decode("caf%C3%A9"), "café");
    }
}
