//! Wire framing for the analysis-service protocol.
//!
//! Messages are JSON values framed by HTTP-style headers:
//!
//! ```text
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of UTF-8 JSON>
//! ```
//!
//! Only `Content-Length` matters; other headers are skipped.

use serde_json::Value;
use std::io::{self, BufRead, Write};

/// Write one framed message to `writer` and flush it.
pub fn write_message<W: Write>(writer: &mut W, message: &Value) -> io::Result<()> {
    let body = serde_json::to_vec(message)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
    writer.write_all(&body)?;
    writer.flush()
}

/// Read one framed message from `reader`.
///
/// Returns `Ok(None)` on clean end of stream before any header byte.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<Value>> {
    let mut length: Option<usize> = None;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            length = value.trim().parse().ok();
        }
    }

    let length = length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length header")
    })?;

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    let message = serde_json::from_slice(&body)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::BufReader;

    #[test]
    fn test_round_trip() {
        let message = json!({"jsonrpc": "2.0", "id": 7, "method": "shutdown"});
        let mut wire = Vec::new();
        write_message(&mut wire, &message).unwrap();

        let mut reader = BufReader::new(wire.as_slice());
        assert_eq!(read_message(&mut reader).unwrap(), Some(message));
        assert_eq!(read_message(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_extra_headers_are_skipped() {
        let body = br#"{"ok":true}"#;
        let mut wire = Vec::new();
        wire.extend_from_slice(b"Content-Type: application/vscode-jsonrpc\r\n");
        wire.extend_from_slice(format!("content-length: {}\r\n\r\n", body.len()).as_bytes());
        wire.extend_from_slice(body);

        let mut reader = BufReader::new(wire.as_slice());
        let message = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(message["ok"], true);
    }

    #[test]
    fn test_missing_length_is_an_error() {
        let mut reader = BufReader::new(&b"X-Other: 1\r\n\r\n{}"[..]);
        assert!(read_message(&mut reader).is_err());
    }
}
