//! `Content-Length` framing of JSON documents.

use serde_json::Value;
use std::io::{self, BufRead, Read, Write};

/// Upper bound for a single frame payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const CONTENT_LENGTH: &str = "content-length";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("transport cancelled")]
    Cancelled,
    #[error("missing Content-Length header")]
    MissingContentLength,
    #[error("malformed header line `{0}`")]
    MalformedHeader(String),
    #[error("invalid Content-Length `{0}`")]
    InvalidContentLength(String),
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
    #[error("invalid frame payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    IO(#[from] io::Error),
}

impl TransportError {
    /// True if the peer went away (or we are shutting down) rather than sent garbage.
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Closed | TransportError::Cancelled => true,
            TransportError::IO(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Read a single frame and parse its payload.
pub fn read_frame<R: BufRead>(reader: &mut R) -> Result<Value, TransportError> {
    let mut content_length: Option<usize> = None;
    let mut first = true;
    loop {
        let mut line = String::new();
        let read_n = reader.read_line(&mut line)?;
        if read_n == 0 {
            return Err(TransportError::Closed);
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            // tolerate stray blank lines between frames
            if first {
                continue;
            }
            break;
        }
        first = false;

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| TransportError::MalformedHeader(line.to_string()))?;
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let value = value.trim();
            let len = value
                .parse::<usize>()
                .map_err(|_| TransportError::InvalidContentLength(value.to_string()))?;
            content_length = Some(len);
        }
    }

    let len = content_length.ok_or(TransportError::MissingContentLength)?;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => TransportError::Closed,
        _ => TransportError::IO(err),
    })?;
    let document: Value = serde_json::from_slice(&buf)?;
    Ok(document)
}

/// Serialize `document` and write it as one frame.
///
/// Header and payload go out in a single write so that a frame is never split by another writer.
pub fn write_frame<W: Write>(writer: &mut W, document: &Value) -> Result<(), TransportError> {
    let payload = serde_json::to_vec(document)?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
    frame.extend_from_slice(&payload);
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_read_two_frames() {
        let first = r#"{"seq":1,"type":"request","command":"initialize"}"#;
        let second = r#"{"seq":2,"type":"request","command":"threads"}"#;
        let raw = format!(
            "Content-Length: {}\r\n\r\n{first}content-length:{}\r\nContent-Type: application/json\r\n\r\n{second}",
            first.len(),
            second.len()
        );
        let mut reader = Cursor::new(raw.into_bytes());

        let msg = read_frame(&mut reader).unwrap();
        assert_eq!(msg["command"], "initialize");
        let msg = read_frame(&mut reader).unwrap();
        assert_eq!(msg["command"], "threads");
        assert!(matches!(
            read_frame(&mut reader),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_malformed_headers() {
        let mut reader = Cursor::new(b"Content-Length 10\r\n\r\n{}".to_vec());
        assert!(matches!(
            read_frame(&mut reader),
            Err(TransportError::MalformedHeader(_))
        ));

        let mut reader = Cursor::new(b"Content-Length: ten\r\n\r\n{}".to_vec());
        assert!(matches!(
            read_frame(&mut reader),
            Err(TransportError::InvalidContentLength(_))
        ));

        let mut reader = Cursor::new(b"Content-Type: json\r\n\r\n{}".to_vec());
        assert!(matches!(
            read_frame(&mut reader),
            Err(TransportError::MissingContentLength)
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let mut reader = Cursor::new(b"Content-Length: 20\r\n\r\n{\"seq\":1}".to_vec());
        let err = read_frame(&mut reader).unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_write_frame() {
        let mut out = Vec::new();
        write_frame(&mut out, &json!({"seq": 7, "type": "event", "event": "initialized"})).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        let (header, payload) = text.split_once("\r\n\r\n").unwrap();
        assert_eq!(header, format!("Content-Length: {}", payload.len()));

        let back = read_frame(&mut Cursor::new(out)).unwrap();
        assert_eq!(back["event"], "initialized");
    }
}
