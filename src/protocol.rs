//! Wire protocol shared by the detection server and its client.
//!
//! One TCP connection carries exactly one exchange:
//!
//! 1. The client writes the raw bytes of one encoded image. There is no length
//!    prefix; the client half-closes its write side to mark end-of-request.
//! 2. The server reads until EOF, processes, writes one UTF-8 JSON object
//!    `{"success": bool, "message": string, "object_count": int}` and closes.
//! 3. The client reads the response until EOF.
//!
//! Both sides must read to EOF; a single `read` is never assumed to return a
//! whole message.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Granularity at which blocking reads wake up to check deadlines and aborts.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 4096;

/// Unit serialized across the wire for every answered request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub success: bool,
    pub message: String,
    /// Only meaningful when `success` is true.
    #[serde(default)]
    pub object_count: usize,
}

impl ResponseMessage {
    pub fn success(message: impl Into<String>, object_count: usize) -> Self {
        Self {
            success: true,
            message: message.into(),
            object_count,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            object_count: 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Serializing a struct of plain fields cannot fail.
        serde_json::to_vec(self).unwrap_or_else(|_| {
            br#"{"success":false,"message":"response encoding failed","object_count":0}"#.to_vec()
        })
    }

    /// Decode a response body.
    ///
    /// JSON is the current form. Older servers answered with bare text, which
    /// is accepted as a successful message without an object count.
    pub fn parse(body: &[u8]) -> Result<Self, NetworkError> {
        let text = std::str::from_utf8(body)
            .map_err(|e| NetworkError::Protocol(format!("response is not UTF-8: {e}")))?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(NetworkError::Protocol("empty response".to_string()));
        }
        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed)
                .map_err(|e| NetworkError::Protocol(format!("invalid response json: {e}")));
        }
        Ok(Self::success(trimmed, 0))
    }
}

/// Result of reading one message to EOF.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Complete(Vec<u8>),
    /// The peer sent more than the limit; reading stopped at `received` bytes.
    TooLarge { received: usize },
}

/// Read from `stream` until the peer shuts down its write side.
///
/// Fails with `TimedOut` once `deadline` passes and with `ConnectionAborted`
/// when `abort` reports true between reads.
pub fn read_to_eof(
    stream: &mut TcpStream,
    limit: usize,
    deadline: Instant,
    abort: &dyn Fn() -> bool,
) -> std::io::Result<ReadOutcome> {
    let mut data = Vec::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(std::io::Error::new(ErrorKind::TimedOut, "read deadline exceeded"));
        }
        stream.set_read_timeout(Some(remaining.min(POLL_INTERVAL)))?;
        match stream.read(&mut buf) {
            Ok(0) => return Ok(ReadOutcome::Complete(data)),
            Ok(n) => {
                data.extend_from_slice(&buf[..n]);
                if data.len() > limit {
                    return Ok(ReadOutcome::TooLarge {
                        received: data.len(),
                    });
                }
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if abort() {
                    return Err(std::io::Error::new(
                        ErrorKind::ConnectionAborted,
                        "read aborted by shutdown",
                    ));
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
}

/// Discard input until EOF, `deadline`, or an error.
///
/// Closing a socket with unread input makes the kernel reset the connection,
/// which would destroy a response written just before.
pub fn discard_to_eof(stream: &mut TcpStream, deadline: Instant) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || stream.set_read_timeout(Some(remaining)).is_err() {
            return;
        }
        match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(_) => return,
        }
    }
}

/// Write the complete payload before `deadline`.
///
/// The write timeout is re-armed with the time left before every partial
/// write, so a slowly draining peer cannot stretch the exchange past `deadline`.
pub fn write_message(
    stream: &mut TcpStream,
    payload: &[u8],
    deadline: Instant,
) -> std::io::Result<()> {
    let mut written = 0;
    while written < payload.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(std::io::Error::new(ErrorKind::TimedOut, "write deadline exceeded"));
        }
        stream.set_write_timeout(Some(remaining))?;
        match stream.write(&payload[written..]) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    ErrorKind::WriteZero,
                    "peer stopped accepting data",
                ))
            }
            Ok(n) => written += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkErrorKind;

    #[test]
    fn json_body_parses() {
        let body = br#"{"success": true, "message": "I see a cat in front of you.", "object_count": 1}"#;
        let msg = ResponseMessage::parse(body).expect("parse");
        assert_eq!(msg, ResponseMessage::success("I see a cat in front of you.", 1));
    }

    #[test]
    fn failure_without_count_parses() {
        let body = br#"{"success": false, "message": "Image processing error"}"#;
        let msg = ResponseMessage::parse(body).expect("parse");
        assert!(!msg.success);
        assert_eq!(msg.object_count, 0);
    }

    #[test]
    fn plain_text_body_is_legacy_success() {
        let msg = ResponseMessage::parse(b"person, 0.91\n").expect("parse");
        assert!(msg.success);
        assert_eq!(msg.message, "person, 0.91");
    }

    #[test]
    fn broken_json_and_empty_bodies_are_protocol_errors() {
        let bodies: [&[u8]; 4] = [b"{\"success\": tru", b"", b"   ", &[0xff, 0xfe]];
        for body in bodies {
            let err = ResponseMessage::parse(body).unwrap_err();
            assert_eq!(err.kind(), NetworkErrorKind::Protocol, "body {:?}", body);
        }
    }

    #[test]
    fn serialized_form_has_wire_field_names() {
        let value: serde_json::Value =
            serde_json::from_slice(&ResponseMessage::success("hi", 2).to_bytes()).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["message"], "hi");
        assert_eq!(value["object_count"], 2);
    }
}
