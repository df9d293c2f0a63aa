//! Client side of the detection protocol: one short-lived connection per request.

use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::error::NetworkError;
use crate::protocol::{self, ReadOutcome, ResponseMessage};

/// Responses are short sentences; anything beyond this is not a valid reply.
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

#[derive(Clone, Debug)]
pub struct DetectionClient {
    addr: String,
    timeout: Duration,
}

impl DetectionClient {
    /// `timeout` bounds the whole exchange, from connect to the final read.
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one encoded image and wait for the server's answer.
    pub fn request_detection(&self, payload: &[u8]) -> Result<ResponseMessage, NetworkError> {
        let deadline = Instant::now() + self.timeout;
        let io_err = |err: std::io::Error| NetworkError::from_io(err, &self.addr);

        let mut stream = self.connect(deadline)?;
        protocol::write_message(&mut stream, payload, deadline).map_err(io_err)?;
        stream.shutdown(Shutdown::Write).map_err(io_err)?;

        let never = || false;
        let body = match protocol::read_to_eof(&mut stream, MAX_RESPONSE_BYTES, deadline, &never)
            .map_err(io_err)?
        {
            ReadOutcome::Complete(body) => body,
            ReadOutcome::TooLarge { received } => {
                return Err(NetworkError::Protocol(format!(
                    "response exceeded {MAX_RESPONSE_BYTES} bytes ({received} read)"
                )))
            }
        };
        ResponseMessage::parse(&body)
    }

    fn connect(&self, deadline: Instant) -> Result<TcpStream, NetworkError> {
        let addrs: Vec<SocketAddr> = self
            .addr
            .to_socket_addrs()
            .map_err(|e| NetworkError::Other(format!("cannot resolve {}: {}", self.addr, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(NetworkError::Other(format!(
                "{} resolved to no addresses",
                self.addr
            )));
        }

        let mut last_err = None;
        for addr in addrs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NetworkError::Timeout {
                    addr: self.addr.clone(),
                });
            }
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => {
                    stream.set_nodelay(true).ok();
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(match last_err {
            Some(err) => NetworkError::from_io(err, &self.addr),
            None => NetworkError::Other(format!("could not connect to {}", self.addr)),
        })
    }
}
