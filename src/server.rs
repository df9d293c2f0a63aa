//! Detection server: one connection fully handled before the next is accepted.
//!
//! Per connection: Accepting -> Receiving -> Processing -> Responding -> Closed.
//! A connection that closes without sending anything gets no reply. Once bytes
//! have arrived the peer always receives some response, and the socket is
//! dropped on every exit path.

use anyhow::{anyhow, Context, Result};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::pipeline::DescribePipeline;
use crate::protocol::{self, ReadOutcome, ResponseMessage};

const ACCEPT_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct ServerSettings {
    /// Bind address, e.g. "0.0.0.0:12345".
    pub addr: String,
    /// Requests larger than this are answered with an error.
    pub max_request_bytes: usize,
    /// Budget for receiving a request and, separately, for writing the response.
    pub socket_timeout: Duration,
}

/// What happened to one accepted connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Peer closed without sending data; nothing was written.
    Empty,
    /// A response was written.
    Responded { success: bool },
}

#[derive(Debug)]
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Stop accepting, abandon any in-flight connection, and wait for the loop.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("detection server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct DetectionServer {
    settings: ServerSettings,
    pipeline: DescribePipeline,
}

impl DetectionServer {
    pub fn new(settings: ServerSettings, pipeline: DescribePipeline) -> Self {
        Self { settings, pipeline }
    }

    /// Bind and run the accept loop on a dedicated thread.
    pub fn spawn(self) -> Result<ServerHandle> {
        let listener = TcpListener::bind(&self.settings.addr)
            .with_context(|| format!("cannot bind detection server to {}", self.settings.addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        log::info!(
            "detection server listening on {} (backend={}, language={})",
            addr,
            self.pipeline.detector_name(),
            self.pipeline.language().code()
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::spawn(move || {
            let DetectionServer {
                settings,
                mut pipeline,
            } = self;
            if let Err(err) = run_server(listener, &settings, &mut pipeline, &shutdown_thread) {
                log::error!("detection server stopped: {}", err);
            }
        });

        Ok(ServerHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_server(
    listener: TcpListener,
    settings: &ServerSettings,
    pipeline: &mut DescribePipeline,
    shutdown: &AtomicBool,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            log::info!("detection server shutting down");
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("accepted connection from {}", peer);
                match handle_connection(stream, settings, pipeline, shutdown) {
                    Ok(SessionOutcome::Empty) => {
                        log::warn!("received no data from {}", peer);
                    }
                    Ok(SessionOutcome::Responded { success }) => {
                        log::debug!("responded to {} (success={})", peer, success);
                    }
                    Err(err) => log::warn!("connection from {} failed: {:#}", peer, err),
                }
                log::debug!("connection from {} closed", peer);
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => {
                // Transient accept failures (e.g. fd exhaustion) must not end the loop.
                log::warn!("accept failed: {}", err);
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
    Ok(())
}

/// Serve one session on an accepted stream. The stream is closed on return.
pub fn handle_connection(
    mut stream: TcpStream,
    settings: &ServerSettings,
    pipeline: &mut DescribePipeline,
    shutdown: &AtomicBool,
) -> Result<SessionOutcome> {
    // Accepted sockets inherit non-blocking mode on some platforms.
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true).ok();

    let deadline = Instant::now() + settings.socket_timeout;
    let abort = || shutdown.load(Ordering::SeqCst);
    let outcome = protocol::read_to_eof(&mut stream, settings.max_request_bytes, deadline, &abort)
        .context("receive request")?;

    let response = match outcome {
        ReadOutcome::Complete(data) if data.is_empty() => return Ok(SessionOutcome::Empty),
        ReadOutcome::Complete(data) => {
            log::info!("received {} bytes, processing", data.len());
            process_guarded(pipeline, &data)
        }
        ReadOutcome::TooLarge { received } => {
            log::warn!(
                "request exceeded {} bytes (read {}), rejecting",
                settings.max_request_bytes,
                received
            );
            protocol::discard_to_eof(&mut stream, deadline);
            ResponseMessage::failure(format!(
                "request too large (limit {} bytes)",
                settings.max_request_bytes
            ))
        }
    };

    if !response.success {
        log::warn!("request failed: {}", response.message);
    }
    let write_deadline = Instant::now() + settings.socket_timeout;
    protocol::write_message(&mut stream, &response.to_bytes(), write_deadline)
        .context("send response")?;
    let _ = stream.shutdown(Shutdown::Both);
    Ok(SessionOutcome::Responded {
        success: response.success,
    })
}

fn process_guarded(pipeline: &mut DescribePipeline, data: &[u8]) -> ResponseMessage {
    match catch_unwind(AssertUnwindSafe(|| pipeline.respond(data))) {
        Ok(response) => response,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("processing panicked: {}", detail);
            ResponseMessage::failure(format!("Internal processing error: {detail}"))
        }
    }
}
