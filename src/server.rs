//! Script web server
//!
//! Local HTTP listener that forwards submitted scripts to the home execution context.
//! - `/exit` acknowledges and stops listening
//! - `/healthz` acknowledges only
//! - anything else echoes the submitted `code` field and executes it
//!
//! Uses std::net on a single network thread: one connection is handled at a time and,
//! for submissions, the loop does not accept again until the home context has finished
//! running the script. Extra browsers wait in the OS accept backlog.

use std::io::BufReader;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{RequestError, Result, ResultExt, ServerError};
use crate::executor::Executor;
use crate::logging;
use crate::request::{IncomingRequest, Route};
use crate::response::{
    build_confirmation_page, write_response, HttpResponse, ResponseEnvelope, HEALTHY_MESSAGE,
    SHUTDOWN_MESSAGE,
};

/// What the accept loop does after a connection has been handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// The bound socket, shared between the lifecycle and the accept loop.
/// Whoever takes it out closes the port.
type ListenerSlot = Arc<Mutex<Option<TcpListener>>>;

/// Process-side view of the listener: whether it runs, on which port, and its thread.
///
/// A fresh flag and slot are created for every start, so a loop that is still winding
/// down from an earlier stop can never be revived by a later start.
#[derive(Debug, Default)]
pub struct ServerState {
    listening: Arc<AtomicBool>,
    listener: ListenerSlot,
    port: String,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerState {
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Bound port while listening
    pub fn port(&self) -> Option<&str> {
        self.is_listening().then_some(self.port.as_str())
    }

    /// Close the listener and ask the accept loop to exit. The port is released before
    /// this returns; a dispatch that is already running is not interrupted. Idempotent.
    pub fn stop(&self) {
        let closed = close_listener(&self.listener, &self.listening);
        if closed {
            logging::write_line("Stopping HTTP listener");
        }
    }

    /// Wait for the accept loop thread to finish.
    ///
    /// Must not be called from the home thread while the loop may still be dispatching:
    /// the loop would wait for the home thread and the home thread for the loop.
    pub fn wait(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("Accept loop thread panicked");
            }
        }
    }
}

impl Drop for ServerState {
    fn drop(&mut self) {
        close_listener(&self.listener, &self.listening);
        // Not joined: dropping on the home thread must never block on a pending dispatch
    }
}

/// Listener lifecycle around one home execution context
pub struct ScriptServer<E: Executor + 'static> {
    config: ServerConfig,
    dispatcher: Dispatcher<E>,
    state: ServerState,
}

impl<E: Executor + 'static> ScriptServer<E> {
    pub fn new(config: ServerConfig, dispatcher: Dispatcher<E>) -> Self {
        Self {
            config,
            dispatcher,
            state: ServerState::default(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_listening(&self) -> bool {
        self.state.is_listening()
    }

    /// Bound port while listening
    pub fn port(&self) -> Option<&str> {
        self.state.port()
    }

    /// URL of the submission form while listening
    pub fn url(&self) -> Option<String> {
        self.port().map(|port| format!("http://localhost:{}/", port))
    }

    /// Bind `port` (blank means the configured port) and spawn the accept loop.
    ///
    /// Does nothing if already listening. A failure to bind is logged and returned;
    /// no loop is spawned and the server stays stopped.
    pub fn start(&mut self, port: &str) -> Result<()> {
        if self.is_listening() {
            debug!(port = %self.state.port, "Start requested while already listening");
            return Ok(());
        }

        self.try_start(port).inspect_err(|e| {
            logging::write_line(&format!("Unable to start the HTTP listener: {}", e));
            if let Some(hint) = e.hint() {
                logging::write_line(&format!("Hint: {}", hint));
            }
        })
    }

    fn try_start(&mut self, port: &str) -> Result<()> {
        let port = match port.trim() {
            "" => self.config.effective_port().to_string(),
            port => port.to_string(),
        };
        let port_number: u16 = port
            .parse()
            .map_err(|_| ServerError::InvalidPort { port: port.clone() })?;

        // Reap a loop that has already wound down; a still-running one is left detached.
        if let Some(previous) = self.state.thread.take() {
            if previous.is_finished() {
                let _ = previous.join();
            }
        }

        let addr = format!("{}:{}", self.config.bind_address, port_number);
        logging::write_line("Starting HTTP listener");
        let listener = TcpListener::bind(&addr).map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

        // Non-blocking so the loop notices a stop request between accepts
        listener
            .set_nonblocking(true)
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let bound_port = listener
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(port_number)
            .to_string();
        logging::write_line(&format!("HTTP listener started on http://localhost:{}/", bound_port));

        let listening = Arc::new(AtomicBool::new(true));
        let listener: ListenerSlot = Arc::new(Mutex::new(Some(listener)));
        let accept_loop = AcceptLoop {
            listener: listener.clone(),
            listening: listening.clone(),
            port: bound_port.clone(),
            dispatcher: self.dispatcher.clone(),
            read_timeout: self.config.read_timeout(),
            max_body_bytes: self.config.max_body_bytes,
            poll_interval: self.config.accept_poll_interval(),
        };

        let handle = thread::Builder::new()
            .name("script-web-server-accept".to_string())
            .spawn(move || accept_loop.run())
            .map_err(ServerError::Spawn)?;

        self.state = ServerState {
            listening,
            listener,
            port: bound_port,
            thread: Some(handle),
        };
        Ok(())
    }

    /// Stop accepting connections. Idempotent; see [`ServerState::stop`].
    pub fn stop(&self) {
        self.state.stop();
    }

    /// Wait for the accept loop to finish; see [`ServerState::wait`].
    pub fn wait(&mut self) {
        self.state.wait();
    }

    /// Give up the dispatcher and keep only the lifecycle state.
    ///
    /// Once the accept loop exits, nothing holds a dispatcher any more and
    /// [`HomeContext::run`](crate::dispatcher::HomeContext::run) returns.
    pub fn into_state(self) -> ServerState {
        self.state
    }
}

/// Everything the network thread owns
struct AcceptLoop<E> {
    listener: ListenerSlot,
    listening: Arc<AtomicBool>,
    port: String,
    dispatcher: Dispatcher<E>,
    read_timeout: Option<Duration>,
    max_body_bytes: usize,
    poll_interval: Duration,
}

impl<E: Executor + 'static> AcceptLoop<E> {
    fn run(self) {
        info!(port = %self.port, "Accept loop started");

        while self.listening.load(Ordering::SeqCst) {
            // Held only for the non-blocking accept; a stop never waits on a dispatch
            let accepted = match self.listener.lock().as_ref() {
                Some(listener) => listener.accept(),
                None => break,
            };
            match accepted {
                Ok((stream, peer)) => {
                    let request_id = Uuid::new_v4().to_string();
                    let span = info_span!("request", request_id = %request_id, peer = %peer);
                    let _enter = span.enter();

                    match self.handle_connection(stream, &request_id) {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Stop) => break,
                        Err(e) => {
                            warn!(error = %e, "Request failed, continuing");
                        }
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(self.poll_interval);
                }
                Err(ref e) if is_transient_accept_error(e) => {
                    debug!(error = %e, "Connection dropped before it was accepted");
                }
                Err(e) => {
                    let err = ServerError::Accept(e);
                    error!(error = %err, "Accept loop terminated");
                    logging::write_line(&err.to_string());
                    break;
                }
            }
        }

        close_listener(&self.listener, &self.listening);
        info!(port = %self.port, "HTTP listener closed");
    }

    fn handle_connection(&self, mut stream: TcpStream, request_id: &str) -> Result<Flow> {
        // Accepted sockets inherit non-blocking mode on some platforms
        stream.set_nonblocking(false).map_err(RequestError::from)?;
        stream
            .set_read_timeout(self.read_timeout)
            .map_err(RequestError::from)?;

        let mut reader = BufReader::new(stream.try_clone().map_err(RequestError::from)?);
        let request = match IncomingRequest::read_from(&mut reader, self.max_body_bytes) {
            Ok(request) => request,
            Err(err) => {
                if !matches!(err, RequestError::Io(_)) {
                    write_response(&mut stream, &HttpResponse::bad_request(&err.to_string()))
                        .warn_on_err();
                }
                close(&stream);
                return Err(err.into());
            }
        };
        drop(reader);

        let route = request.route();
        logging::log_request(request_id, route.as_str(), &request.path);

        match route {
            Route::Exit => {
                let envelope = ResponseEnvelope::success(SHUTDOWN_MESSAGE);
                let written = write_response(&mut stream, &HttpResponse::envelope(&envelope));
                close(&stream);
                // Written before the listener goes away so the caller gets its confirmation
                close_listener(&self.listener, &self.listening);
                logging::write_line("Shutdown requested over HTTP");
                written.map_err(RequestError::from)?;
                Ok(Flow::Stop)
            }
            Route::Health => {
                let envelope = ResponseEnvelope::success(HEALTHY_MESSAGE);
                let written = write_response(&mut stream, &HttpResponse::envelope(&envelope));
                close(&stream);
                written.map_err(RequestError::from)?;
                Ok(Flow::Continue)
            }
            Route::Submit => {
                let code = request.code();
                let page = build_confirmation_page(&self.port, &code);
                // The submission arrived intact, so it runs even if the browser has gone
                write_response(&mut stream, &HttpResponse::html(page)).warn_on_err();
                close(&stream);

                self.dispatch(code, request_id);
                Ok(Flow::Continue)
            }
        }
    }

    /// Run the script on the home context, blocking this thread until it has finished
    fn dispatch(&self, code: String, request_id: &str) {
        let started = Instant::now();
        let result = self
            .dispatcher
            .run_on_home(move |executor: &mut E| executor.execute(&code));
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => logging::log_dispatch(request_id, Ok(()), duration_ms),
            Err(e) => logging::log_dispatch(request_id, Err(&e.to_string()), duration_ms),
        }
    }
}

/// Drop the bound socket, then mark the server stopped. Returns whether this call did it.
fn close_listener(listener: &ListenerSlot, listening: &AtomicBool) -> bool {
    let closed = listener.lock().take().is_some();
    listening.store(false, Ordering::SeqCst);
    closed
}

fn close(stream: &TcpStream) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        debug!(error = %e, "Connection already closed by peer");
    }
}

fn is_transient_accept_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
