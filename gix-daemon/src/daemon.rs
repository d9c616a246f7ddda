//! The accept-loop state machine from `spec.md` §4.7.
//!
//! ```text
//! Idle    --start()--> Running   (fails AlreadyRunning if already Running)
//! Running --accept()-->spawns worker per connection
//! Running --socket close--> Stopping
//! Stopping --workers drain--> Stopped
//! Stopped --start()--> Running  (fresh socket)
//! ```
//!
//! The listening socket is put in non-blocking mode so the acceptor thread can poll a
//! shutdown flag between `accept()` attempts, which is how `stop()` interrupts the loop
//! without a platform-specific socket-shutdown call.

use std::io::Write as _;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use gix_receive_pack::hooks::Hooks;
use gix_receive_pack::policy::PolicySet;
use gix_receive_pack::protocol::{CapabilitySet, HiddenRefPredicate};
use gix_receive_pack::ReceivePackBuilder;
use gix_serve_core::protocol::{ProtocolVersion, ServerRequest};
use gix_serve_core::service::Service;
use gix_upload_pack::config::ServerOptions as UploadPackOptions;

use crate::config::DaemonOptions;
use crate::error::{Error, Result};
use crate::request::{self, ServiceKind as WireServiceKind};
use crate::resolver::RepositoryResolver;
use crate::service::{ReceivePackService, UploadPackService};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lifecycle state of a [`Daemon`]'s accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Not yet started, or never started.
    Idle,
    /// Listening and dispatching connections.
    Running,
    /// `stop()` was called; the listening socket is closed and in-flight workers are
    /// draining.
    Stopping,
    /// Fully stopped; `start()` may be called again to bind a fresh socket.
    Stopped,
}

/// Everything needed to build a fresh [`gix_receive_pack::ReceivePack`] per connection.
///
/// A template rather than a shared instance: each connection gets its own engine so
/// concurrent pushes don't serialize behind a lock, mirroring how upload-pack connections
/// are already independent (`spec.md` §5: "a single session is single-threaded end-to-end").
#[derive(Clone)]
struct ReceivePackTemplate<H: Hooks + Clone> {
    policy: PolicySet,
    hooks: H,
    atomic: bool,
    capabilities: CapabilitySet,
    hidden: Option<Arc<HiddenRefPredicate>>,
}

/// The daemon: owns the listening socket and dispatches accepted connections to
/// `git-upload-pack` or `git-receive-pack` per `spec.md` §4.7.
pub struct Daemon<Res: RepositoryResolver + 'static, H: Hooks + Clone + Send + 'static> {
    options: DaemonOptions,
    resolver: Arc<Res>,
    upload_pack_options: UploadPackOptions,
    receive_pack_template: ReceivePackTemplate<H>,
    state: Arc<Mutex<DaemonState>>,
    shutdown: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<Res: RepositoryResolver + 'static, H: Hooks + Clone + Send + 'static> Daemon<Res, H> {
    /// Build a daemon that resolves repositories via `resolver` and drives receive-pack
    /// hooks via `hooks`.
    pub fn new(
        options: DaemonOptions,
        resolver: Res,
        upload_pack_options: UploadPackOptions,
        receive_pack_policy: PolicySet,
        receive_pack_hooks: H,
    ) -> Self {
        Self {
            options,
            resolver: Arc::new(resolver),
            upload_pack_options,
            receive_pack_template: ReceivePackTemplate {
                policy: receive_pack_policy,
                hooks: receive_pack_hooks,
                atomic: false,
                capabilities: CapabilitySet::modern_defaults(),
                hidden: None,
            },
            state: Arc::new(Mutex::new(DaemonState::Idle)),
            shutdown: Arc::new(AtomicBool::new(false)),
            accept_handle: None,
            workers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Require every receive-pack command in a push to succeed or none to be applied.
    pub fn with_atomic_receive(mut self, atomic: bool) -> Self {
        self.receive_pack_template.atomic = atomic;
        self
    }

    /// Set the capabilities receive-pack advertises.
    pub fn with_receive_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.receive_pack_template.capabilities = capabilities;
        self
    }

    /// Hide refs matching `predicate` from both services' advertisements.
    pub fn with_hidden_refs(mut self, predicate: Arc<HiddenRefPredicate>) -> Self {
        self.receive_pack_template.hidden = Some(predicate);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DaemonState {
        *self.state.lock().expect("state mutex poisoned")
    }

    /// Bind the listening socket and spawn the accept loop.
    ///
    /// Fails with [`Error::AlreadyRunning`] if the daemon is already `Running`.
    pub fn start(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock().expect("state mutex poisoned");
            if *state == DaemonState::Running {
                return Err(Error::AlreadyRunning);
            }
            *state = DaemonState::Running;
        }

        let addr = format!("{}:{}", self.options.bind_address, self.options.port);
        let listener = TcpListener::bind(&addr)?;
        listener.set_nonblocking(true)?;

        self.shutdown.store(false, Ordering::SeqCst);

        let resolver = Arc::clone(&self.resolver);
        let upload_pack_options = self.upload_pack_options.clone();
        let receive_pack_template = self.receive_pack_template.clone();
        let daemon_options = self.options.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let workers = Arc::clone(&self.workers);
        let state = Arc::clone(&self.state);

        let accept_handle = std::thread::spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _addr)) => {
                        let resolver = Arc::clone(&resolver);
                        let upload_pack_options = upload_pack_options.clone();
                        let receive_pack_template = receive_pack_template.clone();
                        let daemon_options = daemon_options.clone();
                        let handle = std::thread::spawn(move || {
                            if let Err(err) =
                                handle_connection(stream, &resolver, &upload_pack_options, &receive_pack_template, &daemon_options)
                            {
                                if daemon_options.verbose {
                                    eprintln!("gix-daemon: connection error: {err}");
                                }
                            }
                        });
                        workers.lock().expect("workers mutex poisoned").push(handle);
                        workers.lock().expect("workers mutex poisoned").retain(|h| !h.is_finished());
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(ACCEPT_POLL_INTERVAL);
                    }
                    Err(_) => break,
                }
            }
            *state.lock().expect("state mutex poisoned") = DaemonState::Stopped;
        });

        self.accept_handle = Some(accept_handle);
        Ok(())
    }

    /// Signal the accept loop to stop, then wait (up to
    /// [`DaemonOptions::shutdown_grace_period`]) for in-flight workers to finish.
    pub fn stop(&mut self) {
        {
            let mut state = self.state.lock().expect("state mutex poisoned");
            if *state != DaemonState::Running {
                return;
            }
            *state = DaemonState::Stopping;
        }
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }

        let deadline = std::time::Instant::now() + self.options.shutdown_grace_period;
        loop {
            let mut workers = self.workers.lock().expect("workers mutex poisoned");
            workers.retain(|h| !h.is_finished());
            if workers.is_empty() || std::time::Instant::now() >= deadline {
                break;
            }
            drop(workers);
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

fn handle_connection<Res: RepositoryResolver, H: Hooks + Clone>(
    mut stream: TcpStream,
    resolver: &Res,
    upload_pack_options: &UploadPackOptions,
    receive_pack_template: &ReceivePackTemplate<H>,
    options: &DaemonOptions,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(options.init_timeout)?;
    stream.set_write_timeout(options.init_timeout)?;

    let request = request::read_request_line(&mut stream)?;

    stream.set_read_timeout(options.timeout)?;
    stream.set_write_timeout(options.timeout)?;

    let resolved = match resolver.resolve(&request.repository_path, request.host.as_deref()) {
        Ok(resolved) => resolved,
        Err(err) => {
            write_err(&mut stream, &err.to_string());
            return Err(err);
        }
    };

    if !resolver.service_enabled(request.service, &request.repository_path) {
        let err = Error::NotEnabled {
            service: request.service.to_string(),
            path: request.repository_path.clone(),
        };
        write_err(&mut stream, &err.to_string());
        return Err(err);
    }

    let kind = match request.service {
        WireServiceKind::UploadPack => gix_serve_core::protocol::ServiceKind::UploadPack,
        WireServiceKind::ReceivePack => gix_serve_core::protocol::ServiceKind::ReceivePack,
    };

    // A TcpStream can't be borrowed mutably as both `input` and `output` at once;
    // `try_clone` gives two handles onto the same socket, exactly as `std::net::TcpStream`
    // is designed to be split for independent concurrent read/write halves.
    let write_half = stream.try_clone()?;
    let server_request = ServerRequest {
        kind,
        version: ProtocolVersion::V0,
        repo: &resolved.repository,
        input: stream,
        output: write_half,
        stateless: false,
        trace_id: None,
        cancellation: None,
    };

    match kind {
        gix_serve_core::protocol::ServiceKind::UploadPack => {
            let mut service = UploadPackService::new(upload_pack_options.clone());
            service
                .handle(server_request)
                .map_err(|e| Error::UploadPack(e.to_string()))
        }
        gix_serve_core::protocol::ServiceKind::ReceivePack => {
            let receive_pack = ReceivePackBuilder::new()
                .blocking()
                .with_policy(receive_pack_template.policy.clone())
                .with_atomic(receive_pack_template.atomic)
                .build(receive_pack_template.hooks.clone());
            let mut service = ReceivePackService::new(
                receive_pack,
                receive_pack_template.capabilities.clone(),
                receive_pack_template.hidden.clone(),
            );
            service
                .handle(server_request)
                .map_err(|e| Error::ReceivePack(e.to_string()))
        }
    }
}

fn write_err<W: std::io::Write>(writer: &mut W, message: &str) {
    let mut framed = Vec::new();
    let mut pkt_writer = gix_packetline_blocking::Writer::new(&mut framed);
    pkt_writer.enable_text_mode();
    let _ = pkt_writer.write_all(format!("ERR {message}").as_bytes());
    let _ = writer.write_all(&framed);
}
