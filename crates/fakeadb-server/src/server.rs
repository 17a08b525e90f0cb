//! Core server: accepts connections and dispatches host requests.
//!
//! One spawned task per accepted connection; reads and writes block the
//! owning task until data arrives or the peer closes. Any I/O failure is
//! caught at the connection boundary — no error is ever fatal to the server
//! or visible to other connections.

use crate::device::{Device, DeviceRegistry};
use crate::handlers::HandlerRegistry;
use crate::services::sink::{RawOutput, ShellV2Output};
use fakeadb_core::codec::{read_request, write_fail, write_okay};
use fakeadb_core::request::{parse_request, parse_service_invocation, HostRequest, StreamMode};
use fakeadb_core::{BridgeError, BridgeResult};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

/// Server-owned state, constructed once and passed explicitly to every
/// connection task. No global lookup anywhere.
pub struct ServerState {
    /// All simulated devices, network addresses, and mDNS records.
    pub devices: DeviceRegistry,
    /// Verb table, populated once at startup.
    handlers: HandlerRegistry,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            devices: DeviceRegistry::new(),
            handlers: HandlerRegistry::with_builtin_handlers(),
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-connection context threaded through dispatch.
pub struct Connection {
    pub(crate) stream: TcpStream,
    pub(crate) peer: SocketAddr,
    /// Device bound by a preceding `transport` request, if any.
    pub(crate) device: Option<Arc<Device>>,
}

/// The fake bridge server instance.
pub struct FakeAdbServer {
    state: Arc<ServerState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl FakeAdbServer {
    /// Bind a listener. Pass port 0 to let the OS pick one (the usual mode
    /// under test harnesses).
    pub async fn bind(addr: &str) -> BridgeResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            state: Arc::new(ServerState::new()),
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared handle to the server state, for harness-side registration.
    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.state.devices
    }

    /// Accept connections until the listener fails.
    pub async fn run(self) -> BridgeResult<()> {
        info!(addr = %self.local_addr, "fakeadb-server ready");
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let state = self.state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(state, stream, peer).await {
                    // Swallowed here: a broken client never takes down the
                    // server or another connection.
                    debug!(peer = %peer, error = %e, "connection ended with error");
                }
            });
        }
    }
}

/// Serve one connection: read length-prefixed requests and dispatch until a
/// handler asks to stop or the peer goes away.
async fn handle_connection(
    state: Arc<ServerState>,
    stream: TcpStream,
    peer: SocketAddr,
) -> BridgeResult<()> {
    debug!(peer = %peer, "connection accepted");
    let mut conn = Connection {
        stream,
        peer,
        device: None,
    };

    loop {
        let request = match read_request(&mut conn.stream).await {
            Ok(request) => request,
            Err(BridgeError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(peer = %conn.peer, "client closed connection");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        debug!(peer = %conn.peer, request = %request, "request");

        let keep_open = dispatch(&state, &mut conn, &request).await?;
        if !keep_open {
            return Ok(());
        }
    }
}

/// Resolve a request's scope and route it to a handler or the per-device
/// service framework.
async fn dispatch(
    state: &ServerState,
    conn: &mut Connection,
    request: &str,
) -> BridgeResult<bool> {
    match parse_request(request) {
        HostRequest::Host { verb, args } => invoke_handler(state, conn, None, &verb, &args).await,
        HostRequest::DeviceScoped { serial, verb, args } => {
            match state.devices.find(&serial).await {
                Some(device) => invoke_handler(state, conn, Some(device), &verb, &args).await,
                None => {
                    let err = BridgeError::DeviceNotFound(serial);
                    write_fail(&mut conn.stream, &err.to_string()).await?;
                    Ok(false)
                }
            }
        }
        HostRequest::Service(line) => {
            // A raw request whose leading token is a registered verb (abb)
            // goes through the handler table; everything else is a service
            // invocation for the bound transport.
            if let Some((verb, rest)) = line.split_once(':') {
                if state.handlers.contains(verb) {
                    let device = conn.device.clone();
                    return invoke_handler(state, conn, device, verb, rest).await;
                }
            }
            serve_service(conn, &line).await
        }
    }
}

async fn invoke_handler(
    state: &ServerState,
    conn: &mut Connection,
    device: Option<Arc<Device>>,
    verb: &str,
    args: &str,
) -> BridgeResult<bool> {
    match state.handlers.get(verb) {
        Some(handler) => handler.invoke(state, conn, device, args).await,
        None => {
            debug!(verb, "unknown host service");
            let err = BridgeError::UnknownService(verb.to_string());
            write_fail(&mut conn.stream, &err.to_string()).await?;
            Ok(false)
        }
    }
}

/// Run a service invocation against the connection's bound device,
/// multiplexing output per the requested stream mode.
async fn serve_service(conn: &mut Connection, line: &str) -> BridgeResult<bool> {
    let Some(device) = conn.device.clone() else {
        write_fail(&mut conn.stream, "no transport selected").await?;
        return Ok(false);
    };

    let invocation = match parse_service_invocation(line) {
        Ok(invocation) => invocation,
        Err(e) => {
            write_fail(&mut conn.stream, &e.to_string()).await?;
            return Ok(false);
        }
    };

    write_okay(&mut conn.stream).await?;
    match invocation.mode {
        StreamMode::ShellV2 => {
            let mut output = ShellV2Output::new(&mut conn.stream);
            device
                .services()
                .process_command(&invocation.args, &mut output)
                .await?;
        }
        StreamMode::Raw => {
            let mut output = RawOutput::new(&mut conn.stream);
            device
                .services()
                .process_command(&invocation.args, &mut output)
                .await?;
        }
    }
    Ok(false)
}
