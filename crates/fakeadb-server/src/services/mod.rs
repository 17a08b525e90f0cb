//! Per-device service framework.
//!
//! Every device owns a [`ServiceManager`] mapping service names to
//! [`Service`] implementations. Dispatch is stateless: a service receives an
//! argument list and an output sink, writes stdout/stderr bytes, and
//! terminates the stream with exactly one exit code. Every processed request
//! is also appended to an insertion-ordered log for test introspection,
//! decoupling observability from execution order.

pub mod package;
pub mod sink;

use async_trait::async_trait;
use fakeadb_core::BridgeResult;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use package::PackageManagerService;

/// Exit code the real bridge reports for an unregistered service.
pub const UNKNOWN_SERVICE_EXIT_CODE: u8 = 5;

/// Abstraction over the device-shell duplex channel.
///
/// `write_exit` is terminal and must be called exactly once per invocation.
/// `read_stdin` returns `Ok(0)` once the client's input is exhausted.
#[async_trait]
pub trait ServiceOutput: Send {
    async fn write_stdout(&mut self, data: &[u8]) -> BridgeResult<()>;
    async fn write_stderr(&mut self, data: &[u8]) -> BridgeResult<()>;
    async fn write_exit(&mut self, code: u8) -> BridgeResult<()>;
    async fn read_stdin(&mut self, buf: &mut [u8]) -> BridgeResult<usize>;
}

/// An on-device service reachable through the shell/abb transport.
#[async_trait]
pub trait Service: Send + Sync {
    async fn run(&self, args: &[String], output: &mut dyn ServiceOutput) -> BridgeResult<()>;
}

/// Per-device registry of named services plus the append-only request log.
pub struct ServiceManager {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
    /// Every request processed, as an immutable snapshot, in arrival order.
    request_log: Mutex<Vec<Vec<String>>>,
}

impl ServiceManager {
    /// An empty manager with no services registered.
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// A manager with the stock on-device services registered. The activity
    /// manager slot stays empty; harnesses plug their own via [`register`].
    ///
    /// [`register`]: ServiceManager::register
    pub fn with_default_services() -> Self {
        let mut services: HashMap<String, Arc<dyn Service>> = HashMap::new();
        services.insert("package".to_string(), Arc::new(PackageManagerService::new()));
        Self {
            services: RwLock::new(services),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Register (or replace) a service under `name`.
    pub async fn register(&self, name: &str, service: Arc<dyn Service>) {
        debug!(service = name, "service registered");
        self.services
            .write()
            .await
            .insert(name.to_string(), service);
    }

    /// Dispatch a shell-style request: the first token names the service,
    /// the rest are its arguments.
    pub async fn process_command(
        &self,
        args: &[String],
        output: &mut dyn ServiceOutput,
    ) -> BridgeResult<()> {
        self.request_log.lock().await.push(args.to_vec());

        let name = args.first().map(String::as_str).unwrap_or("");
        let service = self.services.read().await.get(name).cloned();
        match service {
            Some(service) => service.run(&args[1..], output).await,
            None => {
                debug!(service = name, "unknown service requested");
                output
                    .write_stderr(format!("Error: Service '{name}' is not supported").as_bytes())
                    .await?;
                output.write_exit(UNKNOWN_SERVICE_EXIT_CODE).await
            }
        }
    }

    /// Snapshot of every request processed so far, in arrival order.
    pub async fn request_log(&self) -> Vec<Vec<String>> {
        self.request_log.lock().await.clone()
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}
