//! fakeadb-server: a simulated device-bridge daemon.
//!
//! Speaks the host-side wire protocol of the bridge so client tooling under
//! test can connect exactly as it would to the real daemon, issue host
//! commands (list forwarded ports, pair, disconnect), and drive on-device
//! services such as the simulated package installer. No real devices are
//! involved; test harnesses register simulated ones and assert on
//! wire-level responses.

pub mod config;
pub mod device;
pub mod handlers;
pub mod server;
pub mod services;

// Re-export the harness-facing surface at crate root.
pub use device::{Device, DeviceRegistry, DeviceState, MdnsService, PortForwarder};
pub use server::{FakeAdbServer, ServerState};
pub use services::package::PackageManagerService;
pub use services::{Service, ServiceManager, ServiceOutput};
