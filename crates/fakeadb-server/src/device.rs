//! Simulated devices, port forwarders, and the server-owned registry
//! behind every host command.
//!
//! The registry preserves registration order (the `list-forward` output
//! contract depends on it) and is safe under arbitrarily many concurrent
//! connection tasks.

use crate::services::ServiceManager;
use fakeadb_core::{BridgeError, BridgeResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Connection state of a simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Online,
    Offline,
    Bootloader,
    /// A device attached over the network pairing flow.
    NetworkPaired,
}

impl std::str::FromStr for DeviceState {
    type Err = BridgeError;

    fn from_str(s: &str) -> BridgeResult<Self> {
        match s {
            "online" | "device" => Ok(DeviceState::Online),
            "offline" => Ok(DeviceState::Offline),
            "bootloader" => Ok(DeviceState::Bootloader),
            "network-paired" => Ok(DeviceState::NetworkPaired),
            other => Err(BridgeError::Other(format!("unknown device state {other:?}"))),
        }
    }
}

/// A simulated TCP port-forwarding binding. Unique per device by source port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortForwarder {
    pub source_port: u16,
    pub dest_port: u16,
}

/// One simulated device: serial, properties, connection state, forwarders,
/// and an owned per-device service manager.
pub struct Device {
    serial: String,
    properties: HashMap<String, String>,
    state: RwLock<DeviceState>,
    forwarders: RwLock<Vec<PortForwarder>>,
    services: ServiceManager,
}

impl Device {
    /// Create a device with the default on-device services registered.
    pub fn new(
        serial: impl Into<String>,
        properties: HashMap<String, String>,
        state: DeviceState,
    ) -> Self {
        Self {
            serial: serial.into(),
            properties,
            state: RwLock::new(state),
            forwarders: RwLock::new(Vec::new()),
            services: ServiceManager::with_default_services(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn services(&self) -> &ServiceManager {
        &self.services
    }

    pub async fn state(&self) -> DeviceState {
        *self.state.read().await
    }

    pub async fn set_state(&self, state: DeviceState) {
        *self.state.write().await = state;
    }

    /// Bind a forwarder. Source ports are unique per device.
    pub async fn add_forwarder(&self, forwarder: PortForwarder) -> BridgeResult<()> {
        let mut forwarders = self.forwarders.write().await;
        if forwarders
            .iter()
            .any(|f| f.source_port == forwarder.source_port)
        {
            return Err(BridgeError::ForwarderBound(forwarder.source_port));
        }
        debug!(
            serial = %self.serial,
            source = forwarder.source_port,
            dest = forwarder.dest_port,
            "forwarder added"
        );
        forwarders.push(forwarder);
        Ok(())
    }

    /// Remove a forwarder by source port. Returns whether one was bound.
    pub async fn remove_forwarder(&self, source_port: u16) -> bool {
        let mut forwarders = self.forwarders.write().await;
        let before = forwarders.len();
        forwarders.retain(|f| f.source_port != source_port);
        forwarders.len() != before
    }

    /// Snapshot of this device's forwarders, in the order they were added.
    pub async fn forwarders(&self) -> Vec<PortForwarder> {
        self.forwarders.read().await.clone()
    }
}

/// An mDNS service record the pairing handler consults to decide whether a
/// requested address is known.
#[derive(Debug, Clone)]
pub struct MdnsService {
    pub address: String,
    pub metadata: String,
}

/// Registry of all simulated devices, network-device addresses, and
/// discoverable mDNS services.
pub struct DeviceRegistry {
    /// Devices in registration order.
    devices: RwLock<Vec<Arc<Device>>>,
    /// Network devices indexed by address, for `disconnect`.
    network_index: RwLock<HashMap<String, String>>,
    /// Discoverable services, for `pair`.
    mdns_services: RwLock<Vec<MdnsService>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(Vec::new()),
            network_index: RwLock::new(HashMap::new()),
            mdns_services: RwLock::new(Vec::new()),
        }
    }

    /// Register a local device. Serials are unique within the server.
    pub async fn register(&self, device: Device) -> BridgeResult<Arc<Device>> {
        let mut devices = self.devices.write().await;
        if devices.iter().any(|d| d.serial() == device.serial()) {
            return Err(BridgeError::DuplicateDevice(device.serial().to_string()));
        }
        let device = Arc::new(device);
        info!(serial = %device.serial(), "device registered");
        devices.push(device.clone());
        Ok(device)
    }

    /// Register a network device reachable at `address`.
    pub async fn register_network(
        &self,
        address: &str,
        device: Device,
    ) -> BridgeResult<Arc<Device>> {
        let device = self.register(device).await?;
        self.network_index
            .write()
            .await
            .insert(address.to_string(), device.serial().to_string());
        info!(serial = %device.serial(), address, "network device registered");
        Ok(device)
    }

    /// Unregister a device by serial. Returns whether it existed.
    pub async fn unregister(&self, serial: &str) -> bool {
        let mut devices = self.devices.write().await;
        let before = devices.len();
        devices.retain(|d| d.serial() != serial);
        let removed = devices.len() != before;
        if removed {
            drop(devices);
            self.network_index
                .write()
                .await
                .retain(|_, s| s != serial);
            info!(serial, "device unregistered");
        }
        removed
    }

    pub async fn find(&self, serial: &str) -> Option<Arc<Device>> {
        let devices = self.devices.read().await;
        devices.iter().find(|d| d.serial() == serial).cloned()
    }

    /// All devices, in registration order.
    pub async fn list(&self) -> Vec<Arc<Device>> {
        self.devices.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Remove the network device registered at `address`, if any.
    pub async fn disconnect_network(&self, address: &str) -> Option<Arc<Device>> {
        let serial = self.network_index.write().await.remove(address)?;
        let device = self.find(&serial).await?;
        let mut devices = self.devices.write().await;
        devices.retain(|d| d.serial() != serial);
        info!(serial = %serial, address, "network device disconnected");
        Some(device)
    }

    /// Make a service discoverable for the pairing handler.
    pub async fn register_mdns_service(&self, service: MdnsService) {
        debug!(address = %service.address, "mdns service registered");
        self.mdns_services.write().await.push(service);
    }

    /// Whether any discoverable service matches `address`.
    pub async fn mdns_known(&self, address: &str) -> bool {
        self.mdns_services
            .read()
            .await
            .iter()
            .any(|s| s.address == address)
    }

    /// Every forwarder across every device, paired with its device serial.
    /// Ordered by device registration, then forwarder addition.
    pub async fn all_forwarders(&self) -> Vec<(String, PortForwarder)> {
        let devices = self.devices.read().await.clone();
        let mut all = Vec::new();
        for device in devices {
            for forwarder in device.forwarders().await {
                all.push((device.serial().to_string(), forwarder));
            }
        }
        all
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(serial: &str) -> Device {
        Device::new(serial, HashMap::new(), DeviceState::Online)
    }

    #[tokio::test]
    async fn serials_are_unique() {
        let registry = DeviceRegistry::new();
        registry.register(device("emulator-5554")).await.unwrap();
        assert!(registry.register(device("emulator-5554")).await.is_err());
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn forwarder_source_ports_are_unique_per_device() {
        let dev = device("emulator-5554");
        dev.add_forwarder(PortForwarder {
            source_port: 6000,
            dest_port: 7000,
        })
        .await
        .unwrap();
        let err = dev
            .add_forwarder(PortForwarder {
                source_port: 6000,
                dest_port: 7001,
            })
            .await;
        assert!(err.is_err());
        assert_eq!(dev.forwarders().await.len(), 1);
    }

    #[tokio::test]
    async fn all_forwarders_preserves_registration_order() {
        let registry = DeviceRegistry::new();
        let a = registry.register(device("device-a")).await.unwrap();
        let b = registry.register(device("device-b")).await.unwrap();
        b.add_forwarder(PortForwarder {
            source_port: 6100,
            dest_port: 6101,
        })
        .await
        .unwrap();
        a.add_forwarder(PortForwarder {
            source_port: 6000,
            dest_port: 6001,
        })
        .await
        .unwrap();
        a.add_forwarder(PortForwarder {
            source_port: 6002,
            dest_port: 6003,
        })
        .await
        .unwrap();

        let all = registry.all_forwarders().await;
        let serials: Vec<&str> = all.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(serials, ["device-a", "device-a", "device-b"]);
        assert_eq!(all[0].1.source_port, 6000);
        assert_eq!(all[1].1.source_port, 6002);
    }

    #[tokio::test]
    async fn disconnect_removes_network_device() {
        let registry = DeviceRegistry::new();
        registry
            .register_network(
                "192.168.1.4:5555",
                Device::new("192.168.1.4:5555", HashMap::new(), DeviceState::NetworkPaired),
            )
            .await
            .unwrap();

        let removed = registry.disconnect_network("192.168.1.4:5555").await;
        assert!(removed.is_some());
        assert_eq!(registry.count().await, 0);
        assert!(registry.disconnect_network("192.168.1.4:5555").await.is_none());
    }
}
