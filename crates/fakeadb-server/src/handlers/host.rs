//! Handlers for the device-agnostic host verbs.

use super::CommandHandler;
use crate::device::{Device, PortForwarder};
use crate::server::{Connection, ServerState};
use async_trait::async_trait;
use fakeadb_core::codec::{write_fail, write_okay, write_okay_payload};
use fakeadb_core::{BridgeError, BridgeResult};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// `host:list-forward` — one line per forwarder across every device.
pub struct ListForwardHandler;

#[async_trait]
impl CommandHandler for ListForwardHandler {
    async fn invoke(
        &self,
        state: &ServerState,
        conn: &mut Connection,
        _device: Option<Arc<Device>>,
        _args: &str,
    ) -> BridgeResult<bool> {
        let lines: Vec<String> = state
            .devices
            .all_forwarders()
            .await
            .into_iter()
            .map(|(serial, f)| format_forward_line(&serial, &f))
            .collect();
        // The real bridge strips the final trailing newline; clients depend
        // on it.
        let payload = lines.join("\n");
        write_okay_payload(&mut conn.stream, payload.as_bytes()).await?;
        Ok(false)
    }
}

fn format_forward_line(serial: &str, forwarder: &PortForwarder) -> String {
    format!(
        "{serial} tcp:{} tcp:{}",
        forwarder.source_port, forwarder.dest_port
    )
}

/// `host:pair:<password>:<address>` — pair against a discoverable service.
pub struct PairHandler;

#[async_trait]
impl CommandHandler for PairHandler {
    async fn invoke(
        &self,
        state: &ServerState,
        conn: &mut Connection,
        _device: Option<Arc<Device>>,
        args: &str,
    ) -> BridgeResult<bool> {
        let Some((_password, address)) = args.split_once(':') else {
            write_fail(&mut conn.stream, "bad pair request").await?;
            return Ok(false);
        };

        if state.devices.mdns_known(address).await {
            info!(address, "pairing succeeded");
            let guid = Uuid::new_v4();
            let payload = format!("Successfully paired to {address} [guid={guid}]\n");
            write_okay_payload(&mut conn.stream, payload.as_bytes()).await?;
        } else {
            debug!(address, "pairing failed: address not discoverable");
            // Domain failure still travels inside the success token, with no
            // trailing newline. The real bridge does the same.
            write_okay_payload(
                &mut conn.stream,
                b"Failed: Unable to start pairing client.",
            )
            .await?;
        }
        Ok(false)
    }
}

/// `host:disconnect:<address>` — drop a network device.
pub struct DisconnectHandler;

#[async_trait]
impl CommandHandler for DisconnectHandler {
    async fn invoke(
        &self,
        state: &ServerState,
        conn: &mut Connection,
        _device: Option<Arc<Device>>,
        args: &str,
    ) -> BridgeResult<bool> {
        let address = args;
        match state.devices.disconnect_network(address).await {
            Some(_) => {
                let payload = format!("disconnected {address}");
                write_okay_payload(&mut conn.stream, payload.as_bytes()).await?;
            }
            None => {
                // Same asymmetry as pair: failure text inside a success token.
                let payload = format!("Unknown device {address}");
                write_okay_payload(&mut conn.stream, payload.as_bytes()).await?;
            }
        }
        Ok(false)
    }
}

/// `host:transport:<serial>` — bind this connection to one device. The only
/// builtin handler that keeps the socket open: the next request on it is a
/// raw service invocation for the selected device.
pub struct TransportHandler;

#[async_trait]
impl CommandHandler for TransportHandler {
    async fn invoke(
        &self,
        state: &ServerState,
        conn: &mut Connection,
        _device: Option<Arc<Device>>,
        args: &str,
    ) -> BridgeResult<bool> {
        let serial = args;
        match state.devices.find(serial).await {
            Some(device) => {
                debug!(serial, "transport selected");
                conn.device = Some(device);
                write_okay(&mut conn.stream).await?;
                Ok(true)
            }
            None => {
                let err = BridgeError::DeviceNotFound(serial.to_string());
                write_fail(&mut conn.stream, &err.to_string()).await?;
                Ok(false)
            }
        }
    }
}
