//! Wire-level client helpers shared by the integration suites.
//!
//! These speak the host protocol the way a real client library does:
//! hex-length-prefixed requests, literal status tokens, shell-v2 packets.

#![allow(dead_code)]

use fakeadb_server::{Device, DeviceState, FakeAdbServer, ServerState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Bind a server on an ephemeral port and run it in the background.
pub async fn spawn_server() -> (SocketAddr, Arc<ServerState>) {
    let server = FakeAdbServer::bind("127.0.0.1:0").await.expect("bind server");
    let addr = server.local_addr();
    let state = server.state();
    tokio::spawn(server.run());
    (addr, state)
}

pub fn online_device(serial: &str) -> Device {
    Device::new(serial, HashMap::new(), DeviceState::Online)
}

pub async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.expect("connect to server")
}

/// Send one hex-length-prefixed request.
pub async fn send_request(stream: &mut TcpStream, request: &str) {
    let frame = format!("{:04x}{request}", request.len());
    stream
        .write_all(frame.as_bytes())
        .await
        .expect("write request");
}

/// Read the 4-byte status token.
pub async fn read_status(stream: &mut TcpStream) -> [u8; 4] {
    let mut token = [0u8; 4];
    stream.read_exact(&mut token).await.expect("read status token");
    token
}

/// Read one hex-length-prefixed payload as a string.
pub async fn read_payload(stream: &mut TcpStream) -> String {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await.expect("read length prefix");
    let text = std::str::from_utf8(&prefix).expect("ascii length prefix");
    let len = usize::from_str_radix(text, 16).expect("hex length prefix");
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.expect("read payload");
    String::from_utf8(payload).expect("utf8 payload")
}

/// Write one shell-v2 stdin packet.
pub async fn send_stdin_packet(stream: &mut TcpStream, data: &[u8]) {
    let mut packet = vec![0u8];
    packet.extend_from_slice(&(data.len() as u32).to_le_bytes());
    packet.extend_from_slice(data);
    stream.write_all(&packet).await.expect("write stdin packet");
}

/// Collect shell-v2 packets until the exit packet.
/// Returns (stdout, stderr, exit code).
pub async fn read_shell_result(stream: &mut TcpStream) -> (String, String, u8) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        let mut header = [0u8; 5];
        stream.read_exact(&mut header).await.expect("read packet header");
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.expect("read packet payload");
        match header[0] {
            1 => stdout.extend_from_slice(&payload),
            2 => stderr.extend_from_slice(&payload),
            3 => {
                return (
                    String::from_utf8_lossy(&stdout).into_owned(),
                    String::from_utf8_lossy(&stderr).into_owned(),
                    payload[0],
                )
            }
            other => panic!("unexpected packet id {other}"),
        }
    }
}

/// One full shell-v2 exchange on a fresh connection: select the transport,
/// invoke the command, collect the multiplexed result.
pub async fn shell_v2(addr: SocketAddr, serial: &str, command: &str) -> (String, String, u8) {
    let mut stream = connect(addr).await;
    send_request(&mut stream, &format!("host:transport:{serial}")).await;
    assert_eq!(&read_status(&mut stream).await, b"OKAY");
    send_request(&mut stream, &format!("shell,v2,raw:{command}")).await;
    assert_eq!(&read_status(&mut stream).await, b"OKAY");
    read_shell_result(&mut stream).await
}

/// Extract the session id from an `install-create` success line.
pub fn session_id_from(stdout: &str) -> String {
    stdout
        .trim_end()
        .strip_prefix("Success: created install session [")
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or_else(|| panic!("no session id in {stdout:?}"))
        .to_string()
}
