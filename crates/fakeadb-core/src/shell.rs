//! Shell-v2 stream multiplexing.
//!
//! Service output over a device transport is carried as discrete packets:
//! a one-byte stream id, a little-endian u32 payload length, then the
//! payload. Exactly one exit packet (single status byte) terminates a
//! stream.

use crate::error::{BridgeError, BridgeResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Stream ids used by the shell-v2 protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketId {
    Stdin = 0,
    Stdout = 1,
    Stderr = 2,
    Exit = 3,
    CloseStdin = 4,
}

impl PacketId {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PacketId::Stdin),
            1 => Some(PacketId::Stdout),
            2 => Some(PacketId::Stderr),
            3 => Some(PacketId::Exit),
            4 => Some(PacketId::CloseStdin),
            _ => None,
        }
    }
}

/// Encode one packet.
pub fn encode_packet(id: PacketId, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(5 + payload.len());
    packet.push(id as u8);
    packet.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// Write one packet to the stream.
pub async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    id: PacketId,
    payload: &[u8],
) -> BridgeResult<()> {
    writer.write_all(&encode_packet(id, payload)).await?;
    Ok(())
}

/// Read one packet from the stream.
pub async fn read_packet<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> BridgeResult<(PacketId, Vec<u8>)> {
    let mut header = [0u8; 5];
    reader.read_exact(&mut header).await?;
    let id = PacketId::from_byte(header[0])
        .ok_or_else(|| BridgeError::Framing(format!("unknown shell packet id {}", header[0])))?;
    let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok((id, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_layout() {
        let packet = encode_packet(PacketId::Stdout, b"Success\n");
        assert_eq!(packet[0], 1);
        assert_eq!(&packet[1..5], &8u32.to_le_bytes());
        assert_eq!(&packet[5..], b"Success\n");
    }

    #[test]
    fn exit_packet_is_one_byte() {
        let packet = encode_packet(PacketId::Exit, &[0]);
        assert_eq!(packet, [3, 1, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn round_trip() {
        let (mut client, mut server) = tokio::io::duplex(128);
        write_packet(&mut client, PacketId::Stderr, b"Failure").await.unwrap();
        let (id, payload) = read_packet(&mut server).await.unwrap();
        assert_eq!(id, PacketId::Stderr);
        assert_eq!(payload, b"Failure");
    }

    #[tokio::test]
    async fn unknown_id_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(32);
        use tokio::io::AsyncWriteExt;
        client.write_all(&[255, 0, 0, 0, 0]).await.unwrap();
        assert!(read_packet(&mut server).await.is_err());
    }
}
