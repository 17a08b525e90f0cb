//! Length-prefixed ASCII framing for the bridge host protocol.
//!
//! Wire format: `[4 ASCII hex chars length][payload]`. Responses start with
//! one of the literal 4-byte status tokens; a failure is followed by a
//! length-prefixed human-readable reason. Real client libraries parse this
//! byte-for-byte, so nothing here may deviate.

use crate::error::{BridgeError, BridgeResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Literal success token.
pub const OKAY: &[u8; 4] = b"OKAY";
/// Literal failure token.
pub const FAIL: &[u8; 4] = b"FAIL";

/// Upper bound on a single frame payload. The hex prefix caps payloads at
/// 64 KiB - 1 anyway; this guards the decoder against a corrupted prefix.
const MAX_FRAME_LEN: usize = 0xffff;

/// Encode a payload as a hex-length-prefixed frame.
///
/// A zero-length payload encodes as the bare prefix `0000`.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(format!("{:04x}", payload.len()).as_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Parse a 4-character hex length prefix. Accepts upper or lower case.
pub fn decode_len(prefix: &[u8; 4]) -> BridgeResult<usize> {
    let text = std::str::from_utf8(prefix)
        .map_err(|_| BridgeError::Framing("length prefix is not ASCII".into()))?;
    let len = usize::from_str_radix(text, 16)
        .map_err(|_| BridgeError::Framing(format!("invalid length prefix {text:?}")))?;
    if len > MAX_FRAME_LEN {
        return Err(BridgeError::Framing(format!("frame too large: {len} bytes")));
    }
    Ok(len)
}

/// Read one length-prefixed frame: exactly 4 hex characters, then exactly
/// that many payload bytes.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> BridgeResult<Vec<u8>> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix).await?;
    let len = decode_len(&prefix)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Read one frame and decode it as a UTF-8 request string.
pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> BridgeResult<String> {
    let payload = read_frame(reader).await?;
    String::from_utf8(payload)
        .map_err(|_| BridgeError::Framing("request is not valid UTF-8".into()))
}

/// Write one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> BridgeResult<()> {
    writer.write_all(&encode_frame(payload)).await?;
    Ok(())
}

/// Write the bare success token.
pub async fn write_okay<W: AsyncWrite + Unpin>(writer: &mut W) -> BridgeResult<()> {
    writer.write_all(OKAY).await?;
    Ok(())
}

/// Write the success token followed by a length-prefixed payload.
pub async fn write_okay_payload<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> BridgeResult<()> {
    writer.write_all(OKAY).await?;
    write_frame(writer, payload).await
}

/// Write the failure token followed by a length-prefixed reason string.
pub async fn write_fail<W: AsyncWrite + Unpin>(writer: &mut W, reason: &str) -> BridgeResult<()> {
    writer.write_all(FAIL).await?;
    write_frame(writer, reason.as_bytes()).await
}
