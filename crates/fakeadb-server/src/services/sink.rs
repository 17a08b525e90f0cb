//! [`ServiceOutput`] implementations over the client socket.
//!
//! `ShellV2Output` multiplexes stdout/stderr/exit as discrete shell-v2
//! packets and reads streamed stdin from client packets. `RawOutput` merges
//! stdout and stderr into the raw socket for legacy `shell:`/`exec:`
//! invocations, where no exit code travels on the wire.

use super::ServiceOutput;
use async_trait::async_trait;
use fakeadb_core::shell::{read_packet, write_packet, PacketId};
use fakeadb_core::{BridgeError, BridgeResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Shell-v2 framed sink over a duplex stream.
pub struct ShellV2Output<'a, S> {
    stream: &'a mut S,
    exited: bool,
    /// Stdin bytes received but not yet consumed by the service.
    stdin_buf: Vec<u8>,
    stdin_closed: bool,
}

impl<'a, S> ShellV2Output<'a, S> {
    pub fn new(stream: &'a mut S) -> Self {
        Self {
            stream,
            exited: false,
            stdin_buf: Vec::new(),
            stdin_closed: false,
        }
    }
}

#[async_trait]
impl<'a, S> ServiceOutput for ShellV2Output<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_stdout(&mut self, data: &[u8]) -> BridgeResult<()> {
        write_packet(self.stream, PacketId::Stdout, data).await
    }

    async fn write_stderr(&mut self, data: &[u8]) -> BridgeResult<()> {
        write_packet(self.stream, PacketId::Stderr, data).await
    }

    async fn write_exit(&mut self, code: u8) -> BridgeResult<()> {
        if self.exited {
            return Err(BridgeError::Protocol("exit code written twice".into()));
        }
        self.exited = true;
        write_packet(self.stream, PacketId::Exit, &[code]).await
    }

    async fn read_stdin(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
        // Drain buffered bytes first, then pull packets until stdin data
        // arrives or the input side ends.
        while self.stdin_buf.is_empty() && !self.stdin_closed {
            match read_packet(self.stream).await {
                Ok((PacketId::Stdin, payload)) => self.stdin_buf.extend_from_slice(&payload),
                Ok((PacketId::CloseStdin, _)) => self.stdin_closed = true,
                // Any other packet from the client side is ignored.
                Ok(_) => {}
                // Peer closed mid-stream: treat as end of input so short
                // uploads surface as truncation, not connection errors.
                Err(_) => self.stdin_closed = true,
            }
        }
        let n = self.stdin_buf.len().min(buf.len());
        buf[..n].copy_from_slice(&self.stdin_buf[..n]);
        self.stdin_buf.drain(..n);
        Ok(n)
    }
}

/// Raw passthrough sink: stdout and stderr interleave on the socket, the
/// exit code is recorded but never transmitted.
pub struct RawOutput<'a, S> {
    stream: &'a mut S,
    exit_code: Option<u8>,
}

impl<'a, S> RawOutput<'a, S> {
    pub fn new(stream: &'a mut S) -> Self {
        Self {
            stream,
            exit_code: None,
        }
    }

    pub fn exit_code(&self) -> Option<u8> {
        self.exit_code
    }
}

#[async_trait]
impl<'a, S> ServiceOutput for RawOutput<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_stdout(&mut self, data: &[u8]) -> BridgeResult<()> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    async fn write_stderr(&mut self, data: &[u8]) -> BridgeResult<()> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    async fn write_exit(&mut self, code: u8) -> BridgeResult<()> {
        if self.exit_code.is_some() {
            return Err(BridgeError::Protocol("exit code written twice".into()));
        }
        self.exit_code = Some(code);
        Ok(())
    }

    async fn read_stdin(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
        match self.stream.read(buf).await {
            Ok(n) => Ok(n),
            Err(_) => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakeadb_core::shell::encode_packet;

    #[tokio::test]
    async fn shell_v2_multiplexes_streams() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        {
            let mut out = ShellV2Output::new(&mut server);
            out.write_stdout(b"Success\n").await.unwrap();
            out.write_stderr(b"warning").await.unwrap();
            out.write_exit(0).await.unwrap();
        }
        let (id, payload) = read_packet(&mut client).await.unwrap();
        assert_eq!((id, payload.as_slice()), (PacketId::Stdout, &b"Success\n"[..]));
        let (id, payload) = read_packet(&mut client).await.unwrap();
        assert_eq!((id, payload.as_slice()), (PacketId::Stderr, &b"warning"[..]));
        let (id, payload) = read_packet(&mut client).await.unwrap();
        assert_eq!((id, payload.as_slice()), (PacketId::Exit, &[0u8][..]));
    }

    #[tokio::test]
    async fn shell_v2_exit_is_single_shot() {
        let (_client, mut server) = tokio::io::duplex(64);
        let mut out = ShellV2Output::new(&mut server);
        out.write_exit(0).await.unwrap();
        assert!(out.write_exit(1).await.is_err());
    }

    #[tokio::test]
    async fn shell_v2_stdin_spans_packets_and_eof() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        use tokio::io::AsyncWriteExt;
        client
            .write_all(&encode_packet(PacketId::Stdin, b"abc"))
            .await
            .unwrap();
        client
            .write_all(&encode_packet(PacketId::Stdin, b"de"))
            .await
            .unwrap();
        drop(client);

        let mut out = ShellV2Output::new(&mut server);
        let mut buf = [0u8; 2];
        assert_eq!(out.read_stdin(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(out.read_stdin(&mut buf).await.unwrap(), 1);
        assert_eq!(buf[0], b'c');
        assert_eq!(out.read_stdin(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf, b"de");
        assert_eq!(out.read_stdin(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn raw_sink_merges_streams_and_keeps_exit_local() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        {
            let mut out = RawOutput::new(&mut server);
            out.write_stdout(b"out ").await.unwrap();
            out.write_stderr(b"err").await.unwrap();
            out.write_exit(1).await.unwrap();
            assert_eq!(out.exit_code(), Some(1));
        }
        drop(server);
        let mut buf = Vec::new();
        use tokio::io::AsyncReadExt;
        client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"out err");
    }
}
