//! Transport layer - Pure I/O abstraction for byte exchange with the IDE
//!
//! This module provides the transport abstraction underneath the framed
//! protocol: raw bytes in, raw bytes out, with no knowledge of message format.
//! A zero-length read means the peer went away.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Size of the read buffer for socket reads
const READ_BUFFER_SIZE: usize = 1024;

/// Core transport trait for bidirectional byte exchange
#[async_trait]
pub trait Transport: Send {
    /// Send raw bytes, flushing before returning
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive the next chunk of raw bytes; an empty chunk signals disconnect
    async fn receive(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if transport is still active
    fn is_connected(&self) -> bool;
}

/// Error types for transports
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport is disconnected")]
    Disconnected,
}

impl TransportError {
    /// Whether the error means the client is gone rather than a local failure
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Disconnected => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
        }
    }
}

// ============================================================================
// Stream Transport Implementation
// ============================================================================

/// Transport over any connected tokio stream (Unix socket, named pipe)
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: Option<S>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
        }
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Disconnected)?;
        trace!("StreamTransport: Writing {} bytes", data.len());
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Disconnected)?;
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        let n = stream.read(&mut buffer).await?;
        trace!("StreamTransport: Read {} bytes", n);
        Ok(buffer[..n].to_vec())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

// ============================================================================
// Mock Transport Implementation
// ============================================================================

#[cfg(test)]
pub use mock::MockTransport;


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_transport_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut server = StreamTransport::new(server);
        let mut client = StreamTransport::new(client);

        client.send(b"ping").await.unwrap();
        assert_eq!(server.receive().await.unwrap(), b"ping");

        server.send(b"pong").await.unwrap();
        assert_eq!(client.receive().await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_stream_transport_eof_is_empty_read() {
        let (client, server) = tokio::io::duplex(64);
        let mut server = StreamTransport::new(server);
        drop(client);

        assert!(server.receive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_transport_close() {
        let (_client, server) = tokio::io::duplex(64);
        let mut server = StreamTransport::new(server);

        assert!(server.is_connected());
        server.close().await.unwrap();
        assert!(!server.is_connected());
        assert!(matches!(
            server.send(b"late").await,
            Err(TransportError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_mock_transport_scripted_chunks() {
        let mut transport = MockTransport::with_chunks(vec!["abc", "def"]);

        assert_eq!(transport.receive().await.unwrap(), b"abc");
        assert_eq!(transport.receive().await.unwrap(), b"def");
        assert!(transport.receive().await.unwrap().is_empty());

        transport.send(b"out").await.unwrap();
        assert_eq!(transport.sent(), vec![b"out".to_vec()]);
    }

    #[tokio::test]
    async fn test_mock_transport_broken_pipe_is_disconnect() {
        let mut transport = MockTransport::new().with_broken_pipe();
        let err = transport.send(b"hello").await.unwrap_err();
        assert!(err.is_disconnect());
    }
}
