//! CMake server message framing layer
//!
//! Every message travels as `HEADER ++ json ++ FOOTER`. Reads may split a
//! message or carry several at once, so bytes accumulate until the buffer
//! ends with FOOTER and are then split on the `FOOTER ++ HEADER` boundary.

use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, trace};

use crate::io::transport::{Transport, TransportError};

pub const HEADER: &[u8] = b"\n[== \"CMake Server\" ==[\n";
pub const FOOTER: &[u8] = b"\n]== \"CMake Server\" ==]\n";

/// Error types for message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid JSON in frame: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

impl FramingError {
    /// Whether the error means the client went away
    pub fn is_disconnect(&self) -> bool {
        matches!(self, FramingError::Transport(e) if e.is_disconnect())
    }
}

/// Wrap a payload in HEADER/FOOTER
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER.len() + payload.len() + FOOTER.len());
    frame.extend_from_slice(HEADER);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(FOOTER);
    frame
}

/// Accumulates raw bytes and yields complete frame payloads
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add received bytes; returns the payloads completed by them, in order
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Vec<u8>>, FramingError> {
        self.buffer.extend_from_slice(data);
        if !self.buffer.ends_with(FOOTER) {
            return Ok(Vec::new());
        }

        let buffer = std::mem::take(&mut self.buffer);
        split_frames(&buffer)
    }

    /// Bytes of an incomplete frame still waiting for more data
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn split_frames(buffer: &[u8]) -> Result<Vec<Vec<u8>>, FramingError> {
    let body = buffer
        .strip_prefix(HEADER)
        .and_then(|rest| rest.strip_suffix(FOOTER))
        .ok_or_else(|| {
            FramingError::MalformedFrame(format!(
                "frame does not start with the server header: {:?}",
                String::from_utf8_lossy(&buffer[..buffer.len().min(64)])
            ))
        })?;

    let mut separator = FOOTER.to_vec();
    separator.extend_from_slice(HEADER);

    let mut frames = Vec::new();
    let mut rest = body;
    while let Some(at) = find(rest, &separator) {
        frames.push(rest[..at].to_vec());
        rest = &rest[at + separator.len()..];
    }
    frames.push(rest.to_vec());
    Ok(frames)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// JSON message exchange over a framed transport
///
/// Wraps any transport; complete messages are queued in arrival order and
/// handed out one at a time.
pub struct MessageFraming<T: Transport> {
    transport: T,
    decoder: FrameDecoder,
    queue: VecDeque<Vec<u8>>,
}

impl<T: Transport> MessageFraming<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            decoder: FrameDecoder::new(),
            queue: VecDeque::new(),
        }
    }

    /// Next message, or `None` once the client disconnected
    ///
    /// An incomplete frame pending at disconnect is discarded.
    pub async fn receive(&mut self) -> Result<Option<serde_json::Value>, FramingError> {
        loop {
            if let Some(frame) = self.queue.pop_front() {
                return serde_json::from_slice(&frame)
                    .map(Some)
                    .map_err(FramingError::InvalidJson);
            }

            let data = self.transport.receive().await?;
            if data.is_empty() {
                if self.decoder.pending() > 0 {
                    debug!(
                        "Discarding {} bytes of an incomplete frame",
                        self.decoder.pending()
                    );
                }
                return Ok(None);
            }

            let frames = self.decoder.push(&data)?;
            trace!("MessageFraming: {} complete frames", frames.len());
            self.queue.extend(frames);
        }
    }

    /// Serialize and frame one message, flushing before returning
    pub async fn send<M: Serialize>(&mut self, message: &M) -> Result<(), FramingError> {
        let payload = serde_json::to_vec(message).map_err(FramingError::Encode)?;
        trace!("MessageFraming: Sending {} bytes", payload.len());
        self.transport.send(&encode_frame(&payload)).await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), FramingError> {
        self.transport.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::transport::MockTransport;
    use serde_json::json;

    fn frame(value: &serde_json::Value) -> Vec<u8> {
        encode_frame(value.to_string().as_bytes())
    }

    fn sample_messages() -> Vec<serde_json::Value> {
        vec![
            json!({"type": "handshake", "cookie": "a", "buildDirectory": "/b"}),
            json!({"type": "configure", "cacheArguments": ["-DX=1"]}),
            json!({"type": "cache"}),
        ]
    }

    #[test]
    fn test_decoder_yields_nothing_until_footer() {
        let mut decoder = FrameDecoder::new();
        let bytes = frame(&json!({"type": "cache"}));
        let (head, tail) = bytes.split_at(bytes.len() - 3);

        assert!(decoder.push(head).unwrap().is_empty());
        assert_eq!(decoder.pending(), head.len());
        assert_eq!(decoder.push(tail).unwrap(), vec![br#"{"type":"cache"}"#.to_vec()]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_rejects_missing_header() {
        let mut decoder = FrameDecoder::new();
        let mut bytes = b"garbage".to_vec();
        bytes.extend_from_slice(FOOTER);

        assert!(matches!(
            decoder.push(&bytes),
            Err(FramingError::MalformedFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_one_byte_chunks() {
        let messages = sample_messages();
        let bytes: Vec<u8> = messages.iter().flat_map(frame).collect();
        let chunks: Vec<Vec<u8>> = bytes.iter().map(|b| vec![*b]).collect();

        let mut framing = MessageFraming::new(MockTransport::with_chunks(chunks));
        for expected in &messages {
            assert_eq!(framing.receive().await.unwrap().as_ref(), Some(expected));
        }
        assert!(framing.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_several_messages_in_one_read() {
        let messages = sample_messages();
        let bytes: Vec<u8> = messages.iter().flat_map(frame).collect();

        let mut framing = MessageFraming::new(MockTransport::with_chunks(vec![bytes]));
        for expected in &messages {
            assert_eq!(framing.receive().await.unwrap().as_ref(), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_frame_boundaries_inside_separator() {
        let messages = sample_messages();
        let bytes: Vec<u8> = messages.iter().flat_map(frame).collect();
        // Cut through the second FOOTER ++ HEADER boundary
        let first_len = frame(&messages[0]).len();
        let cut = first_len + frame(&messages[1]).len() - 5;
        let chunks = vec![
            bytes[..cut].to_vec(),
            bytes[cut..cut + 10].to_vec(),
            bytes[cut + 10..].to_vec(),
        ];

        let mut framing = MessageFraming::new(MockTransport::with_chunks(chunks));
        for expected in &messages {
            assert_eq!(framing.receive().await.unwrap().as_ref(), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_every_two_way_split() {
        // An empty read means disconnect, so both chunks are non-empty
        let messages = sample_messages();
        let bytes: Vec<u8> = messages.iter().flat_map(frame).collect();

        for cut in 1..bytes.len() {
            let chunks = vec![bytes[..cut].to_vec(), bytes[cut..].to_vec()];
            let mut framing = MessageFraming::new(MockTransport::with_chunks(chunks));
            for expected in &messages {
                assert_eq!(
                    framing.receive().await.unwrap().as_ref(),
                    Some(expected),
                    "split at {cut}"
                );
            }
            assert!(framing.receive().await.unwrap().is_none(), "split at {cut}");
        }
    }

    #[test]
    fn test_every_three_way_split() {
        let messages = sample_messages();
        let bytes: Vec<u8> = messages.iter().flat_map(frame).collect();
        let expected: Vec<Vec<u8>> = messages.iter().map(|m| m.to_string().into_bytes()).collect();

        for first in 0..=bytes.len() {
            for second in first..=bytes.len() {
                let mut decoder = FrameDecoder::new();
                let mut decoded = Vec::new();
                for chunk in [&bytes[..first], &bytes[first..second], &bytes[second..]] {
                    decoded.extend(decoder.push(chunk).unwrap());
                }
                assert_eq!(decoded, expected, "splits at {first} and {second}");
                assert_eq!(decoder.pending(), 0);
            }
        }
    }

    #[tokio::test]
    async fn test_partial_frame_discarded_at_disconnect() {
        let bytes = frame(&json!({"type": "cache"}));
        let partial = bytes[..bytes.len() - 1].to_vec();

        let mut framing = MessageFraming::new(MockTransport::with_chunks(vec![partial]));
        assert!(framing.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_json_payload() {
        let mut framing =
            MessageFraming::new(MockTransport::with_chunks(vec![encode_frame(b"{not json")]));
        assert!(matches!(
            framing.receive().await,
            Err(FramingError::InvalidJson(_))
        ));
    }

    #[tokio::test]
    async fn test_send_wraps_payload() {
        let transport = MockTransport::new();
        let mut framing = MessageFraming::new(transport.clone());

        framing.send(&json!({"type": "hello"})).await.unwrap();
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with(HEADER));
        assert!(sent[0].ends_with(FOOTER));
        assert_eq!(
            &sent[0][HEADER.len()..sent[0].len() - FOOTER.len()],
            br#"{"type":"hello"}"#
        );
    }
}
