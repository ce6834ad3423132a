//! Line-delimited JSON frames.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::{Message, Properties};
use crate::transport::TransportError;

/// Maximum size of one frame line (10 MB).
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// One protocol frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// First frame sent by a client.
    Connect {
        client_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    /// Broker's answer to `connect`.
    Connack {
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Subscribe {
        id: u64,
        filter: String,
    },
    /// Sent once the subscription is active (or failed, with `error`).
    Suback {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Publish {
        topic: String,
        payload: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_topic: Option<String>,
    },
    Disconnect,
}

impl Frame {
    /// Build a `publish` frame from a message.
    pub fn publish(message: &Message) -> Self {
        Frame::Publish {
            topic: message.topic.clone(),
            payload: STANDARD.encode(&message.payload),
            correlation_data: message
                .properties
                .correlation_data
                .as_ref()
                .map(|data| STANDARD.encode(data)),
            response_topic: message.properties.response_topic.clone(),
        }
    }

    /// Convert a `publish` frame back into a message.
    pub fn into_message(self) -> Result<Message, TransportError> {
        let Frame::Publish {
            topic,
            payload,
            correlation_data,
            response_topic,
        } = self
        else {
            return Err(TransportError::Protocol("expected a publish frame".to_string()));
        };

        let payload = decode_base64("payload", &payload)?;
        let correlation_data = correlation_data
            .map(|data| decode_base64("correlation_data", &data))
            .transpose()?;

        Ok(Message {
            topic,
            payload,
            properties: Properties {
                correlation_data,
                response_topic,
            },
        })
    }
}

fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, TransportError> {
    STANDARD
        .decode(value)
        .map_err(|e| TransportError::Protocol(format!("invalid base64 in {}: {}", field, e)))
}

/// Read the next frame. Returns `None` at end of stream.
///
/// Blank lines are skipped.
pub async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<Frame>, TransportError> {
    loop {
        let mut line = String::new();
        let read = (&mut *reader)
            .take(MAX_FRAME_SIZE as u64 + 1)
            .read_line(&mut line)
            .await?;

        if read == 0 {
            return Ok(None);
        }
        if read > MAX_FRAME_SIZE {
            return Err(TransportError::Protocol(format!(
                "frame exceeds maximum size of {} bytes",
                MAX_FRAME_SIZE
            )));
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        return serde_json::from_str(trimmed)
            .map(Some)
            .map_err(|e| TransportError::Protocol(format!("invalid frame: {}", e)));
    }
}

/// Write one frame followed by a newline.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<(), TransportError> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
