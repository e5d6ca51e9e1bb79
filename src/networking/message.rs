use crate::error::WakuError;
use alloy::primitives::Bytes;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// A message relayed through Waku.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakuRelayMessage {
    /// Content topic the message was published on.
    pub content_topic: String,
    /// Decoded payload.
    pub payload: Bytes,
    /// Sender timestamp, if any.
    pub timestamp: Option<i64>,
    /// Waku message version.
    pub version: u32,
}

impl WakuRelayMessage {
    /// Creates a version 0 message without timestamp.
    pub fn new(content_topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            content_topic: content_topic.into(),
            payload: payload.into(),
            timestamp: None,
            version: 0,
        }
    }

    /// Sets the timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A relay message as carried by the REST bridge, with a base64 payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawRelayMessage {
    #[serde(default)]
    pub content_topic: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl From<&WakuRelayMessage> for RawRelayMessage {
    fn from(message: &WakuRelayMessage) -> Self {
        Self {
            content_topic: message.content_topic.clone(),
            payload: STANDARD.encode(&message.payload),
            timestamp: message.timestamp,
            version: Some(message.version),
        }
    }
}

impl TryFrom<RawRelayMessage> for WakuRelayMessage {
    type Error = WakuError;

    fn try_from(raw: RawRelayMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            content_topic: raw.content_topic,
            payload: STANDARD.decode(raw.payload)?.into(),
            timestamp: raw.timestamp,
            version: raw.version.unwrap_or_default(),
        })
    }
}
