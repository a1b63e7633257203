/// Chat message record and its wire shape
use crate::error::{FlowError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// Upstream label attached to every chat message.
///
/// Labels outside the three known ones are kept verbatim so that a thread
/// created from them reports the label it was created with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    Direct,
    Thread,
    Spam,
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Direct => "direct",
            MessageType::Thread => "thread",
            MessageType::Spam => "spam",
            MessageType::Other(label) => label,
        }
    }
}

impl From<String> for MessageType {
    fn from(label: String) -> Self {
        match label.as_str() {
            "direct" => MessageType::Direct,
            "thread" => MessageType::Thread,
            "spam" => MessageType::Spam,
            _ => MessageType::Other(label),
        }
    }
}

impl From<&str> for MessageType {
    fn from(label: &str) -> Self {
        MessageType::from(label.to_string())
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated chat message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Message {
    /// Build a message stamped with a fresh id and the current time
    pub fn new(author: impl Into<String>, text: impl Into<String>, kind: MessageType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            author: author.into(),
            text: text.into(),
            kind,
            timestamp: now_millis(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Message as it arrives from a producer, before validation.
///
/// Producers are loose about shape: numeric ids, missing timestamps and
/// absent text all occur in practice. Fields of the wrong JSON type are
/// coerced where that is unambiguous and treated as missing otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<f64>,
}

impl RawMessage {
    /// Decode each record on its own so one bad record cannot sink the rest.
    /// Records that are not objects are logged and dropped.
    pub fn from_values(values: Vec<Value>) -> Vec<RawMessage> {
        values
            .into_iter()
            .enumerate()
            .filter_map(|(i, value)| match RawMessage::deserialize(value) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    warn!("Skipping malformed record #{}: {}", i, e);
                    None
                }
            })
            .collect()
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// `deserialize_with` helper for a list of records decoded one at a time
pub(crate) fn lenient_records<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<RawMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(RawMessage::from_values(Vec::<Value>::deserialize(deserializer)?))
}

impl TryFrom<RawMessage> for Message {
    type Error = FlowError;

    fn try_from(raw: RawMessage) -> Result<Self> {
        let author = raw
            .author
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| FlowError::InvalidMessage("missing author".to_string()))?;

        let id = match raw.id {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        let timestamp = raw
            .timestamp
            .filter(|t| t.is_finite())
            .map(|t| t as i64)
            .unwrap_or_else(now_millis);

        Ok(Self {
            id,
            author,
            text: raw.text.unwrap_or_default(),
            kind: raw.kind.map(MessageType::from).unwrap_or(MessageType::Direct),
            timestamp,
        })
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
