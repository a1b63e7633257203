/// Inbound bridge: tagged message events and the buffered-messages file
use crate::error::{FlowError, Result};
use crate::message::{lenient_records, RawMessage};
use crate::service::FlowHandle;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Largest datagram the bridge accepts
const MAX_DATAGRAM: usize = 64 * 1024;

/// Event pushed by an external producer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    #[serde(rename = "CHATFLOW_MESSAGE")]
    Single { message: RawMessage },
    #[serde(rename = "CHATFLOW_MESSAGES")]
    Batch {
        #[serde(deserialize_with = "lenient_records")]
        messages: Vec<RawMessage>,
    },
}

impl BridgeEvent {
    pub fn parse(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| FlowError::Bridge(format!("Malformed bridge event: {}", e)))
    }

    pub fn into_raw_messages(self) -> Vec<RawMessage> {
        match self {
            BridgeEvent::Single { message } => vec![message],
            BridgeEvent::Batch { messages } => messages,
        }
    }
}

/// On-disk layout of messages buffered by the extension
#[derive(Debug, Default, Deserialize)]
struct BufferedMessages {
    #[serde(default, rename = "chatflowMessages", deserialize_with = "lenient_records")]
    chatflow_messages: Vec<RawMessage>,
}

/// Read buffered messages; a missing file means nothing was buffered
pub async fn load_buffered(path: &Path) -> Result<Vec<RawMessage>> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No buffered messages at {}", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(FlowError::Io(e)),
    };

    let buffered: BufferedMessages = serde_json::from_slice(&data)?;
    Ok(buffered.chatflow_messages)
}

/// Receive bridge events over UDP and hand them to the ingest task.
///
/// Returns only when the ingest task has gone away.
pub async fn run_udp_bridge(socket: UdpSocket, handle: FlowHandle) -> Result<()> {
    if let Ok(addr) = socket.local_addr() {
        info!("Bridge listening on udp://{}", addr);
    }

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Bridge receive failed: {}", e);
                continue;
            }
        };

        let payload = match std::str::from_utf8(&buf[..n]) {
            Ok(s) => s,
            Err(_) => {
                warn!("Dropping non-UTF-8 datagram from {}", from);
                continue;
            }
        };

        match BridgeEvent::parse(payload) {
            Ok(event) => {
                let accepted = handle.push_event(event)?;
                debug!("Bridge event from {} carried {} message(s)", from, accepted);
            }
            Err(e) => warn!("Dropping datagram from {}: {}", from, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_single_event() {
        let event = BridgeEvent::parse(
            r#"{"type":"CHATFLOW_MESSAGE",
                "message":{"author":"Alex","text":"hi","type":"direct"}}"#,
        )
        .unwrap();
        let raws = event.into_raw_messages();
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].author.as_deref(), Some("Alex"));
    }

    #[test]
    fn test_parse_batch_event() {
        let event = BridgeEvent::parse(
            r#"{"type":"CHATFLOW_MESSAGES",
                "messages":[{"author":"A"},{"author":"B","type":"spam"}]}"#,
        )
        .unwrap();
        let raws = event.into_raw_messages();
        assert_eq!(raws.len(), 2);
        assert_eq!(raws[1].kind.as_deref(), Some("spam"));
    }

    #[test]
    fn test_batch_survives_badly_typed_records() {
        let event = BridgeEvent::parse(
            r#"{"type":"CHATFLOW_MESSAGES","messages":[
                {"author":"Alex","text":"hi","type":"direct","timestamp":1},
                {"author":42},
                {"author":"Sam","text":"@Alex yo","type":"thread","timestamp":"2"},
                null
            ]}"#,
        )
        .unwrap();
        let raws = event.into_raw_messages();

        assert_eq!(raws.len(), 3);
        assert_eq!(raws[1].author.as_deref(), Some("42"));
        assert_eq!(raws[2].timestamp, Some(2.0));
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(matches!(
            BridgeEvent::parse(r#"{"type":"SOMETHING_ELSE"}"#),
            Err(FlowError::Bridge(_))
        ));
        assert!(BridgeEvent::parse("not json").is_err());
    }

    #[tokio::test]
    async fn test_load_buffered_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"chatflowMessages":[
                {{"author":"Alex","text":"hello","type":"direct","timestamp":100}}
            ]}}"#
        )
        .unwrap();

        let raws = load_buffered(file.path()).await.unwrap();
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].timestamp, Some(100.0));
    }

    #[tokio::test]
    async fn test_load_buffered_keeps_good_records() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"chatflowMessages":[
                {{"author":"Alex","text":"hello","type":"direct","timestamp":"now"}},
                {{"author":"Bot","text":"CHECK OUT MY CHANNEL","type":"spam","timestamp":101}},
                [1, 2]
            ]}}"#
        )
        .unwrap();

        let raws = load_buffered(file.path()).await.unwrap();
        assert_eq!(raws.len(), 2);
        assert_eq!(raws[0].timestamp, None);
        assert_eq!(raws[1].kind.as_deref(), Some("spam"));
    }

    #[tokio::test]
    async fn test_load_buffered_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let raws = load_buffered(&dir.path().join("absent.json")).await.unwrap();
        assert!(raws.is_empty());
    }
}
