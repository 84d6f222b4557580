//! Encoding and decoding for the wire protocol.
//!
//! Decoding happens exactly once, at the transport boundary. Everything past
//! [`decode`] works with the typed [`Message`].

use crate::error::WireError;
use crate::message::{Body, DataBody, EchoBody, Message, MessageId, NodeAddress};
use crate::topology::Advertisement;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::trace;

const TYPE_INFO: &str = "info";
const TYPE_ECHO: &str = "echo";

/// Path trace entry as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawHeader {
    via: String,
}

/// Message object exactly as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    from: String,
    to: String,
    #[serde(default)]
    hops: u32,
    #[serde(default)]
    headers: Vec<RawHeader>,
    #[serde(default)]
    payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sequence: Option<u64>,
}

/// Decode a message received from the transport
pub fn decode(bytes: &[u8]) -> Result<Message, WireError> {
    let raw: RawMessage = serde_json::from_slice(bytes)?;

    if raw.from.is_empty() {
        return Err(WireError::MissingField("from"));
    }
    if raw.to.is_empty() {
        return Err(WireError::MissingField("to"));
    }

    let id = match raw.id {
        Some(id) if !id.is_empty() => MessageId::new(id),
        _ => MessageId::derived(&raw.from, &raw.to, &raw.payload),
    };
    let from = NodeAddress::from(raw.from);

    let body = if raw.kind == TYPE_INFO {
        let costs =
            Advertisement::parse_costs(&raw.payload).map_err(|e| WireError::InvalidPayload {
                kind: TYPE_INFO,
                reason: e.to_string(),
            })?;
        let sequence = raw
            .sequence
            .or_else(|| id.advertisement_sequence(&from))
            .unwrap_or(0);
        Body::Info(Advertisement::new(sequence, costs))
    } else if raw.kind == TYPE_ECHO {
        let sent_at: f64 = raw
            .payload
            .trim()
            .parse()
            .map_err(|_| WireError::InvalidTimestamp(raw.payload.clone()))?;
        if !sent_at.is_finite() {
            return Err(WireError::InvalidTimestamp(raw.payload));
        }
        Body::Echo(EchoBody { sent_at })
    } else {
        Body::Data(DataBody {
            kind: raw.kind,
            payload: raw.payload,
        })
    };

    let message = Message {
        id,
        from,
        to: NodeAddress::from(raw.to),
        hops: raw.hops,
        path: raw
            .headers
            .into_iter()
            .map(|header| NodeAddress::from(header.via))
            .collect(),
        body,
    };

    trace!("Decoded {} message {}", message.kind(), message.id);
    Ok(message)
}

/// Encode a message for the transport
pub fn encode(message: &Message) -> Result<Bytes, WireError> {
    let (kind, payload, sequence) = match &message.body {
        Body::Info(ad) => (TYPE_INFO.to_string(), ad.costs_payload()?, Some(ad.sequence)),
        Body::Echo(echo) => (TYPE_ECHO.to_string(), echo.sent_at.to_string(), None),
        Body::Data(data) => (data.kind.clone(), data.payload.clone(), None),
    };

    let raw = RawMessage {
        id: Some(message.id.to_string()),
        kind,
        from: message.from.to_string(),
        to: message.to.to_string(),
        hops: message.hops,
        headers: message
            .path
            .iter()
            .map(|via| RawHeader {
                via: via.to_string(),
            })
            .collect(),
        payload,
        sequence,
    };

    Ok(Bytes::from(serde_json::to_vec(&raw)?))
}
