//! Engine.IO v4 / Socket.IO v5 text packets.
//!
//! Only the subset a listening client needs: the handshake, heartbeats,
//! namespace connect/disconnect and events. Binary attachments are not used by
//! the alert channel.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::Error;

/// Engine.IO handshake sent by the server as the first packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    /// Namespace connected (`40`).
    Connect,
    /// Namespace disconnected by the server (`41`).
    Disconnect,
    Event { name: String, payload: JsonValue },
    Ack,
    ConnectError(JsonValue),
}

impl Packet {
    /// Parse one websocket text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Realtime`] for unknown packet types or malformed
    /// payloads.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let (kind, rest) = split_type(text)?;
        match kind {
            b'0' => serde_json::from_str(rest)
                .map(Self::Open)
                .map_err(|e| Error::Realtime(format!("bad handshake: {e}"))),
            b'1' => Ok(Self::Close),
            b'2' => Ok(Self::Ping),
            b'3' => Ok(Self::Pong),
            b'4' => decode_message(rest),
            b'6' => Ok(Self::Noop),
            other => Err(Error::Realtime(format!(
                "unknown engine packet type '{}'",
                char::from(other)
            ))),
        }
    }

    /// Encode for sending. `Open` and `ConnectError` are server-only and encode
    /// to their bare type prefix.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Open(_) => "0".into(),
            Self::Close => "1".into(),
            Self::Ping => "2".into(),
            Self::Pong => "3".into(),
            Self::Noop => "6".into(),
            Self::Connect => "40".into(),
            Self::Disconnect => "41".into(),
            Self::Event { name, payload } => {
                let body = JsonValue::Array(vec![JsonValue::String(name.clone()), payload.clone()]);
                format!("42{body}")
            }
            Self::Ack => "43".into(),
            Self::ConnectError(_) => "44".into(),
        }
    }
}

fn split_type(text: &str) -> Result<(u8, &str), Error> {
    match text.as_bytes().first() {
        Some(&kind) if kind.is_ascii_digit() => Ok((kind, &text[1..])),
        Some(_) => Err(Error::Realtime(format!("malformed packet: {text}"))),
        None => Err(Error::Realtime("empty packet".into())),
    }
}

fn decode_message(text: &str) -> Result<Packet, Error> {
    let (kind, rest) = split_type(text)?;
    match kind {
        b'0' => Ok(Packet::Connect),
        b'1' => Ok(Packet::Disconnect),
        b'2' => decode_event(rest),
        b'3' => Ok(Packet::Ack),
        b'4' => {
            let detail = serde_json::from_str(skip_namespace(rest)).unwrap_or(JsonValue::Null);
            Ok(Packet::ConnectError(detail))
        }
        other => Err(Error::Realtime(format!(
            "unsupported socket packet type '{}'",
            char::from(other)
        ))),
    }
}

fn decode_event(text: &str) -> Result<Packet, Error> {
    let body = skip_namespace(text).trim_start_matches(|c: char| c.is_ascii_digit());
    let mut args: Vec<JsonValue> = serde_json::from_str(body)
        .map_err(|e| Error::Realtime(format!("bad event body: {e}")))?;
    if args.is_empty() {
        return Err(Error::Realtime("event without name".into()));
    }
    let name = match args.remove(0) {
        JsonValue::String(name) => name,
        other => return Err(Error::Realtime(format!("event name is not a string: {other}"))),
    };
    let payload = if args.is_empty() {
        JsonValue::Null
    } else {
        args.swap_remove(0)
    };
    Ok(Packet::Event { name, payload })
}

// "/admin,..." -> "..."
fn skip_namespace(text: &str) -> &str {
    if !text.starts_with('/') {
        return text;
    }
    match text.find(',') {
        Some(i) => &text[i + 1..],
        None => "",
    }
}
