//! Envelope shapes and their JSON wire encoding.
//!
//! Every envelope is a flat JSON object. Header fields come first in the order
//! `instanceID`, `timestamp`, `sequence`, `type`, `id`, `name`, followed by the
//! variant payload (`value`, `data`, or `input` + `error`).

use serde::{Serialize, Serializer};
use serde_json::value::RawValue;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

/// Tag carried in the `type` field.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MessageType {
    Startup,
    Shutdown,
    Line,
    Json,
    JsonEncodeError,
    InputReaderError,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Startup => "startup",
            MessageType::Shutdown => "shutdown",
            MessageType::Line => "line",
            MessageType::Json => "json",
            MessageType::JsonEncodeError => "Error: JSON Encode",
            MessageType::InputReaderError => "Error: Input Reader",
        }
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Header shared by every envelope. Built once per emission and never reused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseMessage {
    #[serde(rename = "instanceID", skip_serializing_if = "String::is_empty")]
    pub instance_id: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_timestamp"
    )]
    pub timestamp: Option<OffsetDateTime>,
    pub sequence: u64,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(rename = "id", skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(rename = "name", skip_serializing_if = "String::is_empty")]
    pub reader_name: String,
}

fn serialize_timestamp<S: Serializer>(
    timestamp: &Option<OffsetDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match timestamp {
        Some(timestamp) => {
            // RFC 3339 offsets have no seconds component, so always write UTC.
            let text = timestamp
                .to_offset(UtcOffset::UTC)
                .format(&Rfc3339)
                .map_err(serde::ser::Error::custom)?;
            serializer.serialize_str(&text)
        }
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineEnvelope {
    #[serde(flatten)]
    pub base: BaseMessage,
    pub value: String,
}

/// `data` holds the input line verbatim, minus insignificant whitespace.
#[derive(Debug, Clone, Serialize)]
pub struct JsonEnvelope {
    #[serde(flatten)]
    pub base: BaseMessage,
    pub data: Box<RawValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    #[serde(flatten)]
    pub base: BaseMessage,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub input: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Lifecycle(BaseMessage),
    Line(LineEnvelope),
    Json(JsonEnvelope),
    Error(ErrorEnvelope),
}

impl Envelope {
    pub fn lifecycle(mut base: BaseMessage, message_type: MessageType) -> Self {
        base.message_type = message_type;
        Envelope::Lifecycle(base)
    }

    /// Wraps a line as text. Invalid UTF-8 is replaced, never rejected.
    pub fn line(mut base: BaseMessage, line: &[u8]) -> Self {
        base.message_type = MessageType::Line;
        Envelope::Line(LineEnvelope {
            base,
            value: String::from_utf8_lossy(line).into_owned(),
        })
    }

    /// Embeds a line as JSON `data`, or falls back to a `JsonEncodeError` envelope that
    /// carries the offending line and the parse failure.
    pub fn json_or_error(base: BaseMessage, line: &[u8]) -> Self {
        let embedded = serde_json::from_slice::<Box<RawValue>>(line)
            .and_then(|raw| RawValue::from_string(compact(raw.get())));
        match embedded {
            Ok(data) => {
                let mut base = base;
                base.message_type = MessageType::Json;
                Envelope::Json(JsonEnvelope { base, data })
            }
            Err(err) => Envelope::error(
                base,
                MessageType::JsonEncodeError,
                Some(line),
                err.to_string(),
            ),
        }
    }

    pub fn error(
        mut base: BaseMessage,
        message_type: MessageType,
        input: Option<&[u8]>,
        error: String,
    ) -> Self {
        base.message_type = message_type;
        Envelope::Error(ErrorEnvelope {
            base,
            input: input
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default(),
            error,
        })
    }

    pub fn base(&self) -> &BaseMessage {
        match self {
            Envelope::Lifecycle(base) => base,
            Envelope::Line(envelope) => &envelope.base,
            Envelope::Json(envelope) => &envelope.base,
            Envelope::Error(envelope) => &envelope.base,
        }
    }

    /// Serializes to the wire form.
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which requires a timestamp outside the RFC 3339 range.
    pub fn to_bytes(&self) -> Vec<u8> {
        match serde_json::to_vec(self) {
            Ok(bytes) => bytes,
            Err(err) => panic!("envelope serialization failed: {err}"),
        }
    }
}

/// Drops whitespace outside string literals from already-validated JSON text.
fn compact(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    for ch in json.chars() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
        } else if !matches!(ch, ' ' | '\t' | '\n' | '\r') {
            in_string = ch == '"';
            out.push(ch);
        }
    }
    out
}
