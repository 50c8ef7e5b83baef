//! Stream event wire format.
//!
//! The streaming collaborator delivers text frames of the form
//! `{"event": "<kind>", "payload": <value>}`:
//!
//! | event           | meaning | payload |
//! |-----------------|---------|---------|
//! | `update`        | create  | entry object, or a JSON string holding one |
//! | `status.update` | edit    | same as `update` |
//! | `delete`        | delete  | entry id, string or number |
//!
//! Anything else is a [`DecodeError`]; callers drop and count it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::Entry;
use crate::error::DecodeError;
use crate::ids::EntryId;

/// An undecoded frame as it arrives from the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    /// Event kind.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// A decoded push event, normalized to the same entry shape as paginated results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A new entry was published.
    Create(Entry),
    /// An existing entry was edited.
    Update(Entry),
    /// An entry was deleted.
    Delete(EntryId),
}

impl StreamEvent {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let frame: RawFrame = serde_json::from_str(text)?;
        Self::from_frame(frame)
    }

    /// Decode an already-parsed frame.
    pub fn from_frame(frame: RawFrame) -> Result<Self, DecodeError> {
        let payload = frame
            .payload
            .ok_or_else(|| DecodeError::MissingPayload(frame.event.clone()))?;

        match frame.event.as_str() {
            "update" => Ok(StreamEvent::Create(decode_entry(payload)?)),
            "status.update" => Ok(StreamEvent::Update(decode_entry(payload)?)),
            "delete" => Ok(StreamEvent::Delete(decode_id(payload)?)),
            other => Err(DecodeError::UnknownEvent(other.to_string())),
        }
    }

    /// Encode this event as a text frame.
    pub fn encode(&self) -> Result<String, DecodeError> {
        let frame = match self {
            StreamEvent::Create(entry) => RawFrame {
                event: "update".into(),
                payload: Some(serde_json::to_value(entry)?),
            },
            StreamEvent::Update(entry) => RawFrame {
                event: "status.update".into(),
                payload: Some(serde_json::to_value(entry)?),
            },
            StreamEvent::Delete(id) => RawFrame {
                event: "delete".into(),
                payload: Some(Value::String(id.to_string())),
            },
        };
        Ok(serde_json::to_string(&frame)?)
    }

    /// The id of the entry this event refers to.
    pub fn entry_id(&self) -> EntryId {
        match self {
            StreamEvent::Create(entry) | StreamEvent::Update(entry) => entry.id,
            StreamEvent::Delete(id) => *id,
        }
    }
}

fn decode_entry(payload: Value) -> Result<Entry, DecodeError> {
    match payload {
        // The source service double-encodes entry payloads as strings.
        Value::String(text) => Ok(serde_json::from_str(&text)?),
        other => Ok(serde_json::from_value(other)?),
    }
}

fn decode_id(payload: Value) -> Result<EntryId, DecodeError> {
    match payload {
        Value::String(text) => text.parse(),
        Value::Number(n) => n
            .as_u64()
            .map(EntryId::new)
            .ok_or_else(|| DecodeError::InvalidId(n.to_string())),
        other => Err(DecodeError::InvalidId(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64) -> Entry {
        Entry::new(EntryId::new(id), "alice", 1_700_000_000, "c")
    }

    #[test]
    fn decodes_create_with_object_payload() {
        let text = r#"{"event":"update","payload":{"id":"201","author_id":"a","created_at":1,"content_ref":"c"}}"#;
        let event = StreamEvent::decode(text).unwrap();
        assert!(matches!(event, StreamEvent::Create(ref e) if e.id == EntryId::new(201)));
    }

    #[test]
    fn decodes_create_with_string_payload() {
        let inner = serde_json::to_string(&entry(7)).unwrap();
        let text = serde_json::json!({"event": "update", "payload": inner}).to_string();
        let event = StreamEvent::decode(&text).unwrap();
        assert_eq!(event, StreamEvent::Create(entry(7)));
    }

    #[test]
    fn decodes_edit_and_delete() {
        let edit = StreamEvent::Update(entry(9)).encode().unwrap();
        assert_eq!(StreamEvent::decode(&edit).unwrap(), StreamEvent::Update(entry(9)));

        let del = r#"{"event":"delete","payload":"109"}"#;
        assert_eq!(
            StreamEvent::decode(del).unwrap(),
            StreamEvent::Delete(EntryId::new(109))
        );

        let del_num = r#"{"event":"delete","payload":110}"#;
        assert_eq!(
            StreamEvent::decode(del_num).unwrap(),
            StreamEvent::Delete(EntryId::new(110))
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(
            StreamEvent::decode("not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            StreamEvent::decode(r#"{"event":"notification","payload":{}}"#),
            Err(DecodeError::UnknownEvent(ref k)) if k == "notification"
        ));
        assert!(matches!(
            StreamEvent::decode(r#"{"event":"delete"}"#),
            Err(DecodeError::MissingPayload(_))
        ));
        assert!(matches!(
            StreamEvent::decode(r#"{"event":"delete","payload":"abc"}"#),
            Err(DecodeError::InvalidId(_))
        ));
        assert!(matches!(
            StreamEvent::decode(r#"{"event":"update","payload":{"id":"1"}}"#),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn entry_id_of_event() {
        assert_eq!(StreamEvent::Create(entry(3)).entry_id(), EntryId::new(3));
        assert_eq!(StreamEvent::Delete(EntryId::new(4)).entry_id(), EntryId::new(4));
    }
}
