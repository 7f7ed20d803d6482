//! Canonical bus envelopes, inbound and outbound.

use serde::Serialize;
use serde_json::Value;

pub const TRANSCRIPT_MESSAGE: &str = "UpdateTranscriptPubMsg";
pub const PROVIDER_ERROR_MESSAGE: &str = "TranscriptionProviderErrorMsg";

/// Canonical transcript update for one user in one meeting.
///
/// `is_final` is true only for completed utterances.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub meeting_id: Option<String>,
    pub user_id: String,
    pub locale: String,
    pub text: String,
    pub is_final: bool,
    pub start_ms: u64,
    pub end_ms: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Routing<'a> {
    meeting_id: Option<&'a str>,
    user_id: &'a str,
}

#[derive(Serialize)]
struct EnvelopeHeader<'a> {
    name: &'a str,
    routing: Routing<'a>,
    timestamp: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CoreHeader<'a> {
    name: &'a str,
    meeting_id: Option<&'a str>,
    user_id: &'a str,
}

#[derive(Serialize)]
struct Core<'a, B> {
    header: CoreHeader<'a>,
    body: B,
}

#[derive(Serialize)]
struct Envelope<'a, B> {
    envelope: EnvelopeHeader<'a>,
    core: Core<'a, B>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptBody<'a> {
    transcript_id: String,
    start: String,
    end: String,
    text: &'a str,
    transcript: &'a str,
    locale: &'a str,
    result: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error_code: i64,
    error_message: &'a str,
}

fn wrap<B: Serialize>(
    name: &str,
    meeting_id: Option<&str>,
    user_id: &str,
    timestamp_ms: u64,
    body: B,
) -> Value {
    let envelope = Envelope {
        envelope: EnvelopeHeader {
            name,
            routing: Routing {
                meeting_id,
                user_id,
            },
            timestamp: timestamp_ms,
        },
        core: Core {
            header: CoreHeader {
                name,
                meeting_id,
                user_id,
            },
            body,
        },
    };
    serde_json::to_value(envelope).unwrap_or(Value::Null)
}

/// Build the `UpdateTranscriptPubMsg` published for a transcript event.
pub fn transcript_message(event: &TranscriptEvent, timestamp_ms: u64) -> Value {
    wrap(
        TRANSCRIPT_MESSAGE,
        event.meeting_id.as_deref(),
        &event.user_id,
        timestamp_ms,
        TranscriptBody {
            transcript_id: format!("{}-{}", event.user_id, event.start_ms),
            start: event.start_ms.to_string(),
            end: event.end_ms.to_string(),
            text: "",
            transcript: &event.text,
            locale: &event.locale,
            result: event.is_final,
        },
    )
}

/// Build the `TranscriptionProviderErrorMsg` published for an error frame.
pub fn error_message(
    meeting_id: Option<&str>,
    user_id: &str,
    code: i64,
    message: &str,
    timestamp_ms: u64,
) -> Value {
    wrap(
        PROVIDER_ERROR_MESSAGE,
        meeting_id,
        user_id,
        timestamp_ms,
        ErrorBody {
            error_code: code,
            error_message: message,
        },
    )
}

/// An inbound bus message reduced to its name, header and body.
///
/// Accepts both the 2x layout (`core.header` / `core.body`) and the 1x
/// layout (`header` / `payload`).
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub name: String,
    pub header: Value,
    pub body: Value,
}

impl BusMessage {
    pub fn from_value(message: &Value) -> Option<Self> {
        let (header, body) = if let Some(header) = message.get("header") {
            (header, message.get("payload"))
        } else if let Some(core) = message.get("core") {
            (core.get("header")?, core.get("body"))
        } else {
            return None;
        };

        let name = header.get("name")?.as_str()?.to_string();
        Some(Self {
            name,
            header: header.clone(),
            body: body.cloned().unwrap_or(Value::Null),
        })
    }

    /// String field from the header, e.g. `userId`.
    pub fn header_str(&self, field: &str) -> Option<&str> {
        self.header.get(field).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(is_final: bool) -> TranscriptEvent {
        TranscriptEvent {
            meeting_id: Some("meeting-1".to_string()),
            user_id: "w_abc".to_string(),
            locale: "en-US".to_string(),
            text: "hello there".to_string(),
            is_final,
            start_ms: 1200,
            end_ms: 2500,
        }
    }

    #[test]
    fn test_transcript_message_shape() {
        let message = transcript_message(&event(true), 1_700_000_000_000);

        assert_eq!(message["envelope"]["name"], "UpdateTranscriptPubMsg");
        assert_eq!(message["envelope"]["routing"]["meetingId"], "meeting-1");
        assert_eq!(message["envelope"]["routing"]["userId"], "w_abc");
        assert_eq!(message["envelope"]["timestamp"], 1_700_000_000_000u64);
        assert_eq!(message["core"]["header"]["name"], "UpdateTranscriptPubMsg");

        let body = &message["core"]["body"];
        assert_eq!(body["transcriptId"], "w_abc-1200");
        assert_eq!(body["start"], "1200");
        assert_eq!(body["end"], "2500");
        assert_eq!(body["text"], "");
        assert_eq!(body["transcript"], "hello there");
        assert_eq!(body["locale"], "en-US");
        assert_eq!(body["result"], true);
    }

    #[test]
    fn test_partial_transcript_result_is_false() {
        let message = transcript_message(&event(false), 0);
        assert_eq!(message["core"]["body"]["result"], false);
    }

    #[test]
    fn test_error_message_shape() {
        let message = error_message(None, "w_abc", 4001, "quota", 5);
        assert_eq!(message["envelope"]["name"], "TranscriptionProviderErrorMsg");
        assert!(message["envelope"]["routing"]["meetingId"].is_null());
        assert_eq!(
            message["core"]["body"],
            json!({ "errorCode": 4001, "errorMessage": "quota" })
        );
    }

    #[test]
    fn test_bus_message_2x_layout() {
        let raw = json!({
            "envelope": { "name": "UserSpeechLocaleChangedEvtMsg" },
            "core": {
                "header": { "name": "UserSpeechLocaleChangedEvtMsg", "userId": "w_1", "meetingId": "m" },
                "body": { "provider": "vosk", "locale": "en-US" }
            }
        });
        let message = BusMessage::from_value(&raw).unwrap();
        assert_eq!(message.name, "UserSpeechLocaleChangedEvtMsg");
        assert_eq!(message.header_str("userId"), Some("w_1"));
        assert_eq!(message.body["locale"], "en-US");
    }

    #[test]
    fn test_bus_message_1x_layout() {
        let raw = json!({ "header": { "name": "MeetingCreatedEvtMsg" }, "payload": { "x": 1 } });
        let message = BusMessage::from_value(&raw).unwrap();
        assert_eq!(message.name, "MeetingCreatedEvtMsg");
        assert_eq!(message.body, json!({ "x": 1 }));
    }

    #[test]
    fn test_bus_message_without_header_is_rejected() {
        assert!(BusMessage::from_value(&json!({ "hello": "world" })).is_none());
        assert!(BusMessage::from_value(&json!({ "core": { "body": {} } })).is_none());
    }
}
