//! Events consumed by the channel session controller.

use crate::codec::{BusMessage, lenient_bool, lenient_u64};
use serde_json::Value;

pub const MEETING_CREATED: &str = "MeetingCreatedEvtMsg";
pub const LOCALE_CHANGED: &str = "UserSpeechLocaleChangedEvtMsg";
pub const OPTIONS_CHANGED: &str = "UserSpeechOptionsChangedEvtMsg";

/// Everything the controller reacts to, from the call event source, the
/// event bus, and its own timers.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    ChannelAnswered {
        channel_id: String,
        user_id: String,
        call_id: Option<String>,
    },
    ChannelHangup {
        channel_id: String,
    },
    StartTalking {
        channel_id: String,
        user_id: Option<String>,
    },
    StopTalking {
        channel_id: String,
        user_id: Option<String>,
    },
    SettingsChanged {
        user_id: String,
        change: SettingsChange,
    },
    MeetingCreated {
        voice_conf: String,
        meeting_id: String,
    },
    /// Raw provider result frame received over the fork channel.
    ResultFrame {
        channel_id: String,
        user_id: Option<String>,
        conference: Option<String>,
        body: String,
    },
    /// Result frame already known to carry an error code.
    ErrorFrame {
        channel_id: String,
        user_id: Option<String>,
        conference: Option<String>,
        body: String,
    },
    ForkDisconnected {
        channel_id: String,
        user_id: Option<String>,
    },
    /// Settle delay after a restart stop has elapsed.
    RestartDue {
        channel_id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsChange {
    Locale { provider: String, locale: String },
    Options { partial_utterances: bool, min_utterance_length: u64 },
}

impl ControllerEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChannelAnswered { .. } => "channel_answered",
            Self::ChannelHangup { .. } => "channel_hangup",
            Self::StartTalking { .. } => "start_talking",
            Self::StopTalking { .. } => "stop_talking",
            Self::SettingsChanged { .. } => "settings_changed",
            Self::MeetingCreated { .. } => "meeting_created",
            Self::ResultFrame { .. } => "result_frame",
            Self::ErrorFrame { .. } => "error_frame",
            Self::ForkDisconnected { .. } => "fork_disconnected",
            Self::RestartDue { .. } => "restart_due",
        }
    }

    /// Translate an inbound bus message. Unknown or incomplete messages
    /// yield `None`.
    pub fn from_bus(message: &BusMessage) -> Option<Self> {
        let body = &message.body;
        match message.name.as_str() {
            MEETING_CREATED => {
                let props = body.get("props")?;
                let voice_conf = props.pointer("/voiceProp/voiceConf")?.as_str()?;
                let meeting_id = props.pointer("/meetingProp/intId")?.as_str()?;
                Some(Self::MeetingCreated {
                    voice_conf: voice_conf.to_string(),
                    meeting_id: meeting_id.to_string(),
                })
            }
            LOCALE_CHANGED => Some(Self::SettingsChanged {
                user_id: message.header_str("userId")?.to_string(),
                change: SettingsChange::Locale {
                    provider: string_field(body, "provider"),
                    locale: string_field(body, "locale"),
                },
            }),
            OPTIONS_CHANGED => Some(Self::SettingsChanged {
                user_id: message.header_str("userId")?.to_string(),
                change: SettingsChange::Options {
                    partial_utterances: lenient_bool(body.get("partialUtterances"))
                        .unwrap_or(false),
                    min_utterance_length: lenient_u64(body.get("minUtteranceLength"))
                        .unwrap_or(0),
                },
            }),
            _ => None,
        }
    }
}

fn string_field(body: &Value, field: &str) -> String {
    body.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bus(name: &str, header: Value, body: Value) -> BusMessage {
        let mut header = header;
        header["name"] = json!(name);
        BusMessage::from_value(&json!({ "core": { "header": header, "body": body } })).unwrap()
    }

    #[test]
    fn test_meeting_created() {
        let message = bus(
            MEETING_CREATED,
            json!({}),
            json!({ "props": {
                "voiceProp": { "voiceConf": "72013" },
                "meetingProp": { "intId": "meeting-1" }
            }}),
        );
        assert_eq!(
            ControllerEvent::from_bus(&message),
            Some(ControllerEvent::MeetingCreated {
                voice_conf: "72013".to_string(),
                meeting_id: "meeting-1".to_string(),
            })
        );
    }

    #[test]
    fn test_locale_changed() {
        let message = bus(
            LOCALE_CHANGED,
            json!({ "userId": "w_1", "meetingId": "m" }),
            json!({ "provider": "gladia", "locale": "fr-FR" }),
        );
        assert_eq!(
            ControllerEvent::from_bus(&message),
            Some(ControllerEvent::SettingsChanged {
                user_id: "w_1".to_string(),
                change: SettingsChange::Locale {
                    provider: "gladia".to_string(),
                    locale: "fr-FR".to_string(),
                },
            })
        );
    }

    #[test]
    fn test_options_changed_accepts_strings() {
        let message = bus(
            OPTIONS_CHANGED,
            json!({ "userId": "w_1" }),
            json!({ "partialUtterances": "true", "minUtteranceLength": "750" }),
        );
        let Some(ControllerEvent::SettingsChanged { change, .. }) =
            ControllerEvent::from_bus(&message)
        else {
            panic!("expected settings change");
        };
        assert_eq!(
            change,
            SettingsChange::Options {
                partial_utterances: true,
                min_utterance_length: 750,
            }
        );
    }

    #[test]
    fn test_settings_change_without_user_is_dropped() {
        let message = bus(LOCALE_CHANGED, json!({}), json!({ "locale": "en-US" }));
        assert_eq!(ControllerEvent::from_bus(&message), None);
    }

    #[test]
    fn test_unknown_message_is_dropped() {
        let message = bus("SomethingElseEvtMsg", json!({ "userId": "w_1" }), json!({}));
        assert_eq!(ControllerEvent::from_bus(&message), None);
    }
}
