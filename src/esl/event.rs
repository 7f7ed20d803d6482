//! Translation of event socket events into controller events.

use crate::codec::parse_json_lenient;
use crate::controller::ControllerEvent;
use crate::esl::frame::EslFrame;

pub const CHANNEL_ANSWER: &str = "CHANNEL_ANSWER";
pub const CHANNEL_HANGUP_COMPLETE: &str = "CHANNEL_HANGUP_COMPLETE";
pub const CUSTOM: &str = "CUSTOM";
pub const CONFERENCE_MAINTENANCE: &str = "conference::maintenance";
pub const AUDIO_FORK_JSON: &str = "mod_audio_fork::json";
pub const AUDIO_FORK_DISCONNECT: &str = "mod_audio_fork::disconnect";

/// Subscription sent after authenticating.
pub fn subscription() -> String {
    format!(
        "event plain {} {} {} {} {} {}",
        CHANNEL_ANSWER,
        CHANNEL_HANGUP_COMPLETE,
        CUSTOM,
        CONFERENCE_MAINTENANCE,
        AUDIO_FORK_JSON,
        AUDIO_FORK_DISCONNECT
    )
}

/// The platform user id is the first two `_`-separated parts of the SIP
/// caller username (`w_abc123_3-bbbID-Name` → `w_abc123`).
pub fn user_id_from_username(username: &str) -> Option<String> {
    let user_id = username.split('_').take(2).collect::<Vec<_>>().join("_");
    (!user_id.is_empty()).then_some(user_id)
}

/// Map an event to what the controller cares about. Other events yield
/// `None`.
pub fn translate(event: &EslFrame) -> Option<ControllerEvent> {
    let channel_id = event.header("Channel-Call-UUID").map(str::to_string);
    let user_id = event
        .header("Caller-Username")
        .and_then(user_id_from_username);

    match event.header("Event-Name")? {
        CHANNEL_ANSWER => {
            let call_id = event.header("variable_sip_call_id")?;
            Some(ControllerEvent::ChannelAnswered {
                channel_id: channel_id?,
                user_id: user_id?,
                call_id: Some(call_id.to_string()),
            })
        }
        CHANNEL_HANGUP_COMPLETE => {
            event.header("variable_sip_call_id")?;
            Some(ControllerEvent::ChannelHangup {
                channel_id: channel_id?,
            })
        }
        CUSTOM => translate_custom(event, channel_id?, user_id),
        _ => None,
    }
}

fn translate_custom(
    event: &EslFrame,
    channel_id: String,
    user_id: Option<String>,
) -> Option<ControllerEvent> {
    match event.header("Event-Subclass")? {
        CONFERENCE_MAINTENANCE => match event.header("Action")? {
            "start-talking" => Some(ControllerEvent::StartTalking {
                channel_id,
                user_id,
            }),
            "stop-talking" | "mute-member" => Some(ControllerEvent::StopTalking {
                channel_id,
                user_id,
            }),
            _ => None,
        },
        AUDIO_FORK_JSON => {
            let body = event.body.clone().unwrap_or_default();
            let conference = event
                .header("variable_conference_name")
                .map(str::to_string);
            let is_error = parse_json_lenient(&body)
                .get("errorCode")
                .is_some_and(|code| !code.is_null());
            Some(if is_error {
                ControllerEvent::ErrorFrame {
                    channel_id,
                    user_id,
                    conference,
                    body,
                }
            } else {
                ControllerEvent::ResultFrame {
                    channel_id,
                    user_id,
                    conference,
                    body,
                }
            })
        }
        AUDIO_FORK_DISCONNECT => Some(ControllerEvent::ForkDisconnected {
            channel_id,
            user_id,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(headers: &[(&str, &str)], body: Option<&str>) -> EslFrame {
        EslFrame {
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.map(str::to_string),
        }
    }

    #[test]
    fn test_user_id_from_username() {
        assert_eq!(
            user_id_from_username("w_abc123_3-bbbID-Jane"),
            Some("w_abc123".to_string())
        );
        assert_eq!(user_id_from_username("solo"), Some("solo".to_string()));
        assert_eq!(user_id_from_username(""), None);
    }

    #[test]
    fn test_channel_answer() {
        let answer = event(
            &[
                ("Event-Name", "CHANNEL_ANSWER"),
                ("Channel-Call-UUID", "uuid-1"),
                ("variable_sip_call_id", "sip-1"),
                ("Caller-Username", "w_abc_1-bbbID-Jane"),
            ],
            None,
        );
        assert_eq!(
            translate(&answer),
            Some(ControllerEvent::ChannelAnswered {
                channel_id: "uuid-1".to_string(),
                user_id: "w_abc".to_string(),
                call_id: Some("sip-1".to_string()),
            })
        );
    }

    #[test]
    fn test_channel_answer_requires_sip_call() {
        let answer = event(
            &[
                ("Event-Name", "CHANNEL_ANSWER"),
                ("Channel-Call-UUID", "uuid-1"),
                ("Caller-Username", "w_abc"),
            ],
            None,
        );
        assert_eq!(translate(&answer), None);
    }

    #[test]
    fn test_hangup() {
        let hangup = event(
            &[
                ("Event-Name", "CHANNEL_HANGUP_COMPLETE"),
                ("Channel-Call-UUID", "uuid-1"),
                ("variable_sip_call_id", "sip-1"),
            ],
            None,
        );
        assert_eq!(
            translate(&hangup),
            Some(ControllerEvent::ChannelHangup {
                channel_id: "uuid-1".to_string()
            })
        );
    }

    #[test]
    fn test_talking_actions() {
        let talking = |action: &str| {
            translate(&event(
                &[
                    ("Event-Name", "CUSTOM"),
                    ("Event-Subclass", "conference::maintenance"),
                    ("Action", action),
                    ("Channel-Call-UUID", "uuid-1"),
                    ("Caller-Username", "w_abc_1"),
                ],
                None,
            ))
        };

        assert!(matches!(
            talking("start-talking"),
            Some(ControllerEvent::StartTalking { user_id: Some(u), .. }) if u == "w_abc"
        ));
        assert!(matches!(
            talking("stop-talking"),
            Some(ControllerEvent::StopTalking { .. })
        ));
        assert!(matches!(
            talking("mute-member"),
            Some(ControllerEvent::StopTalking { .. })
        ));
        assert_eq!(talking("floor-change"), None);
    }

    #[test]
    fn test_audio_fork_json_result_and_error() {
        let fork_json = |body: &str| {
            translate(&event(
                &[
                    ("Event-Name", "CUSTOM"),
                    ("Event-Subclass", "mod_audio_fork::json"),
                    ("Channel-Call-UUID", "uuid-1"),
                    ("Caller-Username", "w_abc_1"),
                    ("variable_conference_name", "72013"),
                ],
                Some(body),
            ))
        };

        assert_eq!(
            fork_json(r#"{"text":"hi"}"#),
            Some(ControllerEvent::ResultFrame {
                channel_id: "uuid-1".to_string(),
                user_id: Some("w_abc".to_string()),
                conference: Some("72013".to_string()),
                body: r#"{"text":"hi"}"#.to_string(),
            })
        );
        assert!(matches!(
            fork_json(r#"{"errorCode":4001,"errorMessage":"x"}"#),
            Some(ControllerEvent::ErrorFrame { .. })
        ));
    }

    #[test]
    fn test_unrelated_events_are_dropped() {
        assert_eq!(translate(&event(&[("Event-Name", "HEARTBEAT")], None)), None);
        assert_eq!(translate(&event(&[], None)), None);
    }

    #[test]
    fn test_subscription_lists_every_event() {
        assert_eq!(
            subscription(),
            "event plain CHANNEL_ANSWER CHANNEL_HANGUP_COMPLETE CUSTOM \
conference::maintenance mod_audio_fork::json mod_audio_fork::disconnect"
        );
    }
}
