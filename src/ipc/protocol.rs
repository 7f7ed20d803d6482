//! JSON message protocol for the controller's control socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commands sent by the CLI (or a bus relay) to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Inject an inbound event-bus message
    Bus { message: Value },
    /// Get controller status
    Status,
    /// Stream every published message until the client disconnects
    Subscribe,
}

impl Command {
    /// Serialize command to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize command from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Responses sent by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Command succeeded
    Ok,
    /// Current controller status
    Status {
        version: String,
        esl_connected: bool,
        channels: usize,
        active: usize,
        stop_pending: usize,
        restart_pending: usize,
    },
    /// A message the controller published on the bus
    Published { channel: String, message: Value },
    /// Error occurred
    Error { message: String },
}

impl Response {
    /// Serialize response to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_json_format_examples() {
        assert_eq!(Command::Status.to_json().unwrap(), r#"{"type":"status"}"#);
        assert_eq!(
            Command::Subscribe.to_json().unwrap(),
            r#"{"type":"subscribe"}"#
        );

        let bus = Command::Bus {
            message: json!({ "core": { "header": { "name": "X" } } }),
        };
        assert_eq!(
            bus.to_json().unwrap(),
            r#"{"type":"bus","message":{"core":{"header":{"name":"X"}}}}"#
        );
    }

    #[test]
    fn test_bus_command_parses_from_relay_line() {
        let line = r#"{"type":"bus","message":{"envelope":{"name":"MeetingCreatedEvtMsg"}}}"#;
        match Command::from_json(line).unwrap() {
            Command::Bus { message } => {
                assert_eq!(message["envelope"]["name"], "MeetingCreatedEvtMsg")
            }
            other => panic!("Expected Bus command, got {:?}", other),
        }
    }

    #[test]
    fn test_response_status_fields() {
        let resp = Response::Status {
            version: "0.1.0".to_string(),
            esl_connected: true,
            channels: 3,
            active: 2,
            stop_pending: 1,
            restart_pending: 0,
        };
        let json = resp.to_json().expect("should serialize");
        assert!(json.contains("\"type\":\"status\""));
        assert!(json.contains("\"esl_connected\":true"));
        assert!(json.contains("\"stop_pending\":1"));
        assert_eq!(Response::from_json(&json).unwrap(), resp);
    }

    #[test]
    fn test_response_published_carries_message() {
        let resp = Response::Published {
            channel: "to-akka-apps-redis-channel".to_string(),
            message: json!({ "core": { "body": { "result": true } } }),
        };
        let json = resp.to_json().unwrap();
        assert!(json.starts_with(r#"{"type":"published""#));
        assert_eq!(Response::from_json(&json).unwrap(), resp);
    }

    #[test]
    fn test_response_error_with_special_chars() {
        let resp = Response::Error {
            message: "Error: \"bad\" input (line 1)".to_string(),
        };
        let json = resp.to_json().unwrap();
        assert_eq!(Response::from_json(&json).unwrap(), resp);
    }

    #[test]
    fn test_invalid_json_returns_error() {
        assert!(Command::from_json(r#"{"type": "toggle"}"#).is_err());
        assert!(Command::from_json(r#"{"invalid": "json"}"#).is_err());
        assert!(Command::from_json("not json at all").is_err());
        assert!(Command::from_json(r#"{"type":"bus"}"#).is_err());
    }
}
