//! Event socket wire framing.
//!
//! Every message is a block of `Name: value` header lines ended by a blank
//! line, followed by `Content-Length` bytes of body when that header is set.
//! Events (`text/event-plain`) nest the same layout inside the body, with
//! percent-encoded header values.

use crate::error::{ForkscribeError, Result};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EslFrame {
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl EslFrame {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// `Reply-Text` of a `command/reply` frame.
    pub fn reply_text(&self) -> &str {
        self.header("Reply-Text").unwrap_or_default()
    }
}

/// Read one frame. `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<EslFrame>>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = HashMap::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            if headers.is_empty() {
                return Ok(None);
            }
            return Err(ForkscribeError::EslProtocol {
                message: "connection closed inside a frame".to_string(),
            });
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if headers.is_empty() {
                continue;
            }
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_string(), value.trim().to_string());
        }
    }

    let body = match headers.get("Content-Length") {
        Some(length) => {
            let length: usize = length.parse().map_err(|_| ForkscribeError::EslProtocol {
                message: format!("bad Content-Length '{}'", length),
            })?;
            let mut buf = vec![0u8; length];
            reader.read_exact(&mut buf).await?;
            Some(String::from_utf8_lossy(&buf).into_owned())
        }
        None => None,
    };

    Ok(Some(EslFrame { headers, body }))
}

/// Parse the body of a `text/event-plain` frame into an event.
pub fn parse_event_plain(text: &str) -> EslFrame {
    let (head, rest) = text.split_once("\n\n").unwrap_or((text, ""));

    let headers: HashMap<String, String> = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| {
            (
                name.trim().to_string(),
                percent_decode_str(value.trim())
                    .decode_utf8_lossy()
                    .into_owned(),
            )
        })
        .collect();

    let body = headers
        .get("Content-Length")
        .and_then(|length| length.parse::<usize>().ok())
        .map(|length| rest.get(..length).unwrap_or(rest).to_string());

    EslFrame { headers, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_reads_header_only_and_body_frames() {
        let wire: &[u8] = b"Content-Type: auth/request\n\n\
Content-Type: api/response\nContent-Length: 3\n\n+OK\
Content-Type: command/reply\nReply-Text: +OK accepted\n\n";
        let mut reader = BufReader::new(wire);

        let auth = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(auth.content_type(), Some("auth/request"));
        assert_eq!(auth.body, None);

        let api = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(api.content_type(), Some("api/response"));
        assert_eq!(api.body.as_deref(), Some("+OK"));

        let reply = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(reply.reply_text(), "+OK accepted");

        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        let wire: &[u8] = b"Content-Type: api/response\n";
        let mut reader = BufReader::new(wire);
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_bad_content_length_is_an_error() {
        let wire: &[u8] = b"Content-Type: api/response\nContent-Length: lots\n\n";
        let mut reader = BufReader::new(wire);
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(ForkscribeError::EslProtocol { .. })
        ));
    }

    #[test]
    fn test_event_plain_decodes_values_and_body() {
        let text = "Event-Name: CUSTOM\nEvent-Subclass: mod_audio_fork%3A%3Ajson\n\
Caller-Username: w_abc_1-bbbID-Jane%20Doe\nContent-Length: 13\n\n{\"text\":\"hi\"}\n\n";
        let event = parse_event_plain(text);
        assert_eq!(event.header("Event-Subclass"), Some("mod_audio_fork::json"));
        assert_eq!(event.header("Caller-Username"), Some("w_abc_1-bbbID-Jane Doe"));
        assert_eq!(event.body.as_deref(), Some("{\"text\":\"hi\"}"));
    }

    #[test]
    fn test_event_plain_without_body() {
        let event = parse_event_plain("Event-Name: CHANNEL_ANSWER\n\n");
        assert_eq!(event.header("Event-Name"), Some("CHANNEL_ANSWER"));
        assert_eq!(event.body, None);
    }
}
