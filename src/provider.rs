//! Transcription provider identifiers.

use crate::error::ForkscribeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Speech-recognition backend a user's audio is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Self-hosted Vosk servers, one per locale.
    Vosk,
    /// Gladia real-time API, reached through the bridge.
    Gladia,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Vosk, Provider::Gladia];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Vosk => "vosk",
            Provider::Gladia => "gladia",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ForkscribeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vosk" => Ok(Provider::Vosk),
            "gladia" => Ok(Provider::Gladia),
            other => Err(ForkscribeError::UnknownProvider {
                name: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_providers() {
        assert_eq!("vosk".parse::<Provider>().unwrap(), Provider::Vosk);
        assert_eq!(" Gladia ".parse::<Provider>().unwrap(), Provider::Gladia);
    }

    #[test]
    fn test_parse_unknown_provider_fails() {
        let err = "whisper".parse::<Provider>().unwrap_err();
        assert!(matches!(err, ForkscribeError::UnknownProvider { name } if name == "whisper"));
    }

    #[test]
    fn test_display_matches_serde_name() {
        for provider in Provider::ALL {
            let json = serde_json::to_string(&provider).unwrap();
            assert_eq!(json, format!("\"{}\"", provider));
        }
    }
}
