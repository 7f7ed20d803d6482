//! Error types for forkscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForkscribeError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Unknown transcription provider: {name}")]
    UnknownProvider { name: String },

    // Settings store / event bus errors
    #[error("Settings store error: {message}")]
    Store { message: String },

    // Event socket (telephony control) errors
    #[error("Event socket disconnected")]
    EslDisconnected,

    #[error("Event socket authentication failed: {message}")]
    EslAuth { message: String },

    #[error("Event socket protocol error: {message}")]
    EslProtocol { message: String },

    #[error("Fork command rejected: {reply}")]
    ForkCommand { reply: String },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // Bridge errors
    #[error("Provider negotiation failed with status {status}: {body}")]
    Negotiation { status: u16, body: String },

    #[error("Invalid handshake: {message}")]
    Handshake { message: String },

    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ForkscribeError>;
