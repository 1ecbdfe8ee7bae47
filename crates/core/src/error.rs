//! Error type shared by the client modules.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Credentials rejected by the session gateway. Carries the gateway's status text verbatim.
    #[error("{0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The connection loop ended before the reply arrived.
    #[error("Connection closed before a reply arrived")]
    ChannelClosed,

    #[error("Timed out waiting for reply to {0}")]
    Timeout(String),

    /// The remote object answered the call with an error.
    #[error("{name}: {message}")]
    Remote { name: String, message: String },

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Failures of the call path itself rather than of the remote operation.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::WebSocket(_)
                | Self::ChannelClosed
                | Self::Timeout(_)
                | Self::Http(_)
        )
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}
