use confab_media::MediaError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single SFU REST call
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("SFU request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("SFU request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid SFU response: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(#[from] MediaError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Connection was torn down")]
    Destroyed,

    #[error("No active SFU session")]
    NotConnected,

    #[error("Negotiation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<webrtc::Error> for ClientError {
    fn from(e: webrtc::Error) -> Self {
        ClientError::Negotiation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
