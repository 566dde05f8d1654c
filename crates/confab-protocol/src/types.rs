use serde::{Deserialize, Serialize};

/// SDP role of a session description
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Session description exchanged with the SFU
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}

/// A track published by a session.
///
/// `custom_track_name` carries the publisher's participant identity; the SFU
/// echoes it back to subscribers as the track label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublishedTrack {
    pub track_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    pub custom_track_name: String,
}

/// Reference to a track owned by another session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTrackRef {
    pub remote_session_id: String,
    pub remote_track_id: String,
}

impl RemoteTrackRef {
    pub fn new(remote_session_id: impl Into<String>, remote_track_id: impl Into<String>) -> Self {
        Self {
            remote_session_id: remote_session_id.into(),
            remote_track_id: remote_track_id.into(),
        }
    }
}

/// Entry of the session listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
}
