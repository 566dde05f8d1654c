use serde::{Deserialize, Serialize};

use crate::types::{PublishedTrack, RemoteTrackRef, SessionDescription};

/// `POST /session/new`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionRequest {
    pub session_description: SessionDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResponse {
    pub session_id: String,
    pub session_description: SessionDescription,
}

/// `POST /session/{id}/track/publish`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishTracksRequest {
    pub tracks: Vec<PublishedTrack>,
    pub session_description: SessionDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishTracksResponse {
    pub session_description: SessionDescription,
}

/// `POST /session/{id}/track/subscribe`
///
/// The response carries an offer: the SFU drives this exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeTracksRequest {
    pub tracks: Vec<RemoteTrackRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeTracksResponse {
    pub session_description: SessionDescription,
}

/// `PUT /session/{id}/renegotiate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenegotiateRequest {
    pub session_description: SessionDescription,
}
