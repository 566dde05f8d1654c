//! Typed REST client for the SFU's HTTP API
//!
//! One method per endpoint. No retries: a failed call surfaces as a
//! [`SignalingError`] and the caller decides what to do.

mod api;

use async_trait::async_trait;
use confab_protocol::{
    NewSessionRequest, NewSessionResponse, PublishTracksRequest, PublishTracksResponse,
    PublishedTrack, RemoteTrackRef, RenegotiateRequest, SessionDescription, SessionSummary,
    SubscribeTracksRequest, SubscribeTracksResponse,
};
use std::time::Duration;

use crate::config::SfuEndpoint;
use crate::error::SignalingError;

/// The SFU calls the connection and track layers depend on
#[async_trait]
pub trait SfuSignaling: Send + Sync {
    /// Send the local offer, receive the session id and the SFU's answer
    async fn create_session(
        &self,
        offer: &SessionDescription,
    ) -> Result<NewSessionResponse, SignalingError>;

    /// Send local tracks with a renegotiation offer, receive the answer
    async fn publish_tracks(
        &self,
        session_id: &str,
        tracks: &[PublishedTrack],
        offer: &SessionDescription,
    ) -> Result<SessionDescription, SignalingError>;

    /// Request remote tracks; the SFU answers with an offer
    async fn subscribe_to_tracks(
        &self,
        session_id: &str,
        tracks: &[RemoteTrackRef],
    ) -> Result<SessionDescription, SignalingError>;

    /// Complete a subscription with the local answer
    async fn renegotiate(
        &self,
        session_id: &str,
        answer: &SessionDescription,
    ) -> Result<(), SignalingError>;

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SignalingError>;

    async fn session_tracks(&self, session_id: &str) -> Result<Vec<PublishedTrack>, SignalingError>;
}

#[derive(Debug, Clone)]
pub struct SignalingClient {
    http: reqwest::Client,
    base_url: String,
    secret: String,
}

impl SignalingClient {
    pub fn new(endpoint: &SfuEndpoint, request_timeout: Duration) -> Result<Self, SignalingError> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            http,
            base_url: endpoint.base_url(),
            secret: endpoint.secret.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SfuSignaling for SignalingClient {
    async fn create_session(
        &self,
        offer: &SessionDescription,
    ) -> Result<NewSessionResponse, SignalingError> {
        let request = NewSessionRequest {
            session_description: offer.clone(),
        };
        let response: NewSessionResponse =
            api::post(&self.http, &self.url("/session/new"), &request, &self.secret).await?;

        tracing::debug!("SFU created session {}", response.session_id);
        Ok(response)
    }

    async fn publish_tracks(
        &self,
        session_id: &str,
        tracks: &[PublishedTrack],
        offer: &SessionDescription,
    ) -> Result<SessionDescription, SignalingError> {
        let request = PublishTracksRequest {
            tracks: tracks.to_vec(),
            session_description: offer.clone(),
        };
        let response: PublishTracksResponse = api::post(
            &self.http,
            &self.url(&format!("/session/{}/track/publish", session_id)),
            &request,
            &self.secret,
        )
        .await?;

        Ok(response.session_description)
    }

    async fn subscribe_to_tracks(
        &self,
        session_id: &str,
        tracks: &[RemoteTrackRef],
    ) -> Result<SessionDescription, SignalingError> {
        let request = SubscribeTracksRequest {
            tracks: tracks.to_vec(),
        };
        let response: SubscribeTracksResponse = api::post(
            &self.http,
            &self.url(&format!("/session/{}/track/subscribe", session_id)),
            &request,
            &self.secret,
        )
        .await?;

        Ok(response.session_description)
    }

    async fn renegotiate(
        &self,
        session_id: &str,
        answer: &SessionDescription,
    ) -> Result<(), SignalingError> {
        let request = RenegotiateRequest {
            session_description: answer.clone(),
        };
        api::put_discard(
            &self.http,
            &self.url(&format!("/session/{}/renegotiate", session_id)),
            &request,
            &self.secret,
        )
        .await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SignalingError> {
        api::get(&self.http, &self.url("/sessions"), &self.secret).await
    }

    async fn session_tracks(&self, session_id: &str) -> Result<Vec<PublishedTrack>, SignalingError> {
        api::get(
            &self.http,
            &self.url(&format!("/session/{}/tracks", session_id)),
            &self.secret,
        )
        .await
    }
}
