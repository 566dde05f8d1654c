//! Local peer connection and media ownership
//!
//! Negotiation runs strictly in order: acquire media, create the peer
//! connection, attach local tracks, arm the remote track sink, establish the
//! SFU session (client offers), publish tracks (client offers), then monitor
//! ICE. Subscriptions run the other way round: the SFU offers and we answer.

use async_trait::async_trait;
use confab_media::{LocalMediaStream, MediaConstraints, MediaDevices};
use confab_protocol::{PublishedTrack, RemoteTrackRef, SessionDescription};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::ConnectionOptions;
use crate::error::{ClientError, Result};
use crate::liveness::Liveness;
use crate::peer::{
    IceState, IceStateHandler, PeerConnector, PeerTransport, RemoteTrack, RemoteTrackHandler,
};
use crate::signaling::SfuSignaling;

/// Last-known connection summary for the UI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub error: Option<String>,
    pub remote_participant_count: usize,
}

impl ConnectionState {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            error: Some(error.into()),
            remote_participant_count: 0,
        }
    }

    fn from_ice(state: IceState) -> Option<Self> {
        match state {
            IceState::Connected | IceState::Completed => Some(Self::connected()),
            IceState::Disconnected => Some(Self::disconnected()),
            IceState::Failed => Some(Self::failed("ICE connection failed")),
            _ => None,
        }
    }
}

pub type StateCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

#[derive(Clone)]
pub struct ConnectionCallbacks {
    pub on_remote_track: RemoteTrackHandler,
    pub on_state_change: StateCallback,
}

/// Requests remote tracks on behalf of the track layer
#[async_trait]
pub trait TrackSubscriber: Send + Sync {
    /// SFU-assigned id of the local session, once established
    fn session_id(&self) -> Option<String>;

    async fn subscribe(&self, tracks: &[RemoteTrackRef]) -> Result<()>;
}

pub struct ConnectionManager {
    options: ConnectionOptions,
    signaling: Arc<dyn SfuSignaling>,
    devices: Arc<dyn MediaDevices>,
    connector: Arc<dyn PeerConnector>,
    callbacks: ConnectionCallbacks,
    liveness: Liveness,
    started: AtomicBool,
    peer: RwLock<Option<Arc<dyn PeerTransport>>>,
    local_stream: RwLock<Option<LocalMediaStream>>,
    session_id: RwLock<Option<String>>,
    /// Serializes SDP exchanges on the single peer connection
    negotiation: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    pub fn new(
        options: ConnectionOptions,
        signaling: Arc<dyn SfuSignaling>,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<dyn PeerConnector>,
        callbacks: ConnectionCallbacks,
    ) -> Self {
        Self {
            options,
            signaling,
            devices,
            connector,
            callbacks,
            liveness: Liveness::new(),
            started: AtomicBool::new(false),
            peer: RwLock::new(None),
            local_stream: RwLock::new(None),
            session_id: RwLock::new(None),
            negotiation: tokio::sync::Mutex::new(()),
        }
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn local_stream(&self) -> Option<LocalMediaStream> {
        self.local_stream.read().clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    fn emit_state(&self, state: ConnectionState) {
        if self.liveness.is_alive() {
            (self.callbacks.on_state_change)(state);
        }
    }

    /// Run the full negotiation sequence. Returns the SFU session id.
    ///
    /// Any failure aborts the sequence and is reported through the state
    /// callback. A teardown during negotiation yields [`ClientError::Destroyed`]
    /// and no callback.
    pub async fn initialize(&self) -> Result<String> {
        // Re-entry leaves the running connection and its reported state alone
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Negotiation(
                "Connection already initialized".to_string(),
            ));
        }

        match self.negotiate().await {
            Ok(session_id) => Ok(session_id),
            Err(ClientError::Destroyed) => {
                tracing::debug!("Negotiation discarded after teardown");
                Err(ClientError::Destroyed)
            }
            Err(e) => {
                tracing::error!("Connection attempt failed: {}", e);
                self.emit_state(ConnectionState::failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn negotiate(&self) -> Result<String> {
        self.liveness.ensure_alive()?;

        let stream = self.acquire_media().await?;
        let peer = self.create_peer_connection().await?;

        for track in stream.tracks() {
            peer.add_track(track).await?;
            self.liveness.ensure_alive()?;
        }
        tracing::debug!("Attached {} local track(s)", stream.tracks().len());

        self.arm_remote_track_sink(&peer);

        let session_id = self.establish_session(&peer).await?;
        self.publish_tracks(&peer, &session_id).await?;
        self.monitor_ice_state(&peer);

        Ok(session_id)
    }

    async fn acquire_media(&self) -> Result<LocalMediaStream> {
        tracing::info!("Acquiring camera and microphone for {}", self.options.local_user_id);
        let stream = self
            .devices
            .get_user_media(&MediaConstraints::audio_video())
            .await?;

        *self.local_stream.write() = Some(stream.clone());
        if !self.liveness.is_alive() {
            // Teardown may have run before the stream was stored
            self.local_stream.write().take();
            stream.stop_all();
            return Err(ClientError::Destroyed);
        }

        Ok(stream)
    }

    async fn create_peer_connection(&self) -> Result<Arc<dyn PeerTransport>> {
        let peer = self.connector.connect(&self.options.ice_servers).await?;

        *self.peer.write() = Some(peer.clone());
        if !self.liveness.is_alive() {
            let stored = self.peer.write().take();
            if stored.is_some() {
                if let Err(e) = peer.close().await {
                    tracing::warn!("Error closing discarded peer connection: {}", e);
                }
            }
            return Err(ClientError::Destroyed);
        }

        Ok(peer)
    }

    fn arm_remote_track_sink(&self, peer: &Arc<dyn PeerTransport>) {
        let liveness = self.liveness.clone();
        let on_remote_track = self.callbacks.on_remote_track.clone();

        peer.on_track(Arc::new(move |track: Arc<dyn RemoteTrack>| {
            if !liveness.is_alive() {
                tracing::debug!("Ignoring remote track {} after teardown", track.id());
                return;
            }
            on_remote_track(track);
        }));
    }

    /// Client offers, SFU answers. Yields the session id.
    async fn establish_session(&self, peer: &Arc<dyn PeerTransport>) -> Result<String> {
        let _guard = self.negotiation.lock().await;

        let offer = peer.create_offer().await?;
        peer.set_local_description(&offer).await?;
        self.liveness.ensure_alive()?;

        let response = self.signaling.create_session(&offer).await?;
        self.liveness.ensure_alive()?;

        let answer = expect_answer(response.session_description)?;
        peer.set_remote_description(&answer).await?;
        self.liveness.ensure_alive()?;

        *self.session_id.write() = Some(response.session_id.clone());
        tracing::info!(
            "Established SFU session {} for room {}",
            response.session_id,
            self.options.room_id
        );
        Ok(response.session_id)
    }

    /// Client offers the now-attached senders, SFU answers.
    async fn publish_tracks(&self, peer: &Arc<dyn PeerTransport>, session_id: &str) -> Result<()> {
        let _guard = self.negotiation.lock().await;

        let tracks: Vec<PublishedTrack> = peer
            .senders()
            .await
            .into_iter()
            .filter_map(|sender| {
                Some(PublishedTrack {
                    track_id: sender.track_id?,
                    session_id: session_id.to_string(),
                    mid: sender.mid,
                    custom_track_name: self.options.local_user_id.clone(),
                })
            })
            .collect();

        if tracks.is_empty() {
            tracing::info!("No local tracks to publish");
            return Ok(());
        }

        let offer = peer.create_offer().await?;
        peer.set_local_description(&offer).await?;
        self.liveness.ensure_alive()?;

        let answer = self
            .signaling
            .publish_tracks(session_id, &tracks, &offer)
            .await?;
        self.liveness.ensure_alive()?;

        peer.set_remote_description(&expect_answer(answer)?).await?;
        self.liveness.ensure_alive()?;

        tracing::info!("Published {} track(s) as {}", tracks.len(), self.options.local_user_id);
        Ok(())
    }

    fn monitor_ice_state(&self, peer: &Arc<dyn PeerTransport>) {
        let liveness = self.liveness.clone();
        let on_state_change = self.callbacks.on_state_change.clone();

        let handler: IceStateHandler = Arc::new(move |state: IceState| {
            if !liveness.is_alive() {
                return;
            }
            tracing::info!("ICE connection state: {:?}", state);
            if let Some(connection_state) = ConnectionState::from_ice(state) {
                on_state_change(connection_state);
            }
        });

        peer.on_ice_state_change(handler.clone());
        // ICE may have connected while we were still negotiating
        handler(peer.ice_state());
    }

    /// SFU offers the requested tracks, we answer and renegotiate.
    pub async fn subscribe_to_remote_tracks(&self, tracks: &[RemoteTrackRef]) -> Result<()> {
        self.liveness.ensure_alive()?;
        let peer = self.peer.read().clone().ok_or(ClientError::NotConnected)?;
        let session_id = self.session_id().ok_or(ClientError::NotConnected)?;

        let _guard = self.negotiation.lock().await;
        self.liveness.ensure_alive()?;

        let offer = self.signaling.subscribe_to_tracks(&session_id, tracks).await?;
        self.liveness.ensure_alive()?;

        if !offer.is_offer() {
            return Err(ClientError::Negotiation(
                "SFU answered a subscription with a non-offer description".to_string(),
            ));
        }
        peer.set_remote_description(&offer).await?;
        self.liveness.ensure_alive()?;

        let answer = peer.create_answer().await?;
        peer.set_local_description(&answer).await?;
        self.liveness.ensure_alive()?;

        self.signaling.renegotiate(&session_id, &answer).await?;
        tracing::info!("Subscribed to {} remote track(s)", tracks.len());
        Ok(())
    }

    /// Close the peer connection and stop local media. Only the first call
    /// has any effect.
    pub async fn destroy(&self) {
        if !self.liveness.kill() {
            return;
        }

        let peer = self.peer.write().take();
        if let Some(peer) = peer {
            if let Err(e) = peer.close().await {
                tracing::warn!("Error closing peer connection: {}", e);
            }
        }

        let stream = self.local_stream.write().take();
        if let Some(stream) = stream {
            stream.stop_all();
        }

        self.session_id.write().take();
        tracing::info!("Connection for {} torn down", self.options.local_user_id);
    }
}

fn expect_answer(description: SessionDescription) -> Result<SessionDescription> {
    if description.is_offer() {
        return Err(ClientError::Negotiation(
            "SFU returned an offer where an answer was expected".to_string(),
        ));
    }
    Ok(description)
}

#[async_trait]
impl TrackSubscriber for ConnectionManager {
    fn session_id(&self) -> Option<String> {
        ConnectionManager::session_id(self)
    }

    async fn subscribe(&self, tracks: &[RemoteTrackRef]) -> Result<()> {
        self.subscribe_to_remote_tracks(tracks).await
    }
}
