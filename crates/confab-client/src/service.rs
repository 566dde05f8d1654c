//! Facade composing signaling, connection and track management
//!
//! Construction order is fixed: signaling client, then connection manager,
//! then track manager (which needs the connection to subscribe). Teardown
//! runs the other way: stop discovery, close the connection, clear state.

use confab_media::{LocalMediaStream, MediaDevices, SampleDevices};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::config::{ClientConfig, ConnectionOptions};
use crate::connection::{ConnectionCallbacks, ConnectionManager, ConnectionState, StateCallback};
use crate::error::{ClientError, Result};
use crate::liveness::Liveness;
use crate::peer::{PeerConnector, RemoteTrack, WebRtcConnector};
use crate::signaling::{SfuSignaling, SignalingClient};
use crate::stream::MediaStreamInfo;
use crate::tracks::{DiscoverySettings, TrackManager};

/// The collaborators a service is built from
pub struct ServiceParts {
    pub signaling: Arc<dyn SfuSignaling>,
    pub devices: Arc<dyn MediaDevices>,
    pub connector: Arc<dyn PeerConnector>,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub discovery: DiscoverySettings,
    /// Upper bound on the whole negotiation sequence
    pub negotiation_timeout: Option<Duration>,
}

impl From<&ClientConfig> for ServiceSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            discovery: DiscoverySettings {
                poll_interval: config.discovery_interval(),
                rescan: config.rescan_discovered_sessions,
            },
            negotiation_timeout: config.negotiation_timeout(),
        }
    }
}

/// Cheap to clone; clones drive the same room connection
#[derive(Clone)]
pub struct SfuService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    options: ConnectionOptions,
    connection: Arc<ConnectionManager>,
    tracks: Arc<TrackManager>,
    liveness: Liveness,
    state: Mutex<ConnectionState>,
    on_state: StateCallback,
    negotiation_timeout: Option<Duration>,
}

impl ServiceInner {
    /// Record a connection-level state, annotated with the current
    /// participant count
    fn publish_state(&self, state: ConnectionState) {
        let merged = ConnectionState {
            remote_participant_count: self.tracks.remote_participant_count(),
            ..state
        };
        *self.state.lock() = merged.clone();

        if self.liveness.is_alive() {
            (self.on_state)(merged);
        }
    }

    fn publish_participant_count(&self, count: usize) {
        let merged = {
            let mut state = self.state.lock();
            state.remote_participant_count = count;
            state.clone()
        };

        if self.liveness.is_alive() {
            (self.on_state)(merged);
        }
    }
}

impl SfuService {
    /// Build a service that talks to the configured SFU over webrtc-rs
    pub fn new(
        config: &ClientConfig,
        options: ConnectionOptions,
        on_state: StateCallback,
    ) -> Result<Self> {
        let signaling = SignalingClient::new(&config.endpoint, config.request_timeout())?;
        let parts = ServiceParts {
            signaling: Arc::new(signaling),
            devices: Arc::new(SampleDevices),
            connector: Arc::new(WebRtcConnector::new()?),
        };
        let options = options.resolve_ice_servers(&config.default_ice_servers);

        Ok(Self::with_parts(parts, options, ServiceSettings::from(config), on_state))
    }

    pub fn with_parts(
        parts: ServiceParts,
        options: ConnectionOptions,
        settings: ServiceSettings,
        on_state: StateCallback,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ServiceInner>| {
            let track_sink = weak.clone();
            let state_sink = weak.clone();
            let callbacks = ConnectionCallbacks {
                on_remote_track: Arc::new(move |track: Arc<dyn RemoteTrack>| {
                    if let Some(inner) = track_sink.upgrade() {
                        inner.tracks.handle_remote_track(track);
                    }
                }),
                on_state_change: Arc::new(move |state: ConnectionState| {
                    if let Some(inner) = state_sink.upgrade() {
                        inner.publish_state(state);
                    }
                }),
            };

            let connection = Arc::new(ConnectionManager::new(
                options.clone(),
                parts.signaling.clone(),
                parts.devices,
                parts.connector,
                callbacks,
            ));

            let update_sink = weak.clone();
            let tracks = Arc::new(TrackManager::new(
                parts.signaling,
                connection.clone(),
                settings.discovery,
                Arc::new(move |count: usize| {
                    if let Some(inner) = update_sink.upgrade() {
                        inner.publish_participant_count(count);
                    }
                }),
            ));

            ServiceInner {
                options,
                connection,
                tracks,
                liveness: Liveness::new(),
                state: Mutex::new(ConnectionState::default()),
                on_state,
                negotiation_timeout: settings.negotiation_timeout,
            }
        });

        Self { inner }
    }

    /// Negotiate the connection, then start discovering participants
    pub async fn initialize(&self) -> Result<()> {
        let inner = &self.inner;
        tracing::info!(
            "Joining room {} as {}",
            inner.options.room_id,
            inner.options.local_user_id
        );

        let negotiation = inner.connection.initialize();
        let result = match inner.negotiation_timeout {
            Some(limit) => match tokio::time::timeout(limit, negotiation).await {
                Ok(result) => result,
                Err(_) => {
                    let err = ClientError::Timeout(limit);
                    tracing::error!("{}", err);
                    inner.publish_state(ConnectionState::failed(err.to_string()));
                    Err(err)
                }
            },
            None => negotiation.await,
        };

        let session_id = result?;
        inner.liveness.ensure_alive()?;

        inner.tracks.start_polling();
        tracing::info!("Joined room {} with session {}", inner.options.room_id, session_id);
        Ok(())
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    pub fn local_stream(&self) -> Option<LocalMediaStream> {
        self.inner.connection.local_stream()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.connection.session_id()
    }

    pub fn remote_streams(&self) -> HashMap<String, MediaStreamInfo> {
        self.inner.tracks.remote_streams()
    }

    pub fn remote_participant_count(&self) -> usize {
        self.inner.tracks.remote_participant_count()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().clone()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.liveness.is_alive()
    }

    /// Tear everything down. Safe to call more than once.
    pub async fn destroy(&self) {
        let inner = &self.inner;
        if !inner.liveness.kill() {
            return;
        }

        inner.tracks.stop();
        inner.connection.destroy().await;
        inner.tracks.clear();
        tracing::info!("Left room {}", inner.options.room_id);
    }
}
