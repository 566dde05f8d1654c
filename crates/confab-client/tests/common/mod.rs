//! In-memory fakes for the signaling, media and peer seams

#![allow(dead_code)]

use async_trait::async_trait;
use confab_client::connection::{ConnectionCallbacks, ConnectionState, StateCallback};
use confab_client::error::{Result, SignalingError};
use confab_client::peer::{
    EndedHandler, EndedNotifier, IceState, IceStateHandler, PeerConnector, PeerTransport,
    RemoteTrack, RemoteTrackHandler, SenderInfo,
};
use confab_client::protocol::{
    NewSessionResponse, PublishedTrack, RemoteTrackRef, SessionDescription, SessionSummary,
};
use confab_client::{
    ConnectionManager, ConnectionOptions, IceServer, ServiceParts, ServiceSettings, SfuService,
    SfuSignaling, TrackSubscriber,
};
use confab_media::{
    LocalMediaStream, LocalTrack, MediaConstraints, MediaDevices, MediaError, MediaKind,
    SampleDevices,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

pub const LOCAL_SESSION: &str = "sess-local";

/// Ordered record of calls across fakes
pub type Events = Arc<Mutex<Vec<String>>>;

pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(events: &Events, event: impl Into<String>) {
    events.lock().push(event.into());
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

pub struct FakeSignaling {
    events: Events,
    local_session: String,
    sessions: Mutex<Vec<String>>,
    tracks: Mutex<HashMap<String, Vec<PublishedTrack>>>,
    broken_sessions: Mutex<HashSet<String>>,
    fail_create_session: AtomicBool,
    fail_subscribe: AtomicBool,
    create_gate: Mutex<Option<Arc<Notify>>>,
    pub published: Mutex<Vec<PublishedTrack>>,
    pub subscriptions: Mutex<Vec<Vec<RemoteTrackRef>>>,
    pub renegotiations: Mutex<Vec<SessionDescription>>,
    pub list_calls: AtomicUsize,
    pub track_calls: Mutex<Vec<String>>,
}

impl FakeSignaling {
    pub fn new(events: Events) -> Arc<Self> {
        Arc::new(Self {
            events,
            local_session: LOCAL_SESSION.to_string(),
            sessions: Mutex::new(Vec::new()),
            tracks: Mutex::new(HashMap::new()),
            broken_sessions: Mutex::new(HashSet::new()),
            fail_create_session: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            create_gate: Mutex::new(None),
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            renegotiations: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            track_calls: Mutex::new(Vec::new()),
        })
    }

    /// Register a remote session publishing `track_ids` as `participant`
    pub fn add_session(&self, session_id: &str, participant: &str, track_ids: &[&str]) {
        let tracks = track_ids
            .iter()
            .map(|track_id| PublishedTrack {
                track_id: track_id.to_string(),
                session_id: session_id.to_string(),
                mid: None,
                custom_track_name: participant.to_string(),
            })
            .collect();
        self.sessions.lock().push(session_id.to_string());
        self.tracks.lock().insert(session_id.to_string(), tracks);
    }

    pub fn add_track(&self, session_id: &str, participant: &str, track_id: &str) {
        self.tracks
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .push(PublishedTrack {
                track_id: track_id.to_string(),
                session_id: session_id.to_string(),
                mid: None,
                custom_track_name: participant.to_string(),
            });
    }

    pub fn break_session(&self, session_id: &str) {
        self.broken_sessions.lock().insert(session_id.to_string());
    }

    pub fn fail_create_session(&self) {
        self.fail_create_session.store(true, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Hold `create_session` until the returned gate is notified
    pub fn gate_create_session(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.create_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

fn server_error(body: &str) -> SignalingError {
    SignalingError::Status {
        status: 500,
        body: body.to_string(),
    }
}

#[async_trait]
impl SfuSignaling for FakeSignaling {
    async fn create_session(
        &self,
        _offer: &SessionDescription,
    ) -> std::result::Result<NewSessionResponse, SignalingError> {
        record(&self.events, "signal:create_session");

        let gate = self.create_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_create_session.load(Ordering::SeqCst) {
            return Err(server_error("session limit reached"));
        }

        Ok(NewSessionResponse {
            session_id: self.local_session.clone(),
            session_description: SessionDescription::answer("answer-session"),
        })
    }

    async fn publish_tracks(
        &self,
        _session_id: &str,
        tracks: &[PublishedTrack],
        _offer: &SessionDescription,
    ) -> std::result::Result<SessionDescription, SignalingError> {
        record(&self.events, "signal:publish_tracks");
        self.published.lock().extend_from_slice(tracks);
        Ok(SessionDescription::answer("answer-publish"))
    }

    async fn subscribe_to_tracks(
        &self,
        _session_id: &str,
        tracks: &[RemoteTrackRef],
    ) -> std::result::Result<SessionDescription, SignalingError> {
        record(&self.events, "signal:subscribe_tracks");
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(server_error("subscribe rejected"));
        }
        self.subscriptions.lock().push(tracks.to_vec());
        Ok(SessionDescription::offer("sfu-offer"))
    }

    async fn renegotiate(
        &self,
        _session_id: &str,
        answer: &SessionDescription,
    ) -> std::result::Result<(), SignalingError> {
        record(&self.events, "signal:renegotiate");
        self.renegotiations.lock().push(answer.clone());
        Ok(())
    }

    async fn list_sessions(&self) -> std::result::Result<Vec<SessionSummary>, SignalingError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut sessions = vec![SessionSummary {
            session_id: self.local_session.clone(),
        }];
        sessions.extend(
            self.sessions
                .lock()
                .iter()
                .map(|id| SessionSummary { session_id: id.clone() }),
        );
        Ok(sessions)
    }

    async fn session_tracks(
        &self,
        session_id: &str,
    ) -> std::result::Result<Vec<PublishedTrack>, SignalingError> {
        self.track_calls.lock().push(session_id.to_string());
        if self.broken_sessions.lock().contains(session_id) {
            return Err(server_error("track listing unavailable"));
        }
        Ok(self.tracks.lock().get(session_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Media devices
// ---------------------------------------------------------------------------

pub struct FailingDevices(pub MediaError);

#[async_trait]
impl MediaDevices for FailingDevices {
    async fn get_user_media(
        &self,
        _constraints: &MediaConstraints,
    ) -> std::result::Result<LocalMediaStream, MediaError> {
        Err(self.0.clone())
    }
}

/// Grants access but yields no tracks
pub struct EmptyDevices;

#[async_trait]
impl MediaDevices for EmptyDevices {
    async fn get_user_media(
        &self,
        _constraints: &MediaConstraints,
    ) -> std::result::Result<LocalMediaStream, MediaError> {
        Ok(LocalMediaStream::new())
    }
}

// ---------------------------------------------------------------------------
// Peer connection
// ---------------------------------------------------------------------------

pub struct FakePeer {
    events: Events,
    tracks: Mutex<Vec<LocalTrack>>,
    track_handler: Mutex<Option<RemoteTrackHandler>>,
    ice_handler: Mutex<Option<IceStateHandler>>,
    ice_state: Mutex<IceState>,
    pub local_descriptions: Mutex<Vec<SessionDescription>>,
    pub remote_descriptions: Mutex<Vec<SessionDescription>>,
    close_count: AtomicUsize,
}

impl FakePeer {
    fn new(events: Events, ice_state: IceState) -> Self {
        Self {
            events,
            tracks: Mutex::new(Vec::new()),
            track_handler: Mutex::new(None),
            ice_handler: Mutex::new(None),
            ice_state: Mutex::new(ice_state),
            local_descriptions: Mutex::new(Vec::new()),
            remote_descriptions: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
        }
    }

    /// Simulate the SFU delivering an inbound track
    pub fn deliver(&self, track: Arc<FakeRemoteTrack>) {
        let handler = self.track_handler.lock().clone();
        if let Some(handler) = handler {
            handler(track);
        }
    }

    pub fn set_ice_state(&self, state: IceState) {
        *self.ice_state.lock() = state;
        let handler = self.ice_handler.lock().clone();
        if let Some(handler) = handler {
            handler(state);
        }
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn attached_track_count(&self) -> usize {
        self.tracks.lock().len()
    }
}

#[async_trait]
impl PeerTransport for FakePeer {
    async fn add_track(&self, track: &LocalTrack) -> Result<()> {
        record(&self.events, "peer:add_track");
        self.tracks.lock().push(track.clone());
        Ok(())
    }

    async fn senders(&self) -> Vec<SenderInfo> {
        self.tracks
            .lock()
            .iter()
            .enumerate()
            .map(|(index, track)| SenderInfo {
                track_id: Some(track.id().to_string()),
                mid: Some(index.to_string()),
            })
            .collect()
    }

    fn on_track(&self, handler: RemoteTrackHandler) {
        record(&self.events, "peer:on_track");
        *self.track_handler.lock() = Some(handler);
    }

    fn on_ice_state_change(&self, handler: IceStateHandler) {
        record(&self.events, "peer:on_ice_state_change");
        *self.ice_handler.lock() = Some(handler);
    }

    fn ice_state(&self) -> IceState {
        *self.ice_state.lock()
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        record(&self.events, "peer:create_offer");
        Ok(SessionDescription::offer("local-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        record(&self.events, "peer:create_answer");
        Ok(SessionDescription::answer("local-answer"))
    }

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()> {
        record(&self.events, format!("peer:set_local:{}", sdp_kind(description)));
        self.local_descriptions.lock().push(description.clone());
        Ok(())
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()> {
        record(&self.events, format!("peer:set_remote:{}", sdp_kind(description)));
        self.remote_descriptions.lock().push(description.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        record(&self.events, "peer:close");
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.close_count() > 0
    }
}

fn sdp_kind(description: &SessionDescription) -> &'static str {
    if description.is_offer() { "offer" } else { "answer" }
}

pub struct FakeConnector {
    events: Events,
    initial_ice: IceState,
    peers: Mutex<Vec<Arc<FakePeer>>>,
}

impl FakeConnector {
    pub fn new(events: Events, initial_ice: IceState) -> Arc<Self> {
        Arc::new(Self {
            events,
            initial_ice,
            peers: Mutex::new(Vec::new()),
        })
    }

    pub fn last_peer(&self) -> Option<Arc<FakePeer>> {
        self.peers.lock().last().cloned()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn connect(&self, _ice_servers: &[IceServer]) -> Result<Arc<dyn PeerTransport>> {
        record(&self.events, "peer:connect");
        let peer = Arc::new(FakePeer::new(self.events.clone(), self.initial_ice));
        self.peers.lock().push(peer.clone());
        Ok(peer)
    }
}

pub struct FakeRemoteTrack {
    id: String,
    label: String,
    kind: MediaKind,
    ended: EndedNotifier,
}

impl FakeRemoteTrack {
    pub fn new(id: &str, label: &str, kind: MediaKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            label: label.to_string(),
            kind,
            ended: EndedNotifier::new(),
        })
    }

    pub fn end(&self) {
        self.ended.fire();
    }
}

impl RemoteTrack for FakeRemoteTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn is_live(&self) -> bool {
        !self.ended.is_ended()
    }

    fn on_ended(&self, handler: EndedHandler) {
        self.ended.subscribe(handler);
    }
}

// ---------------------------------------------------------------------------
// Subscriber and callbacks
// ---------------------------------------------------------------------------

pub struct FakeSubscriber {
    session_id: Mutex<Option<String>>,
    fail: AtomicBool,
    pub calls: Mutex<Vec<Vec<RemoteTrackRef>>>,
}

impl FakeSubscriber {
    pub fn new(session_id: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            session_id: Mutex::new(session_id.map(String::from)),
            fail: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TrackSubscriber for FakeSubscriber {
    fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    async fn subscribe(&self, tracks: &[RemoteTrackRef]) -> Result<()> {
        self.calls.lock().push(tracks.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(confab_client::ClientError::Negotiation(
                "subscribe failed".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct StateRecorder {
    states: Arc<Mutex<Vec<ConnectionState>>>,
}

impl StateRecorder {
    pub fn callback(&self) -> StateCallback {
        let states = self.states.clone();
        Arc::new(move |state| states.lock().push(state))
    }

    pub fn all(&self) -> Vec<ConnectionState> {
        self.states.lock().clone()
    }

    pub fn last(&self) -> Option<ConnectionState> {
        self.states.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.states.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

pub struct Harness {
    pub events: Events,
    pub signaling: Arc<FakeSignaling>,
    pub connector: Arc<FakeConnector>,
    pub states: StateRecorder,
}

impl Harness {
    pub fn new(initial_ice: IceState) -> Self {
        let events = events();
        Self {
            signaling: FakeSignaling::new(events.clone()),
            connector: FakeConnector::new(events.clone(), initial_ice),
            states: StateRecorder::default(),
            events,
        }
    }

    pub fn connection(
        &self,
        devices: Arc<dyn MediaDevices>,
        on_remote_track: RemoteTrackHandler,
    ) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(
            ConnectionOptions::new("alice", "room-1"),
            self.signaling.clone(),
            devices,
            self.connector.clone(),
            ConnectionCallbacks {
                on_remote_track,
                on_state_change: self.states.callback(),
            },
        ))
    }

    pub fn service_parts(&self) -> ServiceParts {
        ServiceParts {
            signaling: self.signaling.clone(),
            devices: Arc::new(SampleDevices),
            connector: self.connector.clone(),
        }
    }

    pub fn service(&self, settings: ServiceSettings) -> SfuService {
        SfuService::with_parts(
            self.service_parts(),
            ConnectionOptions::new("alice", "room-1"),
            settings,
            self.states.callback(),
        )
    }

    pub fn peer(&self) -> Arc<FakePeer> {
        self.connector.last_peer().expect("no peer connection created")
    }

    pub fn event_log(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}
