//! Remote participant discovery and remote stream bookkeeping
//!
//! A poll loop lists the SFU's sessions and subscribes to each new session's
//! tracks at most once. Inbound tracks are grouped by label into one
//! [`MediaStreamInfo`] per participant.

use confab_protocol::{PublishedTrack, RemoteTrackRef};
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::connection::TrackSubscriber;
use crate::liveness::Liveness;
use crate::peer::RemoteTrack;
use crate::signaling::SfuSignaling;
use crate::stream::{MediaStream, MediaStreamInfo};

/// Called with the remote participant count whenever the stream map changes
pub type UpdateCallback = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub poll_interval: Duration,
    /// Re-list the tracks of already-seen sessions on every tick
    pub rescan: bool,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(3000),
            rescan: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TrackKey {
    session_id: String,
    track_id: String,
}

impl TrackKey {
    fn new(session_id: &str, track_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            track_id: track_id.to_string(),
        }
    }
}

pub struct TrackManager {
    signaling: Arc<dyn SfuSignaling>,
    subscriber: Arc<dyn TrackSubscriber>,
    settings: DiscoverySettings,
    liveness: Liveness,
    discovered: Mutex<HashSet<String>>,
    subscribed: Mutex<HashSet<TrackKey>>,
    streams: RwLock<HashMap<String, MediaStreamInfo>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    on_update: UpdateCallback,
}

impl TrackManager {
    pub fn new(
        signaling: Arc<dyn SfuSignaling>,
        subscriber: Arc<dyn TrackSubscriber>,
        settings: DiscoverySettings,
        on_update: UpdateCallback,
    ) -> Self {
        Self {
            signaling,
            subscriber,
            settings,
            liveness: Liveness::new(),
            discovered: Mutex::new(HashSet::new()),
            subscribed: Mutex::new(HashSet::new()),
            streams: RwLock::new(HashMap::new()),
            poll_task: Mutex::new(None),
            on_update,
        }
    }

    /// Start the discovery loop. The first tick runs immediately. Calling
    /// this again while a loop is running does nothing.
    pub fn start_polling(self: &Arc<Self>) {
        if !self.liveness.is_alive() {
            return;
        }

        let mut poll_task = self.poll_task.lock();
        if poll_task.is_some() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.poll_interval;
        *poll_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let Some(manager) = weak.upgrade() else { break };
                if !manager.liveness.is_alive() {
                    break;
                }
                manager.poll_once().await;
            }
        }));

        tracing::debug!("Discovery polling every {:?}", period);
    }

    /// One discovery pass: list sessions, then inspect every new one
    /// concurrently. Errors are logged and the pass carries on.
    pub async fn poll_once(&self) {
        let Some(local_session) = self.subscriber.session_id() else {
            tracing::debug!("Skipping discovery: no local session yet");
            return;
        };

        let sessions = match self.signaling.list_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::warn!("Failed to list SFU sessions: {}", e);
                return;
            }
        };
        if !self.liveness.is_alive() {
            return;
        }

        // A session listed twice is still inspected once per pass
        let to_inspect: HashSet<String> = {
            let mut discovered = self.discovered.lock();
            sessions
                .into_iter()
                .map(|s| s.session_id)
                .filter(|id| *id != local_session)
                .filter(|id| discovered.insert(id.clone()) || self.settings.rescan)
                .collect()
        };

        if to_inspect.is_empty() {
            return;
        }
        tracing::debug!("Inspecting {} remote session(s)", to_inspect.len());

        join_all(to_inspect.iter().map(|id| self.inspect_session(id))).await;
    }

    async fn inspect_session(&self, session_id: &str) {
        let tracks = match self.signaling.session_tracks(session_id).await {
            Ok(tracks) => tracks,
            Err(e) => {
                tracing::warn!("Failed to fetch tracks for session {}: {}", session_id, e);
                return;
            }
        };
        if !self.liveness.is_alive() {
            return;
        }

        let wanted = self.unsubscribed(session_id, &tracks);
        if wanted.is_empty() {
            return;
        }

        let refs: Vec<RemoteTrackRef> = wanted
            .iter()
            .map(|key| RemoteTrackRef::new(&key.session_id, &key.track_id))
            .collect();

        match self.subscriber.subscribe(&refs).await {
            Ok(()) => {
                if !self.liveness.is_alive() {
                    return;
                }
                self.subscribed.lock().extend(wanted);
                tracing::info!(
                    "Subscribed to {} track(s) from session {}",
                    refs.len(),
                    session_id
                );
            }
            Err(e) => {
                // Not recorded: a rescan may retry
                tracing::warn!("Failed to subscribe to session {}: {}", session_id, e);
            }
        }
    }

    fn unsubscribed(&self, session_id: &str, tracks: &[PublishedTrack]) -> Vec<TrackKey> {
        let subscribed = self.subscribed.lock();
        let mut seen = HashSet::new();
        tracks
            .iter()
            .map(|t| TrackKey::new(session_id, &t.track_id))
            .filter(|key| !subscribed.contains(key) && seen.insert(key.clone()))
            .collect()
    }

    /// Attach an inbound track to its participant's stream, creating the
    /// entry on first sight. The entry is dropped when any of its tracks ends.
    pub fn handle_remote_track(self: &Arc<Self>, track: Arc<dyn RemoteTrack>) {
        if !self.liveness.is_alive() {
            return;
        }

        let key = track.label();
        let track_id = track.id();
        {
            let mut streams = self.streams.write();
            match streams.get_mut(&key) {
                Some(info) => {
                    if !info.stream.add_track(track.clone()) {
                        tracing::debug!("Track {} already attached to {}", track_id, key);
                        return;
                    }
                    info.refresh();
                }
                None => {
                    let stream = MediaStream::with_track(track.clone());
                    streams.insert(key.clone(), MediaStreamInfo::new(key.clone(), stream));
                }
            }
        }
        tracing::info!("Remote {} track {} for participant {}", track.kind(), track_id, key);

        let weak = Arc::downgrade(self);
        track.on_ended(Box::new(move || {
            if let Some(manager) = weak.upgrade() {
                manager.remove_participant(&key, &track_id);
            }
        }));

        self.notify();
    }

    fn remove_participant(&self, key: &str, ended_track_id: &str) {
        if !self.liveness.is_alive() {
            return;
        }

        let removed = {
            let mut streams = self.streams.write();
            // A newer entry under the same key does not own the ended track
            let owns_track = streams
                .get(key)
                .is_some_and(|info| info.stream.contains(ended_track_id));
            owns_track && streams.remove(key).is_some()
        };

        if removed {
            tracing::info!("Participant {} left (track {} ended)", key, ended_track_id);
            self.notify();
        }
    }

    fn notify(&self) {
        if self.liveness.is_alive() {
            (self.on_update)(self.remote_participant_count());
        }
    }

    pub fn remote_streams(&self) -> HashMap<String, MediaStreamInfo> {
        self.streams.read().clone()
    }

    pub fn remote_participant_count(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_subscribed(&self, session_id: &str, track_id: &str) -> bool {
        self.subscribed
            .lock()
            .contains(&TrackKey::new(session_id, track_id))
    }

    pub fn discovered_session_count(&self) -> usize {
        self.discovered.lock().len()
    }

    /// Stop polling and ignore further tracks and results
    pub fn stop(&self) {
        self.liveness.kill();
        if let Some(task) = self.poll_task.lock().take() {
            task.abort();
        }
    }

    /// Forget every discovered session, subscription and stream
    pub fn clear(&self) {
        self.discovered.lock().clear();
        self.subscribed.lock().clear();
        self.streams.write().clear();
    }
}
