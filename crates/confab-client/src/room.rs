//! Mount-scoped room binding for UI layers
//!
//! [`RoomView`] owns at most one [`SfuService`] keyed by (user, room). It
//! mirrors the service into a [`RoomSnapshot`] watch channel: connection
//! state is pushed by the service's callback, the remote stream map is read
//! on a fixed interval and republished only when stream or track identities
//! change.

use confab_media::LocalMediaStream;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::config::{ClientConfig, ConnectionOptions};
use crate::connection::{ConnectionState, StateCallback};
use crate::error::{ClientError, Result};
use crate::liveness::Liveness;
use crate::service::SfuService;
use crate::stream::MediaStreamInfo;

/// Builds the service for a mount
pub type ServiceFactory =
    Arc<dyn Fn(ConnectionOptions, StateCallback) -> Result<SfuService> + Send + Sync>;

/// What a room UI renders
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    pub session_id: Option<String>,
    pub local_stream: Option<LocalMediaStream>,
    /// Remote participants, local user excluded
    pub remote_streams: BTreeMap<String, MediaStreamInfo>,
    pub connection_state: ConnectionState,
}

type StreamIdentity = Vec<(String, String, Vec<String>)>;

fn stream_identity(streams: &BTreeMap<String, MediaStreamInfo>) -> StreamIdentity {
    streams
        .iter()
        .map(|(key, info)| {
            let mut track_ids = info.stream.track_ids();
            track_ids.sort();
            (key.clone(), info.stream.id().to_string(), track_ids)
        })
        .collect()
}

/// Returns true if any name changed
fn apply_display_names(
    streams: &mut BTreeMap<String, MediaStreamInfo>,
    roster: &HashMap<String, String>,
) -> bool {
    let mut changed = false;
    for (key, info) in streams.iter_mut() {
        let name = roster.get(key);
        if info.display_name.as_ref() != name {
            info.display_name = name.cloned();
            changed = true;
        }
    }
    changed
}

/// Drop entries that belong to the local participant
fn visible_streams(
    streams: HashMap<String, MediaStreamInfo>,
    local_session: Option<&str>,
    local_user_id: &str,
) -> BTreeMap<String, MediaStreamInfo> {
    streams
        .into_iter()
        .filter(|(key, _)| Some(key.as_str()) != local_session && key != local_user_id)
        .collect()
}

struct Mount {
    local_user_id: String,
    room_id: String,
    service: SfuService,
    liveness: Liveness,
    snapshot_task: JoinHandle<()>,
}

impl Mount {
    async fn teardown(self) {
        self.liveness.kill();
        self.snapshot_task.abort();
        self.service.destroy().await;
        tracing::debug!("Unmounted room {} for {}", self.room_id, self.local_user_id);
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        // Already torn down through unmount or a room change
        if !self.liveness.kill() {
            return;
        }
        self.snapshot_task.abort();

        let service = self.service.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { service.destroy().await });
                tracing::debug!(
                    "Room view dropped while mounted, leaving room {}",
                    self.room_id
                );
            }
            Err(_) => tracing::warn!(
                "Room view for {} dropped outside a runtime, service left running",
                self.room_id
            ),
        }
    }
}

pub struct RoomView {
    factory: ServiceFactory,
    snapshot_interval: Duration,
    roster: Arc<RwLock<HashMap<String, String>>>,
    snapshot_tx: watch::Sender<RoomSnapshot>,
    mount: Mutex<Option<Mount>>,
}

impl RoomView {
    /// A view whose services talk to the configured SFU
    pub fn new(config: ClientConfig) -> Self {
        let snapshot_interval = config.snapshot_interval();
        let config = Arc::new(config);
        let factory: ServiceFactory =
            Arc::new(move |options, on_state| SfuService::new(&config, options, on_state));
        Self::with_factory(factory, snapshot_interval)
    }

    pub fn with_factory(factory: ServiceFactory, snapshot_interval: Duration) -> Self {
        let (snapshot_tx, _) = watch::channel(RoomSnapshot::default());
        Self {
            factory,
            snapshot_interval,
            roster: Arc::new(RwLock::new(HashMap::new())),
            snapshot_tx,
            mount: Mutex::new(None),
        }
    }

    /// Bind the view to (user, room). Rebinding to the same pair does
    /// nothing; a different pair tears the old service down first.
    pub async fn mount(&self, local_user_id: &str, room_id: &str) -> Result<()> {
        let mut current = self.mount.lock().await;
        if let Some(mount) = current.as_ref() {
            if mount.local_user_id == local_user_id && mount.room_id == room_id {
                return Ok(());
            }
        }
        if let Some(previous) = current.take() {
            previous.teardown().await;
        }

        self.snapshot_tx.send_replace(RoomSnapshot::default());

        let liveness = Liveness::new();
        let on_state: StateCallback = {
            let tx = self.snapshot_tx.clone();
            let liveness = liveness.clone();
            Arc::new(move |state: ConnectionState| {
                if !liveness.is_alive() {
                    return;
                }
                tx.send_if_modified(|snapshot| {
                    if snapshot.connection_state == state {
                        return false;
                    }
                    snapshot.connection_state = state;
                    true
                });
            })
        };

        let options = ConnectionOptions::new(local_user_id, room_id);
        let service = (self.factory)(options, on_state)?;
        tracing::info!("Mounting room {} for {}", room_id, local_user_id);

        tokio::spawn(initialize(
            service.clone(),
            liveness.clone(),
            self.snapshot_tx.clone(),
        ));
        let snapshot_task = tokio::spawn(snapshot_loop(SnapshotSource {
            service: service.clone(),
            liveness: liveness.clone(),
            tx: self.snapshot_tx.clone(),
            roster: self.roster.clone(),
            interval: self.snapshot_interval,
            local_user_id: local_user_id.to_string(),
        }));

        *current = Some(Mount {
            local_user_id: local_user_id.to_string(),
            room_id: room_id.to_string(),
            service,
            liveness,
            snapshot_task,
        });
        Ok(())
    }

    pub async fn unmount(&self) {
        let previous = self.mount.lock().await.take();
        if let Some(previous) = previous {
            previous.teardown().await;
        }
    }

    /// Replace the participant roster (participant key to display name)
    pub fn set_participants(&self, roster: HashMap<String, String>) {
        *self.roster.write() = roster;
        let roster = self.roster.read().clone();
        self.snapshot_tx
            .send_if_modified(|snapshot| apply_display_names(&mut snapshot.remote_streams, &roster));
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The currently mounted service, if any
    pub async fn service(&self) -> Option<SfuService> {
        self.mount.lock().await.as_ref().map(|m| m.service.clone())
    }
}

async fn initialize(service: SfuService, liveness: Liveness, tx: watch::Sender<RoomSnapshot>) {
    match service.initialize().await {
        Ok(()) => {
            if liveness.is_alive() {
                tx.send_modify(|snapshot| {
                    snapshot.session_id = service.session_id();
                    snapshot.local_stream = service.local_stream();
                });
            }
        }
        Err(ClientError::Destroyed) => {
            tracing::debug!("Room initialization abandoned after unmount");
        }
        Err(e) => {
            tracing::warn!("Room initialization failed: {}", e);
        }
    }
}

struct SnapshotSource {
    service: SfuService,
    liveness: Liveness,
    tx: watch::Sender<RoomSnapshot>,
    roster: Arc<RwLock<HashMap<String, String>>>,
    interval: Duration,
    local_user_id: String,
}

async fn snapshot_loop(source: SnapshotSource) {
    let mut ticker = tokio::time::interval(source.interval);
    // Track lists are shared with the live streams, so the last published
    // identity has to be kept here rather than read back from the snapshot
    let mut published = StreamIdentity::new();

    loop {
        ticker.tick().await;
        if !source.liveness.is_alive() {
            break;
        }

        let local_session = source.service.session_id();
        let local_stream = source.service.local_stream();
        let streams = visible_streams(
            source.service.remote_streams(),
            local_session.as_deref(),
            &source.local_user_id,
        );
        let identity = stream_identity(&streams);
        let streams_changed = identity != published;
        if streams_changed {
            published = identity;
        }

        source.tx.send_if_modified(|snapshot| {
            let mut changed = false;

            if snapshot.session_id != local_session {
                snapshot.session_id = local_session;
                changed = true;
            }

            let stream_id = local_stream.as_ref().map(|s| s.id().to_string());
            if snapshot.local_stream.as_ref().map(|s| s.id().to_string()) != stream_id {
                snapshot.local_stream = local_stream;
                changed = true;
            }

            if streams_changed {
                snapshot.remote_streams = streams;
                changed = true;
            }

            // Read under the channel lock so a concurrent roster update is
            // either seen here or applied after this send
            let roster = source.roster.read();
            if apply_display_names(&mut snapshot.remote_streams, &roster) {
                changed = true;
            }

            changed
        });
    }
}
