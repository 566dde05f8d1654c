//! Remote media streams as presented to the UI

use confab_media::MediaKind;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::peer::RemoteTrack;

/// A group of remote tracks rendered together.
///
/// Clones share the same track list, so a track added through one clone is
/// visible through all of them.
#[derive(Clone)]
pub struct MediaStream {
    id: String,
    tracks: Arc<RwLock<Vec<Arc<dyn RemoteTrack>>>>,
}

impl MediaStream {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_track(track: Arc<dyn RemoteTrack>) -> Self {
        let stream = Self::new();
        stream.add_track(track);
        stream
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns false if a track with the same id is already present
    pub fn add_track(&self, track: Arc<dyn RemoteTrack>) -> bool {
        let mut tracks = self.tracks.write();
        let id = track.id();
        if tracks.iter().any(|t| t.id() == id) {
            return false;
        }
        tracks.push(track);
        true
    }

    pub fn tracks(&self) -> Vec<Arc<dyn RemoteTrack>> {
        self.tracks.read().clone()
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.read().iter().map(|t| t.id()).collect()
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.tracks.read().iter().any(|t| t.id() == track_id)
    }

    pub fn has_live(&self, kind: MediaKind) -> bool {
        self.tracks
            .read()
            .iter()
            .any(|t| t.kind() == kind && t.is_live())
    }

    /// True when both handles refer to the same underlying stream
    pub fn same_stream(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.tracks, &other.tracks)
    }
}

impl Default for MediaStream {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.track_ids())
            .finish()
    }
}

/// One remote participant's rendered media
#[derive(Debug, Clone)]
pub struct MediaStreamInfo {
    pub stream: MediaStream,
    /// Participant key the stream was grouped under (the track label)
    pub session_id: String,
    pub display_name: Option<String>,
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

impl MediaStreamInfo {
    pub fn new(session_id: impl Into<String>, stream: MediaStream) -> Self {
        let mut info = Self {
            stream,
            session_id: session_id.into(),
            display_name: None,
            audio_enabled: false,
            video_enabled: false,
        };
        info.refresh();
        info
    }

    /// Recompute the enabled flags from the stream's current tracks
    pub fn refresh(&mut self) {
        self.audio_enabled = self.stream.has_live(MediaKind::Audio);
        self.video_enabled = self.stream.has_live(MediaKind::Video);
    }
}
