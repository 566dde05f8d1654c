//! Local media tracks and streams

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::codec::capability_for;
use crate::devices::MediaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn from_codec_type(codec_type: RTPCodecType) -> Option<Self> {
        match codec_type {
            RTPCodecType::Audio => Some(MediaKind::Audio),
            RTPCodecType::Video => Some(MediaKind::Video),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local track fed with encoded samples by the embedding application.
///
/// Clones share the underlying track and its live flag.
#[derive(Clone)]
pub struct LocalTrack {
    kind: MediaKind,
    sample_track: Arc<TrackLocalStaticSample>,
    live: Arc<AtomicBool>,
}

impl LocalTrack {
    pub fn new(kind: MediaKind, stream_id: &str) -> Self {
        let sample_track = Arc::new(TrackLocalStaticSample::new(
            capability_for(kind),
            Uuid::new_v4().to_string(),
            stream_id.to_string(),
        ));

        Self {
            kind,
            sample_track,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> &str {
        self.sample_track.id()
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop the track. Further samples are rejected.
    pub fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            tracing::debug!("Stopped local {} track {}", self.kind, self.id());
        }
    }

    /// The webrtc-rs track to attach to a peer connection
    pub fn rtc_track(&self) -> Arc<TrackLocalStaticSample> {
        self.sample_track.clone()
    }

    pub async fn write_sample(&self, sample: &Sample) -> Result<(), MediaError> {
        if !self.is_live() {
            return Err(MediaError::TrackStopped(self.id().to_string()));
        }

        self.sample_track
            .write_sample(sample)
            .await
            .map_err(|e| MediaError::Write(e.to_string()))
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id())
            .field("kind", &self.kind)
            .field("live", &self.is_live())
            .finish()
    }
}

/// The local participant's camera and microphone tracks
#[derive(Debug, Clone)]
pub struct LocalMediaStream {
    id: String,
    tracks: Vec<LocalTrack>,
}

impl LocalMediaStream {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Create a track of `kind` belonging to this stream
    pub fn add_track(&mut self, kind: MediaKind) -> LocalTrack {
        let track = LocalTrack::new(kind, &self.id);
        self.tracks.push(track.clone());
        track
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(|t| t.kind() == MediaKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(|t| t.kind() == MediaKind::Video)
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

impl Default for LocalMediaStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_share_stream_id() {
        let mut stream = LocalMediaStream::new();
        let audio = stream.add_track(MediaKind::Audio);
        let video = stream.add_track(MediaKind::Video);

        assert_eq!(audio.rtc_track().stream_id(), stream.id());
        assert_eq!(video.rtc_track().stream_id(), stream.id());
        assert_ne!(audio.id(), video.id());
        assert_eq!(stream.audio_tracks().count(), 1);
        assert_eq!(stream.video_tracks().count(), 1);
    }

    #[test]
    fn test_stop_is_shared_between_clones() {
        let mut stream = LocalMediaStream::new();
        let track = stream.add_track(MediaKind::Video);
        let clone = stream.clone();

        assert_eq!(clone.live_track_count(), 1);
        clone.stop_all();
        assert!(!track.is_live());
        assert_eq!(stream.live_track_count(), 0);
    }

    #[tokio::test]
    async fn test_stopped_track_rejects_samples() {
        let mut stream = LocalMediaStream::new();
        let track = stream.add_track(MediaKind::Audio);
        track.stop();

        let result = track.write_sample(&Sample::default()).await;
        assert!(matches!(result, Err(MediaError::TrackStopped(_))));
    }
}
