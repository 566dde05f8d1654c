//! Local media acquisition

use async_trait::async_trait;
use thiserror::Error;

use crate::track::{LocalMediaStream, MediaKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("No audio or video requested")]
    NothingRequested,

    #[error("Track {0} has been stopped")]
    TrackStopped(String),

    #[error("Failed to write sample: {0}")]
    Write(String),
}

/// Which kinds of media to acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub fn audio_video() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }

    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self::audio_video()
    }
}

/// Source of local media (camera and microphone)
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMediaStream, MediaError>;
}

/// Creates sample-fed Opus/VP8 tracks without touching capture hardware.
/// The application writes encoded frames into the returned tracks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleDevices;

#[async_trait]
impl MediaDevices for SampleDevices {
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMediaStream, MediaError> {
        if !constraints.audio && !constraints.video {
            return Err(MediaError::NothingRequested);
        }

        let mut stream = LocalMediaStream::new();
        if constraints.audio {
            stream.add_track(MediaKind::Audio);
        }
        if constraints.video {
            stream.add_track(MediaKind::Video);
        }

        tracing::info!(
            "Acquired local stream {} with {} track(s)",
            stream.id(),
            stream.tracks().len()
        );
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_audio_video_stream() {
        let stream = SampleDevices
            .get_user_media(&MediaConstraints::audio_video())
            .await
            .unwrap();

        assert_eq!(stream.audio_tracks().count(), 1);
        assert_eq!(stream.video_tracks().count(), 1);
        assert_eq!(stream.live_track_count(), 2);
    }

    #[tokio::test]
    async fn test_audio_only_stream() {
        let stream = SampleDevices
            .get_user_media(&MediaConstraints::audio_only())
            .await
            .unwrap();

        assert_eq!(stream.tracks().len(), 1);
        assert_eq!(stream.tracks()[0].kind(), MediaKind::Audio);
    }

    #[test]
    fn test_empty_constraints_rejected() {
        let constraints = MediaConstraints {
            audio: false,
            video: false,
        };
        let result = tokio_test::block_on(SampleDevices.get_user_media(&constraints));
        assert_eq!(result.unwrap_err(), MediaError::NothingRequested);
    }
}
