//! Device presence checks before handing out sample tracks

use async_trait::async_trait;
use cpal::traits::HostTrait;

use crate::devices::{MediaConstraints, MediaDevices, MediaError, SampleDevices};
use crate::track::LocalMediaStream;

/// Like [`SampleDevices`], but fails when the host has no default microphone
/// or no camera for the requested kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbedDevices {
    inner: SampleDevices,
}

fn probe_microphone() -> Result<(), MediaError> {
    let host = cpal::default_host();
    match host.default_input_device() {
        Some(_) => Ok(()),
        None => Err(MediaError::NotFound("no default microphone".to_string())),
    }
}

fn probe_camera() -> Result<(), MediaError> {
    let cameras = nokhwa::query(nokhwa::utils::ApiBackend::Auto)
        .map_err(|e| MediaError::PermissionDenied(e.to_string()))?;

    if cameras.is_empty() {
        return Err(MediaError::NotFound("no camera".to_string()));
    }
    Ok(())
}

#[async_trait]
impl MediaDevices for ProbedDevices {
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMediaStream, MediaError> {
        let constraints = *constraints;
        tokio::task::spawn_blocking(move || {
            if constraints.audio {
                probe_microphone()?;
            }
            if constraints.video {
                probe_camera()?;
            }
            Ok::<_, MediaError>(())
        })
        .await
        .map_err(|e| MediaError::NotFound(format!("device probe aborted: {}", e)))??;

        self.inner.get_user_media(&constraints).await
    }
}
