//! Local media for Confab
//!
//! This crate provides:
//! - Local tracks and streams backed by webrtc-rs sample tracks
//! - The `MediaDevices` acquisition seam
//! - Codec registration (Opus, VP8)

pub mod codec;
pub mod devices;
#[cfg(feature = "device-probe")]
pub mod probe;
pub mod track;

pub use devices::{MediaConstraints, MediaDevices, MediaError, SampleDevices};
#[cfg(feature = "device-probe")]
pub use probe::ProbedDevices;
pub use track::{LocalMediaStream, LocalTrack, MediaKind};
