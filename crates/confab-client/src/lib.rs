//! Client-side orchestration for many-to-many audio/video rooms routed
//! through a remote SFU.
//!
//! [`SfuService`] is the entry point for a single room connection. UI layers
//! that mount and unmount rooms use [`RoomView`].

pub mod config;
pub mod connection;
pub mod error;
pub mod liveness;
pub mod peer;
pub mod room;
pub mod service;
pub mod signaling;
pub mod stream;
pub mod telemetry;
pub mod tracks;

pub use config::{ClientConfig, ConnectionOptions, IceServer, SfuEndpoint};
pub use connection::{ConnectionManager, ConnectionState, StateCallback, TrackSubscriber};
pub use error::{ClientError, Result, SignalingError};
pub use room::{RoomSnapshot, RoomView, ServiceFactory};
pub use service::{ServiceParts, ServiceSettings, SfuService};
pub use signaling::{SfuSignaling, SignalingClient};
pub use stream::{MediaStream, MediaStreamInfo};
pub use tracks::{DiscoverySettings, TrackManager};

pub use confab_media::{LocalMediaStream, LocalTrack, MediaConstraints, MediaDevices, MediaKind};
pub use confab_protocol as protocol;
