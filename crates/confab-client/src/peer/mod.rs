//! Peer connection seam
//!
//! [`ConnectionManager`](crate::connection::ConnectionManager) drives a
//! [`PeerTransport`] and never touches webrtc-rs directly. The production
//! implementation lives in [`rtc`].

pub mod rtc;

use async_trait::async_trait;
use confab_media::{LocalTrack, MediaKind};
use confab_protocol::SessionDescription;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use webrtc::rtp::packet::Packet;

use crate::config::IceServer;
use crate::error::Result;

pub use rtc::{WebRtcConnector, WebRtcPeer, WebRtcRemoteTrack};

/// ICE connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// A local sender and the media line it was negotiated on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderInfo {
    pub track_id: Option<String>,
    pub mid: Option<String>,
}

pub type RemoteTrackHandler = Arc<dyn Fn(Arc<dyn RemoteTrack>) + Send + Sync>;
pub type IceStateHandler = Arc<dyn Fn(IceState) + Send + Sync>;
pub type EndedHandler = Box<dyn FnOnce() + Send>;

/// An inbound track delivered by the SFU
pub trait RemoteTrack: Send + Sync {
    fn id(&self) -> String;

    /// Participant identity carried by the track. The SFU echoes the
    /// publisher's `customTrackName` here.
    fn label(&self) -> String;

    fn kind(&self) -> MediaKind;

    fn is_live(&self) -> bool;

    /// Run `handler` once when the track stops. Runs immediately if it
    /// already has.
    fn on_ended(&self, handler: EndedHandler);

    /// Raw RTP for rendering, when the transport exposes it
    fn rtp_packets(&self) -> Option<broadcast::Receiver<Packet>> {
        None
    }
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_track(&self, track: &LocalTrack) -> Result<()>;

    async fn senders(&self) -> Vec<SenderInfo>;

    fn on_track(&self, handler: RemoteTrackHandler);

    fn on_ice_state_change(&self, handler: IceStateHandler);

    fn ice_state(&self) -> IceState;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()>;

    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Creates peer connections
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, ice_servers: &[IceServer]) -> Result<Arc<dyn PeerTransport>>;
}

/// One-shot "track ended" signal shared by [`RemoteTrack`] implementations
#[derive(Default)]
pub struct EndedNotifier {
    ended: AtomicBool,
    handlers: Mutex<Vec<EndedHandler>>,
}

impl EndedNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self, handler: EndedHandler) {
        let mut handlers = self.handlers.lock();
        if self.is_ended() {
            drop(handlers);
            handler();
            return;
        }
        handlers.push(handler);
    }

    /// Mark ended and run every pending handler. Later calls do nothing.
    pub fn fire(&self) {
        let handlers = {
            let mut handlers = self.handlers.lock();
            if self.ended.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *handlers)
        };

        for handler in handlers {
            handler();
        }
    }
}
