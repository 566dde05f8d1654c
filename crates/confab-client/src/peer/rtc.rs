//! webrtc-rs implementation of the peer seam

use async_trait::async_trait;
use confab_media::{LocalTrack, MediaKind, codec};
use confab_protocol::{SdpType, SessionDescription};
use std::sync::Arc;
use tokio::sync::broadcast;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp::packet::Packet;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::{
    EndedHandler, EndedNotifier, IceState, IceStateHandler, PeerConnector, PeerTransport,
    RemoteTrack, RemoteTrackHandler, SenderInfo,
};
use crate::config::IceServer;
use crate::error::{ClientError, Result};

/// Buffered RTP packets per remote track before slow receivers lag
const RTP_BUFFER: usize = 256;

impl From<RTCIceConnectionState> for IceState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Checking => IceState::Checking,
            RTCIceConnectionState::Connected => IceState::Connected,
            RTCIceConnectionState::Completed => IceState::Completed,
            RTCIceConnectionState::Disconnected => IceState::Disconnected,
            RTCIceConnectionState::Failed => IceState::Failed,
            RTCIceConnectionState::Closed => IceState::Closed,
            _ => IceState::New,
        }
    }
}

fn to_rtc_ice_server(server: &IceServer) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

fn to_rtc_description(description: &SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp.clone())?,
        SdpType::Answer => RTCSessionDescription::answer(description.sdp.clone())?,
    };
    Ok(rtc)
}

fn from_rtc_description(description: RTCSessionDescription) -> Result<SessionDescription> {
    match description.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(description.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(description.sdp)),
        other => Err(ClientError::Negotiation(format!(
            "Unexpected SDP type {}",
            other
        ))),
    }
}

/// Builds peer connections that speak Opus and VP8
pub struct WebRtcConnector {
    api: API,
}

impl WebRtcConnector {
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        codec::register_codecs(&mut media_engine)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn connect(&self, ice_servers: &[IceServer]) -> Result<Arc<dyn PeerTransport>> {
        let config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(to_rtc_ice_server).collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(self.api.new_peer_connection(config).await?);
        tracing::info!("Created peer connection with {} ICE server(s)", ice_servers.len());

        Ok(Arc::new(WebRtcPeer { peer_connection }))
    }
}

pub struct WebRtcPeer {
    peer_connection: Arc<RTCPeerConnection>,
}

impl WebRtcPeer {
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }
}

#[async_trait]
impl PeerTransport for WebRtcPeer {
    async fn add_track(&self, track: &LocalTrack) -> Result<()> {
        let rtc_track: Arc<dyn TrackLocal + Send + Sync> = track.rtc_track();
        let sender = self.peer_connection.add_track(rtc_track).await?;

        // Drain RTCP so interceptors keep running
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        tracing::debug!("Attached local {} track {}", track.kind(), track.id());
        Ok(())
    }

    async fn senders(&self) -> Vec<SenderInfo> {
        let mut senders = Vec::new();
        for transceiver in self.peer_connection.get_transceivers().await {
            let sender = transceiver.sender().await;
            let track_id = sender.track().await.map(|t| t.id().to_string());
            senders.push(SenderInfo {
                track_id,
                mid: transceiver.mid().map(|mid| mid.to_string()),
            });
        }
        senders
    }

    fn on_track(&self, handler: RemoteTrackHandler) {
        self.peer_connection
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                tracing::info!(
                    "on_track fired: track {}, stream {}, kind {:?}",
                    track.id(),
                    track.stream_id(),
                    track.kind()
                );
                let handler = handler.clone();
                Box::pin(async move {
                    let remote: Arc<dyn RemoteTrack> = WebRtcRemoteTrack::spawn(track);
                    handler(remote);
                })
            }));
    }

    fn on_ice_state_change(&self, handler: IceStateHandler) {
        self.peer_connection
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                let handler = handler.clone();
                Box::pin(async move {
                    handler(IceState::from(state));
                })
            }));
    }

    fn ice_state(&self) -> IceState {
        self.peer_connection.ice_connection_state().into()
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.peer_connection.create_offer(None).await?;
        from_rtc_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.peer_connection.create_answer(None).await?;
        from_rtc_description(answer)
    }

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()> {
        self.peer_connection
            .set_local_description(to_rtc_description(description)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc_description(description)?)
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.peer_connection.connection_state() == RTCPeerConnectionState::Closed
    }
}

/// Inbound webrtc-rs track. A reader task forwards RTP to subscribers and
/// signals `ended` when the track stops delivering.
pub struct WebRtcRemoteTrack {
    track: Arc<TrackRemote>,
    kind: MediaKind,
    ended: EndedNotifier,
    packets: broadcast::Sender<Packet>,
}

impl WebRtcRemoteTrack {
    pub fn spawn(track: Arc<TrackRemote>) -> Arc<Self> {
        let kind = MediaKind::from_codec_type(track.kind()).unwrap_or(MediaKind::Video);
        let (packets, _) = broadcast::channel(RTP_BUFFER);

        let remote = Arc::new(Self {
            track,
            kind,
            ended: EndedNotifier::new(),
            packets,
        });

        let reader = remote.clone();
        tokio::spawn(async move {
            reader.read_loop().await;
        });

        remote
    }

    async fn read_loop(&self) {
        let mut packet_count = 0u64;
        loop {
            match self.track.read_rtp().await {
                Ok((packet, _attributes)) => {
                    packet_count += 1;
                    if packet_count % 500 == 1 {
                        tracing::debug!(
                            "Received RTP packet {} on {} track {}",
                            packet_count,
                            self.kind,
                            self.track.id()
                        );
                    }
                    // No receivers is fine: nobody is rendering yet
                    let _ = self.packets.send(packet);
                }
                Err(e) => {
                    tracing::info!("Remote {} track {} ended: {}", self.kind, self.track.id(), e);
                    break;
                }
            }
        }

        self.ended.fire();
    }
}

impl RemoteTrack for WebRtcRemoteTrack {
    fn id(&self) -> String {
        self.track.id().to_string()
    }

    fn label(&self) -> String {
        self.track.stream_id().to_string()
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

    fn rtp_packets(&self) -> Option<broadcast::Receiver<Packet>> {
        Some(self.packets.subscribe())
    }
}
