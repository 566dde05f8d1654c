//! Shared wire types for the Confab SFU REST protocol

pub mod messages;
pub mod types;

pub use messages::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_request_uses_camel_case() {
        let request = PublishTracksRequest {
            tracks: vec![PublishedTrack {
                track_id: "t1".to_string(),
                session_id: "s1".to_string(),
                mid: Some("0".to_string()),
                custom_track_name: "alice".to_string(),
            }],
            session_description: SessionDescription::offer("v=0"),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "tracks": [{
                    "trackId": "t1",
                    "sessionId": "s1",
                    "mid": "0",
                    "customTrackName": "alice"
                }],
                "sessionDescription": { "type": "offer", "sdp": "v=0" }
            })
        );
    }

    #[test]
    fn test_track_without_mid_is_accepted() {
        let track: PublishedTrack = serde_json::from_value(json!({
            "trackId": "t2",
            "sessionId": "s2",
            "customTrackName": "bob"
        }))
        .unwrap();

        assert_eq!(track.mid, None);
        assert_eq!(track.custom_track_name, "bob");
    }

    #[test]
    fn test_subscribe_request_shape() {
        let request = SubscribeTracksRequest {
            tracks: vec![RemoteTrackRef::new("remote-session", "remote-track")],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["tracks"][0],
            json!({ "remoteSessionId": "remote-session", "remoteTrackId": "remote-track" })
        );
    }

    #[test]
    fn test_new_session_response_parses_answer() {
        let response: NewSessionResponse = serde_json::from_value(json!({
            "sessionId": "abc",
            "sessionDescription": { "type": "answer", "sdp": "v=0\r\n" }
        }))
        .unwrap();

        assert_eq!(response.session_id, "abc");
        assert!(!response.session_description.is_offer());
    }
}
