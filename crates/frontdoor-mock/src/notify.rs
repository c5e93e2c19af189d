//! Callbacks that turn requests into NOTIFY broadcasts.
//!
//! Installed with [`install_broadcast_callbacks`], they make the mock behave
//! like a device that announces every state change to all listeners. The
//! requester always gets its RESPONSE first, then the NOTIFY like everyone
//! else.

use std::sync::Arc;

use frontdoor_protocol::{Envelope, ErrorBody, Method};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::canned::{missing_payload_error, only_get_error};
use crate::registry::ClientId;
use crate::router::{MockHub, ResourceCallback};

pub const VOLUME_RESOURCE: &str = "/audio/volume";
pub const VOLUME_INCREMENT_RESOURCE: &str = "/audio/volume/increment";
pub const NOW_PLAYING_RESOURCE: &str = "/content/nowPlaying";

/// Installs the volume, volume-increment and now-playing callbacks.
pub fn install_broadcast_callbacks(hub: &MockHub) {
    let callbacks: [(&str, ResourceCallback); 3] = [
        (VOLUME_RESOURCE, Arc::new(volume_callback)),
        (VOLUME_INCREMENT_RESOURCE, Arc::new(increment_volume_callback)),
        (NOW_PLAYING_RESOURCE, Arc::new(now_playing_callback)),
    ];
    for (resource, callback) in callbacks {
        hub.add_callback(resource, callback);
    }
}

fn broadcast_as_notification(hub: &MockHub, request: Envelope, body: Value) {
    let notification = request.into_notification().with_body(body);
    match hub.broadcast(&notification) {
        Ok(delivered) => info!(
            resource = %notification.resource(),
            delivered,
            "Broadcast notification"
        ),
        Err(e) => warn!(resource = %notification.resource(), error = %e, "Broadcast failed"),
    }
}

/// Answers the requester with `body`, then broadcasts it.
fn answer_and_broadcast(hub: &MockHub, client: ClientId, request: Envelope, body: Value) {
    let reply = request.clone().into_response().with_body(body.clone());
    hub.reply(client, &reply);
    broadcast_as_notification(hub, request, body);
}

fn reject(hub: &MockHub, client: ClientId, request: Envelope, status: u16, error: ErrorBody) {
    let reply = request.into_response().into_failure(status, error);
    hub.reply(client, &reply);
}

/// GET answers the requester with the current volume; PUT stores the new
/// volume, answers, and broadcasts it.
pub fn volume_callback(hub: &MockHub, client: ClientId, request: Envelope) {
    match request.method() {
        Method::Get => {
            let volume = hub.volume();
            let reply = request.into_response().with_body(json!({ "value": volume }));
            hub.reply(client, &reply);
        }
        Method::Put => {
            let Some(value) = request.body_field("/value").and_then(Value::as_i64) else {
                warn!(%client, "Volume PUT without a numeric value");
                reject(hub, client, request, 400, missing_payload_error());
                return;
            };
            hub.device(|device| device.volume = value);
            let body = json!({
                "defaultOn": "30",
                "min": "0",
                "muted": "false",
                "max": "100",
                "value": value,
                "thresholdVolume": { "max": "70", "min": "30" }
            });
            answer_and_broadcast(hub, client, request, body);
        }
        method => {
            info!(%client, %method, "Volume callback rejects method");
            reject(hub, client, request, 500, only_get_error());
        }
    }
}

/// PUT answers and broadcasts the requested delta.
pub fn increment_volume_callback(hub: &MockHub, client: ClientId, request: Envelope) {
    if request.method() != Method::Put {
        info!(%client, method = %request.method(), "No other request type supported");
        reject(hub, client, request, 500, only_get_error());
        return;
    }
    let delta = request.body_field("/delta").cloned().unwrap_or(Value::Null);
    answer_and_broadcast(hub, client, request, json!({ "delta": delta }));
}

/// Answers and broadcasts a fixed now-playing state for any request.
pub fn now_playing_callback(hub: &MockHub, client: ClientId, request: Envelope) {
    let art = "https://m.media-amazon.com/images/I/91eh6ApLnzL._UL600_.jpg";
    let body = json!({
        "collectData": true,
        "container": {
            "capabilities": {
                "favoriteSupported": true,
                "ratingsSupported": true,
                "repeatSupported": true,
                "resumeSupported": true,
                "shuffleSupported": true,
                "skipNextSupported": true,
                "skipPreviousSupported": true
            },
            "contentItem": {
                "location": "tracklisturl",
                "name": "",
                "presetable": false,
                "source": "ALEXA",
                "sourceAccount": "alexa_occam@bose.com",
                "containerArt": art
            }
        },
        "metadata": {
            "album": "Hotel California (Remastered)",
            "artist": "Eagles",
            "trackName": "Hotel California (Eagles 2013 Remaster)"
        },
        "state": {
            "canSkipPrevious": false,
            "repeat": "OFF",
            "shuffle": "OFF",
            "status": "PLAY"
        },
        "track": {
            "contentItem": {
                "containerArt": art,
                "presetable": false,
                "name": "Hotel California (Eagles 2013 Remaster)",
                "source": "ALEXA",
                "sourceAccount": "alexa_occam@bose.com"
            },
            "favorite": "YES",
            "rating": "UP",
            "type": "AD"
        }
    });
    answer_and_broadcast(hub, client, request, body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::request_envelope;
    use frontdoor_protocol::decode_message;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    fn attach(hub: &MockHub) -> (ClientId, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (hub.attach(tx), rx)
    }

    fn recv(rx: &mut mpsc::UnboundedReceiver<Message>) -> Envelope {
        match rx.try_recv().unwrap() {
            Message::Text(text) => decode_message(&text).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn volume_put_is_broadcast_to_all_clients() {
        let hub = MockHub::default();
        install_broadcast_callbacks(&hub);
        let (sender, mut rx_sender) = attach(&hub);
        let (_listener, mut rx_listener) = attach(&hub);

        let request = request_envelope(Method::Put, VOLUME_RESOURCE, Some(json!({"value": 42})), 6);
        hub.handle_message(sender, &frontdoor_protocol::encode_message(&request).unwrap());

        let reply = recv(&mut rx_sender);
        assert!(reply.is_response());
        assert_eq!(reply.request_id(), Some(6));
        assert_eq!(reply.body_field("/value"), Some(&json!(42)));

        for rx in [&mut rx_sender, &mut rx_listener] {
            let notification = recv(rx);
            assert!(notification.is_notification());
            assert_eq!(notification.message_type(), None);
            assert_eq!(notification.body_field("/value"), Some(&json!(42)));
        }
        assert_eq!(hub.volume(), 42);
        assert!(rx_listener.try_recv().is_err());
    }

    #[test]
    fn volume_put_without_value_is_answered_with_failure() {
        let hub = MockHub::default();
        let (sender, mut rx) = attach(&hub);
        volume_callback(&hub, sender, request_envelope(Method::Put, VOLUME_RESOURCE, Some(json!({})), 3));

        let reply = recv(&mut rx);
        assert_eq!(reply.header.status, Some(400));
        assert_eq!(reply.request_id(), Some(3));
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.volume(), crate::canned::DEFAULT_VOLUME);
    }

    #[test]
    fn volume_get_answers_only_requester() {
        let hub = MockHub::default();
        install_broadcast_callbacks(&hub);
        let (sender, mut rx_sender) = attach(&hub);
        let (_listener, mut rx_listener) = attach(&hub);

        volume_callback(&hub, sender, request_envelope(Method::Get, VOLUME_RESOURCE, None, 1));

        let reply = recv(&mut rx_sender);
        assert!(reply.is_response());
        assert_eq!(reply.body_field("/value"), Some(&json!(30)));
        assert!(rx_listener.try_recv().is_err());
    }

    #[test]
    fn increment_broadcasts_delta() {
        let hub = MockHub::default();
        let (sender, mut rx) = attach(&hub);
        increment_volume_callback(
            &hub,
            sender,
            request_envelope(Method::Put, VOLUME_INCREMENT_RESOURCE, Some(json!({"delta": 2})), 1),
        );
        let reply = recv(&mut rx);
        assert!(reply.is_response());
        assert_eq!(reply.body, Some(json!({"delta": 2})));
        let notification = recv(&mut rx);
        assert!(notification.is_notification());
        assert_eq!(notification.body, Some(json!({"delta": 2})));

        increment_volume_callback(
            &hub,
            sender,
            request_envelope(Method::Get, VOLUME_INCREMENT_RESOURCE, None, 2),
        );
        let rejected = recv(&mut rx);
        assert_eq!(rejected.header.status, Some(500));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn now_playing_broadcasts_track() {
        let hub = MockHub::default();
        let (sender, mut rx) = attach(&hub);
        now_playing_callback(&hub, sender, request_envelope(Method::Post, NOW_PLAYING_RESOURCE, None, 1));
        assert!(recv(&mut rx).is_response());
        let notification = recv(&mut rx);
        assert_eq!(notification.body_field("/metadata/artist"), Some(&json!("Eagles")));
    }
}
