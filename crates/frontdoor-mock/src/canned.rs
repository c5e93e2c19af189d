//! Canned responses for resources nobody has registered.
//!
//! Each entry maps a resource path to a plain function that fills in the
//! response envelope. Handlers may also return a NOTIFY that is sent to the
//! requester right after the response, the way the real device announces
//! state changes.

use std::collections::HashMap;

use frontdoor_protocol::{Envelope, ErrorBody, Method};
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Capability list served by `/internal/capabilities`.
const INTERNAL_CAPABILITIES: &str = include_str!("../data/internal_capabilities.json");

/// API groups served by `/system/capabilities`.
const SYSTEM_CAPABILITIES: &str = include_str!("../data/system_capabilities.json");

/// Volume the mock device boots with and resets to.
pub const DEFAULT_VOLUME: i64 = 30;

const VOLUME_MIN: i64 = 0;
const VOLUME_MAX: i64 = 100;

/// Mutable device state shared by canned handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct MockDevice {
    pub volume: i64,
    /// Body returned by `/network/wifi/siteScan`.
    pub wifi_scan: Value,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            wifi_scan: json!({
                "wifiScanResult": [{
                    "frequencyKhz": "2412000",
                    "security": "WPA_OR_WPA2",
                    "signalDbm": "-27",
                    "ssid": "B-PRODUCT"
                }]
            }),
        }
    }
}

/// Fills in `reply` and optionally returns a follow-up NOTIFY.
pub type CannedHandler = fn(&mut MockDevice, &mut Envelope) -> Option<Envelope>;

/// What the mock sends back for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct CannedReply {
    pub response: Envelope,
    pub notification: Option<Envelope>,
}

/// Error returned for resources with no canned handler.
pub fn not_registered_error() -> ErrorBody {
    ErrorBody::new(1i64, 2002i64, "WEBSOCKET_API_NOT_REGISTERED")
}

/// Error returned when a GET-only resource receives another method.
pub fn only_get_error() -> ErrorBody {
    ErrorBody::new(
        "1",
        "1005",
        "HandleFrontDoorRequest - Send failed - Request was not in either PostRegistry, or PostEmptyResponseRegistry",
    )
}

/// Error returned when a request lacks its payload.
pub fn missing_payload_error() -> ErrorBody {
    ErrorBody::new(
        "1",
        "1005",
        "HandleFrontDoorRequest - Send failed - Request is missing payload",
    )
}

/// Static resource → handler table.
pub struct CannedResponses {
    handlers: HashMap<&'static str, CannedHandler>,
}

impl Default for CannedResponses {
    fn default() -> Self {
        let entries: [(&'static str, CannedHandler); 38] = [
            ("/startDiscoveryAdvertisement", start_discovery_advertisement),
            ("/system/language", system_language),
            ("/system/info", system_info),
            ("/system/state", system_state),
            ("/system/setup", system_setup),
            ("/system/activated", system_activated),
            ("/system/challenge", system_challenge),
            ("/system/productSourcesReady", product_sources_ready),
            ("/system/sources", system_sources),
            ("/system/capabilities", system_capabilities),
            ("/system/activationData", activation_data),
            ("/internal/capabilities", internal_capabilities),
            ("/accessories", accessories),
            ("/cloudSync", echo),
            ("/remote", remote),
            ("/ui/lightbar", lightbar),
            ("/device/configure", device_configure),
            ("/system/capsInitializationStatus", caps_initialization_status),
            ("/system/update/status", update_status),
            ("/system/update/start", update_start),
            ("/audio/volume", audio_volume),
            ("/audio/volume/increment", volume_increment),
            ("/audio/volume/decrement", volume_decrement),
            ("/audio/defaultVolume", default_volume),
            ("/ui/alive", ui_alive),
            ("/bluetooth/sink/list", bluetooth_sink_list),
            ("/bluetooth/sink/status", bluetooth_sink_status),
            ("/bluetooth/sink/macAddr", bluetooth_mac_address),
            ("/bluetooth/le/setupStatus", bluetooth_le_setup_status),
            ("/demo", demo),
            ("/demo/keyConfig", demo_key_config),
            ("/network/ping", network_ping),
            ("/network/status", network_status),
            ("/network/wifi/status", wifi_status),
            ("/network/wifi/profile", wifi_profile),
            ("/network/wifi/siteScan", wifi_site_scan),
            ("/voice/status", voice_status),
            ("/subscription", echo),
        ];
        Self {
            handlers: entries.into_iter().collect(),
        }
    }
}

impl CannedResponses {
    /// Returns true if a handler exists for `resource`.
    pub fn contains(&self, resource: &str) -> bool {
        self.handlers.contains_key(resource)
    }

    /// Resources with a canned handler, sorted.
    pub fn resources(&self) -> Vec<&'static str> {
        let mut resources: Vec<_> = self.handlers.keys().copied().collect();
        resources.sort_unstable();
        resources
    }

    /// Adds or replaces a handler.
    pub fn insert(&mut self, resource: &'static str, handler: CannedHandler) {
        self.handlers.insert(resource, handler);
    }

    /// Builds the reply for `request`.
    ///
    /// Unknown resources get `status=500` with the not-registered error and
    /// no body.
    pub fn respond(&self, device: &mut MockDevice, request: Envelope) -> CannedReply {
        let mut response = request.into_response();
        let notification = match self.handlers.get(response.resource()) {
            Some(handler) => {
                debug!(resource = %response.resource(), method = %response.method(), "Serving canned response");
                handler(device, &mut response)
            }
            None => {
                warn!(resource = %response.resource(), "No canned handler for resource");
                fail(&mut response, 500, not_registered_error());
                None
            }
        };
        CannedReply {
            response,
            notification,
        }
    }
}

fn fail(reply: &mut Envelope, status: u16, error: ErrorBody) {
    reply.body = None;
    reply.header.status = Some(status);
    reply.error = Some(error);
}

fn only_get(reply: &mut Envelope, body: Value) -> Option<Envelope> {
    if reply.method() == Method::Get {
        reply.body = Some(body);
    } else {
        fail(reply, 500, only_get_error());
    }
    None
}

fn on_get(reply: &mut Envelope, body: Value) -> Option<Envelope> {
    if reply.method() == Method::Get {
        reply.body = Some(body);
    }
    None
}

fn announce(reply: &Envelope, resource: &str) -> Envelope {
    let mut notification = reply.clone().into_notification();
    notification.header.resource = resource.to_string();
    notification.header.status = None;
    notification
}

fn volume_body(volume: i64, muted: Value) -> Value {
    json!({
        "defaultOn": DEFAULT_VOLUME,
        "min": 30,
        "max": 70,
        "feedback": { "enable": "true" },
        "muted": muted,
        "value": volume,
        "properties": { "maxLimit": 70, "minLimit": 30 }
    })
}

/// Reads an integer field that may arrive as a number or a numeric string.
fn int_field(reply: &Envelope, field: &str) -> Option<i64> {
    match reply.body.as_ref()?.get(field)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn echo(_: &mut MockDevice, _: &mut Envelope) -> Option<Envelope> {
    None
}

fn capabilities(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|e| {
        warn!(error = %e, "Bundled capability list does not parse");
        Value::Null
    })
}

fn start_discovery_advertisement(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    if reply.method() != Method::Post {
        return None;
    }
    reply.body = Some(json!({
        "deviceName": "6E3A0B HS 500",
        "guid": "5b4c9e97-0e75-eb87-73dc-725b88c73bd4",
        "ecosys": "ECO2",
        "productType": "eddie",
        "productName": "Bose Home Speaker 500",
        "productColor": "1",
        "softwareVersion": "5.0.7-0+d11a62e",
        "productLanguage": "en"
    }));
    Some(announce(reply, "/startDiscoveryAdvertisement"))
}

fn system_sources(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    if reply.method() != Method::Put {
        return None;
    }
    reply.body = Some(json!({
        "sources": [{
            "accountid": "27a3c068-f7e0-423b-932e-692ad4316eda",
            "details": {
                "activationKey": "ACTIVATION_KEY_TV",
                "cableProvider": "AT&T U-verse TV",
                "ciCode": "T1234",
                "deviceType": "DEVICE_TYPE_SMART_TV",
                "friendlyName": "FRIENDLY_NAME_CABLE_BOX",
                "inputRoute": "INPUT_ROUTE_TV",
                "parentInput": "PARENT_INPUT_TV",
                "sequenceNumber": "0"
            },
            "displayName": "My Playlist",
            "local": "false",
            "modifiable": "false",
            "multiroom": "false",
            "sourceAccountName": "ranjeettr@gmail.com",
            "sourceName": "Spotify",
            "status": "AVAILABLE",
            "visible": "false"
        }]
    }));
    Some(announce(reply, "/system/sources"))
}

fn system_capabilities(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    reply.body = Some(capabilities(SYSTEM_CAPABILITIES));
    None
}

fn internal_capabilities(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    reply.body = Some(capabilities(INTERNAL_CAPABILITIES));
    None
}

fn activation_data(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    match reply.method() {
        Method::Get => {
            fail(
                reply,
                500,
                ErrorBody::new(
                    0i64,
                    1005i64,
                    "HandleFrontDoorRequest - Send failed - Request was not in GetRegistryWithPayload",
                ),
            );
            None
        }
        Method::Post => {
            reply.body = Some(json!({
                "swVersion": "5.0.8-0+13729d0",
                "productType": "eddie",
                "productMarketingName": "Bose Home Speaker 500"
            }));
            Some(announce(reply, "/system/activationData"))
        }
        _ => {
            fail(reply, 500, only_get_error());
            None
        }
    }
}

fn accessories(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    if reply.method() != Method::Put {
        return None;
    }
    if reply.body_field("/value").is_some() {
        reply.body = Some(json!({
            "disbandAccessories": false,
            "enabled": { "rears": false, "subs": false },
            "pairing": true
        }));
    }
    Some(announce(reply, "/accessories"))
}

fn remote(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    match reply.method() {
        Method::Get => {
            reply.body = Some(json!({
                "pairingState": "PSTATE_INIT",
                "remoteMacAddr": "no example specified",
                "remoteName": "no example specified",
                "remoteVersion": "no example specified"
            }));
        }
        Method::Put => reply.body = Some(json!({ "pair": "true", "timeout": 120 })),
        _ => fail(reply, 500, only_get_error()),
    }
    None
}

fn lightbar(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    let frame = json!({
        "repeat": "false",
        "transition": "no example specified",
        "value": "no example specified"
    });
    only_get(
        reply,
        json!({
            "currentValue": frame,
            "nextValue": frame,
            "properties": {
                "supportedTransistions": ["no example specified"],
                "supportedValues": ["no example specified"]
            }
        }),
    )
}

fn device_configure(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    if reply.method() != Method::Put {
        return None;
    }
    let step = |config_type: &str, completed: &str, required: &str| {
        json!({ "configType": config_type, "isCompleted": completed, "isRequired": required })
    };
    reply.body = Some(json!({
        "config": {
            "activationKey": "ACTIVATION_KEY_GAME",
            "friendlyName": "FRIENDLY_NAME_HDTV_TUNER",
            "routingInfo": {
                "availableInputs": [
                    "DEVICE_INPUT_HDMI1",
                    "DEVICE_INPUT_HDMI2",
                    "DEVICE_INPUT_HDMI3",
                    "DEVICE_INPUT_HDMI4"
                ],
                "input": "DEVICE_INPUT_UNKNOWN",
                "parentId": "TV"
            }
        },
        "id": "SLOT_0",
        "status": [
            step("ADDITIONAL_CONFIG_ROUTINGINFO", "false", "false"),
            step("ADDITIONAL_CONFIG_FRIENDLYNAME", "true", "false"),
            step("ADDITIONAL_CONFIG_ACTIVATIONKEY", "true", "true")
        ]
    }));
    None
}

fn system_language(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    reply.body = Some(json!({
        "code": "en",
        "properties": {
            "supported_language_codes": [
                "da", "de", "en-US", "es", "fr", "it", "nl", "sv", "ja", "zh", "ko", "th",
                "cs", "fi", "el", "no", "pl", "pt", "ro", "ru", "sl", "tr", "hu"
            ]
        }
    }));
    None
}

fn system_info(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    only_get(
        reply,
        json!({
            "countryCode": "US",
            "defaultName": "Bose Home Speaker 500",
            "guid": "26e9d45e-cb4e-4deb-8e6b-b68d66cfddbc",
            "name": "Living Room",
            "productColor": 0,
            "productId": 16422,
            "productName": "Bose Home Speaker 500",
            "productType": "eddie",
            "regionCode": "US",
            "serialNumber": "078338980220110AE",
            "softwareVersion": "1.5.16-3941+2048b03",
            "variantId": 1
        }),
    )
}

fn system_state(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    only_get(reply, json!({ "state": "BOOTING" }))
}

fn system_setup(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    reply.body = Some(json!({ "networkConfigured": "true", "isSetupCompleted": "false" }));
    None
}

fn system_activated(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    reply.body = Some(json!({ "status": "NOT_ACTIVATED" }));
    None
}

fn system_challenge(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    reply.body = Some(json!({
        "challenge": "1513630208",
        "guid": "26e9d45e-cb4e-4deb-8e6b-b68d66cfddbc",
        "signature": "I1khamtYXUpwLz10bkgxTT9ffmtuQzBMS3kzVFhUVlRnPC04SyFdTGJQKHV6eE9TOj0="
    }));
    None
}

fn product_sources_ready(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    if reply.method() != Method::Post {
        return None;
    }
    reply.body = Some(json!({ "ready": "true" }));
    Some(announce(reply, "/system/productSourcesReady"))
}

fn caps_initialization_status(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    on_get(reply, json!({ "CapsInitialized": "true" }))
}

fn update_status(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    only_get(
        reply,
        json!({
            "availableVersion": "0.0.0",
            "deadline": "1970-01-01T00:00:00.00Z",
            "deferrable": "true",
            "percent": 0,
            "status": "UP_TO_DATE"
        }),
    )
}

fn update_start(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    reply.body = Some(json!({
        "availableVersion": "",
        "deadline": "",
        "deferrable": "false",
        "localUpdate": "false",
        "percent": "0",
        "status": "CHECKING_FOR_UPDATE"
    }));
    None
}

fn audio_volume(device: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    match reply.method() {
        Method::Get => {
            reply.body = Some(json!({ "value": device.volume }));
            None
        }
        Method::Put => {
            let muted = reply.body_field("/muted").cloned();
            if let Some(volume) = int_field(reply, "value") {
                device.volume = volume.clamp(VOLUME_MIN, VOLUME_MAX);
                reply.body = Some(volume_body(device.volume, json!("false")));
            } else if let Some(muted) = muted {
                reply.body = Some(volume_body(device.volume, muted));
            } else {
                fail(reply, 400, missing_payload_error());
                return None;
            }
            Some(announce(reply, "/audio/volume"))
        }
        _ => {
            fail(reply, 500, only_get_error());
            None
        }
    }
}

fn step_volume(device: &mut MockDevice, reply: &mut Envelope, sign: i64) -> Option<Envelope> {
    if reply.method() != Method::Put {
        fail(reply, 500, only_get_error());
        return None;
    }
    let Some(delta) = int_field(reply, "delta") else {
        fail(reply, 400, missing_payload_error());
        return None;
    };
    device.volume = (device.volume + sign * delta).clamp(VOLUME_MIN, VOLUME_MAX);
    reply.body = Some(volume_body(device.volume, json!("false")));
    Some(announce(reply, "/audio/volume"))
}

fn volume_increment(device: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    step_volume(device, reply, 1)
}

fn volume_decrement(device: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    step_volume(device, reply, -1)
}

fn default_volume(device: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    if reply.method() != Method::Post {
        return None;
    }
    device.volume = DEFAULT_VOLUME;
    reply.body = Some(volume_body(device.volume, json!("false")));
    Some(announce(reply, "/audio/volume"))
}

fn ui_alive(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    if reply.method() != Method::Post {
        return None;
    }
    Some(announce(reply, "/ui/alive"))
}

fn bluetooth_sink_list(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    on_get(reply, json!({ "devices": [] }))
}

fn bluetooth_sink_status(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    on_get(reply, json!({ "devices": [], "status": "APP_INACTIVE" }))
}

fn bluetooth_mac_address(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    only_get(reply, json!({ "mac": "AA:BB:CC:DD:EE:FF" }))
}

fn bluetooth_le_setup_status(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    only_get(reply, json!({ "state": "INACTIVE" }))
}

fn demo(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    only_get(reply, json!({ "demoMode": "ON" }))
}

fn demo_key_config(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    match reply.method() {
        Method::Get | Method::Put | Method::Delete => {
            reply.body = Some(json!({
                "keyTable": [{
                    "origin": 0,
                    "keyEvent": 1,
                    "keyList": [4],
                    "timeOutList": [0],
                    "action": 1001,
                    "comment": "Console: MFB release between 0-1750 ms ---> play-pause"
                }]
            }));
        }
        _ => fail(reply, 500, only_get_error()),
    }
    None
}

fn network_ping(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    only_get(reply, json!({ "pong": "true" }))
}

fn network_status(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    only_get(
        reply,
        json!({
            "interfaces": [{
                "ipInfo": { "ipAddress": "192.168.1.0", "subnetMask": "255.255.255.192" },
                "macAddress": "ABCDEFGHIJ01",
                "name": "wlan0",
                "state": "UP",
                "type": "WIRELESS"
            }],
            "isPrimaryUp": "true",
            "primary": "WIRELESS",
            "primaryIpAddress": "192.168.1.1"
        }),
    )
}

fn wifi_status(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    only_get(
        reply,
        json!({
            "frequencyKhz": "5180000",
            "signalDbm": "-43",
            "ssid": "B-PRODUCT",
            "state": "WIFI_STATION_CONNECTED"
        }),
    )
}

fn wifi_profile(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    if reply.method() == Method::Post {
        let empty = match &reply.body {
            None | Some(Value::Null) => true,
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        };
        if empty {
            fail(reply, 400, missing_payload_error());
        }
    } else {
        reply.body = Some(json!({
            "profiles": [{ "security": "WPA_OR_WPA2", "ssid": "B-PRODUCT" }]
        }));
    }
    None
}

fn wifi_site_scan(device: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    if reply.method() == Method::Get {
        fail(reply, 400, missing_payload_error());
    } else {
        reply.body = Some(device.wifi_scan.clone());
    }
    None
}

fn voice_status(_: &mut MockDevice, reply: &mut Envelope) -> Option<Envelope> {
    only_get(reply, json!({ "status": "IDLE" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontdoor_protocol::{ErrorCode, Header, MessageType};

    fn request(method: Method, resource: &str, body: Option<Value>) -> Envelope {
        let mut envelope = Envelope::new(Header::new(method, resource))
            .with_message_type(MessageType::Request)
            .with_request_id(4);
        envelope.body = body;
        envelope
    }

    fn respond(device: &mut MockDevice, request: Envelope) -> CannedReply {
        CannedResponses::default().respond(device, request)
    }

    #[test]
    fn language_answers_english() {
        let reply = respond(&mut MockDevice::default(), request(Method::Get, "/system/language", None));
        assert!(reply.response.is_response());
        assert_eq!(reply.response.request_id(), Some(4));
        assert_eq!(reply.response.body_field("/code"), Some(&json!("en")));
        assert!(reply.notification.is_none());
    }

    #[test]
    fn unknown_resource_is_not_registered() {
        let reply = respond(
            &mut MockDevice::default(),
            request(Method::Post, "/does/not/exist", Some(json!({"x": 1}))),
        );
        let response = reply.response;
        assert_eq!(response.header.status, Some(500));
        assert!(response.body.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.message, "WEBSOCKET_API_NOT_REGISTERED");
        assert_eq!(error.code, ErrorCode::Number(1));
        assert_eq!(error.subcode, Some(ErrorCode::Number(2002)));
    }

    #[test]
    fn get_only_resource_rejects_post() {
        let reply = respond(&mut MockDevice::default(), request(Method::Post, "/demo", None));
        assert_eq!(reply.response.header.status, Some(500));
        assert_eq!(reply.response.error, Some(only_get_error()));
    }

    #[test]
    fn put_volume_updates_device_and_announces() {
        let mut device = MockDevice::default();
        let reply = respond(
            &mut device,
            request(Method::Put, "/audio/volume", Some(json!({"value": "45"}))),
        );
        assert_eq!(device.volume, 45);
        assert_eq!(reply.response.body_field("/value"), Some(&json!(45)));

        let notification = reply.notification.unwrap();
        assert!(notification.is_notification());
        assert_eq!(notification.resource(), "/audio/volume");
        assert_eq!(notification.message_type(), None);

        let reply = respond(&mut device, request(Method::Get, "/audio/volume", None));
        assert_eq!(reply.response.body, Some(json!({"value": 45})));
    }

    #[test]
    fn put_volume_without_payload_is_rejected() {
        let mut device = MockDevice::default();
        let reply = respond(&mut device, request(Method::Put, "/audio/volume", None));
        assert_eq!(reply.response.header.status, Some(400));
        assert_eq!(reply.response.error, Some(missing_payload_error()));
        assert!(reply.notification.is_none());
        assert_eq!(device.volume, DEFAULT_VOLUME);
    }

    #[test]
    fn increment_and_decrement_step_from_current_volume() {
        let mut device = MockDevice::default();
        respond(
            &mut device,
            request(Method::Put, "/audio/volume/increment", Some(json!({"delta": 5}))),
        );
        assert_eq!(device.volume, 35);

        let reply = respond(
            &mut device,
            request(Method::Put, "/audio/volume/decrement", Some(json!({"delta": 50}))),
        );
        assert_eq!(device.volume, VOLUME_MIN);
        assert_eq!(reply.notification.unwrap().resource(), "/audio/volume");
    }

    #[test]
    fn default_volume_resets() {
        let mut device = MockDevice {
            volume: 60,
            ..MockDevice::default()
        };
        respond(&mut device, request(Method::Post, "/audio/defaultVolume", None));
        assert_eq!(device.volume, DEFAULT_VOLUME);
    }

    #[test]
    fn site_scan_uses_device_data() {
        let mut device = MockDevice::default();
        device.wifi_scan = json!({"wifiScanResult": []});
        let reply = respond(&mut device, request(Method::Post, "/network/wifi/siteScan", None));
        assert_eq!(reply.response.body, Some(json!({"wifiScanResult": []})));

        let reply = respond(&mut device, request(Method::Get, "/network/wifi/siteScan", None));
        assert_eq!(reply.response.header.status, Some(400));
    }

    #[test]
    fn wifi_profile_post_requires_payload() {
        let mut device = MockDevice::default();
        let reply = respond(&mut device, request(Method::Post, "/network/wifi/profile", Some(json!({}))));
        assert_eq!(reply.response.header.status, Some(400));

        let reply = respond(&mut device, request(Method::Get, "/network/wifi/profile", None));
        assert_eq!(
            reply.response.body_field("/profiles/0/ssid"),
            Some(&json!("B-PRODUCT"))
        );
    }

    #[test]
    fn capability_lists_are_bundled() {
        let mut device = MockDevice::default();
        let reply = respond(&mut device, request(Method::Get, "/internal/capabilities", None));
        let capabilities = reply.response.body_field("/capability").and_then(Value::as_array).unwrap();
        assert!(capabilities.iter().any(|c| c["resource"] == json!("/audio/volume")));

        let reply = respond(&mut device, request(Method::Get, "/system/capabilities", None));
        assert!(reply.response.body_field("/group/0/apiGroup").is_some());
    }

    #[test]
    fn activation_data_post_announces_and_get_fails() {
        let mut device = MockDevice::default();
        let reply = respond(&mut device, request(Method::Post, "/system/activationData", Some(json!({}))));
        assert_eq!(reply.response.body_field("/productType"), Some(&json!("eddie")));
        assert_eq!(reply.notification.unwrap().resource(), "/system/activationData");

        let reply = respond(&mut device, request(Method::Get, "/system/activationData", None));
        assert_eq!(reply.response.header.status, Some(500));
        assert_eq!(reply.response.error.unwrap().subcode, Some(ErrorCode::Number(1005)));
    }

    #[test]
    fn discovery_and_sources_announce_on_their_method() {
        let mut device = MockDevice::default();
        let reply = respond(&mut device, request(Method::Post, "/startDiscoveryAdvertisement", None));
        assert_eq!(reply.response.body_field("/ecosys"), Some(&json!("ECO2")));
        assert!(reply.notification.is_some());

        let reply = respond(&mut device, request(Method::Get, "/system/sources", None));
        assert!(reply.notification.is_none());
        assert_eq!(reply.response.header.status, None);

        let reply = respond(&mut device, request(Method::Put, "/system/sources", Some(json!({}))));
        assert_eq!(
            reply.response.body_field("/sources/0/sourceName"),
            Some(&json!("Spotify"))
        );
    }

    #[test]
    fn remote_lightbar_and_configure() {
        let mut device = MockDevice::default();
        let reply = respond(&mut device, request(Method::Put, "/remote", Some(json!({}))));
        assert_eq!(reply.response.body_field("/timeout"), Some(&json!(120)));
        let reply = respond(&mut device, request(Method::Post, "/remote", Some(json!({}))));
        assert_eq!(reply.response.header.status, Some(500));

        let reply = respond(&mut device, request(Method::Post, "/ui/lightbar", Some(json!({}))));
        assert_eq!(reply.response.error, Some(only_get_error()));

        let reply = respond(&mut device, request(Method::Put, "/device/configure", Some(json!({}))));
        assert_eq!(reply.response.body_field("/id"), Some(&json!("SLOT_0")));

        let reply = respond(&mut device, request(Method::Post, "/cloudSync", None));
        assert!(reply.response.is_response());
        assert!(reply.response.error.is_none());
    }

    #[test]
    fn table_lists_resources() {
        let canned = CannedResponses::default();
        assert!(canned.contains("/system/language"));
        assert!(!canned.contains("/register"));
        let resources = canned.resources();
        assert!(resources.windows(2).all(|w| w[0] <= w[1]));
    }
}
