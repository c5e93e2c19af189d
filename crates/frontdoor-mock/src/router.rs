//! Per-message routing for the mock server.
//!
//! Every inbound envelope from client C is handled by the first matching
//! rule:
//!
//! 1. `/register`: record `body.resource → C` and answer C with status 200.
//! 2. A callback is installed for the resource: invoke it.
//! 3. `method == NOTIFY`: broadcast the raw text to every client.
//! 4. The resource has an owner: forward REQUESTs to the owner and
//!    RESPONSEs to the `/test/client` controller; drop anything else.
//! 5. Otherwise answer C from the canned-response table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use frontdoor_protocol::{Envelope, Header, MessageType, Method, decode_message, encode_message};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::canned::{CannedResponses, MockDevice, missing_payload_error};
use crate::clients::{ClientTable, Outbound};
use crate::error::{MockError, MockResult};
use crate::registry::{ClientId, ResourceRegistry};

/// Resource a client posts to in order to claim another resource.
pub const REGISTER_RESOURCE: &str = "/register";

/// Resource claimed by the controller that collects forwarded RESPONSEs.
pub const CONTROLLER_RESOURCE: &str = "/test/client";

/// Server-side handler invoked instead of the default routing for a resource.
pub type ResourceCallback = Arc<dyn Fn(&MockHub, ClientId, Envelope) + Send + Sync>;

/// Routing decision for one inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Claim `resource` for the sender.
    Register { resource: String },
    /// `/register` without a `body.resource` string.
    RegisterMissingPayload,
    /// Hand the envelope to an installed callback.
    Callback,
    /// Fan the raw text out to every client.
    Broadcast,
    /// Send the raw text to the resource owner.
    Forward(ClientId),
    /// Send the raw text to the controller, if one is registered.
    ForwardToController(Option<ClientId>),
    /// Registered resource with an unexpected message type.
    Drop,
    /// Answer from the canned table.
    Canned,
}

struct HubInner {
    registry: ResourceRegistry,
    clients: ClientTable,
    callbacks: RwLock<HashMap<String, ResourceCallback>>,
    canned: CannedResponses,
    device: Mutex<MockDevice>,
}

/// Shared routing state of a mock server.
///
/// Cheap to clone; all clones see the same registry, clients and device.
#[derive(Clone)]
pub struct MockHub {
    inner: Arc<HubInner>,
}

impl Default for MockHub {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl MockHub {
    /// Creates a hub whose resource waits poll at `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self::with_canned(poll_interval, CannedResponses::default())
    }

    /// Creates a hub with a custom canned-response table.
    pub fn with_canned(poll_interval: Duration, canned: CannedResponses) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry: ResourceRegistry::new(poll_interval),
                clients: ClientTable::default(),
                callbacks: RwLock::new(HashMap::new()),
                canned,
                device: Mutex::new(MockDevice::default()),
            }),
        }
    }

    /// Adds a connected client whose outbound frames go to `outbound`.
    pub fn attach(&self, outbound: Outbound) -> ClientId {
        let client = self.inner.clients.connect(outbound);
        info!(%client, "New client connected");
        client
    }

    /// Removes a client and releases every resource it owned.
    pub fn detach(&self, client: ClientId) {
        self.inner.clients.disconnect(client);
        self.inner.registry.remove_client(client);
        info!(%client, "Client disconnected");
    }

    /// Decides how `envelope` from a client is routed.
    pub fn route(&self, envelope: &Envelope) -> Route {
        let resource = envelope.resource();

        if resource == REGISTER_RESOURCE {
            return match envelope.body_field("/resource").and_then(Value::as_str) {
                Some(target) => Route::Register {
                    resource: target.to_string(),
                },
                None => Route::RegisterMissingPayload,
            };
        }

        if self.has_callback(resource) {
            return Route::Callback;
        }

        if envelope.is_notification() {
            return Route::Broadcast;
        }

        if let Some(owner) = self.inner.registry.owner(resource) {
            return match envelope.message_type() {
                Some(MessageType::Request) => Route::Forward(owner),
                Some(MessageType::Response) => {
                    Route::ForwardToController(self.inner.registry.owner(CONTROLLER_RESOURCE))
                }
                _ => Route::Drop,
            };
        }

        Route::Canned
    }

    /// Handles one inbound text frame from `client`.
    ///
    /// Malformed envelopes are logged and dropped without a reply.
    pub fn handle_message(&self, client: ClientId, text: &str) {
        debug!(%client, message = %text, "Client said");

        let envelope = match decode_message(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%client, error = %e, "Dropping malformed message");
                return;
            }
        };

        let route = self.route(&envelope);
        debug!(%client, resource = %envelope.resource(), ?route, "Routing message");

        match route {
            Route::Register { resource } => {
                self.register_resource_handler(resource, client);
                let mut reply = envelope.into_response();
                reply.header.status = Some(200);
                self.reply(client, &reply);
            }
            Route::RegisterMissingPayload => {
                let reply = envelope.into_response().into_failure(400, missing_payload_error());
                self.reply(client, &reply);
            }
            Route::Callback => {
                if let Some(callback) = self.callback(envelope.resource()) {
                    callback(self, client, envelope);
                }
            }
            Route::Broadcast => {
                let delivered = self.inner.clients.broadcast(text);
                debug!(resource = %envelope.resource(), delivered, "Broadcast notification");
            }
            Route::Forward(owner) => {
                self.inner.clients.send_to(owner, text);
            }
            Route::ForwardToController(Some(controller)) => {
                self.inner.clients.send_to(controller, text);
            }
            Route::ForwardToController(None) => {
                info!(resource = %envelope.resource(), "No controller registered, dropping response");
            }
            Route::Drop => {
                info!(
                    resource = %envelope.resource(),
                    message_type = ?envelope.message_type(),
                    "Neither request nor response, dismissing"
                );
            }
            Route::Canned => {
                let reply = {
                    let mut device = self.inner.device.lock().unwrap_or_else(PoisonError::into_inner);
                    self.inner.canned.respond(&mut device, envelope)
                };
                self.reply(client, &reply.response);
                if let Some(notification) = reply.notification {
                    self.reply(client, &notification);
                }
            }
        }
    }

    /// Records `client` as the owner of `resource` (last registrant wins).
    pub fn register_resource_handler(&self, resource: impl Into<String>, client: ClientId) {
        self.inner.registry.register(resource, client);
    }

    /// Sends `envelope` to every connected client; returns how many got it.
    pub fn broadcast(&self, envelope: &Envelope) -> MockResult<usize> {
        let text = encode_message(envelope)?;
        Ok(self.inner.clients.broadcast(&text))
    }

    /// Sends `envelope` to the client that registered `resource`.
    pub fn send_to(&self, resource: &str, envelope: &Envelope) -> MockResult<()> {
        let owner = self
            .inner
            .registry
            .owner(resource)
            .ok_or_else(|| MockError::resource_not_found(resource))?;
        let text = encode_message(envelope)?;
        if self.inner.clients.send_to(owner, text) {
            Ok(())
        } else {
            Err(MockError::resource_not_found(resource))
        }
    }

    /// Sends `envelope` to one specific client.
    pub fn send_to_client(&self, client: ClientId, envelope: &Envelope) -> MockResult<bool> {
        let text = encode_message(envelope)?;
        Ok(self.inner.clients.send_to(client, text))
    }

    /// Registered resources, sorted.
    pub fn list_resources(&self) -> Vec<String> {
        self.inner.registry.resources()
    }

    /// Waits until some client has registered `resource`.
    pub async fn wait_for_client_resource(&self, resource: &str, timeout: Duration) -> bool {
        self.inner.registry.wait_for(resource, timeout).await
    }

    /// Waits until at least one client is connected.
    pub async fn wait_for_client(&self, timeout: Duration) -> bool {
        self.inner.clients.wait_for_client(timeout).await
    }

    /// Installs `callback` for `resource`, replacing any previous one.
    pub fn add_callback(&self, resource: impl Into<String>, callback: ResourceCallback) {
        self.inner
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource.into(), callback);
    }

    /// Removes the callback for `resource`.
    pub fn remove_callback(&self, resource: &str) -> bool {
        self.inner
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(resource)
            .is_some()
    }

    /// Connected client ids.
    pub fn clients(&self) -> Vec<ClientId> {
        self.inner.clients.ids()
    }

    /// Current mock device volume.
    pub fn volume(&self) -> i64 {
        self.device(|device| device.volume)
    }

    /// Replaces the body served by `/network/wifi/siteScan`.
    pub fn set_wifi_scan_data(&self, data: Value) {
        self.device(|device| device.wifi_scan = data);
    }

    /// Runs `f` with exclusive access to the mock device state.
    pub fn device<R>(&self, f: impl FnOnce(&mut MockDevice) -> R) -> R {
        let mut device = self.inner.device.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut device)
    }

    /// Answers `client` directly, logging encode failures.
    pub fn reply(&self, client: ClientId, envelope: &Envelope) {
        match encode_message(envelope) {
            Ok(text) => {
                self.inner.clients.send_to(client, text);
            }
            Err(e) => warn!(%client, error = %e, "Failed to encode reply"),
        }
    }

    fn has_callback(&self, resource: &str) -> bool {
        self.inner
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(resource)
    }

    fn callback(&self, resource: &str) -> Option<ResourceCallback> {
        self.inner
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .cloned()
    }
}

/// Builds a REQUEST envelope, mostly useful for tests and tooling.
pub fn request_envelope(method: Method, resource: &str, body: Option<Value>, request_id: u32) -> Envelope {
    let mut envelope = Envelope::new(Header::new(method, resource))
        .with_message_type(MessageType::Request)
        .with_request_id(request_id);
    envelope.body = body;
    envelope
}
