//! Channel subscription state machine and event routing.
//!
//! A [`Channel`] owns an [`EventDispatcher`], tracks the subscribe handshake,
//! routes inbound [`Frame`]s to bindings and gates outbound client events.
//! The transport is reached only through the [`Connection`] collaborator.
//!
//! # Lifecycle
//!
//! ```text
//!   Initial ──authorize──► AuthorizationPending ──subscribe sent──► SubscriptionPending
//!                                                                        │
//!                                     pusher_internal:subscription_succeeded
//!                                                                        ▼
//!   Unsubscribed ◄──────────── disconnect / unsubscribe ─────────────  Subscribed
//! ```
//!
//! `cancel_subscription` is an orthogonal flag: when the acknowledgement
//! arrives on a cancelled channel, the server subscription is released
//! immediately and no public event is emitted.
//!
//! # Event namespaces
//!
//! - `pusher_internal:*` frames are consumed here and never reach bindings
//! - `pusher:*` events are emitted by the channel to bindings
//! - `client-*` is the only namespace accepted by [`Channel::trigger`]

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::auth::{AuthData, Authorizer};
use crate::config::ClientOptions;
use crate::constants::{
    CLIENT_EVENT_PREFIX, INTERNAL_PREFIX, INTERNAL_SUBSCRIPTION_SUCCEEDED,
    PRESENCE_CHANNEL_PREFIX, PRIVATE_CHANNEL_PREFIX, SUBSCRIBE, SUBSCRIPTION_ERROR,
    SUBSCRIPTION_SUCCEEDED, UNSUBSCRIBE,
};
use crate::dispatcher::{BindingId, EventDispatcher, Metadata};
use crate::error::ChannelError;

/// Transport-facing side of the owning client, shared by all its channels.
pub trait Connection: Send + Sync {
    /// Attempt to transmit an event.
    ///
    /// Returns `false` if the transport cannot send right now.
    fn send_event(&self, event: &str, data: &Value, channel: Option<&str>) -> bool;

    /// Ask the server to drop the subscription to `channel`.
    fn unsubscribe(&self, channel: &str);
}

/// Protocol variant, selected by the channel name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// No authorization step.
    Public,
    /// `private-*`: authorized before subscribing.
    Private,
    /// `presence-*`: authorized like a private channel.
    Presence,
}

impl ChannelKind {
    /// Select the variant for `name`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.starts_with(PRIVATE_CHANNEL_PREFIX) {
            Self::Private
        } else if name.starts_with(PRESENCE_CHANNEL_PREFIX) {
            Self::Presence
        } else {
            Self::Public
        }
    }

    /// Returns `true` if subscribing needs an authorizer.
    #[must_use]
    pub fn requires_authorization(self) -> bool {
        matches!(self, Self::Private | Self::Presence)
    }
}

/// Inbound protocol frame, already decoded by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
    /// Channel the frame is addressed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Originating member of a client event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Frame {
    /// Frame with `event` and `data` and no routing fields.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            channel: None,
            user_id: None,
        }
    }

    /// Address the frame to `channel`.
    #[must_use]
    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    fn metadata(&self) -> Metadata {
        Metadata {
            user_id: self.user_id.clone(),
        }
    }
}

/// A named subscription endpoint.
pub struct Channel {
    name: String,
    kind: ChannelKind,
    connection: Arc<dyn Connection>,
    options: Arc<ClientOptions>,
    dispatcher: EventDispatcher,

    /// Server acknowledged the subscription and the transport is up.
    subscribed: AtomicBool,
    /// Subscribe requested, acknowledgement not yet handled.
    subscription_pending: AtomicBool,
    /// Caller lost interest; never reset.
    subscription_cancelled: AtomicBool,

    /// Authorization capability; `None` for public channels.
    /// Created on first use and reused for the channel's lifetime.
    authorizer: Option<OnceLock<Box<dyn Authorizer>>>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("subscribed", &self.is_subscribed())
            .field("subscription_pending", &self.is_subscription_pending())
            .field("subscription_cancelled", &self.is_subscription_cancelled())
            .field("has_authorizer", &self.has_authorizer())
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Create a channel whose variant is selected by `name`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        connection: Arc<dyn Connection>,
        options: Arc<ClientOptions>,
    ) -> Self {
        let name = name.into();
        let kind = ChannelKind::from_name(&name);
        Self {
            authorizer: kind.requires_authorization().then(OnceLock::new),
            name,
            kind,
            connection,
            options,
            dispatcher: EventDispatcher::new(),
            subscribed: AtomicBool::new(false),
            subscription_pending: AtomicBool::new(false),
            subscription_cancelled: AtomicBool::new(false),
        }
    }

    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protocol variant.
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Options of the owning client.
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// The channel's event dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Server acknowledged the subscription.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    /// A subscribe request is outstanding.
    #[must_use]
    pub fn is_subscription_pending(&self) -> bool {
        self.subscription_pending.load(Ordering::SeqCst)
    }

    /// The caller cancelled before acknowledgement.
    #[must_use]
    pub fn is_subscription_cancelled(&self) -> bool {
        self.subscription_cancelled.load(Ordering::SeqCst)
    }

    /// Returns `true` once an authorizer has been created.
    #[must_use]
    pub fn has_authorizer(&self) -> bool {
        self.authorizer
            .as_ref()
            .is_some_and(|cell| cell.get().is_some())
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    /// Bind `callback` to `event`.
    pub fn bind<F>(&self, event: &str, callback: F) -> BindingId
    where
        F: Fn(&Value, &Metadata) + Send + Sync + 'static,
    {
        self.dispatcher.bind(event, callback)
    }

    /// Bind `callback` to every public event on this channel.
    pub fn bind_global<F>(&self, callback: F) -> BindingId
    where
        F: Fn(&str, &Value, &Metadata) + Send + Sync + 'static,
    {
        self.dispatcher.bind_global(callback)
    }

    /// Remove binding `id` from `event`.
    pub fn unbind(&self, event: &str, id: BindingId) -> bool {
        self.dispatcher.unbind(event, id)
    }

    /// Remove every binding for `event`.
    pub fn unbind_event(&self, event: &str) {
        self.dispatcher.unbind_event(event);
    }

    /// Remove global binding `id`.
    pub fn unbind_global(&self, id: BindingId) -> bool {
        self.dispatcher.unbind_global(id)
    }

    /// Remove all bindings.
    pub fn unbind_all(&self) {
        self.dispatcher.unbind_all();
    }

    // ========================================================================
    // Authorization
    // ========================================================================

    /// Obtain credentials for subscribing with `socket_id`.
    ///
    /// The authorizer's reply is passed to `callback` unchanged. Public
    /// channels need no credentials and reply immediately with empty
    /// [`AuthData`]. Subscription state is not touched.
    pub fn authorize<F>(&self, socket_id: &str, callback: F)
    where
        F: FnOnce(Result<AuthData, ChannelError>) + Send + 'static,
    {
        let Some(cell) = &self.authorizer else {
            callback(Ok(AuthData::default()));
            return;
        };

        let authorizer = cell.get_or_init(|| {
            log::debug!("Creating authorizer for {}", self.name);
            let factory = self.options.authorizer_factory();
            factory(self, self.options.as_ref())
        });
        authorizer.authorize(socket_id, Box::new(callback));
    }

    /// Future-returning form of [`Channel::authorize`].
    ///
    /// The request is issued when this method is called, not when the
    /// future is first polled; dropping the future does not cancel it.
    /// Resolves to an error if the authorizer drops the request without
    /// replying.
    pub fn authorize_async(
        &self,
        socket_id: &str,
    ) -> impl Future<Output = Result<AuthData, ChannelError>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.authorize(socket_id, move |result| {
            // Receiver gone means the caller stopped waiting.
            let _ = tx.send(result);
        });

        async move {
            rx.await.unwrap_or_else(|_closed| {
                Err(ChannelError::AuthorizationFailed(
                    "Authorizer dropped the request without replying".to_string(),
                ))
            })
        }
    }

    // ========================================================================
    // Subscription lifecycle
    // ========================================================================

    /// Run the subscribe handshake: authorize, then send `pusher:subscribe`.
    ///
    /// No-op if already subscribed. On authorization failure the pending
    /// flag is cleared and `pusher:subscription_error` is emitted. A channel
    /// dropped before the authorizer replies ignores the reply.
    pub fn subscribe(self: &Arc<Self>, socket_id: &str) {
        if self.is_subscribed() {
            log::debug!("{} already subscribed", self.name);
            return;
        }

        self.subscription_pending.store(true, Ordering::SeqCst);
        log::info!("Subscribing to {}", self.name);

        let channel = Arc::downgrade(self);
        self.authorize(socket_id, move |result| match channel.upgrade() {
            Some(channel) => channel.finish_subscribe(result),
            None => log::debug!("Channel dropped before authorization reply"),
        });
    }

    fn finish_subscribe(&self, result: Result<AuthData, ChannelError>) {
        match result {
            Ok(auth) => {
                let mut data = json!({ "channel": self.name });
                if !auth.auth.is_empty() {
                    data["auth"] = Value::String(auth.auth);
                }
                if let Some(channel_data) = auth.channel_data {
                    data["channel_data"] = Value::String(channel_data);
                }
                if !self.connection.send_event(SUBSCRIBE, &data, None) {
                    log::debug!("Subscribe for {} not sent, connection unavailable", self.name);
                }
            }
            Err(e) => {
                self.subscription_pending.store(false, Ordering::SeqCst);
                log::warn!("Unable to subscribe to {}: {}", self.name, e);
                let data = json!({ "type": "AuthError", "error": e.to_string() });
                self.dispatcher
                    .emit(SUBSCRIPTION_ERROR, &data, &Metadata::default());
            }
        }
    }

    /// Tell the server to drop this subscription.
    pub fn unsubscribe(&self) {
        self.subscribed.store(false, Ordering::SeqCst);
        log::info!("Unsubscribing from {}", self.name);
        self.connection
            .send_event(UNSUBSCRIBE, &json!({ "channel": self.name }), None);
    }

    /// Stop caring about a pending subscription.
    ///
    /// Only affects how a later `subscription_succeeded` frame is handled.
    /// Idempotent.
    pub fn cancel_subscription(&self) {
        if !self.subscription_cancelled.swap(true, Ordering::SeqCst) {
            log::debug!("Subscription to {} cancelled", self.name);
        }
    }

    /// The transport connection was lost.
    ///
    /// Only `subscribed` changes; handshake progress and intent are kept.
    pub fn disconnect(&self) {
        self.subscribed.store(false, Ordering::SeqCst);
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Send a client event to the other subscribers.
    ///
    /// Returns whether the transport accepted the frame. The only error is a
    /// name outside the `client-` namespace, in which case nothing is sent.
    pub fn trigger(&self, event: &str, data: &Value) -> Result<bool, ChannelError> {
        if !event.starts_with(CLIENT_EVENT_PREFIX) {
            return Err(ChannelError::BadEventName(event.to_string()));
        }

        if !self.is_subscribed() {
            log::warn!(
                "Client event '{}' triggered on {} before subscription succeeded",
                event,
                self.name
            );
        }

        Ok(self.connection.send_event(event, data, Some(&self.name)))
    }

    /// Route an inbound frame.
    pub fn handle_event(&self, frame: &Frame) {
        let event = frame.event.as_str();

        if event == INTERNAL_SUBSCRIPTION_SUCCEEDED {
            self.handle_subscription_succeeded(&frame.data);
        } else if event.starts_with(INTERNAL_PREFIX) {
            log::debug!("Consumed internal event '{}' on {}", event, self.name);
        } else {
            self.dispatcher.emit(event, &frame.data, &frame.metadata());
        }
    }

    fn handle_subscription_succeeded(&self, data: &Value) {
        self.subscription_pending.store(false, Ordering::SeqCst);
        self.subscribed.store(true, Ordering::SeqCst);

        if self.is_subscription_cancelled() {
            log::info!("{} acknowledged after cancellation, releasing", self.name);
            self.connection.unsubscribe(&self.name);
        } else {
            log::info!("{} subscription succeeded", self.name);
            self.dispatcher
                .emit(SUBSCRIPTION_SUCCEEDED, data, &Metadata::default());
        }
    }
}
