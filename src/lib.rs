//! Pusher-style channel subscriptions, client side.
//!
//! This crate implements the channel layer of a publish/subscribe client:
//! the subscription lifecycle state machine, routing of inbound protocol
//! frames to application callbacks, validation of outbound client events,
//! and pluggable channel authorization.
//!
//! # Architecture
//!
//! - **Channel** - Subscription state machine and event routing
//! - **Dispatcher** - Per-channel callback registry
//! - **Auth** - Authorizer trait, factory strategy and HTTP authorizer
//! - **Registry** - Client-side map of channels
//!
//! The transport is out of scope: the owning client implements
//! [`Connection`] and feeds decoded [`Frame`]s to [`Channel::handle_event`].
//!
//! # Usage
//!
//! ```ignore
//! let mut channels = ChannelRegistry::new(connection, ClientOptions::load(None)?);
//! let channel = channels.add("private-orders");
//! channel.bind("order-created", |data, _meta| println!("{data}"));
//! channel.subscribe(&socket_id);
//! ```

pub mod auth;
pub mod channel;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod registry;

// Re-export commonly used types
pub use auth::{AuthData, Authorizer, AuthorizerCallback, AuthorizerFactory, HttpAuthorizer};
pub use channel::{Channel, ChannelKind, Connection, Frame};
pub use config::{AuthOptions, ClientOptions};
pub use dispatcher::{BindingId, EventDispatcher, Metadata};
pub use error::ChannelError;
pub use registry::ChannelRegistry;
