//! Protocol constants for the channel layer.
//!
//! Event names are partitioned by prefix. The server's control frames use
//! [`INTERNAL_PREFIX`] and never reach application bindings; events the
//! channel itself emits to applications use [`PUBLIC_PREFIX`]; events a
//! client may originate must start with [`CLIENT_EVENT_PREFIX`].
//!
//! # Categories
//!
//! - **Namespaces**: event name prefixes
//! - **Channel names**: prefixes that select the channel variant
//! - **Events**: concrete protocol event names
//! - **Authorization**: defaults for the HTTP authorizer

use std::time::Duration;

// ============================================================================
// Namespaces
// ============================================================================

/// Prefix reserved for server control frames.
pub const INTERNAL_PREFIX: &str = "pusher_internal:";

/// Prefix of events the channel layer emits to application bindings.
pub const PUBLIC_PREFIX: &str = "pusher:";

/// Prefix required on every client-originated event.
pub const CLIENT_EVENT_PREFIX: &str = "client-";

// ============================================================================
// Channel names
// ============================================================================

/// Access-controlled channel; subscribing requires authorization.
pub const PRIVATE_CHANNEL_PREFIX: &str = "private-";

/// Presence channel; authorized like a private channel.
pub const PRESENCE_CHANNEL_PREFIX: &str = "presence-";

// ============================================================================
// Events
// ============================================================================

/// Server acknowledgement of a subscribe request.
pub const INTERNAL_SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";

/// Public counterpart of [`INTERNAL_SUBSCRIPTION_SUCCEEDED`].
pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher:subscription_succeeded";

/// Emitted when the authorization step of `subscribe` fails.
pub const SUBSCRIPTION_ERROR: &str = "pusher:subscription_error";

/// Outbound subscribe command.
pub const SUBSCRIBE: &str = "pusher:subscribe";

/// Outbound unsubscribe command.
pub const UNSUBSCRIBE: &str = "pusher:unsubscribe";

// ============================================================================
// Authorization
// ============================================================================

/// Endpoint the HTTP authorizer posts to when none is configured.
pub const DEFAULT_AUTH_ENDPOINT: &str = "/pusher/auth";

/// Request timeout for the HTTP authorizer.
///
/// A request that never completes would otherwise leave the channel waiting
/// for authorization indefinitely.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(30);
