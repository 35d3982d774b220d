//! Error taxonomy for the channel layer.
//!
//! Only [`ChannelError::BadEventName`] is ever returned synchronously. The
//! authorization variants travel as data through authorizer callbacks.

use crate::constants::CLIENT_EVENT_PREFIX;

/// Errors that can occur during channel operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// `trigger` was called with a name outside the client-event namespace.
    BadEventName(String),
    /// The authorizer could not obtain credentials.
    AuthorizationFailed(String),
    /// The auth endpoint answered 200 with a body that is not auth data.
    InvalidAuthResponse(String),
}

impl ChannelError {
    /// Authorization failure for a non-success HTTP status.
    #[must_use]
    pub fn auth_status(status: u16) -> Self {
        Self::AuthorizationFailed(format!(
            "Unable to retrieve auth string from auth endpoint - received status: {status}"
        ))
    }
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadEventName(name) => {
                write!(f, "Event '{name}' does not start with '{CLIENT_EVENT_PREFIX}'")
            }
            Self::AuthorizationFailed(msg) => write!(f, "{msg}"),
            Self::InvalidAuthResponse(body) => write!(
                f,
                "JSON returned from auth endpoint was invalid, yet status code was 200. Data was: {body}"
            ),
        }
    }
}

impl std::error::Error for ChannelError {}
