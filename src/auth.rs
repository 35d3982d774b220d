//! Channel authorization.
//!
//! Access-controlled channels delegate the authorization step to an
//! [`Authorizer`]. Each channel creates its authorizer lazily through an
//! [`AuthorizerFactory`] taken from [`ClientOptions`]; a factory configured
//! by the application replaces the built-in [`HttpAuthorizer`].
//!
//! # Usage
//!
//! ```ignore
//! let options = ClientOptions::default().with_authorizer(Arc::new(|channel, _options| {
//!     Box::new(SignedTokenAuthorizer::new(channel.name()))
//! }));
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::config::{AuthOptions, ClientOptions};
use crate::error::ChannelError;

/// Credential returned by an authorizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthData {
    /// Opaque signature sent with the subscribe command.
    pub auth: String,
    /// Channel-specific payload (presence member info).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
    /// Key material for encrypted channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,
}

/// One-shot reply to an authorization request.
pub type AuthorizerCallback = Box<dyn FnOnce(Result<AuthData, ChannelError>) + Send>;

/// Performs the out-of-band check that grants access to a channel.
pub trait Authorizer: Send + Sync {
    /// Authorize `socket_id` and reply through `callback`.
    ///
    /// Implementations must invoke `callback` exactly once, possibly from
    /// another thread and possibly before returning.
    fn authorize(&self, socket_id: &str, callback: AuthorizerCallback);
}

/// Strategy that builds the authorizer for a channel.
pub type AuthorizerFactory =
    Arc<dyn Fn(&Channel, &ClientOptions) -> Box<dyn Authorizer> + Send + Sync>;

/// Factory used when the options carry no override: an [`HttpAuthorizer`].
#[must_use]
pub fn default_authorizer_factory() -> AuthorizerFactory {
    Arc::new(|channel: &Channel, options: &ClientOptions| -> Box<dyn Authorizer> {
        Box::new(HttpAuthorizer::new(channel.name(), options))
    })
}

/// Authorizer that POSTs the socket id and channel name to an auth endpoint.
///
/// The request runs on a background thread; the response is expected to be
/// the JSON form of [`AuthData`].
#[derive(Debug, Clone)]
pub struct HttpAuthorizer {
    channel_name: String,
    endpoint: String,
    auth: AuthOptions,
    timeout: Duration,
}

impl HttpAuthorizer {
    /// Create an authorizer for `channel_name` using the endpoint in `options`.
    #[must_use]
    pub fn new(channel_name: &str, options: &ClientOptions) -> Self {
        Self {
            channel_name: channel_name.to_string(),
            endpoint: options.auth_endpoint.clone(),
            auth: options.auth.clone(),
            timeout: options.auth_timeout(),
        }
    }

    /// Form body: `socket_id`, `channel_name`, then the configured params.
    fn form<'a>(&'a self, socket_id: &'a str) -> Vec<(&'a str, &'a str)> {
        let mut form = vec![
            ("socket_id", socket_id),
            ("channel_name", self.channel_name.as_str()),
        ];
        form.extend(self.auth.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        form
    }

    /// Perform the auth request on the calling thread.
    pub fn request(&self, socket_id: &str) -> Result<AuthData, ChannelError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| {
                ChannelError::AuthorizationFailed(format!("Failed to build HTTP client: {e}"))
            })?;

        let mut request = client.post(&self.endpoint).form(&self.form(socket_id));
        for (name, value) in &self.auth.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().map_err(|e| {
            ChannelError::AuthorizationFailed(format!(
                "Auth request to {} failed: {e}",
                self.endpoint
            ))
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ChannelError::auth_status(status.as_u16()));
        }

        let body = response.text().map_err(|e| {
            ChannelError::AuthorizationFailed(format!("Failed to read auth response: {e}"))
        })?;

        serde_json::from_str(&body).map_err(|e| {
            log::debug!("Auth response for {} is not auth data: {}", self.channel_name, e);
            ChannelError::InvalidAuthResponse(body.clone())
        })
    }
}

impl Authorizer for HttpAuthorizer {
    fn authorize(&self, socket_id: &str, callback: AuthorizerCallback) {
        let authorizer = self.clone();
        let socket_id = socket_id.to_string();

        log::debug!(
            "Requesting auth for {} from {}",
            self.channel_name,
            self.endpoint
        );

        thread::spawn(move || {
            let result = authorizer.request(&socket_id);
            if let Err(e) = &result {
                log::warn!("Authorization for {} failed: {}", authorizer.channel_name, e);
            }
            callback(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auth_data_optional_fields() {
        let data: AuthData = serde_json::from_value(json!({"auth": "key:sig"})).unwrap();
        assert_eq!(data.auth, "key:sig");
        assert!(data.channel_data.is_none());
        assert!(data.shared_secret.is_none());

        let data: AuthData = serde_json::from_value(json!({
            "auth": "key:sig",
            "channel_data": "{\"user_id\":\"1\"}"
        }))
        .unwrap();
        assert_eq!(data.channel_data.as_deref(), Some("{\"user_id\":\"1\"}"));
    }

    #[test]
    fn test_auth_data_requires_auth() {
        assert!(serde_json::from_value::<AuthData>(json!({"foo": "bar"})).is_err());
    }

    /// The form starts with socket id and channel name, then configured params.
    #[test]
    fn test_form_fields() {
        let options = ClientOptions::default().with_auth_param("foo", "bar");
        let authorizer = HttpAuthorizer::new("private-test", &options);
        assert_eq!(
            authorizer.form("1.23"),
            vec![
                ("socket_id", "1.23"),
                ("channel_name", "private-test"),
                ("foo", "bar"),
            ]
        );
    }

    /// The default relative endpoint cannot be requested without a base URL.
    #[test]
    fn test_request_relative_endpoint_fails() {
        let authorizer = HttpAuthorizer::new("private-test", &ClientOptions::default());
        let err = authorizer.request("1.23").unwrap_err();
        assert!(matches!(err, ChannelError::AuthorizationFailed(_)));
    }
}
