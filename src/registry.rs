//! Channel registry owned by the client.
//!
//! Channels are created on first subscription request and live until the
//! client removes them. Inbound frames are routed to a channel by the
//! frame's `channel` field.

use std::collections::HashMap;
use std::sync::Arc;

use crate::channel::{Channel, Connection, Frame};
use crate::config::ClientOptions;

/// All channels of one client, keyed by name.
pub struct ChannelRegistry {
    connection: Arc<dyn Connection>,
    options: Arc<ClientOptions>,
    channels: HashMap<String, Arc<Channel>>,
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.names())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ChannelRegistry {
    /// Create an empty registry whose channels share `connection` and `options`.
    #[must_use]
    pub fn new(connection: Arc<dyn Connection>, options: ClientOptions) -> Self {
        Self {
            connection,
            options: Arc::new(options),
            channels: HashMap::new(),
        }
    }

    /// Get the channel named `name`, creating it if needed.
    ///
    /// A channel whose subscription was cancelled is replaced by a fresh
    /// instance; bindings made on the cancelled one are not carried over.
    pub fn add(&mut self, name: &str) -> Arc<Channel> {
        if let Some(existing) = self.channels.get(name) {
            if !existing.is_subscription_cancelled() {
                return Arc::clone(existing);
            }
            log::debug!("Replacing cancelled channel {}", name);
        } else {
            log::debug!("Creating channel {}", name);
        }

        let channel = Arc::new(Channel::new(
            name,
            Arc::clone(&self.connection),
            Arc::clone(&self.options),
        ));
        self.channels.insert(name.to_string(), Arc::clone(&channel));
        channel
    }

    /// Drop interest in the channel named `name`.
    ///
    /// A pending subscription is cancelled and the channel stays registered
    /// until its acknowledgement releases it. Otherwise the channel is
    /// removed, and the server is told to unsubscribe if it was subscribed.
    pub fn unsubscribe(&mut self, name: &str) {
        let Some(channel) = self.channels.get(name) else {
            log::debug!("Unsubscribe for unknown channel {}", name);
            return;
        };

        if channel.is_subscription_pending() {
            channel.cancel_subscription();
            return;
        }

        if let Some(channel) = self.channels.remove(name) {
            if channel.is_subscribed() {
                channel.unsubscribe();
            }
        }
    }

    /// Look up a channel.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.get(name).map(Arc::clone)
    }

    /// Remove a channel, returning it if it existed.
    pub fn remove(&mut self, name: &str) -> Option<Arc<Channel>> {
        self.channels.remove(name)
    }

    /// Names of all channels, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if the registry holds no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Mark every channel disconnected after the transport went away.
    pub fn disconnect(&self) {
        for channel in self.channels.values() {
            channel.disconnect();
        }
    }

    /// Deliver `frame` to the channel it is addressed to.
    ///
    /// Returns `false` if the frame names no channel or an unknown one.
    pub fn handle_event(&self, frame: &Frame) -> bool {
        let Some(name) = frame.channel.as_deref() else {
            return false;
        };
        match self.channels.get(name) {
            Some(channel) => {
                channel.handle_event(frame);
                true
            }
            None => {
                log::debug!("Dropping '{}' for unknown channel {}", frame.event, name);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct NullConnection;

    impl Connection for NullConnection {
        fn send_event(&self, _event: &str, _data: &Value, _channel: Option<&str>) -> bool {
            false
        }

        fn unsubscribe(&self, _channel: &str) {}
    }

    #[derive(Default)]
    struct RecordingConnection {
        sent: Mutex<Vec<(String, Value)>>,
        unsubscribed: Mutex<Vec<String>>,
    }

    impl Connection for RecordingConnection {
        fn send_event(&self, event: &str, data: &Value, _channel: Option<&str>) -> bool {
            self.sent
                .lock()
                .unwrap()
                .push((event.to_string(), data.clone()));
            true
        }

        fn unsubscribe(&self, channel: &str) {
            self.unsubscribed.lock().unwrap().push(channel.to_string());
        }
    }

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(Arc::new(NullConnection), ClientOptions::default())
    }

    fn recording_registry() -> (ChannelRegistry, Arc<RecordingConnection>) {
        let conn = Arc::new(RecordingConnection::default());
        let connection: Arc<dyn Connection> = conn.clone();
        (
            ChannelRegistry::new(connection, ClientOptions::default()),
            conn,
        )
    }

    fn acknowledged(name: &str) -> Frame {
        Frame::new("pusher_internal:subscription_succeeded", Value::Null).on_channel(name)
    }

    fn sent_events(conn: &RecordingConnection) -> Vec<String> {
        conn.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(event, _)| event.clone())
            .collect()
    }

    /// `add` returns the same instance for the same name.
    #[test]
    fn test_add_reuses_channel() {
        let mut reg = registry();
        let first = reg.add("private-a");
        let second = reg.add("private-a");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.kind(), ChannelKind::Private);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_find_and_remove() {
        let mut reg = registry();
        reg.add("news");
        reg.add("presence-room");
        assert_eq!(reg.names(), vec!["news", "presence-room"]);

        assert!(reg.find("news").is_some());
        assert!(reg.remove("news").is_some());
        assert!(reg.find("news").is_none());
        assert!(reg.remove("news").is_none());
        assert!(!reg.is_empty());
    }

    #[test]
    fn test_disconnect_all() {
        let mut reg = registry();
        let a = reg.add("a");
        let b = reg.add("private-b");
        for ch in [&a, &b] {
            ch.handle_event(&Frame::new("pusher_internal:subscription_succeeded", Value::Null));
        }

        reg.disconnect();
        assert!(!a.is_subscribed());
        assert!(!b.is_subscribed());
    }

    /// Frames reach only the channel they name.
    #[test]
    fn test_handle_event_routes_by_channel() {
        let mut reg = registry();
        let a = reg.add("a");
        let b = reg.add("b");
        let log = Arc::new(Mutex::new(Vec::new()));
        for ch in [&a, &b] {
            let l = Arc::clone(&log);
            let name = ch.name().to_string();
            ch.bind("update", move |data, _| l.lock().unwrap().push(format!("{name}:{data}")));
        }

        assert!(reg.handle_event(&Frame::new("update", json!(1)).on_channel("b")));
        assert!(!reg.handle_event(&Frame::new("update", json!(2)).on_channel("c")));
        assert!(!reg.handle_event(&Frame::new("update", json!(3))));

        assert_eq!(*log.lock().unwrap(), vec!["b:1".to_string()]);
    }

    /// Subscribing again after a cancel gets a live channel, not the
    /// cancelled one.
    #[test]
    fn test_add_after_cancel_creates_fresh_channel() {
        let (mut reg, conn) = recording_registry();
        let cancelled = reg.add("news");
        cancelled.subscribe("1.1");
        cancelled.cancel_subscription();

        let fresh = reg.add("news");
        assert!(!Arc::ptr_eq(&cancelled, &fresh));
        assert!(!fresh.is_subscription_cancelled());
        assert_eq!(reg.len(), 1);

        let successes = Arc::new(Mutex::new(0));
        let s = Arc::clone(&successes);
        fresh.bind("pusher:subscription_succeeded", move |_, _| {
            *s.lock().unwrap() += 1;
        });
        fresh.subscribe("1.1");

        assert!(reg.handle_event(&acknowledged("news")));
        assert_eq!(*successes.lock().unwrap(), 1);
        assert!(fresh.is_subscribed());
        assert!(conn.unsubscribed.lock().unwrap().is_empty());
        assert!(!cancelled.is_subscribed());
    }

    /// A live channel is returned unchanged, bindings included.
    #[test]
    fn test_add_keeps_live_channel() {
        let (mut reg, _conn) = recording_registry();
        let channel = reg.add("news");
        channel.subscribe("1.1");
        channel.bind("update", |_, _| {});

        let again = reg.add("news");
        assert!(Arc::ptr_eq(&channel, &again));
        assert!(again.dispatcher().has_bindings("update"));
    }

    /// Unsubscribing while the handshake is in flight cancels it; the late
    /// acknowledgement is released without a success event.
    #[test]
    fn test_unsubscribe_pending_cancels() {
        let (mut reg, conn) = recording_registry();
        let channel = reg.add("news");
        let successes = Arc::new(Mutex::new(0));
        let s = Arc::clone(&successes);
        channel.bind("pusher:subscription_succeeded", move |_, _| {
            *s.lock().unwrap() += 1;
        });
        channel.subscribe("1.1");

        reg.unsubscribe("news");
        assert!(channel.is_subscription_cancelled());
        assert!(reg.find("news").is_some());

        assert!(reg.handle_event(&acknowledged("news")));
        assert_eq!(*successes.lock().unwrap(), 0);
        assert_eq!(*conn.unsubscribed.lock().unwrap(), vec!["news".to_string()]);
    }

    /// Unsubscribing an acknowledged channel removes it and tells the server.
    #[test]
    fn test_unsubscribe_subscribed_removes() {
        let (mut reg, conn) = recording_registry();
        let channel = reg.add("news");
        channel.subscribe("1.1");
        reg.handle_event(&acknowledged("news"));

        reg.unsubscribe("news");
        assert!(reg.find("news").is_none());
        assert!(!channel.is_subscribed());
        assert_eq!(
            sent_events(&conn),
            vec!["pusher:subscribe".to_string(), "pusher:unsubscribe".to_string()]
        );
    }

    /// A channel that never subscribed is just dropped.
    #[test]
    fn test_unsubscribe_idle_only_removes() {
        let (mut reg, conn) = recording_registry();
        reg.add("news");

        reg.unsubscribe("news");
        reg.unsubscribe("missing");
        assert!(reg.is_empty());
        assert!(sent_events(&conn).is_empty());
    }
}
