//! Chat service configuration.

use std::time::Duration;

use spotter_client::{ReconnectPolicy, SessionConfig};

/// Default STOMP-over-WebSocket endpoint.
pub const DEFAULT_BROKER_URL: &str = "wss://i12a309.p.ssafy.io/ws-chat";

/// Default REST base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://i12a309.p.ssafy.io";

/// Time allowed for opening the transport and completing the handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames buffered per direction between the service and the transport task.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Chat service configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// WebSocket URL of the STOMP broker
    pub broker_url: String,
    /// Base URL of the REST endpoints
    pub api_base_url: String,
    /// STOMP `host` header. Derived from `broker_url` when `None`.
    pub host: Option<String>,
    /// Timeout for `connect`
    pub connect_timeout: Duration,
    /// Reconnect behaviour after a lost connection
    pub reconnect: ReconnectPolicy,
    /// Frame channel capacity
    pub channel_capacity: usize,
}

impl ChatConfig {
    /// STOMP `host` header value.
    ///
    /// The explicit `host` if set, otherwise the authority of `broker_url`
    /// without scheme, credentials, port or path.
    pub fn host(&self) -> String {
        if let Some(host) = &self.host {
            return host.clone();
        }
        host_from_url(&self.broker_url).unwrap_or("localhost").to_string()
    }

    /// Sans-IO session settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.host(),
            handshake_timeout: self.connect_timeout,
            reconnect: self.reconnect,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            host: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

fn host_from_url(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next()?;
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);

    let host = if authority.starts_with('[') {
        authority.split_once(']').map(|(h, _)| h.trim_start_matches('['))?
    } else {
        authority.split(':').next()?
    };
    (!host.is_empty()).then_some(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_derived_from_broker_url() {
        let config = ChatConfig::default();
        assert_eq!(config.host(), "i12a309.p.ssafy.io");

        let config = ChatConfig {
            broker_url: "ws://user:pw@127.0.0.1:8080/ws-chat".to_string(),
            ..ChatConfig::default()
        };
        assert_eq!(config.host(), "127.0.0.1");

        let config = ChatConfig { broker_url: "ws://[::1]:80/x".to_string(), ..Default::default() };
        assert_eq!(config.host(), "::1");
    }

    #[test]
    fn explicit_host_wins() {
        let config = ChatConfig { host: Some("chat".to_string()), ..ChatConfig::default() };
        assert_eq!(config.session_config().host, "chat");
    }

    #[test]
    fn session_config_uses_connect_timeout() {
        let config = ChatConfig { connect_timeout: Duration::from_secs(2), ..Default::default() };
        let session = config.session_config();

        assert_eq!(session.handshake_timeout, Duration::from_secs(2));
        assert_eq!(session.reconnect, ReconnectPolicy::default());
    }
}
