//! Production driver over the WebSocket transport.

use std::time::Instant;

use spotter_client::transport::{self, ConnectedClient, TransportError};
use spotter_proto::Frame;

use crate::{config::ChatConfig, driver::Driver};

/// [`Driver`] backed by [`transport::connect`].
pub struct WebSocketDriver {
    url: String,
    capacity: usize,
    connection: Option<ConnectedClient>,
}

impl WebSocketDriver {
    /// Driver for the broker in `config`.
    pub fn new(config: &ChatConfig) -> Self {
        Self { url: config.broker_url.clone(), capacity: config.channel_capacity, connection: None }
    }
}

impl Driver for WebSocketDriver {
    type Error = TransportError;
    type Instant = Instant;

    async fn open(&mut self) -> Result<(), Self::Error> {
        self.close();
        tracing::debug!(url = %self.url, "opening websocket");
        self.connection = Some(transport::connect(&self.url, self.capacity).await?);
        Ok(())
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Self::Error> {
        let Some(conn) = &self.connection else {
            return Err(TransportError::Connection("transport not open".to_string()));
        };
        conn.to_server
            .send(frame)
            .await
            .map_err(|_| TransportError::Stream("connection task stopped".to_string()))
    }

    async fn recv_frame(&mut self) -> Option<Frame> {
        match self.connection.as_mut() {
            Some(conn) => conn.from_server.recv().await,
            None => None,
        }
    }

    fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.stop();
        }
    }
}
