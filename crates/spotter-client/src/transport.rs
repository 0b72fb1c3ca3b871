//! WebSocket transport for the session.
//!
//! Provides [`ConnectedClient`], which carries STOMP frames over a WebSocket.
//! This layer only moves frames; session logic stays in the Sans-IO
//! [`Session`](crate::Session).

use futures_util::{SinkExt, StreamExt, stream::SplitStream};
use spotter_proto::Frame;
use thiserror::Error;
use tokio::{net::TcpStream, sync::mpsc, task::AbortHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};

/// Default capacity of the frame channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Failure of the WebSocket layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The WebSocket handshake did not complete.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Reading or writing the open socket failed.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Handle to an open WebSocket carrying STOMP frames.
///
/// Frames are sent and received via the channels; a background task does the
/// WebSocket I/O. `from_server` yields `None` once the socket is closed.
pub struct ConnectedClient {
    /// Send frames to the broker.
    pub to_server: mpsc::Sender<Frame>,
    /// Receive frames from the broker.
    pub from_server: mpsc::Receiver<Frame>,
    /// Aborts the socket task.
    abort_handle: AbortHandle,
}

impl ConnectedClient {
    /// Abort the socket task. `from_server` then yields `None`.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

impl Drop for ConnectedClient {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket to `url` (`ws://` or `wss://`).
///
/// Returns a [`ConnectedClient`] whose channels hold up to `capacity` frames
/// in each direction.
pub async fn connect(url: &str, capacity: usize) -> Result<ConnectedClient, TransportError> {
    let (socket, response) = connect_async(url)
        .await
        .map_err(|e| TransportError::Connection(format!("websocket connect failed: {e}")))?;
    tracing::debug!(%url, status = %response.status(), "websocket open");

    let (to_server_tx, to_server_rx) = mpsc::channel::<Frame>(capacity.max(1));
    let (from_server_tx, from_server_rx) = mpsc::channel::<Frame>(capacity.max(1));

    let handle = tokio::spawn(run_connection(socket, to_server_rx, from_server_tx));

    Ok(ConnectedClient {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run the connection, bridging between channels and the WebSocket.
async fn run_connection(
    socket: WsStream,
    mut to_server: mpsc::Receiver<Frame>,
    from_server: mpsc::Sender<Frame>,
) {
    let (mut sink, stream) = socket.split();
    let _reader = AbortOnDrop(tokio::spawn(read_frames(stream, from_server)).abort_handle());

    while let Some(frame) = to_server.recv().await {
        if let Err(e) = sink.send(encode_message(&frame)).await {
            tracing::warn!(error = %e, command = %frame.command, "websocket send failed");
            break;
        }
    }

    if let Err(e) = sink.close().await {
        tracing::debug!(error = %e, "websocket close failed");
    }
}

/// Forward decoded frames until the socket closes or the receiver is gone.
async fn read_frames(mut stream: SplitStream<WsStream>, from_server: mpsc::Sender<Frame>) {
    while let Some(message) = stream.next().await {
        let data = match message {
            Ok(Message::Text(text)) => text.as_str().as_bytes().to_vec(),
            Ok(Message::Binary(bytes)) => bytes.to_vec(),
            Ok(Message::Close(close)) => {
                tracing::debug!(?close, "websocket closed by peer");
                break;
            },
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "websocket read failed");
                break;
            },
        };

        match Frame::decode_all(&data) {
            Ok(frames) => {
                for frame in frames {
                    if from_server.send(frame).await.is_err() {
                        return;
                    }
                }
            },
            Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
        }
    }
}

/// WebSocket message for `frame`, always binary.
fn encode_message(frame: &Frame) -> Message {
    Message::Binary(frame.to_bytes().into())
}
