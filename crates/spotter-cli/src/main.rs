//! Spotter chat developer console.
//!
//! Loads the room list, connects to the broker, subscribes to the given
//! rooms and prints inbound messages. Each stdin line is published to the
//! first room; `/quit` leaves.
//!
//! # Usage
//!
//! ```bash
//! spotter-cli --token "$TOKEN" --user-id 12 --room 12_34 --room 12_56
//! ```

use std::io::{self, Write};

use clap::Parser;
use spotter_app::{
    ChatConfig, ChatService, DEFAULT_API_BASE_URL, DEFAULT_BROKER_URL, ReconnectPolicy,
    SessionState,
};
use spotter_proto::payloads::InboundMessage;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Spotter chat console
#[derive(Parser, Debug)]
#[command(name = "spotter-cli")]
#[command(about = "Developer console for the Spotter chat session")]
#[command(version)]
struct Args {
    /// STOMP-over-WebSocket broker URL
    #[arg(long, default_value = DEFAULT_BROKER_URL)]
    broker: String,

    /// REST base URL
    #[arg(long, default_value = DEFAULT_API_BASE_URL)]
    api: String,

    /// Bearer token
    #[arg(long)]
    token: String,

    /// Id of the current user
    #[arg(long)]
    user_id: i64,

    /// Room to subscribe to (repeatable). Input goes to the first one.
    #[arg(long = "room")]
    rooms: Vec<String>,

    /// Reconnect attempts after a lost connection
    #[arg(long, default_value_t = 5)]
    reconnect_attempts: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let config = ChatConfig {
        broker_url: args.broker.clone(),
        api_base_url: args.api.clone(),
        reconnect: ReconnectPolicy {
            max_attempts: args.reconnect_attempts,
            ..ReconnectPolicy::default()
        },
        ..ChatConfig::default()
    };
    let mut service = ChatService::websocket(config, args.user_id);
    let mut out = io::stdout();

    match service.load_rooms(&args.token).await {
        Ok(count) => tracing::info!(count, "rooms loaded"),
        Err(e) => tracing::warn!(error = %e, "room list unavailable"),
    }
    for room in service.store().rooms() {
        writeln!(out, "{}  {}  ({} unread)", room.id, room.name, room.unread_count)?;
    }

    service.connect(&args.token).await?;

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<InboundMessage>();
    for room_id in &args.rooms {
        if let Err(e) = service.load_history(&args.token, room_id).await {
            tracing::warn!(error = %e, %room_id, "history unavailable");
        }
        let tx = inbound_tx.clone();
        service
            .subscribe_to_room(room_id.clone(), move |message| {
                let _ = tx.send(message.clone());
            })
            .await;
    }

    if let Some(first) = args.rooms.first() {
        service.open_room(first);
        for message in service.store().messages(first) {
            writeln!(out, "{} <{}> {}", message.timestamp, message.sender_id, message.content)?;
        }
    }

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    'console: loop {
        service.process_cycle().await;

        while let Ok(message) = inbound_rx.try_recv() {
            writeln!(out, "[{}] <{}> {}", message.room_id, message.sender_id, message.content)?;
        }

        loop {
            match line_rx.try_recv() {
                Ok(line) if line.trim() == "/quit" => break 'console,
                Ok(line) => match args.rooms.first() {
                    Some(room_id) => {
                        if !service.send_message(room_id, &line, &args.token).await {
                            tracing::warn!(%room_id, "not connected, message dropped");
                        }
                    },
                    None => tracing::warn!("no --room given, nowhere to send"),
                },
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => break 'console,
            }
        }

        if service.state() == SessionState::Disconnected {
            tracing::error!("chat session ended");
            break;
        }
    }

    service.disconnect().await;
    Ok(())
}
