use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use cohort_realtime::Dispatcher;
use cohort_types::events::{GatewayCommand, GatewayFrame};

use crate::subscriptions::ConnectionSubscriptions;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection.
/// The JWT was already validated at the HTTP upgrade layer, so we go
/// straight to Ready + event loop.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, user_id: String) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} connected to gateway", user_id);

    let ready = GatewayFrame::Ready {
        user_id: user_id.clone(),
    };
    if send_frame(&mut sender, &ready).await.is_err() {
        return;
    }

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<GatewayFrame>();
    let mut subscriptions =
        ConnectionSubscriptions::new(dispatcher, user_id.clone(), outbound_tx.clone());

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued frames -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if send_frame(&mut sender, &frame).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client. The subscriptions live inside this task and
    // are released when it finishes or is aborted.
    let user_recv = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&user_recv, cmd, &mut subscriptions, &outbound_tx),
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_recv,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} disconnected from gateway", user_id);
}

fn handle_command(
    user_id: &str,
    cmd: GatewayCommand,
    subscriptions: &mut ConnectionSubscriptions,
    outbound: &mpsc::UnboundedSender<GatewayFrame>,
) {
    match cmd {
        GatewayCommand::Subscribe { channels } => {
            info!("{} subscribing to {} channels", user_id, channels.len());
            let outcome = subscriptions.subscribe_all(channels);
            for (channel, reason) in outcome.rejected {
                warn!("{} rejected from {}: {}", user_id, channel, reason);
                let _ = outbound.send(GatewayFrame::Rejected { channel, reason });
            }
            let _ = outbound.send(GatewayFrame::Subscribed {
                channels: outcome.accepted,
            });
        }

        GatewayCommand::Unsubscribe { channels } => {
            subscriptions.unsubscribe_all(&channels);
        }
    }
}

async fn send_frame(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: &GatewayFrame,
) -> Result<(), ()> {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode gateway frame: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
