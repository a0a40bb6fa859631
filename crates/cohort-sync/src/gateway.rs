use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cohort_realtime::{
    Dispatcher, EventCallback, EventFilter, RealtimeClient, RealtimeError, SubscriptionHandle,
};
use cohort_types::ChannelKey;
use cohort_types::events::{GatewayCommand, GatewayFrame};

/// How long `subscribe` waits for the server to accept or reject a channel.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

type Reply = oneshot::Sender<Result<(), RealtimeError>>;

/// Listener bookkeeping shared with the socket task.
#[derive(Default)]
struct Channels {
    handles: HashMap<SubscriptionHandle, ChannelKey>,
    /// Channels the server has accepted.
    confirmed: HashSet<String>,
    /// Subscribers waiting for the server's verdict, per channel.
    pending: HashMap<String, Vec<Reply>>,
}

impl Channels {
    fn has_listeners(&self, channel: &ChannelKey) -> bool {
        self.handles.values().any(|c| c == channel)
    }

    fn resolve(&mut self, channel: &str, result: Result<(), RealtimeError>) {
        for reply in self.pending.remove(channel).unwrap_or_default() {
            let _ = reply.send(result.clone());
        }
    }
}

type SharedChannels = Arc<Mutex<Channels>>;

fn lock(channels: &SharedChannels) -> MutexGuard<'_, Channels> {
    channels.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `RealtimeClient` over the gateway WebSocket.
///
/// Listeners are kept in a local dispatcher; the server is asked to
/// subscribe when a channel gets its first listener and to unsubscribe when
/// it loses its last one. `subscribe` waits for the server's `Subscribed` or
/// `Rejected` answer. Once the socket closes, new subscriptions fail with
/// `RealtimeError::Closed` and existing listeners simply stop hearing
/// anything.
pub struct GatewayClient {
    user_id: String,
    local: Dispatcher,
    commands: mpsc::UnboundedSender<GatewayCommand>,
    channels: SharedChannels,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl GatewayClient {
    /// Connect to `<base>/gateway?token=...` and wait for the Ready frame.
    pub async fn connect(ws_base_url: &str, token: &str) -> Result<Self, RealtimeError> {
        let url = format!("{}/gateway?token={}", ws_base_url.trim_end_matches('/'), token);
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let user_id = match ws_rx.next().await {
            Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<GatewayFrame>(text.as_str()) {
                Ok(GatewayFrame::Ready { user_id }) => user_id,
                Ok(other) => {
                    return Err(RealtimeError::Connect(format!(
                        "expected Ready, got {:?}",
                        other
                    )));
                }
                Err(e) => return Err(RealtimeError::Connect(format!("bad frame: {}", e))),
            },
            Some(Ok(other)) => {
                return Err(RealtimeError::Connect(format!("unexpected message {:?}", other)));
            }
            Some(Err(e)) => return Err(RealtimeError::Connect(e.to_string())),
            None => return Err(RealtimeError::Closed),
        };
        info!("Gateway ready for {}", user_id);

        let local = Dispatcher::new();
        let (commands, mut command_rx) = mpsc::unbounded_channel::<GatewayCommand>();
        let connected = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let channels = SharedChannels::default();

        let dispatcher = local.clone();
        let shared = channels.clone();
        let connected_flag = connected.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break;
                    }
                    Some(command) = command_rx.recv() => {
                        let text = match serde_json::to_string(&command) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Failed to encode gateway command: {}", e);
                                continue;
                            }
                        };
                        if ws_tx.send(WsMessage::text(text)).await.is_err() {
                            break;
                        }
                    }
                    incoming = ws_rx.next() => match incoming {
                        Some(Ok(WsMessage::Text(text))) => handle_frame(&dispatcher, &shared, text.as_str()),
                        Some(Ok(WsMessage::Ping(data))) => {
                            if ws_tx.send(WsMessage::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Gateway read error: {}", e);
                            break;
                        }
                    },
                }
            }

            connected_flag.store(false, Ordering::Relaxed);
            // Waiting subscribers see their reply sender dropped.
            lock(&shared).pending.clear();
            info!("Gateway connection closed");
        });

        Ok(Self {
            user_id,
            local,
            commands,
            channels,
            connected,
            cancel,
        })
    }

    /// The user the gateway authenticated.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed) && !self.commands.is_closed()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl RealtimeClient for GatewayClient {
    async fn subscribe(
        &self,
        channel: &ChannelKey,
        filter: EventFilter,
        callback: EventCallback,
    ) -> Result<SubscriptionHandle, RealtimeError> {
        let (handle, reply) = {
            let mut channels = lock(&self.channels);
            if !self.is_connected() {
                return Err(RealtimeError::Closed);
            }

            let first = !channels.has_listeners(channel);
            if first {
                let command = GatewayCommand::Subscribe {
                    channels: vec![channel.as_str().to_string()],
                };
                if self.commands.send(command).is_err() {
                    return Err(RealtimeError::Closed);
                }
            }
            let handle = self.local.subscribe(channel.clone(), filter, callback);
            channels.handles.insert(handle, channel.clone());

            let reply = if channels.confirmed.contains(channel.as_str()) {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                channels
                    .pending
                    .entry(channel.as_str().to_string())
                    .or_default()
                    .push(tx);
                Some(rx)
            };
            (handle, reply)
        };

        let Some(reply) = reply else {
            return Ok(handle);
        };
        let outcome = match tokio::time::timeout(SUBSCRIBE_TIMEOUT, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RealtimeError::Closed),
            Err(_) => Err(RealtimeError::Timeout(channel.to_string())),
        };
        match outcome {
            Ok(()) => Ok(handle),
            Err(e) => {
                self.unsubscribe(handle);
                Err(e)
            }
        }
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut channels = lock(&self.channels);
        let Some(channel) = channels.handles.remove(&handle) else {
            return;
        };
        self.local.unsubscribe(handle);

        if !channels.has_listeners(&channel) {
            channels.confirmed.remove(channel.as_str());
            // Nothing to do if the socket is already gone.
            let _ = self.commands.send(GatewayCommand::Unsubscribe {
                channels: vec![channel.as_str().to_string()],
            });
        }
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn handle_frame(dispatcher: &Dispatcher, channels: &SharedChannels, text: &str) {
    match serde_json::from_str::<GatewayFrame>(text) {
        Ok(GatewayFrame::Change { channel, event }) => {
            dispatcher.publish(&channel, event);
        }
        Ok(GatewayFrame::Subscribed { channels: accepted }) => {
            debug!("Gateway subscribed: {:?}", accepted);
            let mut channels = lock(channels);
            for channel in accepted {
                channels.confirmed.insert(channel.clone());
                channels.resolve(&channel, Ok(()));
            }
        }
        Ok(GatewayFrame::Rejected { channel, reason }) => {
            warn!("Gateway rejected {}: {}", channel, reason);
            let error = RealtimeError::Rejected {
                channel: channel.clone(),
                reason,
            };
            lock(channels).resolve(&channel, Err(error));
        }
        Ok(GatewayFrame::Ready { .. }) => {}
        Err(e) => warn!("Ignoring malformed gateway frame: {}", e),
    }
}
