//! Managers talking to a live server over HTTP and the gateway WebSocket.
mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::time::{sleep, timeout};

use cohort_api::auth::{AppState, AppStateInner, issue_token};
use cohort_api::middleware::{SERVICE_KEY_HEADER, decode_token};
use cohort_db::{Database, SqliteStore};
use cohort_gateway::connection::handle_connection;
use cohort_realtime::{Dispatcher, EventCallback, EventFilter, RealtimeClient, RealtimeError};
use cohort_sync::{
    ChatSession, Draft, GatewayClient, HttpStore, NotificationCenter, SyncContext, SyncError,
    ToastDispatcher, ToastLevel,
};
use cohort_types::api::{GatewayQuery, MAX_BULK_READ_IDS};
use cohort_types::{
    ChannelKey, ConversationKey, DataAccess, NewNotification, NewPartnership, NotificationKind,
    RealtimeEvent,
};

use common::{MockStore, no_refresh, text_message};

const SECRET: &str = "integration-secret";
const SERVICE_KEY: &str = "integration-service-key";
const WAIT: Duration = Duration::from_secs(5);

async fn gateway(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match decode_token(&state.jwt_secret, &query.token) {
        Some(claims) => {
            let dispatcher = state.dispatcher.clone();
            ws.on_upgrade(move |socket| handle_connection(socket, dispatcher, claims.sub))
        }
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn spawn_server() -> (String, AppState) {
    let state: AppState = Arc::new(AppStateInner {
        store: SqliteStore::new(Arc::new(Database::open_in_memory().unwrap())),
        dispatcher: Dispatcher::new(),
        jwt_secret: SECRET.into(),
        service_key: SERVICE_KEY.into(),
    });
    let ws_route = Router::new()
        .route("/gateway", get(gateway))
        .with_state(state.clone());
    let app = cohort_api::router(state.clone()).merge(ws_route);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr.to_string(), state)
}

fn token(user: &str) -> String {
    issue_token(SECRET, user, user, chrono::Duration::hours(1)).unwrap()
}

async fn remote_context(addr: &str, user: &str) -> SyncContext {
    let token = token(user);
    let store = HttpStore::new(format!("http://{addr}"), token.clone(), user);
    let realtime = GatewayClient::connect(&format!("ws://{addr}"), &token)
        .await
        .unwrap();
    assert_eq!(realtime.user_id(), user);
    SyncContext::new(Arc::new(store), Arc::new(realtime), ToastDispatcher::detached())
        .with_config(no_refresh())
}

fn ignore() -> EventCallback {
    Arc::new(|_: RealtimeEvent| {})
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn partners_chat_through_the_server() {
    let (addr, state) = spawn_server().await;
    state
        .store
        .run(|db| {
            db.insert_partnership(&NewPartnership {
                student_a: "alice".into(),
                student_b: "bob".into(),
                track: "data".into(),
            })
        })
        .await
        .unwrap();

    let mut alice = ChatSession::open_with_partner(remote_context(&addr, "alice").await, "alice")
        .await
        .unwrap();
    let mut bob = ChatSession::open(remote_context(&addr, "bob").await, "bob", "alice")
        .await
        .unwrap();
    assert!(alice.is_live() && bob.is_live());

    let channel = ChannelKey::conversation(alice.conversation_key());
    wait_for(|| state.dispatcher.channel_subscribers(&channel) == 2).await;

    let sent = alice.send(&mut Draft::text("hello")).await.unwrap();
    assert!(timeout(WAIT, bob.recv()).await.unwrap());
    assert_eq!(bob.messages().len(), 1);
    assert_eq!(bob.messages()[0].id, sent.id);

    // Alice hears her own insert too and drops it as a duplicate.
    assert!(!timeout(WAIT, alice.recv()).await.unwrap());
    assert_eq!(alice.messages().len(), 1);

    alice.close();
    bob.close();
    wait_for(|| state.dispatcher.channel_subscribers(&channel) == 0).await;
}

#[tokio::test]
async fn notifications_arrive_live_and_mark_all_read() {
    let (addr, state) = spawn_server().await;
    let mut center = NotificationCenter::open(remote_context(&addr, "alice").await, "alice")
        .await
        .unwrap();
    assert_eq!(center.unread_count(), 0);

    let channel = ChannelKey::notifications("alice");
    wait_for(|| state.dispatcher.channel_subscribers(&channel) == 1).await;

    let client = reqwest::Client::new();
    for title in ["Week 1 reviewed", "Bob is online"] {
        let resp = client
            .post(format!("http://{addr}/internal/notifications"))
            .header(SERVICE_KEY_HEADER, SERVICE_KEY)
            .json(&serde_json::json!({
                "user_id": "alice",
                "kind": "partner_activity",
                "title": title,
                "body": "",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    }

    for _ in 0..2 {
        assert!(timeout(WAIT, center.recv()).await.unwrap());
    }
    assert_eq!(center.unread_count(), 2);

    assert_eq!(center.mark_all_as_read().await.unwrap(), 2);
    assert_eq!(center.unread_count(), 0);

    let stored = state.store.fetch_notifications("alice").await.unwrap();
    assert!(stored.iter().all(|n| n.read));
}

#[tokio::test]
async fn bad_token_cannot_reach_the_gateway() {
    let (addr, _state) = spawn_server().await;
    let result = GatewayClient::connect(&format!("ws://{addr}"), "not-a-token").await;
    assert!(matches!(result, Err(RealtimeError::Connect(_))));

    let store = HttpStore::new(format!("http://{addr}"), "not-a-token", "alice");
    assert!(store.fetch_notifications("alice").await.is_err());
    // A store never answers for another user.
    assert!(store.fetch_notifications("bob").await.is_err());
}

#[tokio::test]
async fn mark_all_read_spans_several_batches() {
    let (addr, state) = spawn_server().await;
    let total = MAX_BULK_READ_IDS + 1;
    state
        .store
        .run(move |db| {
            for i in 0..total {
                db.insert_notification(&NewNotification {
                    user_id: "alice".into(),
                    kind: NotificationKind::Generic,
                    title: format!("Reminder {}", i),
                    body: String::new(),
                })?;
            }
            Ok(())
        })
        .await
        .unwrap();

    let mut center = NotificationCenter::open(remote_context(&addr, "alice").await, "alice")
        .await
        .unwrap();
    assert_eq!(center.unread_count(), total);

    assert_eq!(center.mark_all_as_read().await.unwrap(), total);
    assert_eq!(center.unread_count(), 0);

    let stored = state.store.fetch_notifications("alice").await.unwrap();
    assert_eq!(stored.len(), total);
    assert!(stored.iter().all(|n| n.read));
}

#[tokio::test]
async fn gateway_reports_a_rejected_channel() {
    let (addr, state) = spawn_server().await;
    let carol = GatewayClient::connect(&format!("ws://{addr}"), &token("carol"))
        .await
        .unwrap();

    let foreign = ChannelKey::conversation(&ConversationKey::between("alice", "bob").unwrap());
    let result = carol
        .subscribe(&foreign, EventFilter::all(), ignore())
        .await;
    assert!(matches!(result, Err(RealtimeError::Rejected { .. })));
    assert_eq!(state.dispatcher.channel_subscribers(&foreign), 0);

    // Carol's own channel still comes up on the same socket.
    let own = ChannelKey::notifications("carol");
    let handle = carol
        .subscribe(&own, EventFilter::all(), ignore())
        .await
        .unwrap();
    assert_eq!(state.dispatcher.channel_subscribers(&own), 1);
    carol.unsubscribe(handle);
    wait_for(|| state.dispatcher.channel_subscribers(&own) == 0).await;
}

#[tokio::test]
async fn session_on_a_forbidden_conversation_is_not_live() {
    let (addr, _state) = spawn_server().await;
    let store = MockStore::new();
    store.add_message(text_message(1, "alice", "bob", 10, "private"));
    let realtime = GatewayClient::connect(&format!("ws://{addr}"), &token("carol"))
        .await
        .unwrap();
    let (toasts, mut toast_rx) = ToastDispatcher::channel();
    let ctx = SyncContext::new(store.clone(), Arc::new(realtime), toasts).with_config(no_refresh());

    let session = ChatSession::open(ctx, "alice", "bob").await.unwrap();
    assert!(!session.is_live());
    assert!(matches!(
        session.realtime_error(),
        Some(RealtimeError::Rejected { reason, .. }) if reason == "forbidden"
    ));
    assert!(matches!(session.ensure_live(), Err(SyncError::SubscriptionFailed(_))));
    assert_eq!(toast_rx.try_recv().unwrap().level, ToastLevel::Error);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_listeners_share_one_server_subscription() {
    let (addr, state) = spawn_server().await;
    let alice = Arc::new(
        GatewayClient::connect(&format!("ws://{addr}"), &token("alice"))
            .await
            .unwrap(),
    );
    let channel = ChannelKey::notifications("alice");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let alice = alice.clone();
            let channel = channel.clone();
            tokio::spawn(async move { alice.subscribe(&channel, EventFilter::all(), ignore()).await })
        })
        .collect();
    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }
    assert_eq!(state.dispatcher.channel_subscribers(&channel), 1);

    let last = handles.pop().unwrap();
    for handle in handles {
        alice.unsubscribe(handle);
    }
    sleep(Duration::from_millis(50)).await;
    assert_eq!(state.dispatcher.channel_subscribers(&channel), 1);

    alice.unsubscribe(last);
    wait_for(|| state.dispatcher.channel_subscribers(&channel) == 0).await;
}
