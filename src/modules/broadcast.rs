//! Subscriber for the admin notification channel on a Pusher-protocol service
//! (Pusher, Laravel Reverb, soketi).
//!
//! The listener is fire-and-forget: one connection, one channel, one event name. It never
//! reconnects. Whatever it receives is forwarded as a [`BroadcastEvent`]; whatever goes
//! wrong is logged and ends the task with a `Disconnected` event.

use futures_util::{SinkExt, StreamExt};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use crate::config::BroadcastConfig;
use crate::modules::notifications::NotificationPayload;

const PROTOCOL_VERSION: u8 = 7;
const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(120);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    Connected { socket_id: String },
    Subscribed { channel: String },
    Notification(NotificationPayload),
    Disconnected { reason: String },
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Broadcast key is not configured")]
    MissingKey,

    #[error("WebSocket error: {0}")]
    Socket(#[from] tungstenite::Error),

    #[error("Channel authorization failed: {0}")]
    Auth(String),

    #[error("Malformed frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("Service error {code:?}: {message}")]
    Service { code: Option<u16>, message: String },

    #[error("Connection closed by server")]
    Closed,

    #[error("No activity within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub key: String,
    pub cluster: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub use_tls: bool,
    pub channel: String,
    pub private: bool,
    pub event: String,
    pub namespace: Option<String>,
    pub auth_endpoint: String,
}

impl From<&BroadcastConfig> for ListenerSettings {
    fn from(cfg: &BroadcastConfig) -> Self {
        Self {
            key: cfg.key.clone(),
            cluster: cfg.cluster.clone(),
            host: cfg.host.clone(),
            port: cfg.port,
            use_tls: cfg.use_tls,
            channel: cfg.channel.clone(),
            private: cfg.private,
            event: cfg.event.clone(),
            namespace: Some(cfg.namespace.clone()).filter(|n| !n.is_empty()),
            auth_endpoint: cfg.auth_endpoint.clone(),
        }
    }
}

impl ListenerSettings {
    pub fn socket_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        let host = self
            .host
            .clone()
            .unwrap_or_else(|| format!("ws-{}.pusher.com", self.cluster));
        let port = self.port.unwrap_or(if self.use_tls { 443 } else { 80 });
        format!(
            "{scheme}://{host}:{port}/app/{}?protocol={PROTOCOL_VERSION}&client=atelier&version={}&flash=false",
            self.key,
            env!("CARGO_PKG_VERSION")
        )
    }

    pub fn channel_name(&self) -> String {
        if self.private && !self.channel.starts_with("private-") {
            format!("private-{}", self.channel)
        } else {
            self.channel.clone()
        }
    }

    pub fn event_name(&self) -> String {
        resolve_event_name(&self.event, self.namespace.as_deref())
    }
}

/// Laravel Echo naming: a leading `.` (or `\`) marks a literal name, anything else is
/// namespaced and written with backslashes, e.g. `AdminNotification` becomes
/// `App\Events\AdminNotification`.
pub fn resolve_event_name(event: &str, namespace: Option<&str>) -> String {
    if let Some(literal) = event.strip_prefix('.').or_else(|| event.strip_prefix('\\')) {
        return literal.to_string();
    }
    let qualified = match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}.{event}"),
        _ => event.to_string(),
    };
    qualified.replace('.', "\\")
}

/// One protocol frame. `data` is usually a JSON-encoded string, sometimes an inline object.
#[derive(Debug, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.data {
            Value::String(raw) => serde_json::from_str(raw),
            other => serde_json::from_value(other.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionEstablished {
    socket_id: String,
    #[serde(default)]
    activity_timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct ChannelAuth {
    auth: String,
}

fn subscribe_frame(channel: &str, auth: Option<&str>) -> String {
    let mut data = json!({ "channel": channel });
    if let Some(auth) = auth {
        data["auth"] = json!(auth);
    }
    json!({ "event": "pusher:subscribe", "data": data }).to_string()
}

fn unsubscribe_frame(channel: &str) -> String {
    json!({ "event": "pusher:unsubscribe", "data": { "channel": channel } }).to_string()
}

fn control_frame(event: &str) -> String {
    json!({ "event": event, "data": {} }).to_string()
}

fn emit(events: &mpsc::Sender<BroadcastEvent>, event: BroadcastEvent) {
    if let Err(err) = events.try_send(event) {
        warn!(error = %err, "dropping broadcast event");
    }
}

pub struct BroadcastListener {
    settings: ListenerSettings,
    http: reqwest::Client,
    token: Option<String>,
}

impl BroadcastListener {
    /// `token` is only sent to the channel auth endpoint for private channels.
    pub fn new(settings: ListenerSettings, http: reqwest::Client, token: Option<String>) -> Self {
        Self { settings, http, token }
    }

    pub fn spawn(self, events: mpsc::Sender<BroadcastEvent>) -> ListenerHandle {
        let connected = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(events, connected.clone(), shutdown_rx));
        ListenerHandle {
            connected,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run(
        self,
        events: mpsc::Sender<BroadcastEvent>,
        connected: Arc<AtomicBool>,
        shutdown: oneshot::Receiver<()>,
    ) {
        let channel = self.settings.channel_name();
        let reason = match self.session(&events, &connected, shutdown).await {
            Ok(()) => {
                info!(%channel, "broadcast listener stopped");
                "stopped".to_string()
            }
            Err(err) => {
                warn!(%channel, error = %err, "broadcast listener ended");
                err.to_string()
            }
        };
        connected.store(false, Ordering::SeqCst);
        emit(&events, BroadcastEvent::Disconnected { reason });
    }

    async fn session(
        &self,
        events: &mpsc::Sender<BroadcastEvent>,
        connected: &AtomicBool,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<(), BroadcastError> {
        if self.settings.key.is_empty() {
            return Err(BroadcastError::MissingKey);
        }
        let url = self.settings.socket_url();
        info!(%url, "connecting to broadcast service");
        let (socket, _) = connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();

        let channel = self.settings.channel_name();
        let event_name = self.settings.event_name();
        let mut idle = DEFAULT_ACTIVITY_TIMEOUT;
        let mut ping_sent = false;

        loop {
            let next = tokio::select! {
                _ = &mut shutdown => {
                    if connected.load(Ordering::SeqCst) {
                        let _ = sink.send(Message::Text(unsubscribe_frame(&channel))).await;
                    }
                    let _ = sink.close().await;
                    return Ok(());
                }
                next = time::timeout(idle, stream.next()) => next,
            };

            let message = match next {
                Err(_) if ping_sent => return Err(BroadcastError::Timeout(idle)),
                Err(_) => {
                    sink.send(Message::Text(control_frame("pusher:ping"))).await?;
                    ping_sent = true;
                    continue;
                }
                Ok(None) => return Err(BroadcastError::Closed),
                Ok(Some(message)) => message?,
            };
            ping_sent = false;

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => return Err(BroadcastError::Closed),
                _ => continue,
            };
            let frame = match Frame::parse(&text) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "ignoring malformed frame");
                    continue;
                }
            };

            match frame.event.as_str() {
                "pusher:connection_established" => {
                    let established: ConnectionEstablished = frame.data()?;
                    if let Some(secs) = established.activity_timeout.filter(|s| *s > 0) {
                        idle = Duration::from_secs(secs);
                    }
                    connected.store(true, Ordering::SeqCst);
                    info!(socket_id = %established.socket_id, "broadcast connection established");
                    emit(events, BroadcastEvent::Connected { socket_id: established.socket_id.clone() });

                    let auth = if self.settings.private {
                        Some(self.authorize(&established.socket_id, &channel).await?)
                    } else {
                        None
                    };
                    sink.send(Message::Text(subscribe_frame(&channel, auth.as_deref()))).await?;
                }
                "pusher_internal:subscription_succeeded" => {
                    info!(%channel, event = %event_name, "subscribed");
                    emit(events, BroadcastEvent::Subscribed { channel: channel.clone() });
                }
                "pusher:ping" => {
                    sink.send(Message::Text(control_frame("pusher:pong"))).await?;
                }
                "pusher:pong" => {}
                "pusher:error" => {
                    let err: ServiceError = frame.data().unwrap_or_default();
                    warn!(code = ?err.code, message = %err.message, "broadcast service error");
                    // 4000-4099: the service asks clients not to reconnect.
                    if err.code.is_some_and(|c| (4000..4100).contains(&c)) {
                        return Err(BroadcastError::Service { code: err.code, message: err.message });
                    }
                }
                name if name == event_name && frame.channel.as_deref() == Some(channel.as_str()) => {
                    match frame.data::<NotificationPayload>() {
                        Ok(payload) => {
                            debug!(title = %payload.title, kind = %payload.kind, "notification received");
                            emit(events, BroadcastEvent::Notification(payload));
                        }
                        Err(err) => warn!(error = %err, "skipping malformed notification payload"),
                    }
                }
                other => debug!(event = other, channel = ?frame.channel, "ignoring frame"),
            }
        }
    }

    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<String, BroadcastError> {
        let mut req = self
            .http
            .post(&self.settings.auth_endpoint)
            .header(ACCEPT, "application/json")
            .form(&[("socket_id", socket_id), ("channel_name", channel)]);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let response = req
            .send()
            .await
            .map_err(|e| BroadcastError::Auth(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BroadcastError::Auth(format!("HTTP {status}")));
        }
        let body: ChannelAuth = response
            .json()
            .await
            .map_err(|e| BroadcastError::Auth(e.to_string()))?;
        Ok(body.auth)
    }
}

/// Owner side of a running listener. Dropping it asks the task to unsubscribe and close.
pub struct ListenerHandle {
    connected: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Unsubscribes and closes the socket, waiting briefly for the task to wind down.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                abort.abort();
            }
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{accept_async, WebSocketStream};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WAIT: Duration = Duration::from_secs(5);

    fn settings(port: u16) -> ListenerSettings {
        ListenerSettings {
            key: "app-key".to_string(),
            cluster: "eu".to_string(),
            host: Some("127.0.0.1".to_string()),
            port: Some(port),
            use_tls: false,
            channel: "admin-notifications".to_string(),
            private: false,
            event: ".admin.notification".to_string(),
            namespace: Some("App.Events".to_string()),
            auth_endpoint: String::new(),
        }
    }

    async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
        loop {
            match time::timeout(WAIT, ws.next()).await.unwrap() {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("socket ended early: {other:?}"),
            }
        }
    }

    async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
        ws.send(Message::Text(value.to_string())).await.unwrap();
    }

    async fn recv(rx: &mut mpsc::Receiver<BroadcastEvent>) -> BroadcastEvent {
        time::timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    fn established(socket_id: &str) -> Value {
        json!({
            "event": "pusher:connection_established",
            "data": json!({ "socket_id": socket_id, "activity_timeout": 30 }).to_string()
        })
    }

    #[test]
    fn event_names_follow_echo_rules() {
        assert_eq!(resolve_event_name(".admin.notification", Some("App.Events")), "admin.notification");
        assert_eq!(
            resolve_event_name("AdminNotification", Some("App.Events")),
            "App\\Events\\AdminNotification"
        );
        assert_eq!(resolve_event_name("quote.created", None), "quote\\created");
        assert_eq!(resolve_event_name("\\Custom\\Event", Some("App.Events")), "Custom\\Event");
    }

    #[test]
    fn socket_url_defaults_to_cluster_host() {
        let mut s = settings(0);
        s.host = None;
        s.port = None;
        s.use_tls = true;
        let url = s.socket_url();
        assert!(url.starts_with("wss://ws-eu.pusher.com:443/app/app-key?protocol=7"));
        assert!(url.contains("client=atelier"));
    }

    #[test]
    fn private_channels_get_prefixed_once() {
        let mut s = settings(0);
        s.private = true;
        assert_eq!(s.channel_name(), "private-admin-notifications");
        s.channel = "private-admin-notifications".to_string();
        assert_eq!(s.channel_name(), "private-admin-notifications");
    }

    #[test]
    fn frame_data_accepts_string_or_object() {
        let encoded = Frame::parse(
            r#"{"event":"admin.notification","channel":"admin-notifications","data":"{\"title\":\"A\",\"message\":\"B\"}"}"#,
        )
        .unwrap();
        let inline = Frame::parse(
            r#"{"event":"admin.notification","data":{"title":"A","message":"B","type":"review"}}"#,
        )
        .unwrap();
        let a: NotificationPayload = encoded.data().unwrap();
        let b: NotificationPayload = inline.data().unwrap();
        assert_eq!(a.kind, "info");
        assert_eq!(b.kind, "review");
        assert_eq!(encoded.channel.as_deref(), Some("admin-notifications"));
        assert_eq!(inline.channel, None);
    }

    #[test]
    fn subscribe_frame_carries_auth_only_when_given() {
        let public: Value = serde_json::from_str(&subscribe_frame("admin-notifications", None)).unwrap();
        assert_eq!(public["event"], "pusher:subscribe");
        assert!(public["data"].get("auth").is_none());

        let private: Value =
            serde_json::from_str(&subscribe_frame("private-x", Some("key:sig"))).unwrap();
        assert_eq!(private["data"]["auth"], "key:sig");
        assert_eq!(private["data"]["channel"], "private-x");
    }

    #[tokio::test]
    async fn forwards_only_matching_events_and_unsubscribes_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            send_json(&mut ws, established("123.456")).await;

            let subscribe: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
            assert_eq!(subscribe["event"], "pusher:subscribe");
            assert_eq!(subscribe["data"]["channel"], "admin-notifications");

            send_json(&mut ws, json!({
                "event": "pusher_internal:subscription_succeeded",
                "channel": "admin-notifications",
                "data": "{}"
            }))
            .await;
            send_json(&mut ws, json!({ "event": "pusher:ping", "data": {} })).await;
            let pong: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
            assert_eq!(pong["event"], "pusher:pong");

            let body = json!({
                "title": "New quote",
                "message": "Client X submitted a request",
                "type": "contact"
            })
            .to_string();
            // wrong event, wrong channel, malformed payload, then the real one
            send_json(&mut ws, json!({ "event": "quote.updated", "channel": "admin-notifications", "data": body })).await;
            send_json(&mut ws, json!({ "event": "admin.notification", "channel": "public", "data": body })).await;
            send_json(&mut ws, json!({ "event": "admin.notification", "channel": "admin-notifications", "data": "not json" })).await;
            send_json(&mut ws, json!({ "event": "admin.notification", "channel": "admin-notifications", "data": body })).await;

            next_text(&mut ws).await
        });

        let (tx, mut rx) = mpsc::channel(16);
        let handle = BroadcastListener::new(settings(port), reqwest::Client::new(), None).spawn(tx);

        assert_eq!(recv(&mut rx).await, BroadcastEvent::Connected { socket_id: "123.456".into() });
        assert!(handle.is_connected());
        assert_eq!(
            recv(&mut rx).await,
            BroadcastEvent::Subscribed { channel: "admin-notifications".into() }
        );
        match recv(&mut rx).await {
            BroadcastEvent::Notification(p) => {
                assert_eq!(p.title, "New quote");
                assert_eq!(p.message, "Client X submitted a request");
                assert_eq!(p.kind, "contact");
            }
            other => panic!("expected notification, got {other:?}"),
        }

        handle.shutdown().await;
        let unsubscribe: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(unsubscribe["event"], "pusher:unsubscribe");
        assert_eq!(unsubscribe["data"]["channel"], "admin-notifications");
        assert_eq!(recv(&mut rx).await, BroadcastEvent::Disconnected { reason: "stopped".into() });
    }

    #[tokio::test]
    async fn private_channel_is_authorized_with_bearer_token() {
        let auth_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/broadcasting/auth"))
            .and(header("authorization", "Bearer admin-token"))
            .and(body_string_contains("socket_id=9.9"))
            .and(body_string_contains("channel_name=private-admin-notifications"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "auth": "app-key:signature" })))
            .expect(1)
            .mount(&auth_server)
            .await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            send_json(&mut ws, established("9.9")).await;
            let subscribe: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
            ws.close(None).await.ok();
            subscribe
        });

        let mut s = settings(port);
        s.private = true;
        s.auth_endpoint = format!("{}/broadcasting/auth", auth_server.uri());
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = BroadcastListener::new(s, reqwest::Client::new(), Some("admin-token".into())).spawn(tx);

        let subscribe = server.await.unwrap();
        assert_eq!(subscribe["data"]["channel"], "private-admin-notifications");
        assert_eq!(subscribe["data"]["auth"], "app-key:signature");

        assert!(matches!(recv(&mut rx).await, BroadcastEvent::Connected { .. }));
        assert!(matches!(recv(&mut rx).await, BroadcastEvent::Disconnected { .. }));
    }

    #[tokio::test]
    async fn refused_auth_ends_listener_without_subscribing() {
        let auth_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&auth_server)
            .await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            send_json(&mut ws, established("1.1")).await;
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut s = settings(port);
        s.private = true;
        s.auth_endpoint = format!("{}/broadcasting/auth", auth_server.uri());
        let (tx, mut rx) = mpsc::channel(16);
        let handle = BroadcastListener::new(s, reqwest::Client::new(), None).spawn(tx);

        assert!(matches!(recv(&mut rx).await, BroadcastEvent::Connected { .. }));
        match recv(&mut rx).await {
            BroadcastEvent::Disconnected { reason } => assert!(reason.contains("authorization")),
            other => panic!("expected disconnect, got {other:?}"),
        }
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn missing_key_never_connects() {
        let mut s = settings(1);
        s.key.clear();
        let (tx, mut rx) = mpsc::channel(4);
        let handle = BroadcastListener::new(s, reqwest::Client::new(), None).spawn(tx);
        assert_eq!(
            recv(&mut rx).await,
            BroadcastEvent::Disconnected { reason: BroadcastError::MissingKey.to_string() }
        );
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn server_close_clears_connected_flag() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            send_json(&mut ws, established("2.2")).await;
            let _ = next_text(&mut ws).await;
            ws.close(None).await.ok();
        });

        let (tx, mut rx) = mpsc::channel(16);
        let handle = BroadcastListener::new(settings(port), reqwest::Client::new(), None).spawn(tx);
        assert!(matches!(recv(&mut rx).await, BroadcastEvent::Connected { .. }));
        assert!(matches!(recv(&mut rx).await, BroadcastEvent::Disconnected { .. }));
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn fatal_service_error_ends_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            send_json(&mut ws, established("3.3")).await;
            let _ = next_text(&mut ws).await;
            send_json(
                &mut ws,
                json!({"event": "pusher:error", "data": {"code": 4001, "message": "App disabled"}}),
            )
            .await;
            time::sleep(WAIT).await;
        });

        let (tx, mut rx) = mpsc::channel(16);
        let handle = BroadcastListener::new(settings(port), reqwest::Client::new(), None).spawn(tx);
        assert!(matches!(recv(&mut rx).await, BroadcastEvent::Connected { .. }));
        match recv(&mut rx).await {
            BroadcastEvent::Disconnected { reason } => {
                assert!(reason.contains("4001"), "{reason}");
                assert!(reason.contains("App disabled"), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn other_service_errors_keep_the_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            send_json(&mut ws, established("4.4")).await;
            let _ = next_text(&mut ws).await;
            send_json(
                &mut ws,
                json!({"event": "pusher:error", "data": {"code": 4201, "message": "Pong reply not received"}}),
            )
            .await;
            send_json(
                &mut ws,
                json!({
                    "event": "admin.notification",
                    "channel": "admin-notifications",
                    "data": json!({"title": "New quote", "message": "Still here", "type": "quote"}).to_string()
                }),
            )
            .await;
            time::sleep(WAIT).await;
        });

        let (tx, mut rx) = mpsc::channel(16);
        let handle = BroadcastListener::new(settings(port), reqwest::Client::new(), None).spawn(tx);
        assert!(matches!(recv(&mut rx).await, BroadcastEvent::Connected { .. }));
        match recv(&mut rx).await {
            BroadcastEvent::Notification(payload) => assert_eq!(payload.message, "Still here"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(handle.is_connected());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn silent_server_gets_pinged_then_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (seen_tx, seen_rx) = oneshot::channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            send_json(
                &mut ws,
                json!({
                    "event": "pusher:connection_established",
                    "data": json!({ "socket_id": "5.5", "activity_timeout": 1 }).to_string()
                }),
            )
            .await;
            let _ = next_text(&mut ws).await;
            let ping = next_text(&mut ws).await;
            let _ = seen_tx.send(ping);
            // Never answer the ping.
            time::sleep(WAIT).await;
        });

        let (tx, mut rx) = mpsc::channel(16);
        let handle = BroadcastListener::new(settings(port), reqwest::Client::new(), None).spawn(tx);
        assert!(matches!(recv(&mut rx).await, BroadcastEvent::Connected { .. }));

        let ping: Value = serde_json::from_str(&time::timeout(WAIT, seen_rx).await.unwrap().unwrap()).unwrap();
        assert_eq!(ping["event"], "pusher:ping");

        match recv(&mut rx).await {
            BroadcastEvent::Disconnected { reason } => assert!(reason.contains("No activity"), "{reason}"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!handle.is_connected());
    }
}
