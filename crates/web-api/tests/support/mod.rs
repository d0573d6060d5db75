#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::verification::MemoryVerificationStore;
use application::{
    ChatHub, ChatHubDependencies, DeliveryMode, HubOptions, PhoneVerificationService,
    PhoneVerificationServiceDependencies, SystemClock, VerificationPolicy,
};
use config::WebSocketConfig;
use futures_util::{SinkExt, StreamExt};
use infrastructure::LoggingSmsSender;
use serde_json::{json, Value};
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: Arc<ChatHub>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 以开发模式（验证码直接返回）启动服务
pub async fn spawn_server() -> TestServer {
    spawn_server_with(WebSocketConfig::default()).await
}

pub async fn spawn_server_with(websocket: WebSocketConfig) -> TestServer {
    let clock = Arc::new(SystemClock);
    let hub = Arc::new(ChatHub::new(ChatHubDependencies {
        clock: clock.clone(),
        status_store: None,
        options: HubOptions::default(),
    }));
    let verification = Arc::new(PhoneVerificationService::new(
        PhoneVerificationServiceDependencies {
            store: Arc::new(MemoryVerificationStore::new()),
            sms: Arc::new(LoggingSmsSender),
            clock,
            policy: VerificationPolicy {
                delivery: DeliveryMode::Echo,
                ..VerificationPolicy::default()
            },
        },
    ));

    let app = router(AppState::new(hub.clone(), verification, websocket));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        addr,
        hub,
        shutdown: Some(shutdown_tx),
    }
}

pub async fn connect(server: &TestServer) -> WsClient {
    let (socket, _) = connect_async(server.ws_url()).await.expect("ws connect");
    socket
}

pub async fn emit(socket: &mut WsClient, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    socket
        .send(TungsteniteMessage::Text(frame.into()))
        .await
        .expect("ws send");
}

/// 读取下一个 JSON 事件，超时返回 None
pub async fn next_event(socket: &mut WsClient) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_millis(500), socket.next())
            .await
            .ok()??
            .ok()?;
        match frame {
            TungsteniteMessage::Text(text) => {
                return Some(serde_json::from_str(text.as_str()).expect("json frame"))
            }
            TungsteniteMessage::Close(_) => return None,
            _ => continue,
        }
    }
}

/// 跳过其它事件，直到收到指定名称的事件
pub async fn expect_event(socket: &mut WsClient, name: &str) -> Value {
    while let Some(event) = next_event(socket).await {
        if event["event"] == name {
            return event;
        }
    }
    panic!("expected event {name}");
}

/// 建立连接并完成 setup
pub async fn connect_as(server: &TestServer, user_id: &str) -> WsClient {
    let mut socket = connect(server).await;
    emit(&mut socket, "setup", json!({ "_id": user_id })).await;
    expect_event(&mut socket, "connected").await;
    socket
}

/// 丢弃当前已到达的事件
pub async fn drain(socket: &mut WsClient) {
    while next_event(socket).await.is_some() {}
}

/// 等待房间成员数达到预期，避免不同连接之间的事件顺序竞争
pub async fn wait_for_members(server: &TestServer, room: &str, expected: usize) {
    let room = domain::RoomId::from(room);
    for _ in 0..50 {
        if server.hub.rooms().members(&room).len() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room {room} never reached {expected} members");
}

/// 等待会话数达到预期
pub async fn wait_for_sessions(server: &TestServer, expected: usize) {
    for _ in 0..50 {
        if server.hub.registry().len() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("registry never reached {expected} sessions");
}
