use application::{ChatHub, EventReceiver};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientEvent, ServerEvent, SessionId};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// WebSocket 连接管理器
///
/// 封装单个 WebSocket 连接的生命周期：
/// - 把客户端事件交给 `ChatHub`
/// - 把会话出站队列中的事件写回客户端
/// - 服务器心跳 Ping、回复 Pong 与空闲超时
/// - 断开时统一走 `ChatHub::disconnect`
pub struct WebSocketConnection {
    state: AppState,
    session: SessionId,
    outbound: Option<EventReceiver>,
}

impl WebSocketConnection {
    /// 在连接中枢注册新会话
    pub fn new(state: AppState) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let session = state.hub.connect(outbound_tx);

        tracing::info!(session_id = %session, "WebSocket 连接已建立");

        Self {
            state,
            session,
            outbound: Some(outbound_rx),
        }
    }

    /// 运行连接主循环，直到客户端关闭、传输中断或空闲超时
    pub async fn run(mut self, socket: WebSocket) {
        let Some(mut outbound) = self.outbound.take() else {
            return;
        };
        let session = self.session;
        let hub = self.state.hub.clone();
        let idle_timeout = self.state.websocket.idle_timeout();
        let ping_interval = self.state.websocket.ping_interval();

        let (mut sender, mut incoming) = socket.split();

        // 控制帧（pong、close）与出站事件共用同一个写端
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        let mut send_task = tokio::spawn(async move {
            // 心跳由服务器发起，客户端的 Pong 刷新空闲计时
            let mut heartbeat = tokio::time::interval_at(
                tokio::time::Instant::now() + ping_interval,
                ping_interval,
            );

            loop {
                let message = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                        WsCommand::Close => {
                            let _ = sender.send(WsMessage::Close(None)).await;
                            break;
                        }
                    },
                    event = outbound.recv() => match event {
                        Some(event) => match event.to_json() {
                            Ok(json) => WsMessage::Text(json.into()),
                            Err(err) => {
                                tracing::warn!(error = %err, "failed to serialize websocket payload");
                                continue;
                            }
                        },
                        // 会话已注销
                        None => break,
                    },
                    _ = heartbeat.tick() => WsMessage::Ping(Vec::new().into()),
                };

                if sender.send(message).await.is_err() {
                    tracing::debug!(session_id = %session, "websocket write failed");
                    break;
                }
            }
            tracing::debug!(session_id = %session, "WebSocket发送任务结束");
        });

        let mut recv_task = tokio::spawn(async move {
            loop {
                let message = match tokio::time::timeout(idle_timeout, incoming.next()).await {
                    Ok(Some(Ok(message))) => message,
                    Ok(Some(Err(err))) => {
                        tracing::debug!(session_id = %session, error = %err, "websocket transport error");
                        break;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        tracing::info!(session_id = %session, "WebSocket空闲超时，未收到 Pong");
                        let _ = cmd_tx.send(WsCommand::Close).await;
                        break;
                    }
                };

                if Self::handle_incoming(&hub, session, message, &cmd_tx)
                    .await
                    .is_err()
                {
                    break;
                }
            }
            tracing::debug!(session_id = %session, "WebSocket接收任务结束");
        });

        let send_finished = tokio::select! {
            _ = &mut send_task => {
                recv_task.abort();
                true
            }
            _ = &mut recv_task => false,
        };

        // 注销会话会关闭出站队列，发送任务随之退出
        self.state.hub.disconnect(session).await;
        if !send_finished {
            let _ = send_task.await;
        }

        tracing::info!(session_id = %session, "WebSocket连接已断开");
    }

    /// 处理来自客户端的帧
    async fn handle_incoming(
        hub: &ChatHub,
        session: SessionId,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Close(_) => {
                tracing::debug!(session_id = %session, "WebSocket收到关闭消息");
                return Err(());
            }
            WsMessage::Ping(data) => {
                if cmd_tx
                    .send(WsCommand::SendPong(data.to_vec()))
                    .await
                    .is_err()
                {
                    tracing::warn!("Failed to send pong command");
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {
                tracing::trace!(session_id = %session, "heartbeat pong");
            }
            WsMessage::Text(text) => Self::dispatch(hub, session, text.as_str()).await,
            WsMessage::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => Self::dispatch(hub, session, text).await,
                Err(_) => {
                    hub.registry()
                        .send_to(session, ServerEvent::error("binary frames must carry UTF-8 JSON"));
                }
            },
        }
        Ok(())
    }

    /// 解码并执行客户端事件，失败时只回复发起方
    async fn dispatch(hub: &ChatHub, session: SessionId, text: &str) {
        let result = match ClientEvent::decode(text) {
            Ok(event) => hub.handle(session, event).await,
            Err(err) => Err(err.into()),
        };

        if let Err(err) = result {
            tracing::warn!(session_id = %session, error = %err, "rejected client event");
            hub.registry()
                .send_to(session, ServerEvent::error(err.to_string()));
        }
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
    Close,
}
