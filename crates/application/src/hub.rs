//! 聊天连接中枢
//!
//! 进程启动时构建一次，以句柄形式传给每个连接处理器。负责把
//! 连接注册表、房间、在线状态和消息分发串起来：
//! - `setup` 绑定身份后标记上线
//! - 断开时先清理房间成员，再按用户身份标记离线

use std::sync::Arc;

use domain::{ClientEvent, MessageEvent, RoomId, ServerEvent, SessionId, UserId};
use serde_json::Value;

use crate::clock::Clock;
use crate::connection::{BindOutcome, ConnectionRegistry, EventSender, SessionSnapshot};
use crate::error::ApplicationError;
use crate::fanout::{FanoutReport, MessageFanout};
use crate::presence::{PresenceTracker, UserStatusStore};
use crate::rooms::RoomMembership;

/// 中枢行为开关
#[derive(Debug, Clone)]
pub struct HubOptions {
    /// 状态未变化时是否仍然广播
    pub broadcast_duplicate_presence: bool,
    /// 只有用户最后一个连接断开时才标记离线
    pub offline_on_last_session: bool,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            broadcast_duplicate_presence: true,
            offline_on_last_session: true,
        }
    }
}

pub struct ChatHubDependencies {
    pub clock: Arc<dyn Clock>,
    pub status_store: Option<Arc<dyn UserStatusStore>>,
    pub options: HubOptions,
}

pub struct ChatHub {
    clock: Arc<dyn Clock>,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomMembership>,
    presence: Arc<PresenceTracker>,
    fanout: MessageFanout,
    options: HubOptions,
}

impl ChatHub {
    pub fn new(deps: ChatHubDependencies) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomMembership::new(registry.clone()));

        let mut presence = PresenceTracker::new(registry.clone(), deps.clock.clone())
            .broadcast_duplicates(deps.options.broadcast_duplicate_presence);
        if let Some(store) = deps.status_store {
            presence = presence.with_status_store(store);
        }

        Self {
            clock: deps.clock,
            fanout: MessageFanout::new(registry.clone()),
            registry,
            rooms,
            presence: Arc::new(presence),
            options: deps.options,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn rooms(&self) -> &Arc<RoomMembership> {
        &self.rooms
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    /// 新连接建立
    pub fn connect(&self, outbound: EventSender) -> SessionId {
        self.registry.register(outbound, self.clock.now())
    }

    /// 处理单个客户端事件
    pub async fn handle(&self, session: SessionId, event: ClientEvent) -> Result<(), ApplicationError> {
        match event {
            ClientEvent::Setup(payload) => self.setup(session, payload.user_id).await,
            ClientEvent::JoinChat(room) => self.join(session, room).map(|_| ()),
            ClientEvent::Typing(room) => {
                self.typing(session, &room, true);
                Ok(())
            }
            ClientEvent::StopTyping(room) => {
                self.typing(session, &room, false);
                Ok(())
            }
            ClientEvent::NewMessage(payload) => self.new_message(session, payload).map(|_| ()),
        }
    }

    /// 绑定身份，回复 `connected` 并广播上线
    pub async fn setup(&self, session: SessionId, user_id: UserId) -> Result<(), ApplicationError> {
        let outcome = self.registry.bind_identity(session, user_id.clone())?;
        self.registry.send_to(session, ServerEvent::Connected);
        if outcome == BindOutcome::AlreadyBound {
            tracing::debug!(session_id = %session, user_id = %user_id, "repeated setup");
        }
        self.presence.set_online(user_id).await;
        Ok(())
    }

    pub fn join(&self, session: SessionId, room: RoomId) -> Result<bool, ApplicationError> {
        self.rooms.join(session, room)
    }

    pub fn typing(&self, session: SessionId, room: &RoomId, is_typing: bool) -> usize {
        self.rooms.relay_typing(session, room, is_typing)
    }

    pub fn new_message(&self, session: SessionId, payload: Value) -> Result<FanoutReport, ApplicationError> {
        if !self.registry.contains(session) {
            return Err(ApplicationError::UnknownSession(session));
        }
        let event = MessageEvent::from_payload(payload)?;
        if let Some(bound) = self.registry.user_of(session) {
            if bound != event.sender {
                tracing::debug!(session_id = %session, bound = %bound, sender = %event.sender, "message sender differs from session identity");
            }
        }
        let report = self.fanout.deliver(&event)?;
        Ok(report)
    }

    /// 连接断开（主动关闭或传输中断）都走这里
    pub async fn disconnect(&self, session: SessionId) -> Option<SessionSnapshot> {
        let snapshot = self.registry.unregister(session)?;
        self.rooms.remove_session(session, &snapshot.rooms);

        if let Some(user) = &snapshot.user {
            self.presence
                .release(user.clone(), self.options.offline_on_last_session)
                .await;
        }

        tracing::info!(
            session_id = %session,
            user_id = ?snapshot.user,
            rooms = snapshot.rooms.len(),
            "session disconnected"
        );
        Some(snapshot)
    }
}
