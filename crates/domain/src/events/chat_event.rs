use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DomainError;
use crate::value_objects::{RoomId, UserId};

/// `setup` 事件负载，兼容 `_id` / `id` / `userId` 三种写法。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupPayload {
    #[serde(alias = "_id", alias = "id")]
    pub user_id: UserId,
}

/// 客户端发往服务器的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// 声明连接身份
    #[serde(rename = "setup")]
    Setup(SetupPayload),
    /// 加入聊天室
    #[serde(rename = "join chat")]
    JoinChat(RoomId),
    #[serde(rename = "typing")]
    Typing(RoomId),
    #[serde(rename = "stop typing")]
    StopTyping(RoomId),
    /// 新消息，负载原样保留用于转发
    #[serde(rename = "new message")]
    NewMessage(Value),
}

impl ClientEvent {
    pub fn decode(text: &str) -> Result<Self, DomainError> {
        serde_json::from_str(text).map_err(|err| DomainError::malformed_event(err.to_string()))
    }
}

/// 在线状态变更通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: UserId,
    pub is_online: bool,
}

/// 服务器推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// `setup` 的确认
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "typing")]
    Typing(RoomId),
    #[serde(rename = "stop typing")]
    StopTyping(RoomId),
    #[serde(rename = "message received")]
    MessageReceived(Value),
    #[serde(rename = "user status")]
    UserStatus(UserStatus),
    /// 协议错误提示，例如帧无法解析或重复绑定身份
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn typing(room_id: RoomId, is_typing: bool) -> Self {
        if is_typing {
            ServerEvent::Typing(room_id)
        } else {
            ServerEvent::StopTyping(room_id)
        }
    }

    pub fn user_status(user_id: UserId, is_online: bool) -> Self {
        ServerEvent::UserStatus(UserStatus { user_id, is_online })
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
