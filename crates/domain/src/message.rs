use serde::Deserialize;
use serde_json::Value;

use crate::errors::DomainError;
use crate::value_objects::{RoomId, UserId};

/// 参与者引用：既可以是裸 ID 字符串，也可以是带 `_id` / `id` 的用户对象。
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ParticipantRef {
    Id(UserId),
    Object {
        #[serde(alias = "_id")]
        id: UserId,
    },
}

impl ParticipantRef {
    fn into_user_id(self) -> UserId {
        match self {
            ParticipantRef::Id(id) | ParticipantRef::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatRef {
    #[serde(default, alias = "_id")]
    id: Option<RoomId>,
    #[serde(default)]
    users: Option<Vec<ParticipantRef>>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    chat: Option<ChatRef>,
    sender: Option<ParticipantRef>,
}

/// 一次待分发的新消息。
///
/// 只在分发期间存在，不做持久化。`payload` 原样转发给接收方。
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub sender: UserId,
    pub chat_id: Option<RoomId>,
    /// 会话参与者列表，缺失时分发为空操作。
    pub participants: Option<Vec<UserId>>,
    pub payload: Value,
}

impl MessageEvent {
    pub fn new(
        sender: UserId,
        chat_id: Option<RoomId>,
        participants: Option<Vec<UserId>>,
        payload: Value,
    ) -> Self {
        Self {
            sender,
            chat_id,
            participants,
            payload,
        }
    }

    /// 从客户端 `new message` 事件的原始 JSON 中提取路由信息。
    pub fn from_payload(payload: Value) -> Result<Self, DomainError> {
        let envelope = Envelope::deserialize(&payload)
            .map_err(|err| DomainError::malformed_event(err.to_string()))?;

        let sender = envelope
            .sender
            .ok_or_else(|| DomainError::malformed_event("missing sender"))?
            .into_user_id();

        let (chat_id, participants) = match envelope.chat {
            Some(chat) => (
                chat.id,
                chat.users.map(|users| {
                    users
                        .into_iter()
                        .map(ParticipantRef::into_user_id)
                        .collect()
                }),
            ),
            None => (None, None),
        };

        Ok(Self {
            sender,
            chat_id,
            participants,
            payload,
        })
    }
}
