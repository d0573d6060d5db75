use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use domain::{RoomId, ServerEvent, SessionId};

use crate::connection::ConnectionRegistry;
use crate::error::ApplicationError;

/// 房间成员管理器
///
/// 房间没有独立生命周期：首次加入时创建，最后一个成员离开时删除。
pub struct RoomMembership {
    registry: Arc<ConnectionRegistry>,
    rooms: DashMap<RoomId, HashSet<SessionId>>,
}

impl RoomMembership {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            rooms: DashMap::new(),
        }
    }

    /// 加入房间（幂等），返回是否为新加入
    pub fn join(&self, session: SessionId, room: RoomId) -> Result<bool, ApplicationError> {
        self.registry.record_room(session, &room)?;
        let inserted = self.rooms.entry(room.clone()).or_default().insert(session);

        // 会话可能在两步之间被注销，此时撤销刚写入的成员关系
        if !self.registry.contains(session) {
            self.remove_session(session, std::slice::from_ref(&room));
            return Err(ApplicationError::UnknownSession(session));
        }

        if inserted {
            tracing::info!(session_id = %session, room_id = %room, "session joined room");
        }
        Ok(inserted)
    }

    /// 会话断开时由上层通知，移除其所有房间成员关系
    pub fn remove_session(&self, session: SessionId, rooms: &[RoomId]) {
        for room in rooms {
            let now_empty = match self.rooms.get_mut(room) {
                Some(mut members) => {
                    members.remove(&session);
                    members.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.rooms.remove_if(room, |_, members| members.is_empty());
            }
        }
    }

    pub fn members(&self, room: &RoomId) -> Vec<SessionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, room: &RoomId, session: SessionId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(&session))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// 向房间内除 `origin` 外的所有会话广播，返回成功投递数
    pub fn broadcast_except(&self, room: &RoomId, origin: SessionId, event: &ServerEvent) -> usize {
        self.members(room)
            .into_iter()
            .filter(|member| *member != origin)
            .filter(|member| self.registry.send_to(*member, event.clone()))
            .count()
    }
}
