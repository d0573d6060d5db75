//! 连接注册表
//!
//! 记录所有活跃会话、会话绑定的用户身份，以及每个用户的个人频道
//! （用户 → 会话集合）。个人频道在身份绑定时隐式订阅，与房间订阅相互独立。

use std::collections::HashSet;

use dashmap::DashMap;
use domain::{RoomId, ServerEvent, SessionId, Timestamp, UserId};
use tokio::sync::mpsc;

use crate::error::ApplicationError;

/// 会话的出站事件通道
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

struct SessionEntry {
    user: Option<UserId>,
    rooms: HashSet<RoomId>,
    outbound: EventSender,
    connected_at: Timestamp,
}

/// 会话注销时返回的状态快照
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub user: Option<UserId>,
    pub rooms: Vec<RoomId>,
    pub connected_at: Timestamp,
}

/// 身份绑定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Bound,
    /// 同一身份重复 setup
    AlreadyBound,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    channels: DashMap<UserId, HashSet<SessionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册新连接，此时尚未绑定用户
    pub fn register(&self, outbound: EventSender, connected_at: Timestamp) -> SessionId {
        let id = SessionId::new();
        self.sessions.insert(
            id,
            SessionEntry {
                user: None,
                rooms: HashSet::new(),
                outbound,
                connected_at,
            },
        );
        tracing::debug!(session_id = %id, "session registered");
        id
    }

    /// 绑定用户身份并订阅该用户的个人频道。身份一旦绑定不可更改。
    pub fn bind_identity(
        &self,
        session: SessionId,
        user: UserId,
    ) -> Result<BindOutcome, ApplicationError> {
        let mut entry = self
            .sessions
            .get_mut(&session)
            .ok_or(ApplicationError::UnknownSession(session))?;

        if let Some(bound) = entry.user.as_ref() {
            if *bound == user {
                return Ok(BindOutcome::AlreadyBound);
            }
            return Err(ApplicationError::IdentityAlreadyBound {
                session,
                bound: bound.clone(),
            });
        }
        entry.user = Some(user.clone());

        // 持有会话锁时写入频道索引，保证与 unregister 的顺序一致（sessions → channels）
        self.channels
            .entry(user.clone())
            .or_default()
            .insert(session);
        drop(entry);

        tracing::info!(session_id = %session, user_id = %user, "session identity bound");
        Ok(BindOutcome::Bound)
    }

    /// 注销会话，返回其最后状态，由调用方通知房间和在线状态
    pub fn unregister(&self, session: SessionId) -> Option<SessionSnapshot> {
        let (id, entry) = self.sessions.remove(&session)?;

        if let Some(user) = &entry.user {
            let now_empty = match self.channels.get_mut(user) {
                Some(mut sessions) => {
                    sessions.remove(&id);
                    sessions.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.channels.remove_if(user, |_, sessions| sessions.is_empty());
            }
        }

        tracing::debug!(session_id = %id, "session unregistered");
        Some(SessionSnapshot {
            id,
            user: entry.user,
            rooms: entry.rooms.into_iter().collect(),
            connected_at: entry.connected_at,
        })
    }

    /// 在会话上记录已加入的房间，返回是否为首次加入
    pub fn record_room(&self, session: SessionId, room: &RoomId) -> Result<bool, ApplicationError> {
        let mut entry = self
            .sessions
            .get_mut(&session)
            .ok_or(ApplicationError::UnknownSession(session))?;
        Ok(entry.rooms.insert(room.clone()))
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.sessions.contains_key(&session)
    }

    pub fn user_of(&self, session: SessionId) -> Option<UserId> {
        self.sessions.get(&session).and_then(|entry| entry.user.clone())
    }

    pub fn rooms_of(&self, session: SessionId) -> Option<Vec<RoomId>> {
        self.sessions
            .get(&session)
            .map(|entry| entry.rooms.iter().cloned().collect())
    }

    /// 个人频道上的所有会话
    pub fn sessions_of(&self, user: &UserId) -> Vec<SessionId> {
        self.channels
            .get(user)
            .map(|sessions| sessions.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_user_connected(&self, user: &UserId) -> bool {
        self.channels
            .get(user)
            .is_some_and(|sessions| !sessions.is_empty())
    }

    /// 向单个会话推送事件，会话不存在或已断开时返回 false
    pub fn send_to(&self, session: SessionId, event: ServerEvent) -> bool {
        let Some(outbound) = self.sessions.get(&session).map(|entry| entry.outbound.clone())
        else {
            return false;
        };
        if outbound.send(event).is_err() {
            tracing::debug!(session_id = %session, "outbound channel closed, event dropped");
            return false;
        }
        true
    }

    /// 向所有连接广播，返回成功投递的会话数
    pub fn broadcast_all(&self, event: &ServerEvent) -> usize {
        let targets: Vec<(SessionId, EventSender)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.outbound.clone()))
            .collect();

        let mut delivered = 0;
        for (session, outbound) in targets {
            match outbound.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::debug!(session_id = %session, "skipping closed session during broadcast")
                }
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn registry_with_session() -> (ConnectionRegistry, SessionId, EventReceiver) {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let session = registry.register(tx, Utc::now());
        (registry, session, rx)
    }

    #[test]
    fn test_bind_identity_requires_registered_session() {
        let registry = ConnectionRegistry::new();
        let missing = SessionId::new();
        let result = registry.bind_identity(missing, UserId::from("alice"));
        assert!(matches!(result, Err(ApplicationError::UnknownSession(id)) if id == missing));
    }

    #[test]
    fn test_identity_is_immutable_once_bound() {
        let (registry, session, _rx) = registry_with_session();
        let alice = UserId::from("alice");

        assert_eq!(
            registry.bind_identity(session, alice.clone()).unwrap(),
            BindOutcome::Bound
        );
        assert_eq!(
            registry.bind_identity(session, alice.clone()).unwrap(),
            BindOutcome::AlreadyBound
        );
        assert!(matches!(
            registry.bind_identity(session, UserId::from("bob")),
            Err(ApplicationError::IdentityAlreadyBound { .. })
        ));
        assert_eq!(registry.user_of(session), Some(alice.clone()));
        assert_eq!(registry.sessions_of(&alice), vec![session]);
    }

    #[test]
    fn test_unregister_clears_personal_channel() {
        let (registry, session, _rx) = registry_with_session();
        let alice = UserId::from("alice");
        registry.bind_identity(session, alice.clone()).unwrap();
        registry.record_room(session, &RoomId::from("r1")).unwrap();

        let snapshot = registry.unregister(session).unwrap();
        assert_eq!(snapshot.user, Some(alice.clone()));
        assert_eq!(snapshot.rooms, vec![RoomId::from("r1")]);
        assert!(!registry.is_user_connected(&alice));
        assert!(registry.sessions_of(&alice).is_empty());
        assert!(registry.is_empty());
        assert!(registry.unregister(session).is_none());
    }

    #[test]
    fn test_user_with_two_sessions_stays_connected() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let first = registry.register(tx1, Utc::now());
        let second = registry.register(tx2, Utc::now());
        let alice = UserId::from("alice");
        registry.bind_identity(first, alice.clone()).unwrap();
        registry.bind_identity(second, alice.clone()).unwrap();

        registry.unregister(first);
        assert!(registry.is_user_connected(&alice));
        assert_eq!(registry.sessions_of(&alice), vec![second]);
    }

    #[test]
    fn test_broadcast_all_skips_closed_channels() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        registry.register(tx1, Utc::now());
        registry.register(tx2, Utc::now());
        drop(rx2);

        let delivered = registry.broadcast_all(&ServerEvent::Connected);
        assert_eq!(delivered, 1);
        assert_eq!(rx1.try_recv().unwrap(), ServerEvent::Connected);
    }

    #[test]
    fn test_send_to_unknown_session_returns_false() {
        let (registry, session, mut rx) = registry_with_session();
        assert!(registry.send_to(session, ServerEvent::Connected));
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Connected);
        assert!(!registry.send_to(SessionId::new(), ServerEvent::Connected));
    }
}
