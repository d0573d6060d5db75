use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use domain::{ServerEvent, Timestamp, UserId};
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::connection::ConnectionRegistry;
use crate::error::ApplicationError;

/// 用户在线状态外部存储（例如用户表上的 isOnline 字段）
#[async_trait::async_trait]
pub trait UserStatusStore: Send + Sync {
    /// 记录用户在线状态变化
    async fn update_status(
        &self,
        user_id: &UserId,
        is_online: bool,
        changed_at: Timestamp,
    ) -> Result<(), ApplicationError>;
}

/// 单个用户的在线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceState {
    pub online: bool,
    pub changed_at: Timestamp,
}

/// 一次状态设置的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChange {
    pub user_id: UserId,
    pub online: bool,
    /// 状态是否真的发生了变化
    pub changed: bool,
    /// 收到广播的连接数，未广播时为 0
    pub notified: usize,
}

/// 在线状态跟踪器
///
/// 状态严格按用户身份记录，上线、离线都向所有连接广播 `user status`。
/// 同一用户的状态变更（写状态、持久化、广播）按用户串行执行。
pub struct PresenceTracker {
    registry: Arc<ConnectionRegistry>,
    clock: Arc<dyn Clock>,
    states: DashMap<UserId, PresenceState>,
    gates: DashMap<UserId, Arc<Mutex<()>>>,
    status_store: Option<Arc<dyn UserStatusStore>>,
    broadcast_duplicates: bool,
}

impl PresenceTracker {
    pub fn new(registry: Arc<ConnectionRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            clock,
            states: DashMap::new(),
            gates: DashMap::new(),
            status_store: None,
            broadcast_duplicates: true,
        }
    }

    pub fn with_status_store(mut self, store: Arc<dyn UserStatusStore>) -> Self {
        self.status_store = Some(store);
        self
    }

    /// 状态未变化时是否仍然广播
    pub fn broadcast_duplicates(mut self, enabled: bool) -> Self {
        self.broadcast_duplicates = enabled;
        self
    }

    pub async fn set_online(&self, user_id: UserId) -> PresenceChange {
        let gate = self.gate(&user_id);
        let _serialized = gate.lock().await;
        self.transition(user_id, true).await
    }

    pub async fn set_offline(&self, user_id: UserId) -> PresenceChange {
        let gate = self.gate(&user_id);
        let _serialized = gate.lock().await;
        self.transition(user_id, false).await
    }

    /// 会话断开后的离线处理
    ///
    /// `last_session_only` 为真时，在用户锁内确认该用户已没有存活连接才标记离线，
    /// 与同一用户并发的 `set_online` 不会交错。返回 `None` 表示用户仍在线。
    pub async fn release(&self, user_id: UserId, last_session_only: bool) -> Option<PresenceChange> {
        let gate = self.gate(&user_id);
        let _serialized = gate.lock().await;
        if last_session_only && self.registry.is_user_connected(&user_id) {
            tracing::debug!(user_id = %user_id, "user still has live sessions, staying online");
            return None;
        }
        Some(self.transition(user_id, false).await)
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.states.get(user_id).is_some_and(|state| state.online)
    }

    pub fn snapshot(&self, user_id: &UserId) -> Option<PresenceState> {
        self.states.get(user_id).map(|state| *state)
    }

    fn gate(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        self.gates.entry(user_id.clone()).or_default().clone()
    }

    /// 调用方必须持有该用户的锁
    async fn transition(&self, user_id: UserId, online: bool) -> PresenceChange {
        let now = self.clock.now();
        let changed = match self.states.entry(user_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let changed = occupied.get().online != online;
                if changed {
                    occupied.insert(PresenceState {
                        online,
                        changed_at: now,
                    });
                }
                changed
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PresenceState {
                    online,
                    changed_at: now,
                });
                true
            }
        };

        if !changed && !self.broadcast_duplicates {
            tracing::debug!(user_id = %user_id, online, "presence unchanged, broadcast suppressed");
            return PresenceChange {
                user_id,
                online,
                changed,
                notified: 0,
            };
        }

        // 外部存储失败不影响广播
        if let Some(store) = &self.status_store {
            if let Err(err) = store.update_status(&user_id, online, now).await {
                tracing::warn!(error = %err, user_id = %user_id, "failed to persist user status");
            }
        }

        let notified = self
            .registry
            .broadcast_all(&ServerEvent::user_status(user_id.clone(), online));

        tracing::info!(user_id = %user_id, online, notified, "user status broadcast");

        PresenceChange {
            user_id,
            online,
            changed,
            notified,
        }
    }
}
