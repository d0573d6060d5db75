//! 输入状态转发
//!
//! 无状态：只把 typing / stop typing 广播给同房间的其他会话。

use domain::{RoomId, ServerEvent, SessionId};

use crate::rooms::RoomMembership;

impl RoomMembership {
    /// 转发输入状态，不包括发起方自己。房间不存在时什么也不做。
    pub fn relay_typing(&self, origin: SessionId, room: &RoomId, is_typing: bool) -> usize {
        let event = ServerEvent::typing(room.clone(), is_typing);
        let delivered = self.broadcast_except(room, origin, &event);
        tracing::trace!(session_id = %origin, room_id = %room, is_typing, delivered, "typing relayed");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use tokio::sync::mpsc;

    use crate::connection::{ConnectionRegistry, EventReceiver};
    use crate::rooms::RoomMembership;

    use super::*;

    fn session(registry: &ConnectionRegistry) -> (SessionId, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (registry.register(tx, Utc::now()), rx)
    }

    #[test]
    fn test_typing_excludes_sender() {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = RoomMembership::new(registry.clone());
        let room = RoomId::from("r");
        let (a, mut rx_a) = session(&registry);
        let (b, mut rx_b) = session(&registry);
        let (c, mut rx_c) = session(&registry);
        for id in [a, b, c] {
            rooms.join(id, room.clone()).unwrap();
        }

        assert_eq!(rooms.relay_typing(a, &room, true), 2);
        assert_eq!(rx_b.try_recv().unwrap(), ServerEvent::Typing(room.clone()));
        assert_eq!(rx_c.try_recv().unwrap(), ServerEvent::Typing(room.clone()));
        assert!(rx_a.try_recv().is_err());

        assert_eq!(rooms.relay_typing(b, &room, false), 2);
        assert_eq!(rx_a.try_recv().unwrap(), ServerEvent::StopTyping(room.clone()));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_typing_in_unknown_room_is_noop() {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = RoomMembership::new(registry.clone());
        let (a, _rx) = session(&registry);
        assert_eq!(rooms.relay_typing(a, &RoomId::from("nowhere"), true), 0);
    }

    #[test]
    fn test_typing_reaches_other_rooms_members_only() {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = RoomMembership::new(registry.clone());
        let (a, _rx_a) = session(&registry);
        let (b, mut rx_b) = session(&registry);
        rooms.join(a, RoomId::from("one")).unwrap();
        rooms.join(b, RoomId::from("two")).unwrap();

        assert_eq!(rooms.relay_typing(a, &RoomId::from("one"), true), 0);
        assert!(rx_b.try_recv().is_err());
    }
}
