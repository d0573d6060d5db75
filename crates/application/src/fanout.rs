use std::collections::HashSet;
use std::sync::Arc;

use domain::{MessageEvent, RoomId, ServerEvent};
use thiserror::Error;

use crate::connection::ConnectionRegistry;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FanoutError {
    /// 消息所属会话没有携带参与者列表
    #[error("chat {} has no participant list", .chat_id.as_ref().map(RoomId::as_str).unwrap_or("<unknown>"))]
    MissingParticipants { chat_id: Option<RoomId> },
}

/// 一次分发的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// 除发送者外的参与者数
    pub recipients: usize,
    /// 成功投递的连接数
    pub delivered: usize,
    /// 没有任何在线连接的参与者数
    pub offline: usize,
    /// 投递失败的连接数（连接正在关闭）
    pub failed: usize,
}

/// 新消息分发器
///
/// 把消息投递到每个参与者（发送者除外）的个人频道，
/// 参与者即使没有打开该房间也能收到通知。尽力而为，最多投递一次。
pub struct MessageFanout {
    registry: Arc<ConnectionRegistry>,
}

impl MessageFanout {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn deliver(&self, event: &MessageEvent) -> Result<FanoutReport, FanoutError> {
        let participants =
            event
                .participants
                .as_ref()
                .ok_or_else(|| FanoutError::MissingParticipants {
                    chat_id: event.chat_id.clone(),
                })?;

        let mut report = FanoutReport::default();
        let mut seen = HashSet::new();

        for participant in participants {
            if *participant == event.sender || !seen.insert(participant) {
                continue;
            }
            report.recipients += 1;

            let sessions = self.registry.sessions_of(participant);
            if sessions.is_empty() {
                report.offline += 1;
                continue;
            }

            for session in sessions {
                let delivered = self
                    .registry
                    .send_to(session, ServerEvent::MessageReceived(event.payload.clone()));
                if delivered {
                    report.delivered += 1;
                } else {
                    // 单个接收方失败不影响其他接收方
                    report.failed += 1;
                    tracing::warn!(
                        session_id = %session,
                        user_id = %participant,
                        "failed to deliver message to session"
                    );
                }
            }
        }

        tracing::debug!(
            sender = %event.sender,
            chat_id = ?event.chat_id,
            recipients = report.recipients,
            delivered = report.delivered,
            offline = report.offline,
            "message fan-out complete"
        );
        Ok(report)
    }
}
