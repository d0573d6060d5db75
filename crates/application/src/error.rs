use domain::{DomainError, SessionId, UserId};
use thiserror::Error;

use crate::fanout::FanoutError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    /// 传输层在注册前就使用了会话，属于协议违规
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    #[error("session {session} is already bound to user {bound}")]
    IdentityAlreadyBound { session: SessionId, bound: UserId },
    #[error("fan-out error: {0}")]
    Fanout(#[from] FanoutError),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }
}
