//! 领域模型错误定义
//!
//! 值对象解析、事件解码失败时返回的错误类型。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 手机号格式不正确
    #[error("invalid phone number format, expected a 10-digit mobile number")]
    InvalidPhoneNumber,

    /// 客户端事件无法解析
    #[error("malformed event: {message}")]
    MalformedEvent { message: String },
}

impl DomainError {
    /// 创建参数错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 创建事件格式错误
    pub fn malformed_event(message: impl Into<String>) -> Self {
        Self::MalformedEvent {
            message: message.into(),
        }
    }
}
