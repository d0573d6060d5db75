//! 聊天核心领域模型
//!
//! 包含会话、用户、聊天室、手机号等值对象，以及连接级事件定义。

pub mod errors;
pub mod events;
pub mod message;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use message::MessageEvent;
pub use value_objects::*;
