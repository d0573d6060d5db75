//! 连接级事件定义
//!
//! 客户端与服务器之间通过 WebSocket 交换的 JSON 帧，格式为
//! `{"event": <名称>, "data": <负载>}`。

pub mod chat_event;

pub use chat_event::*;
