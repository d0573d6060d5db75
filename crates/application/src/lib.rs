//! 应用层实现。
//!
//! 实时连接核心（连接注册、房间成员、在线状态、消息分发、输入状态转发）
//! 以及手机号验证码服务，对外部能力（短信发送、用户状态存储）只依赖抽象。

pub mod clock;
pub mod connection;
pub mod error;
pub mod fanout;
pub mod hub;
pub mod presence;
pub mod rooms;
pub mod typing;
pub mod verification;

pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::{
    BindOutcome, ConnectionRegistry, EventReceiver, EventSender, SessionSnapshot,
};
pub use error::ApplicationError;
pub use fanout::{FanoutError, FanoutReport, MessageFanout};
pub use hub::{ChatHub, ChatHubDependencies, HubOptions};
pub use presence::{PresenceChange, PresenceState, PresenceTracker, UserStatusStore};
pub use rooms::RoomMembership;
pub use verification::{
    DeliveryMode, PhoneVerificationService, PhoneVerificationServiceDependencies, SmsError,
    SmsReceipt, SmsSender, VerificationError, VerificationPolicy, VerificationStore,
};
