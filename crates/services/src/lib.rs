pub mod auth;
pub mod background;
pub mod dao;
pub mod dispatch;
pub mod error;
pub mod notification;
pub mod realtime;
pub mod receipts;
pub mod request;
pub mod views;

pub use auth::AuthService;
pub use background::TaskService;
pub use dao::*;
pub use dispatch::{MessageDispatcher, NewComment, SendMessage, SendTarget};
pub use error::{ChatError, ChatResult};
pub use notification::{LogPushProvider, Notifier, PushPayload, PushProvider, PushReport};
pub use realtime::PresenceRegistry;
pub use receipts::{MarkSeen, ReceiptAggregator};
pub use request::AuthenticatedRequest;
