pub mod channel;
pub mod comment;
pub mod container;
pub mod conversation;
pub mod group;
pub mod message;
pub mod user;

pub use channel::Channel;
pub use comment::Comment;
pub use container::{member_ids, ContainerKind, ContainerRef, LastMessage, Member};
pub use conversation::Conversation;
pub use group::Group;
pub use message::{DeliveryStatus, Message, MessageReference, MessageStatus, ReferenceKind};
pub use user::{PushToken, User};
