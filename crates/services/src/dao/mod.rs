pub mod base;
pub mod comment;
pub mod container;
pub mod message;
pub mod user;

pub use base::{BaseDao, DaoError, DaoResult};
pub use comment::CommentDao;
pub use container::ContainerDao;
pub use message::MessageDao;
pub use user::UserDao;
