//! 会话层：processTurn 入口与并发会话管理

pub mod manager;
pub mod turn;

pub use manager::{SessionFactory, SessionManager};
pub use turn::{Session, UserSignal};
