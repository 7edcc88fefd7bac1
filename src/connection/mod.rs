//! Состояние соединения с брокером и автоматическое переподключение.

pub mod handler;
pub mod state;

pub use handler::*;
pub use state::*;
