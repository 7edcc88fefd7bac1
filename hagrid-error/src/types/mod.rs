pub mod broker;
pub mod config;
pub mod connection;
pub mod listener;
pub mod pool;
pub mod stream;
pub mod topic;

// Публичный экспорт всех типов ошибок из вложенных модулей, чтобы упростить
// доступ к ним из внешнего кода.
pub use broker::*;
pub use config::*;
pub use connection::*;
pub use listener::*;
pub use pool::*;
pub use stream::*;
pub use topic::*;
