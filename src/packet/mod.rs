//! Пакеты: то, что публикуется и доставляется слушателям.
//!
//! - `packet`: пакет с идентификатором, ссылкой на запрос и статусом.
//! - `payload`: типизированная полезная нагрузка.
//! - `status`: код статуса, подкод и сообщение.
//! - `wire`: представление пакета на границе с брокером.

#[allow(clippy::module_inception)]
pub mod packet;
pub mod payload;
pub mod status;
pub mod wire;

pub use packet::*;
pub use payload::*;
pub use status::*;
pub use wire::*;
