//! Путь отправки пакетов и учёт отправленных ("простаивающих") пакетов.

pub mod handler;
pub mod idle;

pub use handler::*;
pub use idle::*;
