//! Реестр слушателей и диспетчеризация пакетов.
//!
//! - `listener`: слушатель, его фильтры и билдер.
//! - `response`: ответ, заполняемый обработчиком.
//! - `registry`: хранение, отбор по шаблону, порядок приоритетов,
//!   корреляция и таймауты.
//! - `cleanup`: фоновая задача снятия истёкших слушателей.

pub mod cleanup;
#[allow(clippy::module_inception)]
pub mod listener;
pub mod registry;
pub mod response;

pub use cleanup::*;
pub use listener::*;
pub use registry::*;
pub use response::*;
