//! Приём пакетов: пул потребителей, опрашивающих брокер.
//!
//! - `pool`: распределение топиков по ограниченному числу потребителей;
//! - `worker`: цикл опроса одного потребителя и восстановление пакетов.

pub mod pool;
pub mod worker;

pub use pool::*;
pub use worker::PacketSink;
pub(crate) use worker::{Worker, WorkerCommand, WorkerContext};
