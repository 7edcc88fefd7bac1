//! Топики и сопоставление шаблонов.
//!
//! - `pattern`: синтаксис, компиляция и порядок специфичности шаблонов.
//! - `topic`: топик с привязкой сериализации и свойствами.
//! - `group`: топики с общим первым сегментом.
//! - `registry`: потокобезопасный реестр групп.

pub mod group;
pub mod pattern;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod topic;

pub use group::*;
pub use pattern::*;
pub use registry::*;
pub use topic::*;
