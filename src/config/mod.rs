//! Загрузка настроек сервиса.

pub mod settings;

pub use settings::*;
