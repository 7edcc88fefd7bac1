//! Типы ошибок сервиса. Определены в крейте `hagrid-error` и
//! переэкспортируются здесь для удобства.

pub use hagrid_error::*;
