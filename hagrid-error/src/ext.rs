use std::{any::Any, error::Error};

use crate::ErrorCode;

/// Расширение для ошибок библиотеки (object-safe).
///
/// Предоставляет вспомогательные методы для работы с ошибками:
/// - извлечение кода ошибки,
/// - безопасное сообщение для вызывающей стороны,
/// - детализированное сообщение для логов,
/// - теги для систем наблюдаемости.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Код ошибки.
    ///
    /// По умолчанию возвращает [`ErrorCode::Internal`].
    fn error_code(&self) -> ErrorCode {
        ErrorCode::Internal
    }

    /// Возвращает ошибку как [`Any`](std::any::Any), чтобы можно было
    /// выполнить downcast к конкретному типу.
    fn as_any(&self) -> &dyn Any;

    /// Безопасное сообщение для вызывающей стороны.
    ///
    /// Для внутренних ошибок возвращает строку `"Internal error"`.
    fn client_message(&self) -> String {
        match self.error_code() {
            ErrorCode::Unknown | ErrorCode::Internal | ErrorCode::Unexpected => {
                "Internal error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Детализированное сообщение для логов.
    fn log_message(&self) -> String {
        format!("{self:?}")
    }

    /// Набор тегов для систем наблюдаемости.
    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", self.type_name()),
            ("error_code", self.error_code().to_string()),
        ]
    }

    /// Имя типа ошибки (для метрик или логирования).
    fn type_name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("Unknown")
            .to_string()
    }
}
