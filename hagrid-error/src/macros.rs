/// Немедленно возвращает доменную ошибку, обёрнутую в `StackError`
/// (аналогично `anyhow::bail!`).
///
/// ```ignore
/// use hagrid_error::{bail, StreamError};
///
/// if let Err(e) = publisher.push(topic, key, &wire).await {
///     bail!(StreamError::Publish { topic: topic.to_string(), reason: e.to_string() });
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
}

/// Трейт-расширение для `Result`: `.context(...)` и `.with_context(...)`.
///
/// Ошибка любого доменного типа превращается в `StackError` с описанием
/// шага, на котором она возникла.
pub trait ResultExt<T> {
    /// Оборачивает ошибку в `StackError` и добавляет контекст.
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    /// Ленивый контекст (строка формируется только в случае ошибки).
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        self.map_err(|e| e.into().context(ctx))
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
