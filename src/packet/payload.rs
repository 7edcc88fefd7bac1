use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};

/// Тип полезной нагрузки, используемый фильтрами слушателей.
///
/// Сравнивается по `TypeId`; имя хранится только для логов и ошибок.
#[derive(Clone, Copy)]
pub struct PayloadType {
    id: TypeId,
    name: &'static str,
}

/// Типизированная полезная нагрузка пакета.
///
/// Значение хранится за `Arc`, поэтому клонирование пакета не копирует
/// данные.
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
    kind: PayloadType,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl PayloadType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl Payload {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            kind: PayloadType::of::<T>(),
        }
    }

    pub fn payload_type(&self) -> PayloadType {
        self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.kind.is::<T>()
    }

    /// Возвращает ссылку на значение, если оно имеет тип `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl PartialEq for PayloadType {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.id == other.id
    }
}

impl Eq for PayloadType {}

impl fmt::Debug for PayloadType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Debug for Payload {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Payload<{}>", self.kind.name)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
