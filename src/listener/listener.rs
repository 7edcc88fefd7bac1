use std::{any::Any, fmt, sync::Arc, time::Duration};

use super::Response;
use crate::packet::{Packet, Payload, PayloadType};

/// Направление пакета относительно процесса.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Исходящий пакет (публикация).
    Upstream,
    /// Входящий пакет (получен от брокера).
    Downstream,
}

/// Стандартные приоритеты. Меньшее значение исполняется раньше.
#[derive(Debug)]
pub struct Priority;

impl Priority {
    pub const HIGHEST: i32 = 0;
    pub const HIGH: i32 = 2;
    pub const MEDIUM: i32 = 4;
    pub const LOW: i32 = 8;
    pub const LOWEST: i32 = 16;
}

/// Фильтр по типу полезной нагрузки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFilter {
    /// Любая нагрузка, в том числе отсутствующая. Нагрузка передаётся
    /// обработчику.
    Any,
    /// Любой пакет, но обработчик нагрузку не получает.
    Empty,
    /// Только нагрузка указанного типа.
    Type(PayloadType),
}

impl PayloadFilter {
    /// Подходит ли пакет с такой нагрузкой.
    ///
    /// Пакет без нагрузки принимают `Any`, `Empty` и слушатели, ожидающие
    /// коррелированный ответ.
    pub fn accepts(
        &self,
        payload: Option<PayloadType>,
        correlated: bool,
    ) -> bool {
        match (self, payload) {
            (Self::Any | Self::Empty, _) => true,
            (Self::Type(_), None) => correlated,
            (Self::Type(expected), Some(actual)) => *expected == actual,
        }
    }
}

/// Контекст доставки пакета обработчику.
pub struct Delivery<'a> {
    topic: &'a str,
    direction: Direction,
    packet: &'a Packet,
    payload: Option<&'a Payload>,
}

impl<'a> Delivery<'a> {
    pub(crate) fn new(
        topic: &'a str,
        direction: Direction,
        packet: &'a Packet,
        filter: PayloadFilter,
    ) -> Self {
        let payload = match filter {
            PayloadFilter::Empty => None,
            _ => packet.payload(),
        };
        Self {
            topic,
            direction,
            packet,
            payload,
        }
    }

    /// Имя топика, по которому идёт диспетчеризация.
    pub fn topic(&self) -> &'a str {
        self.topic
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn packet(&self) -> &'a Packet {
        self.packet
    }

    pub fn payload(&self) -> Option<&'a Payload> {
        self.payload
    }

    pub fn payload_as<T: Any>(&self) -> Option<&'a T> {
        self.payload.and_then(Payload::downcast_ref::<T>)
    }
}

pub type Handler = dyn Fn(&Delivery<'_>, &mut Response) -> anyhow::Result<()> + Send + Sync;

/// Слушатель: шаблон топика, фильтры, приоритет и обработчик.
///
/// Создаётся через [`Listener::builder`].
#[derive(Clone)]
pub struct Listener {
    pub(crate) pattern: String,
    pub(crate) direction: Option<Direction>,
    pub(crate) filter: PayloadFilter,
    pub(crate) priority: i32,
    pub(crate) correlation_id: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) responsive: bool,
    pub(crate) handler: Arc<Handler>,
}

pub struct ListenerBuilder {
    pattern: String,
    direction: Option<Direction>,
    priority: i32,
    correlation_id: Option<String>,
    timeout: Option<Duration>,
    responsive: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Listener {
    pub fn builder(pattern: impl Into<String>) -> ListenerBuilder {
        ListenerBuilder {
            pattern: pattern.into(),
            direction: None,
            priority: Priority::MEDIUM,
            correlation_id: None,
            timeout: None,
            responsive: false,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn filter(&self) -> PayloadFilter {
        self.filter
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_responsive(&self) -> bool {
        self.responsive
    }

    /// Подходит ли слушатель по направлению и корреляции.
    pub(crate) fn wants(
        &self,
        direction: Direction,
        packet: &Packet,
    ) -> bool {
        if self.direction.is_some_and(|d| d != direction) {
            return false;
        }
        match &self.correlation_id {
            Some(id) => id == packet.request_id(),
            None => true,
        }
    }
}

impl ListenerBuilder {
    pub fn direction(
        mut self,
        direction: Direction,
    ) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn upstream(self) -> Self {
        self.direction(Direction::Upstream)
    }

    pub fn downstream(self) -> Self {
        self.direction(Direction::Downstream)
    }

    pub fn priority(
        mut self,
        priority: i32,
    ) -> Self {
        self.priority = priority;
        self
    }

    /// Срабатывать только на ответ на пакет `request_id`; после первого
    /// срабатывания слушатель удаляется.
    pub fn listens_to(
        mut self,
        request_id: impl Into<String>,
    ) -> Self {
        self.correlation_id = Some(request_id.into());
        self
    }

    /// `Duration::ZERO` отключает таймаут.
    pub fn timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Ошибка обработчика превращается в ответ со статусом `INTERNAL`.
    pub fn responsive(
        mut self,
        responsive: bool,
    ) -> Self {
        self.responsive = responsive;
        self
    }

    /// Обработчик для нагрузки типа `T`.
    pub fn handle<T, F>(
        self,
        f: F,
    ) -> Listener
    where
        T: Any + Send + Sync,
        F: Fn(Option<&T>, &Delivery<'_>, &mut Response) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        let handler = move |delivery: &Delivery<'_>, response: &mut Response| {
            f(delivery.payload_as::<T>(), delivery, response)
        };
        self.finish(PayloadFilter::Type(PayloadType::of::<T>()), Arc::new(handler))
    }

    /// Обработчик для любой нагрузки.
    pub fn handle_any<F>(
        self,
        f: F,
    ) -> Listener
    where
        F: Fn(&Delivery<'_>, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.finish(PayloadFilter::Any, Arc::new(f))
    }

    /// Обработчик, которому нагрузка не нужна.
    pub fn handle_empty<F>(
        self,
        f: F,
    ) -> Listener
    where
        F: Fn(&Delivery<'_>, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.finish(PayloadFilter::Empty, Arc::new(f))
    }

    fn finish(
        self,
        filter: PayloadFilter,
        handler: Arc<Handler>,
    ) -> Listener {
        Listener {
            pattern: self.pattern,
            direction: self.direction,
            filter,
            priority: self.priority,
            correlation_id: self.correlation_id,
            timeout: self.timeout,
            responsive: self.responsive,
            handler,
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Listener")
            .field("pattern", &self.pattern)
            .field("direction", &self.direction)
            .field("filter", &self.filter)
            .field("priority", &self.priority)
            .field("correlation_id", &self.correlation_id)
            .field("timeout", &self.timeout)
            .field("responsive", &self.responsive)
            .finish_non_exhaustive()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
