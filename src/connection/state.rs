use std::fmt;

use tokio::time::Instant;

/// Состояние соединения с брокером.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// Ещё ни разу не подключались
    #[default]
    Idle,
    /// Соединение исправно
    Active,
    /// Соединение потеряно или закрыто
    Inactive,
}

/// Снимок состояния соединения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Попытки переподключения с момента последней смены статуса
    pub retries: u32,
    pub last_success: Option<Instant>,
    pub last_failure: Option<Instant>,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl ConnectionState {
    /// Явная смена статуса сбрасывает счётчик попыток.
    pub(crate) fn set_status(
        &mut self,
        status: ConnectionStatus,
    ) {
        self.status = status;
        self.retries = 0;
    }

    /// Успешная операция: `ACTIVE`, счётчик сброшен.
    pub(crate) fn mark_success(
        &mut self,
        now: Instant,
    ) {
        self.retries = 0;
        self.status = ConnectionStatus::Active;
        self.last_success = Some(now);
    }

    /// Фатальная ошибка. Возвращает `true`, если статус действительно
    /// сменился на `INACTIVE`; в уже неактивном состоянии ничего не меняет.
    pub(crate) fn mark_failure(
        &mut self,
        now: Instant,
    ) -> bool {
        if self.status == ConnectionStatus::Inactive {
            return false;
        }
        self.status = ConnectionStatus::Inactive;
        self.last_failure = Some(now);
        true
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
