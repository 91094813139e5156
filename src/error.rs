use crate::events::WindowHandle;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка разбора JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Окно {0} недоступно")]
    StaleWindow(WindowHandle),

    #[error("Неверный формат файла правил: {0}")]
    InvalidRuleFile(String),

    #[error("Команда '{command}' завершилась с ошибкой: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Планировщик уже запущен")]
    AlreadyRunning,

    #[error("Планировщик не запущен")]
    NotRunning,

    #[error("Таймаут: {0}")]
    Timeout(String),

    #[error("Сервис недоступен: {0}")]
    ServiceUnavailable(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl WardenError {
    pub fn stale_window<T>(handle: WindowHandle) -> Result<T> {
        Err(WardenError::StaleWindow(handle))
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;

/// Ошибки выполнения действия правила. Никогда не прерывают обработку события.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("у окна-триггера {0} не определён путь к исполняемому файлу")]
    MissingExecutablePath(WindowHandle),

    #[error("окно {handle} класса '{class}' не является окном файлового менеджера")]
    NotFileBrowser { handle: WindowHandle, class: String },

    #[error("не удалось определить путь к папке для окна {0}")]
    FolderPathUnavailable(WindowHandle),

    #[error("ошибка доступа к окнам: {0}")]
    Backend(#[from] WardenError),
}

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! warden_error {
    (timeout, $($arg:tt)*) => {
        $crate::error::WardenError::Timeout(format!($($arg)*))
    };
    (service_unavailable, $($arg:tt)*) => {
        $crate::error::WardenError::ServiceUnavailable(format!($($arg)*))
    };
    (invalid_rule_file, $($arg:tt)*) => {
        $crate::error::WardenError::InvalidRuleFile(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::WardenError::Internal(format!($($arg)*))
    };
}
