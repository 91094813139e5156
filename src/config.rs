use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Допустимый диапазон интервала опроса, секунды
pub const MIN_POLLING_INTERVAL_SECS: f64 = 0.1;
pub const MAX_POLLING_INTERVAL_SECS: f64 = 60.0;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub polling: PollingConfig,
    pub windows: WindowsConfig,
    pub rules: RulesConfig,
    pub cache: CacheConfig,
    // Индекс для O(1) проверки классов - не сериализуется, строится после загрузки
    #[serde(skip)]
    ignored_class_set: HashSet<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    /// Как часто (в обработанных событиях) писать строку состояния; 0 - никогда
    pub status_every_events: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    pub interval_secs: f64,
    pub error_backoff_secs: f64,
    pub stop_timeout_secs: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowsConfig {
    pub backend: String,
    /// Системные окна (панель задач, меню пуск и т.п.), которые не отслеживаются
    pub ignored_classes: Vec<String>,
    /// Классы окон файлового менеджера для CLOSE_DUPLICATE_PATH
    pub file_browser_classes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RulesConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub executable_path_capacity: usize,
    pub executable_path_ttl_secs: u64,
    pub folder_path_capacity: usize,
    pub folder_path_ttl_secs: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(clamp_interval_secs(self.interval_secs))
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.error_backoff_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.stop_timeout_secs)
    }
}

impl CacheConfig {
    pub fn executable_path_ttl(&self) -> Duration {
        Duration::from_secs(self.executable_path_ttl_secs)
    }

    pub fn folder_path_ttl(&self) -> Duration {
        Duration::from_secs(self.folder_path_ttl_secs)
    }
}

/// Приводит интервал к [0.1, 60.0]; NaN считается минимальным значением.
pub fn clamp_interval_secs(secs: f64) -> f64 {
    if secs.is_nan() {
        return MIN_POLLING_INTERVAL_SECS;
    }
    secs.clamp(MIN_POLLING_INTERVAL_SECS, MAX_POLLING_INTERVAL_SECS)
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "compact".to_string(),
                status_every_events: 50,
            },
            polling: PollingConfig {
                interval_secs: 3.0,
                error_backoff_secs: 5.0,
                stop_timeout_secs: 5.0,
            },
            windows: WindowsConfig {
                backend: "x11".to_string(),
                ignored_classes: [
                    "Shell_TrayWnd",
                    "Shell_SecondaryTrayWnd",
                    "NotifyIconOverflowWindow",
                    "Windows.UI.Core.CoreWindow",
                    "ApplicationFrameWindow",
                    "ImmersiveLauncher",
                    "SearchUI",
                    "Shell_CharmWindow",
                    "MultitaskingViewFrame",
                    "Shell_AppWnd",
                    "Desktop",
                    "Plasmashell",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                file_browser_classes: [
                    "CabinetWClass",
                    "Org.gnome.Nautilus",
                    "Nautilus",
                    "Thunar",
                    "dolphin",
                    "Nemo",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            },
            rules: RulesConfig {
                path: PathBuf::from("rules.json"),
            },
            cache: CacheConfig {
                executable_path_capacity: 200,
                executable_path_ttl_secs: 600,
                folder_path_capacity: 100,
                folder_path_ttl_secs: 300,
            },
            ignored_class_set: HashSet::new(),
        };
        config.build_optimization_indexes();
        config
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        // Файл необязателен: отсутствующие ключи берутся из значений по умолчанию
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("WINWARDEN_").split("__"));

        let mut config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;
        config.build_optimization_indexes();

        Ok(config)
    }

    /// Строит индекс игнорируемых классов окон
    pub fn build_optimization_indexes(&mut self) {
        self.ignored_class_set = self.windows.ignored_classes.iter().cloned().collect();
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "compact" | "full" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        match self.windows.backend.as_str() {
            "x11" | "dry-run" => {}
            _ => anyhow::bail!("Неверный источник окон: {}", self.windows.backend),
        }

        let polling = &self.polling;
        if !(MIN_POLLING_INTERVAL_SECS..=MAX_POLLING_INTERVAL_SECS).contains(&polling.interval_secs) {
            anyhow::bail!(
                "polling.interval_secs должно быть в диапазоне [{}, {}], получено {}",
                MIN_POLLING_INTERVAL_SECS,
                MAX_POLLING_INTERVAL_SECS,
                polling.interval_secs
            );
        }
        if !(polling.error_backoff_secs.is_finite() && polling.error_backoff_secs > 0.0) {
            anyhow::bail!("polling.error_backoff_secs должно быть больше 0");
        }
        if !(polling.stop_timeout_secs.is_finite() && polling.stop_timeout_secs > 0.0) {
            anyhow::bail!("polling.stop_timeout_secs должно быть больше 0");
        }

        if self.cache.executable_path_capacity == 0 || self.cache.folder_path_capacity == 0 {
            anyhow::bail!("Размер кэша должен быть больше 0");
        }

        if self.rules.path.as_os_str().is_empty() {
            anyhow::bail!("Не задан путь к файлу правил");
        }

        Ok(())
    }

    /// Системное окно, которое не отслеживается
    pub fn is_ignored_class(&self, class: &str) -> bool {
        self.ignored_class_set.contains(class)
    }
}
