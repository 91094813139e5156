use crate::error::{WardenError, Result};
use std::path::Path;
use tracing::{info, warn};

/// Утилиты, через которые X11-бэкенд управляет окнами
pub const REQUIRED_TOOLS: [&str; 2] = ["wmctrl", "xdotool"];

/// Проверить, что окружение позволяет управлять окнами через X11
pub fn check_environment() -> Result<()> {
    info!("Проверка окружения...");

    check_display()?;
    check_tools()?;
    check_session_type();

    info!("Проверка окружения завершена успешно");
    Ok(())
}

fn check_display() -> Result<()> {
    check_display_value(std::env::var("DISPLAY").ok().as_deref())
}

fn check_display_value(value: Option<&str>) -> Result<()> {
    match value {
        Some(name) if !name.is_empty() => {
            info!("Используется дисплей {}", name);
            Ok(())
        }
        _ => Err(WardenError::ServiceUnavailable(
            "Переменная DISPLAY не задана: X11-сервер недоступен".to_string(),
        )),
    }
}

fn check_tools() -> Result<()> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    let missing: Vec<&str> = REQUIRED_TOOLS
        .iter()
        .copied()
        .filter(|tool| !is_in_path(tool, &path_var))
        .collect();

    if missing.is_empty() {
        info!("Найдены утилиты: {}", REQUIRED_TOOLS.join(", "));
        Ok(())
    } else {
        Err(WardenError::ServiceUnavailable(format!(
            "Не найдены утилиты: {}. Установите их: {}",
            missing.join(", "),
            get_setup_commands().join("; ")
        )))
    }
}

fn is_in_path(tool: &str, path_var: &std::ffi::OsStr) -> bool {
    std::env::split_paths(path_var).any(|dir| Path::new(&dir).join(tool).is_file())
}

fn check_session_type() {
    match std::env::var("XDG_SESSION_TYPE") {
        Ok(session) if session == "wayland" => {
            warn!("⚠️  Сессия Wayland: управление доступно только для окон XWayland");
        }
        Ok(session) => {
            info!("Тип сессии: {}", session);
        }
        Err(_) => {
            warn!("Не удалось определить тип сессии");
        }
    }
}

/// Получить рекомендуемые команды для установки необходимых утилит
pub fn get_setup_commands() -> Vec<String> {
    vec![
        "sudo apt install wmctrl xdotool".to_string(),
        "sudo dnf install wmctrl xdotool".to_string(),
        "sudo pacman -S wmctrl xdotool".to_string(),
    ]
}
