use serde::{Deserialize, Serialize};
use std::fmt;

/// Непрозрачный идентификатор окна, уникальный пока окно существует
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(pub u64);

impl WindowHandle {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Состояние окна
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowState {
    #[default]
    Normal,
    Minimized,
    Maximized,
    Hidden,
}

/// Информация об окне
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
    pub class: String,
    pub owner_process_id: Option<u32>,
    pub executable_path: Option<String>,
    pub is_visible: bool,
    pub is_top_level: bool,
    pub window_state: WindowState,
}

impl WindowInfo {
    pub fn new(handle: WindowHandle, title: impl Into<String>) -> Self {
        Self {
            handle,
            title: title.into(),
            class: String::new(),
            owner_process_id: None,
            executable_path: None,
            is_visible: true,
            is_top_level: true,
            window_state: WindowState::Normal,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.owner_process_id = Some(pid);
        self
    }

    pub fn with_executable(mut self, path: impl Into<String>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    pub fn with_visibility(mut self, is_visible: bool) -> Self {
        self.is_visible = is_visible;
        self
    }

    pub fn with_state(mut self, state: WindowState) -> Self {
        self.window_state = state;
        self
    }

    /// Минимальная информация об исчезнувшем окне: известны только заголовок и класс.
    pub fn gone(handle: WindowHandle, title: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            handle,
            title: title.into(),
            class: class.into(),
            owner_process_id: None,
            executable_path: None,
            is_visible: false,
            is_top_level: false,
            window_state: WindowState::Normal,
        }
    }

    /// Имя исполняемого файла в нижнем регистре (`C:\Windows\notepad.exe` -> `notepad.exe`)
    pub fn executable_name(&self) -> Option<String> {
        self.executable_path
            .as_deref()
            .map(executable_base_name)
            .filter(|name| !name.is_empty())
            .map(str::to_lowercase)
    }

    /// Слияние при смене заголовка: неизвестные pid и путь не затирают уже известные.
    pub fn merge_from(&mut self, update: &WindowInfo) {
        self.title.clone_from(&update.title);
        self.class.clone_from(&update.class);
        if update.owner_process_id.is_some() {
            self.owner_process_id = update.owner_process_id;
        }
        if update.executable_path.is_some() {
            self.executable_path.clone_from(&update.executable_path);
        }
        self.is_visible = update.is_visible;
        self.is_top_level = update.is_top_level;
        self.window_state = update.window_state;
    }
}

/// Последний компонент пути; разделителями считаются и `/`, и `\`.
pub fn executable_base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

impl fmt::Display for WindowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class.is_empty() {
            write!(f, "\"{}\" [{}]", self.title, self.handle)
        } else {
            write!(f, "\"{}\" ({}) [{}]", self.title, self.class, self.handle)
        }
    }
}

/// Элемент перечисления окон: только поля, нужные для сравнения снимков
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSummary {
    pub handle: WindowHandle,
    pub title: String,
    pub class: String,
}

impl WindowSummary {
    pub fn new(handle: WindowHandle, title: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            handle,
            title: title.into(),
            class: class.into(),
        }
    }
}

/// Тип события окна
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "CREATE")]
    Created,
    #[serde(rename = "DESTROY")]
    Destroyed,
    #[serde(rename = "SHOW")]
    Shown,
    #[serde(rename = "HIDE")]
    Hidden,
    #[serde(rename = "NAMECHANGE")]
    NameChanged,
    #[serde(rename = "FOREGROUND")]
    Foreground,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Created => "CREATE",
            EventKind::Destroyed => "DESTROY",
            EventKind::Shown => "SHOW",
            EventKind::Hidden => "HIDE",
            EventKind::NameChanged => "NAMECHANGE",
            EventKind::Foreground => "FOREGROUND",
        };
        f.write_str(name)
    }
}

/// Событие жизненного цикла окна
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEvent {
    pub kind: EventKind,
    pub window: WindowInfo,
    pub timestamp: std::time::Instant,
}

impl WindowEvent {
    pub fn new(kind: EventKind, window: WindowInfo) -> Self {
        Self {
            kind,
            window,
            timestamp: std::time::Instant::now(),
        }
    }

    pub fn handle(&self) -> WindowHandle {
        self.window.handle
    }

    pub fn created(window: WindowInfo) -> Self {
        Self::new(EventKind::Created, window)
    }

    pub fn destroyed(window: WindowInfo) -> Self {
        Self::new(EventKind::Destroyed, window)
    }

    pub fn name_changed(window: WindowInfo) -> Self {
        Self::new(EventKind::NameChanged, window)
    }

    pub fn foreground(window: WindowInfo) -> Self {
        Self::new(EventKind::Foreground, window)
    }
}

impl fmt::Display for WindowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}ms ago)",
            self.kind,
            self.window,
            self.timestamp.elapsed().as_millis()
        )
    }
}
