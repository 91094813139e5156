use super::r#trait::{WindowBackend, WindowCommand};
use crate::error::{WardenError, Result};
use crate::events::{WindowHandle, WindowInfo, WindowState, WindowSummary};
use crate::warden_error;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Окна, которые эмулирует демонстрационный режим: (заголовок, класс, исполняемый файл, папка)
const DEMO_WINDOWS: [(&str, &str, &str, Option<&str>); 5] = [
    ("Terminal - dry_run", "DryRunTerminal", "/usr/bin/dry-terminal", None),
    ("Documents - dry_run", "CabinetWClass", r"C:\Windows\explorer.exe", Some(r"C:\Users\demo\Documents")),
    ("Editor - dry_run", "DryRunEditor", "/usr/bin/dry-editor", None),
    ("Documents - dry_run", "CabinetWClass", r"C:\Windows\explorer.exe", Some(r"C:\Users\demo\Documents")),
    ("Editor - dry_run", "DryRunEditor", "/usr/bin/dry-editor", None),
];
const DEMO_TICKS_PER_STEP: u64 = 3;
const DEMO_MAX_WINDOWS: usize = 4;

#[derive(Debug, Clone)]
struct SimulatedWindow {
    info: WindowInfo,
    folder: Option<String>,
}

#[derive(Debug, Default)]
struct Desktop {
    windows: BTreeMap<WindowHandle, SimulatedWindow>,
    foreground: Option<WindowHandle>,
    failing: HashSet<WindowHandle>,
    failing_enumerations: u32,
    commands: Vec<(WindowHandle, WindowCommand)>,
    demo: Option<DemoScript>,
}

#[derive(Debug, Default)]
struct DemoScript {
    tick: u64,
    step: usize,
    next_handle: u64,
}

/// Рабочий стол в памяти: режим сухого запуска и подставной бэкенд для тестов.
///
/// Каждая команда записывается в журнал (`commands`) и применяется к
/// эмулируемым окнам, так что следующий снимок видит её результат.
#[derive(Debug, Default)]
pub struct DryRunBackend {
    desktop: Mutex<Desktop>,
}

impl DryRunBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Рабочий стол, на котором окна периодически открываются и закрываются сами
    pub fn demo() -> Self {
        let backend = Self::new();
        backend.desktop.lock().demo = Some(DemoScript {
            next_handle: 0x1000,
            ..DemoScript::default()
        });
        backend
    }

    pub fn open_window(&self, info: WindowInfo) {
        self.insert(info, None);
    }

    pub fn open_folder_window(&self, info: WindowInfo, folder: impl Into<String>) {
        self.insert(info, Some(folder.into()));
    }

    fn insert(&self, info: WindowInfo, folder: Option<String>) {
        let mut desktop = self.desktop.lock();
        desktop.windows.insert(info.handle, SimulatedWindow { info, folder });
    }

    /// Окно закрыто пользователем, а не через команду
    pub fn remove_window(&self, handle: WindowHandle) {
        let mut desktop = self.desktop.lock();
        desktop.windows.remove(&handle);
        if desktop.foreground == Some(handle) {
            desktop.foreground = None;
        }
    }

    pub fn rename_window(&self, handle: WindowHandle, title: impl Into<String>) {
        if let Some(window) = self.desktop.lock().windows.get_mut(&handle) {
            window.info.title = title.into();
        }
    }

    pub fn set_foreground(&self, handle: Option<WindowHandle>) {
        self.desktop.lock().foreground = handle;
    }

    /// Все команды для окна будут завершаться ошибкой
    pub fn fail_commands_for(&self, handle: WindowHandle) {
        self.desktop.lock().failing.insert(handle);
    }

    /// Следующие `count` перечислений окон завершатся ошибкой
    pub fn fail_next_enumerations(&self, count: u32) {
        self.desktop.lock().failing_enumerations = count;
    }

    pub fn commands(&self) -> Vec<(WindowHandle, WindowCommand)> {
        self.desktop.lock().commands.clone()
    }

    pub fn window(&self, handle: WindowHandle) -> Option<WindowInfo> {
        self.desktop.lock().windows.get(&handle).map(|w| w.info.clone())
    }
}

impl Desktop {
    fn advance_demo(&mut self) {
        let Some(demo) = self.demo.as_mut() else {
            return;
        };

        demo.tick += 1;
        if demo.tick % DEMO_TICKS_PER_STEP != 0 {
            return;
        }

        let (title, class, exe, folder) = DEMO_WINDOWS[demo.step % DEMO_WINDOWS.len()];
        demo.step += 1;
        let handle = WindowHandle(demo.next_handle);
        demo.next_handle += 1;

        info!("Dry-run: эмулируем открытие окна \"{}\" [{}]", title, handle);
        let info = WindowInfo::new(handle, title)
            .with_class(class)
            .with_pid(1000 + handle.value() as u32 % 1000)
            .with_executable(exe);
        self.windows.insert(
            handle,
            SimulatedWindow {
                info,
                folder: folder.map(str::to_string),
            },
        );
        self.foreground = Some(handle);

        if self.windows.len() > DEMO_MAX_WINDOWS {
            if let Some(oldest) = self.windows.keys().next().copied() {
                info!("Dry-run: эмулируем закрытие окна [{}]", oldest);
                self.windows.remove(&oldest);
            }
        }
    }

    fn apply(&mut self, handle: WindowHandle, command: WindowCommand) -> Result<()> {
        if self.failing.contains(&handle) {
            return Err(WardenError::Internal(format!(
                "команда {} для окна {} отклонена",
                command, handle
            )));
        }

        let window = match self.windows.get_mut(&handle) {
            Some(window) => &mut window.info,
            None => return WardenError::stale_window(handle),
        };

        match command {
            WindowCommand::Minimize => window.window_state = WindowState::Minimized,
            WindowCommand::Maximize => window.window_state = WindowState::Maximized,
            WindowCommand::Restore => window.window_state = WindowState::Normal,
            WindowCommand::Hide => {
                window.is_visible = false;
                window.window_state = WindowState::Hidden;
            }
            WindowCommand::Show => {
                window.is_visible = true;
                window.window_state = WindowState::Normal;
            }
            WindowCommand::BringToForeground => {
                if window.window_state == WindowState::Minimized {
                    window.window_state = WindowState::Normal;
                }
                self.foreground = Some(handle);
            }
            WindowCommand::Close => {
                self.windows.remove(&handle);
                if self.foreground == Some(handle) {
                    self.foreground = None;
                }
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl WindowBackend for DryRunBackend {
    async fn enumerate_windows(&self) -> Result<Vec<WindowSummary>> {
        let mut desktop = self.desktop.lock();
        if desktop.failing_enumerations > 0 {
            desktop.failing_enumerations -= 1;
            return Err(warden_error!(
                service_unavailable,
                "эмулируемый сбой перечисления окон (осталось {})",
                desktop.failing_enumerations
            ));
        }

        desktop.advance_demo();

        Ok(desktop
            .windows
            .values()
            .map(|w| &w.info)
            .filter(|info| info.is_visible && info.is_top_level && !info.title.is_empty())
            .map(|info| WindowSummary::new(info.handle, info.title.clone(), info.class.clone()))
            .collect())
    }

    async fn window_info(&self, handle: WindowHandle) -> Result<WindowInfo> {
        match self.desktop.lock().windows.get(&handle) {
            Some(window) => Ok(window.info.clone()),
            None => WardenError::stale_window(handle),
        }
    }

    async fn folder_path(&self, handle: WindowHandle) -> Result<Option<String>> {
        match self.desktop.lock().windows.get(&handle) {
            Some(window) => Ok(window.folder.clone()),
            None => WardenError::stale_window(handle),
        }
    }

    async fn foreground_window(&self) -> Result<Option<WindowHandle>> {
        let desktop = self.desktop.lock();
        Ok(desktop.foreground.filter(|h| desktop.windows.contains_key(h)))
    }

    async fn execute(&self, handle: WindowHandle, command: WindowCommand) -> Result<()> {
        let mut desktop = self.desktop.lock();
        desktop.commands.push((handle, command));
        info!("[DRY RUN] {} для окна {}", command, handle);
        desktop.apply(handle, command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enumeration_lists_only_visible_titled_windows() {
        let backend = DryRunBackend::new();
        backend.open_window(WindowInfo::new(WindowHandle(1), "Shown").with_class("A"));
        backend.open_window(WindowInfo::new(WindowHandle(2), "Hidden").with_visibility(false));
        backend.open_window(WindowInfo::new(WindowHandle(3), ""));

        let windows = backend.enumerate_windows().await.unwrap();
        assert_eq!(windows, vec![WindowSummary::new(WindowHandle(1), "Shown", "A")]);
    }

    #[tokio::test]
    async fn commands_are_recorded_and_applied() {
        let backend = DryRunBackend::new();
        backend.open_window(WindowInfo::new(WindowHandle(1), "One"));
        backend.open_window(WindowInfo::new(WindowHandle(2), "Two"));

        backend.execute(WindowHandle(1), WindowCommand::Minimize).await.unwrap();
        backend.execute(WindowHandle(2), WindowCommand::Close).await.unwrap();
        assert!(backend.execute(WindowHandle(2), WindowCommand::Close).await.is_err());

        assert_eq!(
            backend.window(WindowHandle(1)).unwrap().window_state,
            WindowState::Minimized
        );
        assert!(backend.window(WindowHandle(2)).is_none());
        assert_eq!(backend.commands().len(), 3);

        backend.execute(WindowHandle(1), WindowCommand::BringToForeground).await.unwrap();
        assert_eq!(backend.foreground_window().await.unwrap(), Some(WindowHandle(1)));
        assert_eq!(
            backend.window(WindowHandle(1)).unwrap().window_state,
            WindowState::Normal
        );
    }

    #[tokio::test]
    async fn stale_handle_lookups_fail() {
        let backend = DryRunBackend::new();
        assert!(matches!(
            backend.window_info(WindowHandle(9)).await,
            Err(WardenError::StaleWindow(WindowHandle(9)))
        ));
        assert!(backend.folder_path(WindowHandle(9)).await.is_err());
    }

    #[tokio::test]
    async fn demo_script_opens_windows_over_time() {
        let backend = DryRunBackend::demo();
        let mut seen = 0;
        for _ in 0..(DEMO_TICKS_PER_STEP * 8) {
            let windows = backend.enumerate_windows().await.unwrap();
            assert!(windows.len() <= DEMO_MAX_WINDOWS);
            seen = seen.max(windows.len());
        }
        assert_eq!(seen, DEMO_MAX_WINDOWS);
    }
}
