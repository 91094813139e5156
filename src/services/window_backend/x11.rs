use super::r#trait::{WindowBackend, WindowCommand};
use crate::config::Config;
use crate::error::{WardenError, Result};
use crate::events::{WindowHandle, WindowInfo, WindowState, WindowSummary};
use crate::trace_if_enabled;
use crate::utils::TtlCache;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

static HOME_DIR: Lazy<Option<String>> = Lazy::new(|| std::env::var("HOME").ok());

/// Управление окнами X11 через wmctrl и xdotool.
///
/// Класс окна всегда берётся из пары WM_CLASS в формате `instance.Class`
/// и разбирается одной функцией, как при перечислении, так и при запросе сведений.
///
/// Пути к исполняемым файлам (по pid) и папкам файлового менеджера (по окну и
/// заголовку) кэшируются с ограниченным временем жизни.
pub struct X11Backend {
    config: Arc<Config>,
    executable_paths: TtlCache<u32, String>,
    folder_paths: TtlCache<(WindowHandle, String), String>,
}

/// Строка вывода `wmctrl -lpx`
#[derive(Debug, Clone, PartialEq, Eq)]
struct WmctrlRow {
    handle: WindowHandle,
    class: String,
    title: String,
}

impl X11Backend {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let cache = &config.cache;
        let executable_paths =
            TtlCache::new(cache.executable_path_capacity, cache.executable_path_ttl());
        let folder_paths = TtlCache::new(cache.folder_path_capacity, cache.folder_path_ttl());

        Ok(Self {
            config,
            executable_paths,
            folder_paths,
        })
    }

    async fn run(program: &str, args: &[&str]) -> Result<String> {
        trace_if_enabled!("Запуск {} {:?}", program, args);
        let output = Command::new(program).args(args).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(WardenError::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    async fn list_rows() -> Result<Vec<WmctrlRow>> {
        let stdout = Self::run("wmctrl", &["-lpx"]).await?;
        Ok(stdout.lines().filter_map(parse_wmctrl_line).collect())
    }

    fn executable_path(&self, pid: u32) -> Option<String> {
        if let Some(path) = self.executable_paths.get(&pid) {
            return Some(path);
        }

        match std::fs::read_link(format!("/proc/{}/exe", pid)) {
            Ok(path) => {
                let path = path.to_string_lossy().into_owned();
                self.executable_paths.insert(pid, path.clone());
                Some(path)
            }
            Err(e) => {
                debug!("Не удалось получить исполняемый файл процесса {}: {}", pid, e);
                None
            }
        }
    }

    /// Класс и состояние окна за один вызов xprop
    async fn wm_properties(handle: WindowHandle) -> (String, WindowState) {
        let id = handle.value().to_string();
        match Self::run("xprop", &["-id", &id, "WM_CLASS", "_NET_WM_STATE"]).await {
            Ok(stdout) => {
                let class = parse_wm_class(&stdout)
                    .map(|column| class_from_wm_class_column(&column))
                    .unwrap_or_default();
                (class, parse_net_wm_state(&stdout))
            }
            Err(e) => {
                debug!("xprop недоступен для окна {}: {}", handle, e);
                (String::new(), WindowState::Normal)
            }
        }
    }

    /// Папка по заголовку; смена заголовка даёт новый ключ кэша
    fn folder_for_title(&self, handle: WindowHandle, title: &str, home: Option<&str>) -> Option<String> {
        let key = (handle, title.to_string());
        if let Some(path) = self.folder_paths.get(&key) {
            return Some(path);
        }

        let path = folder_from_title(title, home)?;
        self.folder_paths.insert(key, path.clone());
        Some(path)
    }

    fn is_file_browser(&self, class: &str) -> bool {
        self.config
            .windows
            .file_browser_classes
            .iter()
            .any(|c| c == class)
    }
}

#[async_trait::async_trait]
impl WindowBackend for X11Backend {
    async fn enumerate_windows(&self) -> Result<Vec<WindowSummary>> {
        let rows = Self::list_rows().await?;
        Ok(rows
            .into_iter()
            .filter(|row| !row.title.is_empty() && !self.config.is_ignored_class(&row.class))
            .map(|row| WindowSummary::new(row.handle, row.title, row.class))
            .collect())
    }

    async fn window_info(&self, handle: WindowHandle) -> Result<WindowInfo> {
        let id = handle.value().to_string();
        // getwindowname падает для несуществующего окна
        let title = Self::run("xdotool", &["getwindowname", &id]).await?;
        let pid = Self::run("xdotool", &["getwindowpid", &id])
            .await
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok());

        let (class, state) = Self::wm_properties(handle).await;

        let mut info = WindowInfo::new(handle, title)
            .with_class(class)
            .with_state(state);
        if let Some(pid) = pid {
            info.owner_process_id = Some(pid);
            info.executable_path = self.executable_path(pid);
        }
        Ok(info)
    }

    async fn folder_path(&self, handle: WindowHandle) -> Result<Option<String>> {
        let id = handle.value().to_string();
        // Заголовок читается всегда: окно могло перейти в другую папку
        let title = Self::run("xdotool", &["getwindowname", &id]).await?;
        let (class, _) = Self::wm_properties(handle).await;
        if !self.is_file_browser(&class) {
            return Ok(None);
        }

        Ok(self.folder_for_title(handle, &title, HOME_DIR.as_deref()))
    }

    async fn foreground_window(&self) -> Result<Option<WindowHandle>> {
        match Self::run("xdotool", &["getactivewindow"]).await {
            Ok(stdout) => Ok(stdout.trim().parse::<u64>().ok().map(WindowHandle)),
            // Нет активного окна (например, пустой рабочий стол)
            Err(WardenError::CommandFailed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, handle: WindowHandle, command: WindowCommand) -> Result<()> {
        let id = handle.value().to_string();
        let hex = handle.to_string();
        match command {
            WindowCommand::Minimize => Self::run("xdotool", &["windowminimize", &id]).await?,
            WindowCommand::Maximize => {
                Self::run("wmctrl", &["-i", "-r", &hex, "-b", "add,maximized_vert,maximized_horz"]).await?
            }
            WindowCommand::Restore => {
                Self::run("wmctrl", &["-i", "-r", &hex, "-b", "remove,maximized_vert,maximized_horz"]).await?;
                Self::run("xdotool", &["windowmap", &id]).await?
            }
            WindowCommand::Close => Self::run("wmctrl", &["-i", "-c", &hex]).await?,
            WindowCommand::Hide => Self::run("xdotool", &["windowunmap", &id]).await?,
            WindowCommand::Show => Self::run("xdotool", &["windowmap", &id]).await?,
            WindowCommand::BringToForeground => Self::run("wmctrl", &["-i", "-a", &hex]).await?,
        };

        debug!("{} выполнено для окна {}", command, handle);
        Ok(())
    }
}

/// Пропускает `count` полей, разделённых пробелами, и возвращает их вместе с остатком строки
fn split_fields(line: &str, count: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(count);
    let mut rest = line.trim_start();
    for _ in 0..count {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    Some((fields, rest))
}

/// `0x03a00003  0 2044   gnome-terminal-server.Gnome-terminal  host  Title with spaces`
fn parse_wmctrl_line(line: &str) -> Option<WmctrlRow> {
    let (fields, title) = split_fields(line, 5)?;
    let handle = u64::from_str_radix(fields[0].trim_start_matches("0x"), 16).ok()?;
    // Рабочий стол (-1 для закреплённых окон) и pid только проверяются на формат
    fields[1].parse::<i32>().ok()?;
    fields[2].parse::<u32>().ok()?;
    let class = class_from_wm_class_column(fields[3]);

    Some(WmctrlRow {
        handle: WindowHandle(handle),
        class,
        title: title.trim_end().to_string(),
    })
}

/// Класс из `instance.Class`. Обе части могут содержать точки (`org.gnome.Nautilus`):
/// если строка делится посередине на две одинаковые без учёта регистра части,
/// берётся вторая, иначе последний сегмент.
fn class_from_wm_class_column(column: &str) -> String {
    let mid = column.len() / 2;
    if column.len() % 2 == 1 && column.get(mid..mid + 1) == Some(".") {
        let (instance, class) = (&column[..mid], &column[mid + 1..]);
        if instance.eq_ignore_ascii_case(class) {
            return class.to_string();
        }
    }
    column
        .rsplit_once('.')
        .map(|(_, class)| class)
        .unwrap_or(column)
        .to_string()
}

/// `WM_CLASS(STRING) = "org.gnome.Nautilus", "Org.gnome.Nautilus"` -> `org.gnome.Nautilus.Org.gnome.Nautilus`
fn parse_wm_class(stdout: &str) -> Option<String> {
    let line = stdout.lines().find(|line| line.starts_with("WM_CLASS"))?;
    let (_, values) = line.split_once('=')?;
    let mut parts = values.split(',').map(|part| part.trim().trim_matches('"'));
    let instance = parts.next()?;
    let class = parts.next()?;
    Some(format!("{}.{}", instance, class))
}

fn parse_net_wm_state(stdout: &str) -> WindowState {
    if stdout.contains("_NET_WM_STATE_HIDDEN") {
        WindowState::Minimized
    } else if stdout.contains("_NET_WM_STATE_MAXIMIZED_VERT")
        && stdout.contains("_NET_WM_STATE_MAXIMIZED_HORZ")
    {
        WindowState::Maximized
    } else {
        WindowState::Normal
    }
}

/// Файловые менеджеры X11 показывают путь в заголовке (`/home/user/docs - File Manager`)
fn folder_from_title(title: &str, home: Option<&str>) -> Option<String> {
    let candidate = title.split(" - ").next()?.trim();
    if candidate.starts_with('/') {
        let trimmed = candidate.trim_end_matches('/');
        return Some(if trimmed.is_empty() { "/" } else { trimmed }.to_string());
    }
    match (candidate.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            Some(format!("{}{}", home.trim_end_matches('/'), rest.trim_end_matches('/')))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wmctrl_rows() {
        let row = parse_wmctrl_line(
            "0x03a00003  0 2044   gnome-terminal-server.Gnome-terminal  host  user@host: ~/src  - vim",
        )
        .unwrap();
        assert_eq!(row.handle, WindowHandle(0x03a00003));
        assert_eq!(row.class, "Gnome-terminal");
        assert_eq!(row.title, "user@host: ~/src  - vim");
    }

    #[test]
    fn parses_sticky_window_without_pid_or_title() {
        let row = parse_wmctrl_line("0x01000007 -1 0      plasmashell.Plasmashell  host").unwrap();
        assert_eq!(row.class, "Plasmashell");
        assert_eq!(row.title, "");

        assert!(parse_wmctrl_line("garbage").is_none());
        assert!(parse_wmctrl_line("").is_none());
    }

    #[test]
    fn parses_window_state() {
        assert_eq!(
            parse_net_wm_state("_NET_WM_STATE(ATOM) = _NET_WM_STATE_HIDDEN"),
            WindowState::Minimized
        );
        assert_eq!(
            parse_net_wm_state(
                "_NET_WM_STATE(ATOM) = _NET_WM_STATE_MAXIMIZED_VERT, _NET_WM_STATE_MAXIMIZED_HORZ"
            ),
            WindowState::Maximized
        );
        assert_eq!(parse_net_wm_state("_NET_WM_STATE(ATOM) ="), WindowState::Normal);
    }

    #[test]
    fn derives_folder_from_title() {
        assert_eq!(
            folder_from_title("/home/user/docs - File Manager", None).as_deref(),
            Some("/home/user/docs")
        );
        assert_eq!(folder_from_title("/", None).as_deref(), Some("/"));
        assert_eq!(
            folder_from_title("~/Music - Thunar", Some("/home/user")).as_deref(),
            Some("/home/user/Music")
        );
        assert_eq!(folder_from_title("~", Some("/home/user/")).as_deref(), Some("/home/user"));
        assert_eq!(folder_from_title("Documents - Files", Some("/home/user")), None);
    }

    #[test]
    fn parses_class_with_dotted_instance() {
        let row = parse_wmctrl_line(
            "0x02400004  0 3121   org.gnome.Nautilus.Org.gnome.Nautilus  host  /home/u - Files",
        )
        .unwrap();
        assert_eq!(row.class, "Org.gnome.Nautilus");
        assert_eq!(row.title, "/home/u - Files");

        assert_eq!(class_from_wm_class_column("Navigator.firefox"), "firefox");
        assert_eq!(class_from_wm_class_column("a.b.Thunar"), "Thunar");
        assert_eq!(class_from_wm_class_column("Plain"), "Plain");
    }

    #[test]
    fn xprop_and_wmctrl_agree_on_class() {
        let stdout = "WM_CLASS(STRING) = \"org.gnome.Nautilus\", \"Org.gnome.Nautilus\"\n\
                      _NET_WM_STATE(ATOM) = _NET_WM_STATE_HIDDEN";
        let column = parse_wm_class(stdout).unwrap();
        assert_eq!(column, "org.gnome.Nautilus.Org.gnome.Nautilus");

        let row = parse_wmctrl_line(&format!("0x1  0 1  {}  host  Files", column)).unwrap();
        assert_eq!(class_from_wm_class_column(&column), row.class);
        assert_eq!(parse_net_wm_state(stdout), WindowState::Minimized);

        assert!(parse_wm_class("WM_CLASS:  not found.").is_none());
    }

    #[test]
    fn folder_follows_title_change() {
        let backend = X11Backend::new(Arc::new(Config::default())).unwrap();
        let handle = WindowHandle(0x42);

        assert_eq!(backend.folder_for_title(handle, "/a - Files", None).as_deref(), Some("/a"));
        // Окно перешло в другую папку: старая запись кэша не используется
        assert_eq!(backend.folder_for_title(handle, "/b - Files", None).as_deref(), Some("/b"));
        assert_eq!(backend.folder_for_title(handle, "/a - Files", None).as_deref(), Some("/a"));
        assert_eq!(backend.folder_for_title(handle, "Recent - Files", None), None);
    }
}
