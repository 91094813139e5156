use super::window_backend::{WindowBackend, WindowCommand};
use crate::error::DispatchError;
use crate::events::{WindowHandle, WindowInfo};
use crate::rules::{Action, ActionKind};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, info, warn};

type Handles = SmallVec<[WindowHandle; 8]>;

/// Выполнение действий правил над окнами.
///
/// `dispatch` возвращает число окон, к которым действие применилось;
/// `Ok(0)` означает, что делать было нечего.
pub struct ActionDispatcher {
    backend: Arc<dyn WindowBackend>,
    file_browser_classes: Vec<String>,
}

impl ActionDispatcher {
    pub fn new(backend: Arc<dyn WindowBackend>, file_browser_classes: Vec<String>) -> Self {
        Self {
            backend,
            file_browser_classes,
        }
    }

    pub async fn dispatch(
        &self,
        action: &Action,
        targets: &[WindowInfo],
        trigger: &WindowInfo,
    ) -> Result<usize, DispatchError> {
        debug!(
            "Действие {} для {} окон (триггер {})",
            action.kind,
            targets.len(),
            trigger.handle
        );

        match action.kind {
            ActionKind::MinimizeOthersOfSameApp => self.minimize_others_of_same_app(targets, trigger).await,
            ActionKind::CloseDuplicatePath => self.close_duplicate_path(trigger).await,
            ActionKind::BringToForeground => {
                self.apply_to(handles_of(targets), WindowCommand::BringToForeground).await
            }
            ActionKind::CloseWindow => self.apply_to(handles_of(targets), WindowCommand::Close).await,
            ActionKind::HideWindow => self.apply_to(handles_of(targets), WindowCommand::Hide).await,
        }
    }

    async fn minimize_others_of_same_app(
        &self,
        targets: &[WindowInfo],
        trigger: &WindowInfo,
    ) -> Result<usize, DispatchError> {
        let Some(app) = trigger.executable_name() else {
            return Err(DispatchError::MissingExecutablePath(trigger.handle));
        };

        let others: Handles = targets
            .iter()
            .filter(|w| w.handle != trigger.handle && w.is_visible && w.is_top_level)
            .filter(|w| w.executable_name().as_deref() == Some(app.as_str()))
            .map(|w| w.handle)
            .collect();

        let minimized = self.apply_to(others, WindowCommand::Minimize).await?;
        info!("Свёрнуто {} окон приложения {}", minimized, app);
        Ok(minimized)
    }

    async fn close_duplicate_path(&self, trigger: &WindowInfo) -> Result<usize, DispatchError> {
        if !self.is_file_browser(&trigger.class) {
            return Err(DispatchError::NotFileBrowser {
                handle: trigger.handle,
                class: trigger.class.clone(),
            });
        }

        let path = self
            .backend
            .folder_path(trigger.handle)
            .await?
            .ok_or(DispatchError::FolderPathUnavailable(trigger.handle))?;
        info!("Окно файлового менеджера {} открыто в {}", trigger.handle, path);

        let duplicates = self.browser_windows_at(&path).await?;
        if duplicates.len() <= 1 {
            debug!("Дубликатов папки {} нет", path);
            return Ok(0);
        }

        let keeper = self.choose_keeper(&duplicates, trigger.handle).await;
        let to_close: Handles = duplicates.iter().copied().filter(|h| *h != keeper).collect();
        let closed = self.apply_to(to_close, WindowCommand::Close).await?;

        if let Err(e) = self
            .backend
            .execute(keeper, WindowCommand::BringToForeground)
            .await
        {
            warn!("Не удалось активировать окно {}: {}", keeper, e);
        }

        info!("Закрыто {} дубликатов папки {} (оставлено окно {})", closed, path, keeper);
        Ok(closed)
    }

    /// Открытые окна файлового менеджера с той же папкой (без учёта регистра)
    async fn browser_windows_at(&self, path: &str) -> Result<Handles, DispatchError> {
        let wanted = path.to_lowercase();
        let mut duplicates = Handles::new();

        for summary in self.backend.enumerate_windows().await? {
            if !self.is_file_browser(&summary.class) {
                continue;
            }
            match self.backend.folder_path(summary.handle).await {
                Ok(Some(folder)) if folder.to_lowercase() == wanted => duplicates.push(summary.handle),
                Ok(_) => {}
                Err(e) => debug!("Папка окна {} недоступна: {}", summary.handle, e),
            }
        }

        Ok(duplicates)
    }

    async fn choose_keeper(&self, duplicates: &[WindowHandle], trigger: WindowHandle) -> WindowHandle {
        if duplicates.contains(&trigger) {
            return trigger;
        }

        match self.backend.foreground_window().await {
            Ok(Some(foreground)) if duplicates.contains(&foreground) => foreground,
            Ok(_) => duplicates[0],
            Err(e) => {
                debug!("Активное окно недоступно: {}", e);
                duplicates[0]
            }
        }
    }

    /// Применяет команду к каждому окну. Ошибка возвращается, только если
    /// не удалось ни одно из непустого списка.
    async fn apply_to(&self, handles: Handles, command: WindowCommand) -> Result<usize, DispatchError> {
        let mut succeeded = 0;
        let mut last_error = None;

        for handle in handles {
            match self.backend.execute(handle, command).await {
                Ok(()) => {
                    succeeded += 1;
                    debug!("{} выполнено для окна {}", command, handle);
                }
                Err(e) => {
                    warn!("{} не выполнено для окна {}: {}", command, handle, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e.into()),
            _ => Ok(succeeded),
        }
    }

    fn is_file_browser(&self, class: &str) -> bool {
        self.file_browser_classes.iter().any(|c| c == class)
    }
}

fn handles_of(targets: &[WindowInfo]) -> Handles {
    targets.iter().map(|w| w.handle).collect()
}
