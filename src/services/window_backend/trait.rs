use super::dry_run::DryRunBackend;
use super::x11::X11Backend;
use crate::config::Config;
use crate::error::Result;
use crate::events::{WindowHandle, WindowInfo, WindowSummary};
use std::fmt;
use std::sync::Arc;

/// Команда управления окном
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowCommand {
    Minimize,
    Maximize,
    Restore,
    Close,
    Hide,
    Show,
    BringToForeground,
}

impl fmt::Display for WindowCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Access to the desktop's top-level windows.
///
/// Implementations must be cheap to call from the polling loop: enumeration
/// returns only the fields needed for snapshot diffing, full details are
/// fetched per handle on demand.
#[async_trait::async_trait]
pub trait WindowBackend: Send + Sync {
    /// Visible, parentless windows that have a title
    async fn enumerate_windows(&self) -> Result<Vec<WindowSummary>>;

    /// Full details; fails for a handle that no longer exists
    async fn window_info(&self, handle: WindowHandle) -> Result<WindowInfo>;

    /// Folder shown by a file-browser window, `None` for other windows
    async fn folder_path(&self, handle: WindowHandle) -> Result<Option<String>>;

    async fn foreground_window(&self) -> Result<Option<WindowHandle>>;

    async fn execute(&self, handle: WindowHandle, command: WindowCommand) -> Result<()>;
}

/// Factory function to create a window backend based on the configuration and the dry_run flag
pub fn create_window_backend(
    config: Arc<Config>,
    dry_run: bool,
) -> Result<Arc<dyn WindowBackend>> {
    if dry_run || config.windows.backend == "dry-run" {
        Ok(Arc::new(DryRunBackend::demo()))
    } else {
        Ok(Arc::new(X11Backend::new(config)?))
    }
}
