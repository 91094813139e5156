pub mod window;

pub use window::{
    executable_base_name, EventKind, WindowEvent, WindowHandle, WindowInfo, WindowState,
    WindowSummary,
};
