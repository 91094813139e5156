//! Window backend: responsibility and boundaries
//!
//! This module and its submodules are responsible ONLY for querying and
//! commanding top-level windows (enumeration, details, folder paths, foreground,
//! minimize/close/raise/...). They MUST NOT contain rule logic or keep window
//! lifecycle state; both belong to the RuleEngine. Caches kept here only avoid
//! repeated expensive system lookups.

mod dry_run;
mod x11;
mod r#trait;

pub use self::dry_run::DryRunBackend;
pub use self::r#trait::{create_window_backend, WindowBackend, WindowCommand};
pub use self::x11::X11Backend;
