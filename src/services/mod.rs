pub mod action_dispatcher;
pub mod differ;
pub mod rule_engine;
pub mod scheduler;
pub mod window_backend;
pub mod window_store;

pub use action_dispatcher::ActionDispatcher;
pub use differ::{diff, Snapshot, WindowDiff};
pub use rule_engine::{RuleEngine, RuleEngineStatistics};
pub use scheduler::{PollingScheduler, SchedulerState, SchedulerStatus};
pub use window_backend::{create_window_backend, DryRunBackend, WindowBackend, WindowCommand};
pub use window_store::WindowStore;
