use super::action_dispatcher::ActionDispatcher;
use super::window_backend::WindowBackend;
use super::window_store::WindowStore;
use crate::config::Config;
use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::{WindowEvent, WindowHandle, WindowInfo};
use crate::rules::{enabled_by_priority, Rule};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Снимок статистики движка правил
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleEngineStatistics {
    pub total_events_processed: u64,
    pub current_windows_tracked: usize,
    pub rule_execution_counts: BTreeMap<String, u64>,
    pub enabled_rules: usize,
    pub dispatch_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    total_events_processed: u64,
    rule_execution_counts: HashMap<String, u64>,
    dispatch_failures: u64,
}

/// Движок правил: владеет состоянием окон и статистикой, сопоставляет
/// события с правилами и передаёт совпавшие действия диспетчеру.
pub struct RuleEngine {
    config: Arc<Config>,
    backend: Arc<dyn WindowBackend>,
    dispatcher: ActionDispatcher,
    store: WindowStore,
    rules: RwLock<Vec<Rule>>,
    counters: Mutex<Counters>,
}

impl RuleEngine {
    pub fn new(config: Arc<Config>, backend: Arc<dyn WindowBackend>, rules: Vec<Rule>) -> Self {
        let dispatcher = ActionDispatcher::new(
            backend.clone(),
            config.windows.file_browser_classes.clone(),
        );
        info!(
            "Движок правил инициализирован: {} правил ({} включено)",
            rules.len(),
            rules.iter().filter(|r| r.enabled).count()
        );

        Self {
            config,
            backend,
            dispatcher,
            store: WindowStore::new(),
            rules: RwLock::new(rules),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Обрабатывает одно событие окна.
    ///
    /// Проверяются все включённые правила; приоритет задаёт только порядок
    /// выполнения. Ошибка одного правила не мешает остальным.
    pub async fn process_event(&self, event: WindowEvent) {
        let total = {
            let mut counters = self.counters.lock();
            counters.total_events_processed += 1;
            counters.total_events_processed
        };
        debug_if_enabled!("Событие: {}", event);

        self.store.apply(&event);

        // Копии совпавших правил: блокировка не удерживается во время действий
        let matched: Vec<Rule> = {
            let rules = self.rules.read();
            enabled_by_priority(&rules)
                .into_iter()
                .filter(|rule| rule.trigger.matches(event.kind, &event.window))
                .cloned()
                .collect()
        };

        for rule in &matched {
            self.run_rule(rule, &event.window).await;
        }

        let every = self.config.logging.status_every_events;
        if every > 0 && total % every == 0 {
            self.log_status();
        }
    }

    async fn run_rule(&self, rule: &Rule, trigger: &WindowInfo) {
        let action = &rule.action;
        let targets = self.store.select(|window| {
            action.accepts_target(window)
                && !(action.exclude_trigger_window && window.handle == trigger.handle)
        });

        if targets.is_empty() {
            debug!("Правило '{}': нет подходящих окон", rule.name);
            return;
        }

        info!(
            "Правило '{}' сработало на окно {} ({}), действие {}",
            rule.name, trigger.handle, trigger.title, action.kind
        );

        match self.dispatcher.dispatch(action, &targets, trigger).await {
            Ok(0) => {
                debug!("Правило '{}': действие {} ничего не изменило", rule.name, action.kind);
            }
            Ok(affected) => {
                let mut counters = self.counters.lock();
                *counters
                    .rule_execution_counts
                    .entry(rule.name.clone())
                    .or_insert(0) += 1;
                debug!("Правило '{}': затронуто окон: {}", rule.name, affected);
            }
            Err(e) => {
                warn!("Правило '{}': действие {} не выполнено: {}", rule.name, action.kind, e);
                self.counters.lock().dispatch_failures += 1;
            }
        }
    }

    /// Перечитывает окна через бэкенд и заменяет ими текущее состояние.
    ///
    /// Окна, сведения о которых получить не удалось, пропускаются.
    pub async fn refresh_window_state(&self) -> Result<usize> {
        let summaries = self.backend.enumerate_windows().await?;
        let mut windows = Vec::with_capacity(summaries.len());

        for summary in summaries {
            if summary.title.is_empty() || self.config.is_ignored_class(&summary.class) {
                continue;
            }
            match self.backend.window_info(summary.handle).await {
                Ok(info) => windows.push(info),
                Err(e) => debug!("Окно {} пропущено: {}", summary.handle, e),
            }
        }

        let count = windows.len();
        self.store.replace_all(windows);
        info!("Состояние окон обновлено: {} окон", count);
        Ok(count)
    }

    pub fn statistics(&self) -> RuleEngineStatistics {
        let enabled_rules = self.rules.read().iter().filter(|r| r.enabled).count();
        let counters = self.counters.lock();

        RuleEngineStatistics {
            total_events_processed: counters.total_events_processed,
            current_windows_tracked: self.store.len(),
            rule_execution_counts: counters
                .rule_execution_counts
                .iter()
                .map(|(name, count)| (name.clone(), *count))
                .collect(),
            enabled_rules,
            dispatch_failures: counters.dispatch_failures,
        }
    }

    pub fn clear_statistics(&self) {
        *self.counters.lock() = Counters::default();
        info!("Статистика движка правил сброшена");
    }

    /// Копия текущего состояния окон
    pub fn window_state(&self) -> BTreeMap<WindowHandle, WindowInfo> {
        self.store.snapshot()
    }

    pub fn store(&self) -> &WindowStore {
        &self.store
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.rules.read().clone()
    }

    pub fn replace_rules(&self, rules: Vec<Rule>) {
        info!("Список правил заменён: {} правил", rules.len());
        *self.rules.write() = rules;
    }

    /// Включает или выключает правило по имени; `false`, если правила нет
    pub fn set_rule_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut rules = self.rules.write();
        match rules.iter_mut().find(|rule| rule.name == name) {
            Some(rule) => {
                rule.enabled = enabled;
                info!(
                    "Правило '{}' {}",
                    name,
                    if enabled { "включено" } else { "выключено" }
                );
                true
            }
            None => {
                warn!("Правило '{}' не найдено", name);
                false
            }
        }
    }

    pub fn log_status(&self) {
        let stats = self.statistics();
        let executions: u64 = stats.rule_execution_counts.values().sum();
        info!(
            "📊 Событий: {}, окон: {}, правил включено: {}, срабатываний: {}, ошибок действий: {}",
            stats.total_events_processed,
            stats.current_windows_tracked,
            stats.enabled_rules,
            executions,
            stats.dispatch_failures
        );
    }
}
