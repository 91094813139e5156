use super::differ::{diff, snapshot_from_state, snapshot_from_summaries, Snapshot};
use super::rule_engine::RuleEngine;
use super::window_backend::WindowBackend;
use crate::config::{clamp_interval_secs, Config};
use crate::debug_if_enabled;
use crate::error::{Result, WardenError};
use crate::events::{WindowEvent, WindowHandle, WindowInfo};
use crate::warden_error;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Сколько ждать сигнала готовности от рабочей задачи
const START_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Stopped,
    Running,
    Stopping,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub interval_secs: f64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SchedulerState>,
    interval_secs: Mutex<f64>,
}

impl Shared {
    fn set_state(&self, state: SchedulerState) {
        *self.state.lock() = state;
    }

    fn interval(&self) -> Duration {
        Duration::from_secs_f64(*self.interval_secs.lock())
    }
}

/// Переводит планировщик в Stopped при любом выходе рабочей задачи
struct StoppedOnExit(Arc<Shared>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        self.0.set_state(SchedulerState::Stopped);
    }
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Периодический опрос окон: снимок, сравнение с предыдущим и передача
/// событий движку правил.
pub struct PollingScheduler {
    config: Arc<Config>,
    backend: Arc<dyn WindowBackend>,
    engine: Arc<RuleEngine>,
    shared: Arc<Shared>,
    // Сериализует start/stop; удерживается через .await, поэтому асинхронный
    worker: tokio::sync::Mutex<Option<Worker>>,
}

impl PollingScheduler {
    pub fn new(config: Arc<Config>, backend: Arc<dyn WindowBackend>, engine: Arc<RuleEngine>) -> Self {
        let interval_secs = clamp_interval_secs(config.polling.interval_secs);
        Self {
            config,
            backend,
            engine,
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState::Stopped),
                interval_secs: Mutex::new(interval_secs),
            }),
            worker: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.lock()
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state(),
            interval_secs: *self.shared.interval_secs.lock(),
        }
    }

    /// Устанавливает интервал опроса (приводится к [0.1, 60.0] с) и возвращает применённое значение.
    /// Действует со следующей паузы.
    pub fn set_interval(&self, secs: f64) -> f64 {
        let applied = clamp_interval_secs(secs);
        if applied != secs {
            warn!("Интервал опроса {} с вне допустимого диапазона, используется {} с", secs, applied);
        }
        let old = std::mem::replace(&mut *self.shared.interval_secs.lock(), applied);
        info!("Интервал опроса изменён: {} с -> {} с", old, applied);
        applied
    }

    /// Запускает рабочую задачу и ждёт сигнала, что она работает
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.worker.lock().await;
        if self.state() != SchedulerState::Stopped {
            warn!("Планировщик уже запущен");
            return Err(WardenError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();
        let poller = Poller {
            config: Arc::clone(&self.config),
            backend: Arc::clone(&self.backend),
            engine: Arc::clone(&self.engine),
            shared: Arc::clone(&self.shared),
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(poller.run(ready_tx));

        match timeout(START_TIMEOUT, ready_rx).await {
            Ok(Ok(())) => {
                *slot = Some(Worker {
                    shutdown: shutdown_tx,
                    handle,
                });
                info!("Планировщик опроса запущен");
                Ok(())
            }
            _ => {
                let _ = shutdown_tx.send(true);
                handle.abort();
                let _ = handle.await;
                Err(warden_error!(
                    timeout,
                    "рабочая задача не запустилась за {:?}",
                    START_TIMEOUT
                ))
            }
        }
    }

    /// Останавливает рабочую задачу, ожидая её завершения не дольше `stop_timeout`.
    ///
    /// При таймауте планировщик остаётся в состоянии Stopping; повторный
    /// вызов снова ждёт завершения.
    pub async fn stop(&self) -> Result<()> {
        let mut slot = self.worker.lock().await;
        if self.state() == SchedulerState::Stopped {
            slot.take();
            return Err(WardenError::NotRunning);
        }
        let Some(mut worker) = slot.take() else {
            return Err(WardenError::NotRunning);
        };

        info!("Остановка планировщика опроса...");
        self.shared.set_state(SchedulerState::Stopping);
        let _ = worker.shutdown.send(true);

        let stop_timeout = self.config.polling.stop_timeout();
        match timeout(stop_timeout, &mut worker.handle).await {
            Ok(Ok(())) => {
                info!("Планировщик опроса остановлен");
                Ok(())
            }
            Ok(Err(e)) => Err(warden_error!(internal, "рабочая задача завершилась аварийно: {}", e)),
            Err(_) => {
                warn!("Рабочая задача не завершилась за {:?}", stop_timeout);
                *slot = Some(worker);
                Err(warden_error!(timeout, "остановка планировщика за {:?}", stop_timeout))
            }
        }
    }
}

/// Состояние одной рабочей задачи опроса
struct Poller {
    config: Arc<Config>,
    backend: Arc<dyn WindowBackend>,
    engine: Arc<RuleEngine>,
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
}

impl Poller {
    async fn run(mut self, ready: oneshot::Sender<()>) {
        let _stopped = StoppedOnExit(Arc::clone(&self.shared));

        // Окна, уже известные движку, не считаются созданными заново
        let mut previous = snapshot_from_state(&self.engine.window_state());
        let mut foreground = self.backend.foreground_window().await.ok().flatten();

        self.shared.set_state(SchedulerState::Running);
        if ready.send(()).is_err() {
            return;
        }
        debug!("Рабочая задача опроса запущена, известно окон: {}", previous.len());

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let pause = match self.poll_once(&mut previous, &mut foreground).await {
                Ok(events) => {
                    if events > 0 {
                        debug_if_enabled!("Цикл опроса: событий {}", events);
                    }
                    self.shared.interval()
                }
                Err(e) => {
                    warn!("Ошибка цикла опроса: {}", e);
                    self.config.polling.error_backoff()
                }
            };

            tokio::select! {
                _ = sleep(pause) => {}
                changed = self.shutdown.changed() => {
                    // Отправитель удалён вместе с планировщиком
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Рабочая задача опроса завершена");
    }

    /// Один цикл: снимок, разница с предыдущим, события. Возвращает число событий.
    async fn poll_once(
        &self,
        previous: &mut Snapshot,
        foreground: &mut Option<WindowHandle>,
    ) -> Result<usize> {
        let summaries = self.backend.enumerate_windows().await?;
        let mut current = snapshot_from_summaries(
            summaries
                .into_iter()
                .filter(|s| !self.config.is_ignored_class(&s.class)),
        );
        let changes = diff(previous, &current);
        let mut events = 0;

        for &handle in &changes.created {
            match self.backend.window_info(handle).await {
                Ok(info) => {
                    self.engine.process_event(WindowEvent::created(info)).await;
                    events += 1;
                }
                Err(e) => {
                    // Окно будет обнаружено снова в следующем цикле
                    debug!("Нет сведений о новом окне {}: {}", handle, e);
                    current.remove(&handle);
                }
            }
        }

        for &handle in &changes.destroyed {
            if let Some(entry) = previous.get(&handle) {
                let gone = WindowInfo::gone(handle, entry.title.clone(), entry.class.clone());
                self.engine.process_event(WindowEvent::destroyed(gone)).await;
                events += 1;
            }
        }

        for &handle in &changes.changed {
            match self.backend.window_info(handle).await {
                Ok(info) => events += self.report_change(previous, info).await,
                Err(e) => {
                    debug!("Нет сведений об изменённом окне {}: {}", handle, e);
                    if let Some(entry) = previous.get(&handle) {
                        current.insert(handle, entry.clone());
                    }
                }
            }
        }

        match self.backend.foreground_window().await {
            Ok(active) if active != *foreground => {
                *foreground = active;
                if let Some(info) = active.and_then(|h| self.engine.store().get(h)) {
                    self.engine.process_event(WindowEvent::foreground(info)).await;
                    events += 1;
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Активное окно недоступно: {}", e),
        }

        *previous = current;
        Ok(events)
    }

    /// Смена заголовка; если у того же идентификатора сменился процесс,
    /// окно считается закрытым и открытым заново.
    async fn report_change(&self, previous: &Snapshot, info: WindowInfo) -> usize {
        let handle = info.handle;
        let stored_pid = self.engine.store().get(handle).and_then(|w| w.owner_process_id);

        match (stored_pid, info.owner_process_id, previous.get(&handle)) {
            (Some(old), Some(new), Some(entry)) if old != new => {
                debug!("Идентификатор {} перешёл от процесса {} к {}", handle, old, new);
                let gone = WindowInfo::gone(handle, entry.title.clone(), entry.class.clone());
                self.engine.process_event(WindowEvent::destroyed(gone)).await;
                self.engine.process_event(WindowEvent::created(info)).await;
                2
            }
            _ => {
                self.engine.process_event(WindowEvent::name_changed(info)).await;
                1
            }
        }
    }
}
