use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use winwarden::config::{clamp_interval_secs, Config};
use winwarden::rules::{JsonRuleStore, RuleStore};
use winwarden::services::{create_window_backend, PollingScheduler, RuleEngine};
use winwarden::utils::environment;

#[derive(Parser, Debug)]
#[command(name = "winwarden")]
#[command(about = "Автоматизация окон рабочего стола по правилам: реакция на открытие, закрытие и смену заголовка окон")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "winwarden.toml")]
    config: String,

    /// Режим сухого запуска (эмулируемый рабочий стол, без реальных действий)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (по умолчанию из конфигурации)
    #[arg(long)]
    log_level: Option<String>,

    /// Интервал опроса окон, секунды
    #[arg(short, long)]
    interval: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let mut config = Config::load(&args.config)?;
    if let Some(interval) = args.interval {
        config.polling.interval_secs = clamp_interval_secs(interval);
    }

    // Инициализация системы логирования
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, &config.logging.format)?;

    info!("Запуск winwarden v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    let config = Arc::new(config);
    let dry_run = args.dry_run || config.windows.backend == "dry-run";
    if dry_run {
        warn!("Режим сухого запуска - реальные действия отключены");
    } else {
        environment::check_environment()?;
    }

    // Инициализация компонентов
    let backend = create_window_backend(Arc::clone(&config), dry_run)?;
    let rules = JsonRuleStore::new(&config.rules.path).load()?;
    let engine = Arc::new(RuleEngine::new(Arc::clone(&config), Arc::clone(&backend), rules));

    if let Err(e) = engine.refresh_window_state().await {
        warn!("Не удалось получить начальное состояние окон: {}", e);
    }

    let scheduler = PollingScheduler::new(Arc::clone(&config), backend, Arc::clone(&engine));
    scheduler.start().await?;
    let status = scheduler.status();
    info!("Опрос окон запущен (интервал {} с)", status.interval_secs);

    // Ожидание сигнала завершения
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Получен сигнал завершения (Ctrl+C)");
        }
        Err(err) => {
            error!("Ошибка при ожидании сигнала завершения: {}", err);
        }
    }

    info!("Завершение работы...");

    match scheduler.stop().await {
        Ok(()) => info!("Опрос окон остановлен корректно"),
        Err(e) => warn!("Ошибка при остановке опроса: {}", e),
    }

    let stats = engine.statistics();
    engine.log_status();
    for (rule, count) in &stats.rule_execution_counts {
        info!("  Правило '{}': {} срабатываний", rule, count);
    }

    info!("winwarden завершил работу");
    Ok(())
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if format == "full" {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    }

    Ok(())
}
