//! File-based logging for processes embedding Warden.
//!
//! | Log File    | Component                          | Target Prefixes             |
//! |-------------|------------------------------------|-----------------------------|
//! | warden.log  | Root logger (all components)       | (all)                       |
//! | mutex.log   | Local and distributed mutexes      | warden_mutex, warden_store  |
//! | pool.log    | Resource pool allocation           | warden_pool                 |
//!
//! Log files are stored in `~/warden/logs` by default.
//! Override with the `WARDEN_LOG_DIR` environment variable.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Internal definition for a component log file.
struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "mutex.log",
        targets: &["warden_mutex", "warden_store"],
    },
    ComponentLogDef {
        file_name: "pool.log",
        targets: &["warden_pool"],
    },
];

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl LogRotation {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "daily" => Some(Self::Daily),
            "hourly" => Some(Self::Hourly),
            "never" => Some(Self::Never),
            _ => None,
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Base log directory (default: `~/warden/logs`)
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub file_logging: bool,
    pub level: Level,
    pub rotation: LogRotation,
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/warden/logs", home))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            file_logging: false,
            level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Create from the process environment.
    ///
    /// | Variable             | Meaning                          | Default         |
    /// |----------------------|----------------------------------|-----------------|
    /// | WARDEN_LOG_DIR       | Directory for log files          | `~/warden/logs` |
    /// | WARDEN_LOG_CONSOLE   | `false`/`0` disables the console | on              |
    /// | WARDEN_LOG_FILE      | `true`/`1` enables log files     | off             |
    /// | WARDEN_LOG_LEVEL     | `trace` .. `error`               | `info`          |
    /// | WARDEN_LOG_ROTATION  | `daily`, `hourly` or `never`     | `daily`         |
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Create from an arbitrary variable lookup; unparsable values fall back
    /// to their defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let flag = |name: &str| lookup(name).map(|v| v.trim().to_lowercase());

        let log_dir = lookup("WARDEN_LOG_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.log_dir);

        let console_output = flag("WARDEN_LOG_CONSOLE")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(defaults.console_output);

        let file_logging = flag("WARDEN_LOG_FILE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.file_logging);

        let level = lookup("WARDEN_LOG_LEVEL")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.level);

        let rotation = flag("WARDEN_LOG_ROTATION")
            .and_then(|v| LogRotation::parse(&v))
            .unwrap_or(defaults.rotation);

        Self {
            log_dir,
            console_output,
            file_logging,
            level,
            rotation,
        }
    }
}

/// Guard that keeps the non-blocking file writers alive.
///
/// Dropping it flushes all buffered log output.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level for the console and root file.
/// Component files route events by target prefix.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, Box<dyn std::error::Error>> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, "warden.log");
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);

        let root_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
        let root_layer = fmt::layer()
            .with_writer(root_nb)
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_filter(root_filter);
        layers.push(Box::new(root_layer));

        for component in COMPONENT_LOGS {
            let appender = RollingFileAppender::new(
                config.rotation.into(),
                &config.log_dir,
                component.file_name,
            );
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let level = LevelFilter::from_level(config.level);
            let targets = component
                .targets
                .iter()
                .fold(Targets::new(), |targets, target| targets.with_target(*target, level));

            let layer = fmt::layer()
                .with_writer(nb)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .with_filter(targets);
            layers.push(Box::new(layer));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            "File logging initialized: warden.log (root) + {} component log files",
            COMPONENT_LOGS.len()
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}
