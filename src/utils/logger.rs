//! 日志系统模块
//!
//! 按编排器配置中的 `logging` 段安装全局 tracing 订阅者：控制台输出
//! （文本或 JSON），可选的按时间轮转的日志文件。`RUST_LOG` 优先于配置级别。

use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::core::config::LogConfig;
use crate::utils::{CoreError, Result};

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync + 'static>;

/// 日志文件名
const LOG_FILE_NAME: &str = "chips-orchestrator.log";

/// 日志轮转策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    /// 不轮转
    Never,
    /// 每小时
    Hourly,
    /// 每天（默认）
    #[default]
    Daily,
}

impl RotationStrategy {
    /// 从配置字符串解析，无法识别时回退到 `Daily`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "never" | "none" => RotationStrategy::Never,
            "hourly" | "hour" => RotationStrategy::Hourly,
            _ => RotationStrategy::Daily,
        }
    }

    fn to_rotation(self) -> Rotation {
        match self {
            RotationStrategy::Never => Rotation::NEVER,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Daily => Rotation::DAILY,
        }
    }
}

/// 日志系统配置
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// 默认日志级别
    pub level: String,
    /// 是否输出 JSON
    pub json_format: bool,
    /// 日志文件目录（None 表示只输出到控制台）
    pub file_output: Option<PathBuf>,
    /// 日志文件轮转策略
    pub rotation: RotationStrategy,
    /// 是否显示线程 ID
    pub show_thread_ids: bool,
    /// 是否显示源码位置
    pub show_file_line: bool,
}

impl LoggerConfig {
    /// 从编排器配置的 `logging` 段创建
    pub fn from_log_config(log_config: &LogConfig) -> Self {
        Self {
            level: log_config.level.clone(),
            json_format: log_config.json_format,
            file_output: log_config
                .log_dir
                .clone()
                .filter(|_| log_config.file_output),
            rotation: RotationStrategy::parse(&log_config.rotation),
            show_thread_ids: false,
            show_file_line: false,
        }
    }

    fn parse_level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

/// 日志守卫
///
/// 持有非阻塞写入器的 `WorkerGuard`，丢弃时刷新挂起的日志，需存活到程序退出。
#[derive(Default)]
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// 日志系统
pub struct Logger;

impl Logger {
    /// 初始化全局日志订阅者
    ///
    /// 重复初始化或全局订阅者已被设置时返回 `CoreError::InitFailed`。
    pub fn init(config: LoggerConfig) -> Result<LogGuard> {
        if LOGGER_INITIALIZED.get().is_some() {
            return Err(CoreError::InitFailed("日志系统已初始化".to_string()));
        }

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.parse_level().as_str().to_lowercase()));

        let mut guards = Vec::new();
        let mut layers: Vec<BoxedLayer> = Vec::new();

        let (writer, worker) = tracing_appender::non_blocking(io::stdout());
        guards.push(worker);
        layers.push(Self::build_layer(&config, writer, true));

        if let Some(ref log_dir) = config.file_output {
            let appender =
                RollingFileAppender::new(config.rotation.to_rotation(), log_dir, LOG_FILE_NAME);
            let (writer, worker) = tracing_appender::non_blocking(appender);
            guards.push(worker);
            layers.push(Self::build_layer(&config, writer, false));
        }

        tracing_subscriber::registry()
            .with(filter)
            .with(layers)
            .try_init()
            .map_err(|e| CoreError::InitFailed(format!("日志系统初始化失败: {}", e)))?;

        let _ = LOGGER_INITIALIZED.set(());
        Ok(LogGuard { _guards: guards })
    }

    /// 尝试初始化，失败时返回空守卫
    pub fn try_init(config: LoggerConfig) -> LogGuard {
        Self::init(config).unwrap_or_default()
    }

    fn build_layer(config: &LoggerConfig, writer: NonBlocking, ansi: bool) -> BoxedLayer {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_thread_ids(config.show_thread_ids)
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line);

        if config.json_format {
            layer.json().with_ansi(false).boxed()
        } else {
            layer.with_ansi(ansi).boxed()
        }
    }
}
