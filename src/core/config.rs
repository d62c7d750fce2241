//! 编排器配置
//!
//! 定义编排器的配置结构和加载逻辑。配置文件可以是 YAML 或 JSON（按扩展名判断），
//! 其中 `modules` 为种子清单：由引导步骤逐条注册到生命周期管理器。

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::module::metadata::ModuleDescriptor;
use crate::utils::{CoreError, Result};

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 非关键依赖启动失败时对依赖方的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyFailurePolicy {
    /// 继续启动依赖方（默认）
    #[default]
    Proceed,
    /// 跳过依赖方，依赖方保持原状态
    Abort,
}

/// 生命周期配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// onStart 钩子超时（毫秒），超时视为初始化失败
    #[serde(default)]
    pub start_timeout_ms: Option<u64>,

    /// onStop 钩子超时（毫秒），超时后模块仍视为已停止
    #[serde(default)]
    pub stop_timeout_ms: Option<u64>,

    /// 非关键依赖失败时的策略
    #[serde(default)]
    pub dependency_failure: DependencyFailurePolicy,

    /// 状态变更通知通道容量
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    64
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: None,
            stop_timeout_ms: None,
            dependency_failure: DependencyFailurePolicy::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl LifecycleConfig {
    /// onStart 超时
    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout_ms.map(Duration::from_millis)
    }

    /// onStop 超时
    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout_ms.map(Duration::from_millis)
    }
}

/// 编排器配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 生命周期配置
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// 模块种子清单
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
}

impl OrchestratorConfig {
    /// 创建配置构建器
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    /// 从文件加载配置
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("无法读取配置文件 {}: {}", path.display(), e))
        })?;

        let mut config: OrchestratorConfig =
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                serde_json::from_str(&content)?
            } else {
                serde_yaml::from_str(&content)?
            };

        config.config_path = Some(path);
        Ok(config)
    }

    /// 验证配置
    ///
    /// 检查种子清单中的描述是否有效、名称是否重复，以及生命周期参数是否合法。
    /// 依赖引用与循环在解析阶段报告，不在此处检查。
    pub fn validate(&self) -> Result<()> {
        if self.lifecycle.event_capacity == 0 {
            return Err(CoreError::InvalidConfigValue {
                key: "lifecycle.event_capacity".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        for (key, value) in [
            ("lifecycle.start_timeout_ms", self.lifecycle.start_timeout_ms),
            ("lifecycle.stop_timeout_ms", self.lifecycle.stop_timeout_ms),
        ] {
            if value == Some(0) {
                return Err(CoreError::InvalidConfigValue {
                    key: key.to_string(),
                    reason: "超时必须大于 0".to_string(),
                });
            }
        }

        let mut seen = HashSet::new();
        for desc in &self.modules {
            desc.validate()?;
            if !seen.insert(desc.name.as_str()) {
                return Err(CoreError::InvalidConfigValue {
                    key: "modules".to_string(),
                    reason: format!("模块名称重复: '{}'", desc.name),
                });
            }
        }
        Ok(())
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 设置 onStart 超时
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.config.lifecycle.start_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// 设置 onStop 超时
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.lifecycle.stop_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// 设置依赖失败策略
    pub fn dependency_failure(mut self, policy: DependencyFailurePolicy) -> Self {
        self.config.lifecycle.dependency_failure = policy;
        self
    }

    /// 添加种子模块
    pub fn module(mut self, descriptor: ModuleDescriptor) -> Self {
        self.config.modules.push(descriptor);
        self
    }

    /// 构建配置
    pub fn build(self) -> OrchestratorConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.lifecycle.dependency_failure, DependencyFailurePolicy::Proceed);
        assert_eq!(config.lifecycle.event_capacity, 64);
        assert!(config.lifecycle.start_timeout().is_none());
        assert!(config.modules.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = OrchestratorConfig::builder()
            .log_level("debug")
            .start_timeout(Duration::from_secs(5))
            .dependency_failure(DependencyFailurePolicy::Abort)
            .module(ModuleDescriptor::new("Auth", "1.0.0").with_priority(1))
            .build();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.lifecycle.start_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.lifecycle.dependency_failure, DependencyFailurePolicy::Abort);
        assert_eq!(config.modules.len(), 1);
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let config = OrchestratorConfig::builder()
            .module(ModuleDescriptor::new("Auth", "1.0.0"))
            .module(ModuleDescriptor::new("Auth", "2.0.0"))
            .build();
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = OrchestratorConfig::default();
        config.lifecycle.stop_timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_yaml_roundtrip() {
        let yaml = r#"
lifecycle:
  start_timeout_ms: 2000
  dependency_failure: abort
modules:
  - name: Auth
    priority: 1
    critical: true
  - name: Reporting
    version: "1.2.0"
    required_module: Auth
"#;
        let config: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.lifecycle.start_timeout_ms, Some(2000));
        assert_eq!(config.lifecycle.dependency_failure, DependencyFailurePolicy::Abort);
        assert_eq!(config.modules.len(), 2);
        assert!(config.modules[0].is_critical);
        assert_eq!(config.modules[1].required_module.as_deref(), Some("Auth"));
        assert_eq!(config.modules[1].priority, crate::module::metadata::DEFAULT_PRIORITY);
    }
}
