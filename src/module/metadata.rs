//! 模块元数据定义
//!
//! 模块描述（[`ModuleDescriptor`]）、生命周期状态（[`ModuleState`]）
//! 以及由生命周期管理器持有的注册记录（[`ModuleRegistration`]）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{CoreError, Result};

/// 默认优先级
pub const DEFAULT_PRIORITY: i32 = 100;

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_version() -> String {
    "0.0.0".to_string()
}

/// 模块描述
///
/// 由模块提供方给出的不可变元数据。名称区分大小写，在注册集合中唯一。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// 模块名称（唯一键）
    pub name: String,

    /// 模块版本（仅供展示，重复注册时以最后一次为准）
    #[serde(default = "default_version")]
    pub version: String,

    /// 优先级，数值越小越先加载
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// 必需的前置模块
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_module: Option<String>,

    /// 是否为关键模块（启动失败会中止整个编排过程）
    #[serde(default, alias = "critical")]
    pub is_critical: bool,
}

impl ModuleDescriptor {
    /// 创建模块描述
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            priority: DEFAULT_PRIORITY,
            required_module: None,
            is_critical: false,
        }
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// 设置必需的前置模块
    pub fn requires(mut self, module: impl Into<String>) -> Self {
        self.required_module = Some(module.into());
        self
    }

    /// 标记为关键模块
    pub fn critical(mut self) -> Self {
        self.is_critical = true;
        self
    }

    /// 验证描述有效性
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidDescriptor("模块名称不能为空".to_string()));
        }
        if let Some(ref dep) = self.required_module {
            if dep.trim().is_empty() {
                return Err(CoreError::InvalidDescriptor(format!(
                    "模块 '{}' 的依赖名称不能为空",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// 模块生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// 未加载（初始状态）
    #[default]
    NotLoaded,
    /// 正在加载（onStart 钩子执行中）
    Loading,
    /// 已加载
    Loaded,
    /// 启动失败
    Error,
}

impl ModuleState {
    /// 是否可以启动（错误状态允许重试）
    pub fn can_start(&self) -> bool {
        matches!(self, ModuleState::NotLoaded | ModuleState::Error)
    }

    /// 是否可以停止
    pub fn can_stop(&self) -> bool {
        matches!(self, ModuleState::Loaded)
    }

    /// 状态名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::NotLoaded => "not_loaded",
            ModuleState::Loading => "loading",
            ModuleState::Loaded => "loaded",
            ModuleState::Error => "error",
        }
    }
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 模块注册记录
///
/// 由生命周期管理器独占修改；查询接口返回其副本。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRegistration {
    /// 模块描述
    pub descriptor: ModuleDescriptor,

    /// 当前状态
    pub state: ModuleState,

    /// 最后一次状态变更时间
    pub last_state_change: DateTime<Utc>,

    /// 最后错误信息（仅在 `Error` 状态下存在）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ModuleRegistration {
    /// 创建处于 `NotLoaded` 状态的注册记录
    pub fn new(descriptor: ModuleDescriptor) -> Self {
        Self {
            descriptor,
            state: ModuleState::NotLoaded,
            last_state_change: Utc::now(),
            last_error: None,
        }
    }

    /// 是否已加载
    pub fn is_loaded(&self) -> bool {
        self.state == ModuleState::Loaded
    }

    pub(crate) fn transition(&mut self, state: ModuleState, error: Option<String>) -> ModuleState {
        let previous = self.state;
        self.state = state;
        self.last_state_change = Utc::now();
        self.last_error = if state == ModuleState::Error { error } else { None };
        previous
    }
}

/// 状态变更通知
#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    /// 模块名称
    pub module: String,
    /// 原状态
    pub from: ModuleState,
    /// 新状态
    pub to: ModuleState,
    /// 变更时间
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let desc = ModuleDescriptor::new("Reporting", "2.1.0")
            .with_priority(100)
            .requires("Auth")
            .critical();

        assert_eq!(desc.name, "Reporting");
        assert_eq!(desc.priority, 100);
        assert_eq!(desc.required_module.as_deref(), Some("Auth"));
        assert!(desc.is_critical);
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_descriptor_validation() {
        assert!(ModuleDescriptor::new("", "1.0.0").validate().is_err());
        assert!(ModuleDescriptor::new("a", "1.0.0").requires(" ").validate().is_err());
    }

    #[test]
    fn test_descriptor_yaml_defaults() {
        let desc: ModuleDescriptor = serde_yaml::from_str("name: Auth\ncritical: true\n").unwrap();
        assert_eq!(desc.version, "0.0.0");
        assert_eq!(desc.priority, DEFAULT_PRIORITY);
        assert!(desc.required_module.is_none());
        assert!(desc.is_critical);
    }

    #[test]
    fn test_module_state_transitions() {
        assert!(ModuleState::NotLoaded.can_start());
        assert!(ModuleState::Error.can_start());
        assert!(!ModuleState::Loading.can_start());
        assert!(!ModuleState::Loaded.can_start());

        assert!(ModuleState::Loaded.can_stop());
        assert!(!ModuleState::NotLoaded.can_stop());
        assert_eq!(ModuleState::default(), ModuleState::NotLoaded);
    }

    #[test]
    fn test_registration_clears_error_when_leaving_error_state() {
        let mut reg = ModuleRegistration::new(ModuleDescriptor::new("db", "1.0.0"));
        reg.transition(ModuleState::Loading, None);
        let prev = reg.transition(ModuleState::Error, Some("boom".to_string()));
        assert_eq!(prev, ModuleState::Loading);
        assert_eq!(reg.last_error.as_deref(), Some("boom"));

        reg.transition(ModuleState::Loading, None);
        assert!(reg.last_error.is_none());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&ModuleState::NotLoaded).unwrap();
        assert_eq!(json, "\"not_loaded\"");
        assert_eq!(ModuleState::Loaded.to_string(), "loaded");
    }
}
