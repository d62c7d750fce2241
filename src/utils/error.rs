//! 编排器错误类型定义
//!
//! 本模块定义了编排器中使用的所有错误类型。

use thiserror::Error;

/// 编排器核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 依赖解析错误 ====================

    /// 依赖模块未注册
    #[error("模块 '{module}' 的依赖 '{dependency}' 未注册")]
    DependencyNotFound {
        /// 声明依赖的模块
        module: String,
        /// 缺失的依赖模块
        dependency: String,
    },

    /// 循环依赖
    #[error("检测到循环依赖: {}", .path.join(" -> "))]
    CyclicDependency {
        /// 循环路径（首尾相同）
        path: Vec<String>,
    },

    // ==================== 模块管理错误 ====================

    /// 模块未注册
    #[error("模块未注册: '{0}'")]
    ModuleNotFound(String),

    /// 无效的模块描述
    #[error("无效的模块描述: {0}")]
    InvalidDescriptor(String),

    /// 模块初始化失败（onStart 钩子返回错误）
    #[error("模块初始化失败: '{module}' - {source:#}")]
    ModuleInitialization {
        /// 失败的模块
        module: String,
        /// 钩子返回的原始错误
        #[source]
        source: anyhow::Error,
    },

    /// 依赖模块启动失败，依赖方被跳过
    #[error("模块 '{module}' 的依赖 '{dependency}' 启动失败")]
    DependencyFailed {
        /// 被跳过的模块
        module: String,
        /// 失败的依赖模块
        dependency: String,
    },

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        /// 配置项
        key: String,
        /// 原因
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 操作被取消
    #[error("操作被取消")]
    Cancelled,
}

/// 编排器操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 模块错误 (MODULE-xxx)
    pub const MODULE_NOT_REGISTERED: &str = "MODULE-001";
    pub const MODULE_INIT_FAILED: &str = "MODULE-003";
    pub const MODULE_CIRCULAR_DEPENDENCY: &str = "MODULE-005";
    pub const MODULE_DEPENDENCY_NOT_FOUND: &str = "MODULE-006";
    pub const MODULE_DEPENDENCY_FAILED: &str = "MODULE-007";
    pub const MODULE_INVALID_DESCRIPTOR: &str = "MODULE-008";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";

    // 核心错误 (CORE-xxx)
    pub const CORE_INIT_FAILED: &str = "CORE-003";
    pub const CORE_CANCELLED: &str = "CORE-004";
    pub const CORE_IO_ERROR: &str = "CORE-005";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::DependencyNotFound { .. } => error_code::MODULE_DEPENDENCY_NOT_FOUND,
            CoreError::CyclicDependency { .. } => error_code::MODULE_CIRCULAR_DEPENDENCY,
            CoreError::ModuleNotFound(_) => error_code::MODULE_NOT_REGISTERED,
            CoreError::InvalidDescriptor(_) => error_code::MODULE_INVALID_DESCRIPTOR,
            CoreError::ModuleInitialization { .. } => error_code::MODULE_INIT_FAILED,
            CoreError::DependencyFailed { .. } => error_code::MODULE_DEPENDENCY_FAILED,
            CoreError::ConfigLoadFailed(_) | CoreError::Json(_) | CoreError::Yaml(_) => {
                error_code::CONFIG_LOAD_FAILED
            }
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            CoreError::InitFailed(_) => error_code::CORE_INIT_FAILED,
            CoreError::Cancelled => error_code::CORE_CANCELLED,
            CoreError::Io(_) => error_code::CORE_IO_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::DependencyNotFound {
            module: "Reporting".to_string(),
            dependency: "Auth".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Reporting"));
        assert!(msg.contains("Auth"));
    }

    #[test]
    fn test_cycle_display_joins_path() {
        let err = CoreError::CyclicDependency {
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn test_error_code() {
        let err = CoreError::ModuleNotFound("x".to_string());
        assert_eq!(err.error_code(), error_code::MODULE_NOT_REGISTERED);
        assert_eq!(CoreError::Cancelled.error_code(), error_code::CORE_CANCELLED);
    }

    #[test]
    fn test_initialization_keeps_source() {
        let err = CoreError::ModuleInitialization {
            module: "db".to_string(),
            source: anyhow::anyhow!("connection refused"),
        };
        assert!(err.to_string().contains("connection refused"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
    }
}
