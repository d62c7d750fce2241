//! # Chips Orchestrator - 薯片模块编排器
//!
//! 模块编排器负责在进程内协调各功能模块的启动与停止，提供以下核心功能：
//!
//! - **依赖解析**: 按优先级和注册顺序计算确定的加载顺序，检测缺失依赖和循环依赖
//! - **生命周期管理**: `NotLoaded → Loading → Loaded / Error` 状态机，依赖级联启动
//! - **并发控制**: 同一模块的状态转换串行化，不同模块互不阻塞
//! - **配置管理**: YAML/JSON 配置与模块种子清单
//! - **日志系统**: 结构化日志记录
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use chips_orchestrator::{FnModule, LifecycleManager, ModuleDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = LifecycleManager::new();
//!
//!     manager
//!         .register(FnModule::noop(ModuleDescriptor::new("Auth", "1.0.0").with_priority(1)))
//!         .await?;
//!     manager
//!         .register(FnModule::noop(ModuleDescriptor::new("Reporting", "1.0.0").requires("Auth")))
//!         .await?;
//!
//!     // 启动 Reporting 时会先启动 Auth
//!     manager.start_module("Reporting").await?;
//!     manager.stop_all().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 模块描述、依赖解析和生命周期管理
//! - `core` - 编排器配置
//! - `utils` - 错误类型和日志

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod core;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use module::{
    DependencyResolver, FnModule, LifecycleManager, ModuleDescriptor, ModuleRegistration,
    ModuleRuntime, ModuleState, StateChange,
};

pub use utils::logger::{LogGuard, Logger, LoggerConfig, RotationStrategy};
pub use utils::{error_code, CoreError, Result};

pub use core::config::{
    DependencyFailurePolicy, LifecycleConfig, LogConfig, OrchestratorConfig,
    OrchestratorConfigBuilder,
};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
