//! 模块管理模块
//!
//! 包含模块编排的核心组件：
//! - 模块元数据定义（描述、状态、注册记录）
//! - 依赖解析器（加载顺序、循环与缺失依赖检测）
//! - 生命周期管理器（状态机、级联启动、并发串行化）
//! - 模块运行时接口（启动/停止回调）

pub mod dependency;
pub mod lifecycle;
pub mod metadata;
pub mod runtime;

// 重导出常用类型
pub use dependency::{DependencyGraph, DependencyResolver};
pub use lifecycle::LifecycleManager;
pub use metadata::{
    ModuleDescriptor, ModuleRegistration, ModuleState, StateChange, DEFAULT_PRIORITY,
};
pub use runtime::{FnModule, HookFn, ModuleRuntime};
