//! 模块运行时接口
//!
//! 编排器把模块的功能代码视为不透明的回调对：启动时调用 `on_start`，
//! 停止时调用 `on_stop`。模块通过 [`ModuleRuntime::describe`] 提供自身描述，
//! 由外部引导步骤显式注册，不做运行时类型扫描。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use super::metadata::ModuleDescriptor;

/// 模块运行时接口
///
/// 钩子可以是任意外部代码（例如打开数据库连接），失败以 `anyhow::Error` 表示。
/// 传入的取消令牌仅为建议：钩子自行决定是否响应。
#[async_trait]
pub trait ModuleRuntime: Send + Sync {
    /// 模块描述
    fn describe(&self) -> ModuleDescriptor;

    /// 初始化钩子
    async fn on_start(&self, cancel: CancellationToken) -> anyhow::Result<()>;

    /// 关闭钩子
    async fn on_stop(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// 钩子闭包类型
pub type HookFn = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// 基于闭包的模块
///
/// 对应“描述 + 两个异步回调”的注册形式。
///
/// ```rust
/// use chips_orchestrator::module::{FnModule, ModuleDescriptor};
///
/// let module = FnModule::new(
///     ModuleDescriptor::new("Auth", "1.0.0").with_priority(1),
///     |_cancel| async { Ok(()) },
///     |_cancel| async { Ok(()) },
/// );
/// ```
#[derive(Clone)]
pub struct FnModule {
    descriptor: ModuleDescriptor,
    on_start: HookFn,
    on_stop: HookFn,
}

impl FnModule {
    /// 使用描述和启动/停止回调创建模块
    pub fn new<S, SF, T, TF>(descriptor: ModuleDescriptor, on_start: S, on_stop: T) -> Self
    where
        S: Fn(CancellationToken) -> SF + Send + Sync + 'static,
        SF: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
        T: Fn(CancellationToken) -> TF + Send + Sync + 'static,
        TF: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            descriptor,
            on_start: Arc::new(move |cancel| on_start(cancel).boxed()),
            on_stop: Arc::new(move |cancel| on_stop(cancel).boxed()),
        }
    }

    /// 钩子什么也不做的模块
    pub fn noop(descriptor: ModuleDescriptor) -> Self {
        Self::new(descriptor, |_| async { Ok(()) }, |_| async { Ok(()) })
    }
}

impl fmt::Debug for FnModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModule")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ModuleRuntime for FnModule {
    fn describe(&self) -> ModuleDescriptor {
        self.descriptor.clone()
    }

    async fn on_start(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        (self.on_start)(cancel).await
    }

    async fn on_stop(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        (self.on_stop)(cancel).await
    }
}
