//! 生命周期管理器
//!
//! 管理模块的生命周期状态转换：注册、启动（含依赖级联）、停止、重启和状态查询。
//!
//! 注册表是唯一的共享可变结构，由一把读写锁保护，因此全量快照总是一致的时间点副本。
//! 同一模块的状态转换由该模块自己的互斥门串行化，不同模块之间互不阻塞。

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::dependency::DependencyResolver;
use super::metadata::{ModuleDescriptor, ModuleRegistration, ModuleState, StateChange};
use super::runtime::ModuleRuntime;
use crate::core::config::{DependencyFailurePolicy, LifecycleConfig};
use crate::utils::{CoreError, Result};

/// 注册表条目
struct ModuleEntry {
    registration: ModuleRegistration,
    runtime: Arc<dyn ModuleRuntime>,
    /// 串行化该模块的状态转换，持有期间执行钩子
    gate: Arc<Mutex<()>>,
    /// 每次状态转换递增，用于识别等待期间已完成的并发启动
    epoch: u64,
}

/// 生命周期管理器
///
/// 独占所有 [`ModuleRegistration`] 及其状态的修改权。
pub struct LifecycleManager {
    entries: RwLock<HashMap<String, ModuleEntry>>,
    resolver: RwLock<DependencyResolver>,
    config: LifecycleConfig,
    events: broadcast::Sender<StateChange>,
}

impl LifecycleManager {
    /// 使用默认配置创建生命周期管理器
    pub fn new() -> Self {
        Self::with_config(LifecycleConfig::default())
    }

    /// 使用指定配置创建生命周期管理器
    pub fn with_config(config: LifecycleConfig) -> Self {
        info!(
            dependency_failure = ?config.dependency_failure,
            start_timeout_ms = ?config.start_timeout_ms,
            "创建生命周期管理器"
        );
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            entries: RwLock::new(HashMap::new()),
            resolver: RwLock::new(DependencyResolver::new()),
            config,
            events,
        }
    }

    /// 当前配置
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    // ==================== 注册 ====================

    /// 注册模块
    ///
    /// 新模块以 `NotLoaded` 状态登记。重复注册同名模块会替换描述和运行时，
    /// 但保留当前状态（已加载的模块不会被重置）。
    pub async fn register_module(&self, runtime: Arc<dyn ModuleRuntime>) -> Result<()> {
        let descriptor = runtime.describe();
        descriptor.validate()?;
        let name = descriptor.name.clone();

        let mut resolver = self.resolver.write().await;
        let mut entries = self.entries.write().await;

        match entries.get_mut(&name) {
            Some(entry) => {
                info!(
                    module = %name,
                    version = %descriptor.version,
                    state = %entry.registration.state,
                    "更新模块注册"
                );
                entry.registration.descriptor = descriptor.clone();
                entry.runtime = runtime;
            }
            None => {
                info!(
                    module = %name,
                    version = %descriptor.version,
                    priority = descriptor.priority,
                    critical = descriptor.is_critical,
                    "注册模块"
                );
                entries.insert(
                    name,
                    ModuleEntry {
                        registration: ModuleRegistration::new(descriptor.clone()),
                        runtime,
                        gate: Arc::new(Mutex::new(())),
                        epoch: 0,
                    },
                );
            }
        }

        resolver.register_module(descriptor);
        Ok(())
    }

    /// 注册实现了 [`ModuleRuntime`] 的模块
    pub async fn register<M>(&self, module: M) -> Result<()>
    where
        M: ModuleRuntime + 'static,
    {
        self.register_module(Arc::new(module)).await
    }

    /// 按顺序注册一组模块
    ///
    /// 遇到无效描述时立即返回，之前的模块保持已注册。
    pub async fn register_all<I>(&self, modules: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn ModuleRuntime>>,
    {
        for module in modules {
            self.register_module(module).await?;
        }
        Ok(())
    }

    // ==================== 启动 ====================

    /// 启动模块（先级联启动其所有未加载的依赖）
    ///
    /// 未注册或已加载的模块只记录警告并正常返回。
    ///
    /// # 错误
    ///
    /// - 依赖结构错误（缺失依赖、循环依赖）
    /// - 关键模块（或其关键依赖）初始化失败
    pub async fn start_module(&self, name: &str) -> Result<()> {
        self.start_module_with_cancel(name, &CancellationToken::new())
            .await
    }

    /// 启动模块，支持取消
    ///
    /// 钩子开始执行前取消会返回 [`CoreError::Cancelled`] 且不改变状态；
    /// 钩子开始后取消仅作为建议传递给钩子，状态以钩子的实际结果为准。
    #[instrument(skip(self, cancel), fields(module = %name))]
    pub async fn start_module_with_cancel(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.state_of(name).await {
            None => {
                warn!(module = %name, "模块未注册，忽略启动请求");
                return Ok(());
            }
            Some(ModuleState::Loaded) => {
                warn!(module = %name, "模块已加载，忽略启动请求");
                return Ok(());
            }
            Some(_) => {}
        }

        let chain = self
            .resolver
            .read()
            .await
            .get_transitive_dependencies(name)?;
        let dependencies = &chain[..chain.len().saturating_sub(1)];

        let critical = self.is_critical(name).await;
        for dependency in dependencies {
            if self.state_of(dependency).await == Some(ModuleState::Loaded) {
                continue;
            }
            debug!(module = %name, dependency = %dependency, "级联启动依赖");
            self.start_single(dependency, cancel).await?;

            if self.state_of(dependency).await == Some(ModuleState::Error)
                && self.config.dependency_failure == DependencyFailurePolicy::Abort
            {
                if critical {
                    error!(module = %name, dependency = %dependency, "依赖启动失败，中止关键模块启动");
                    return Err(CoreError::DependencyFailed {
                        module: name.to_string(),
                        dependency: dependency.clone(),
                    });
                }
                warn!(module = %name, dependency = %dependency, "依赖启动失败，跳过模块");
                return Ok(());
            }
        }

        self.start_single(name, cancel).await
    }

    /// 执行单个模块的启动转换（不处理依赖）
    async fn start_single(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        let (gate, epoch_seen) = {
            let entries = self.entries.read().await;
            let entry = entries
                .get(name)
                .ok_or_else(|| CoreError::ModuleNotFound(name.to_string()))?;
            (entry.gate.clone(), entry.epoch)
        };

        let _guard = gate.lock().await;

        let (runtime, registration, epoch) = {
            let entries = self.entries.read().await;
            let entry = entries
                .get(name)
                .ok_or_else(|| CoreError::ModuleNotFound(name.to_string()))?;
            (entry.runtime.clone(), entry.registration.clone(), entry.epoch)
        };

        if registration.state == ModuleState::Loaded {
            debug!(module = %name, "模块已由并发请求加载");
            return Ok(());
        }

        // 等待期间另一个启动请求已经失败，直接沿用其结果而不是再次调用钩子
        if registration.state == ModuleState::Error && epoch != epoch_seen {
            debug!(module = %name, "模块已由并发请求启动失败");
            let message = registration.last_error.unwrap_or_default();
            return self.failure_outcome(&registration.descriptor, anyhow::Error::msg(message));
        }

        if !registration.state.can_start() {
            warn!(module = %name, state = %registration.state, "模块当前状态不允许启动");
            return Ok(());
        }

        if cancel.is_cancelled() {
            info!(module = %name, "启动请求已取消");
            return Err(CoreError::Cancelled);
        }

        self.transition(name, ModuleState::Loading, None).await;
        info!(module = %name, "启动模块");

        let started = Instant::now();
        let result = run_hook(
            "onStart",
            runtime.on_start(cancel.clone()),
            self.config.start_timeout(),
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                self.transition(name, ModuleState::Loaded, None).await;
                info!(module = %name, duration_ms, "模块启动成功");
                Ok(())
            }
            Err(e) => {
                self.transition(name, ModuleState::Error, Some(format!("{e:#}")))
                    .await;
                self.failure_outcome(&registration.descriptor, e)
            }
        }
    }

    /// 按关键性决定初始化失败是否向调用方传播
    fn failure_outcome(&self, descriptor: &ModuleDescriptor, source: anyhow::Error) -> Result<()> {
        if descriptor.is_critical {
            error!(module = %descriptor.name, error = %format!("{source:#}"), "关键模块初始化失败");
            Err(CoreError::ModuleInitialization {
                module: descriptor.name.clone(),
                source,
            })
        } else {
            warn!(module = %descriptor.name, error = %format!("{source:#}"), "模块初始化失败");
            Ok(())
        }
    }

    /// 按加载顺序启动全部模块
    ///
    /// 先解析完整加载顺序，结构错误在任何钩子执行前返回；
    /// 关键模块失败会中止剩余模块的启动。
    pub async fn start_all(&self) -> Result<()> {
        self.start_all_with_cancel(&CancellationToken::new()).await
    }

    /// 按加载顺序启动全部模块，支持取消
    #[instrument(skip(self, cancel))]
    pub async fn start_all_with_cancel(&self, cancel: &CancellationToken) -> Result<()> {
        let order = self.load_order().await?;
        info!(count = order.len(), order = ?order, "按加载顺序启动全部模块");

        for name in &order {
            self.start_module_with_cancel(name, cancel).await?;
        }

        let failed = self.get_modules_by_state(ModuleState::Error).await;
        if failed.is_empty() {
            info!("全部模块启动完成");
        } else {
            warn!(failed = ?failed, "部分非关键模块启动失败");
        }
        Ok(())
    }

    // ==================== 停止 ====================

    /// 停止模块
    ///
    /// 仅对 `Loaded` 状态的模块调用关闭钩子；钩子失败或超时只记录日志，
    /// 模块仍转为 `NotLoaded`。不会级联停止依赖方。
    pub async fn stop_module(&self, name: &str) -> Result<()> {
        self.stop_module_with_cancel(name, &CancellationToken::new())
            .await
    }

    /// 停止模块，支持取消
    #[instrument(skip(self, cancel), fields(module = %name))]
    pub async fn stop_module_with_cancel(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let gate = {
            let entries = self.entries.read().await;
            match entries.get(name) {
                Some(entry) => entry.gate.clone(),
                None => {
                    warn!(module = %name, "模块未注册，忽略停止请求");
                    return Ok(());
                }
            }
        };

        let _guard = gate.lock().await;

        let (runtime, state) = {
            let entries = self.entries.read().await;
            let entry = entries
                .get(name)
                .ok_or_else(|| CoreError::ModuleNotFound(name.to_string()))?;
            (entry.runtime.clone(), entry.registration.state)
        };

        if !state.can_stop() {
            warn!(module = %name, state = %state, "模块未加载，忽略停止请求");
            return Ok(());
        }

        if cancel.is_cancelled() {
            info!(module = %name, "停止请求已取消");
            return Err(CoreError::Cancelled);
        }

        let dependents = self.loaded_dependents(name).await;
        if !dependents.is_empty() {
            warn!(module = %name, dependents = ?dependents, "停止模块时仍有已加载的依赖方");
        }

        info!(module = %name, "停止模块");
        let result = run_hook(
            "onStop",
            runtime.on_stop(cancel.clone()),
            self.config.stop_timeout(),
        )
        .await;

        if let Err(e) = result {
            warn!(module = %name, error = %format!("{e:#}"), "onStop 失败，模块仍视为已停止");
        }

        self.transition(name, ModuleState::NotLoaded, None).await;
        info!(module = %name, "模块已停止");
        Ok(())
    }

    /// 按卸载顺序停止全部已加载模块
    ///
    /// 依赖结构无法解析时退化为按注册顺序的反序停止。
    pub async fn stop_all(&self) -> Result<()> {
        let order = {
            let resolver = self.resolver.read().await;
            match resolver.get_unload_order() {
                Ok(order) => order,
                Err(e) => {
                    warn!(error = %e, "无法解析卸载顺序，按注册顺序反序停止");
                    resolver
                        .descriptors()
                        .into_iter()
                        .rev()
                        .map(|d| d.name.clone())
                        .collect()
                }
            }
        };

        info!(count = order.len(), "停止全部模块");
        for name in &order {
            if self.state_of(name).await == Some(ModuleState::Loaded) {
                self.stop_module(name).await?;
            }
        }
        Ok(())
    }

    /// 重启模块
    pub async fn restart_module(&self, name: &str) -> Result<()> {
        info!(module = %name, "重启模块");
        self.stop_module(name).await?;
        self.start_module(name).await
    }

    // ==================== 查询 ====================

    /// 获取模块注册记录（副本）
    pub async fn get_module_state(&self, name: &str) -> Option<ModuleRegistration> {
        self.entries
            .read()
            .await
            .get(name)
            .map(|e| e.registration.clone())
    }

    /// 获取所有模块注册记录的一致快照
    pub async fn get_all_module_states(&self) -> HashMap<String, ModuleRegistration> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(name, e)| (name.clone(), e.registration.clone()))
            .collect()
    }

    /// 获取处于指定状态的模块名称（按名称排序）
    pub async fn get_modules_by_state(&self, state: ModuleState) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.registration.state == state)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// 已注册模块数量
    pub async fn module_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// 是否已注册
    pub async fn is_registered(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// 当前注册集合的加载顺序
    pub async fn load_order(&self) -> Result<Vec<String>> {
        self.resolver.read().await.resolve_load_order()
    }

    /// 订阅状态变更通知
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    // ==================== 内部辅助 ====================

    async fn state_of(&self, name: &str) -> Option<ModuleState> {
        self.entries
            .read()
            .await
            .get(name)
            .map(|e| e.registration.state)
    }

    async fn is_critical(&self, name: &str) -> bool {
        self.entries
            .read()
            .await
            .get(name)
            .map(|e| e.registration.descriptor.is_critical)
            .unwrap_or(false)
    }

    async fn loaded_dependents(&self, name: &str) -> Vec<String> {
        let dependents = self.resolver.read().await.get_dependents(name);
        let entries = self.entries.read().await;
        dependents
            .into_iter()
            .filter(|d| {
                entries
                    .get(d)
                    .map(|e| e.registration.is_loaded())
                    .unwrap_or(false)
            })
            .collect()
    }

    async fn transition(&self, name: &str, to: ModuleState, error: Option<String>) {
        let change = {
            let mut entries = self.entries.write().await;
            let Some(entry) = entries.get_mut(name) else {
                return;
            };
            let from = entry.registration.transition(to, error);
            entry.epoch += 1;
            StateChange {
                module: name.to_string(),
                from,
                to,
                at: entry.registration.last_state_change,
            }
        };

        debug!(module = %name, from = %change.from, to = %change.to, "模块状态变更");
        // 没有订阅者时发送失败，忽略
        let _ = self.events.send(change);
    }
}

/// 执行模块钩子
///
/// 钩子是外部代码：panic 和超时都转换为普通错误，状态机据此完成转换。
async fn run_hook(
    hook_name: &str,
    hook: BoxFuture<'_, anyhow::Result<()>>,
    limit: Option<Duration>,
) -> anyhow::Result<()> {
    let guarded = AssertUnwindSafe(hook).catch_unwind().map(|outcome| {
        outcome.unwrap_or_else(|payload| {
            Err(anyhow::anyhow!("{} panic: {}", hook_name, panic_message(&*payload)))
        })
    });

    match limit {
        Some(limit) => tokio::time::timeout(limit, guarded).await.unwrap_or_else(|_| {
            Err(anyhow::anyhow!("{} 超时（{} ms）", hook_name, limit.as_millis()))
        }),
        None => guarded.await,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "未知 panic"
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
