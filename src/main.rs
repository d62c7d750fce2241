//! Chips Orchestrator 命令行入口
//!
//! 模块编排器的命令行工具，用于检查模块清单、查看加载顺序和演练启动流程。
//!
//! # 命令概览
//!
//! - `order` - 显示模块清单的加载顺序
//! - `check-config` - 验证配置文件
//! - `boot` - 以空钩子注册清单中的模块，启动全部后再停止全部
//! - `version` - 显示版本信息
//!
//! # 使用示例
//!
//! ```bash
//! # 查看加载顺序
//! chips-orchestrator -c orchestrator.yaml order
//!
//! # 检查配置文件
//! chips-orchestrator check-config -c orchestrator.yaml
//!
//! # 演练启动流程（开发模式）
//! chips-orchestrator --dev boot
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use chips_orchestrator::{
    DependencyResolver, FnModule, LifecycleManager, LogGuard, Logger, LoggerConfig,
    ModuleDescriptor, OrchestratorConfig,
};

/// Chips Orchestrator - 薯片模块编排器
///
/// 解析模块依赖、计算加载顺序并管理模块生命周期。
#[derive(Parser)]
#[command(name = "chips-orchestrator")]
#[command(version, about = "薯片生态的模块生命周期编排器", long_about = None)]
#[command(author = "Chips Team")]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "orchestrator.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（显示线程 ID 和源码位置）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Option<Commands>,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 显示加载顺序
    ///
    /// 解析配置中的模块清单，按加载顺序列出模块。
    Order,

    /// 验证配置文件
    ///
    /// 检查配置文件是否有效，并验证模块清单的依赖结构。
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 演练启动流程
    ///
    /// 以空钩子注册清单中的模块，按加载顺序启动全部模块，
    /// 打印状态表后按卸载顺序停止。
    Boot,

    /// 查看版本信息
    Version,
}

/// 加载配置文件，不存在时使用默认配置
async fn load_config(path: &Path) -> Result<OrchestratorConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        let config = OrchestratorConfig::from_file(path).await?;
        config.validate()?;
        Ok(config)
    } else {
        // 日志系统尚未初始化
        eprintln!("⚠️  配置文件 {} 不存在，使用默认配置", path.display());
        Ok(OrchestratorConfig::default())
    }
}

/// 初始化日志系统
fn init_logging(config: &OrchestratorConfig, level: Option<&str>, dev_mode: bool) -> LogGuard {
    let mut logger_config = LoggerConfig::from_log_config(&config.logging);
    if let Some(level) = level {
        logger_config.level = level.to_string();
    }
    if dev_mode {
        logger_config.show_thread_ids = true;
        logger_config.show_file_line = true;
    }
    Logger::try_init(logger_config)
}

fn resolver_for(modules: &[ModuleDescriptor]) -> DependencyResolver {
    let mut resolver = DependencyResolver::new();
    for desc in modules {
        resolver.register_module(desc.clone());
    }
    resolver
}

/// 显示加载顺序
fn show_order(config: &OrchestratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = resolver_for(&config.modules);
    let order = resolver.resolve_load_order()?;

    println!();
    println!("加载顺序");
    println!("═══════════════════════════════════════");
    for (index, name) in order.iter().enumerate() {
        if let Some(desc) = resolver.descriptor(name) {
            println!(
                "  {:>3}. {:<20} 优先级 {:<5} 依赖 {:<16} {}",
                index + 1,
                desc.name,
                desc.priority,
                desc.required_module.as_deref().unwrap_or("-"),
                if desc.is_critical { "[关键]" } else { "" }
            );
        }
    }
    if order.is_empty() {
        println!("  (模块清单为空)");
    }
    println!("═══════════════════════════════════════");
    println!();
    Ok(())
}

/// 检查配置文件
async fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("检查配置文件: {}", path.display());
    println!();

    if !path.exists() {
        println!("⚠️  警告: 配置文件不存在，将使用默认配置");
        return Ok(());
    }

    let config = match OrchestratorConfig::from_file(path).await {
        Ok(config) => config,
        Err(e) => {
            println!("❌ 配置文件无效: {} [{}]", e, e.error_code());
            return Err(Box::new(e));
        }
    };

    if let Err(e) = config
        .validate()
        .and_then(|_| resolver_for(&config.modules).resolve_load_order().map(|_| ()))
    {
        println!("❌ 配置文件无效: {} [{}]", e, e.error_code());
        return Err(Box::new(e));
    }

    println!("✅ 配置文件有效！");
    println!();
    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  [日志配置]");
    println!("    日志级别:       {}", config.logging.level);
    println!("    文件输出:       {}", if config.logging.file_output { "是" } else { "否" });
    println!("    JSON 格式:      {}", if config.logging.json_format { "是" } else { "否" });
    println!();
    println!("  [生命周期配置]");
    println!("    启动超时:       {}", format_timeout(config.lifecycle.start_timeout_ms));
    println!("    停止超时:       {}", format_timeout(config.lifecycle.stop_timeout_ms));
    println!("    依赖失败策略:   {:?}", config.lifecycle.dependency_failure);
    println!();
    println!("  [模块清单]");
    println!("    模块数量:       {}", config.modules.len());
    println!("────────────────────────────────────────");
    Ok(())
}

fn format_timeout(value: Option<u64>) -> String {
    value.map(|ms| format!("{} ms", ms)).unwrap_or_else(|| "无".to_string())
}

/// 演练启动流程
async fn run_boot(config: OrchestratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let manager = LifecycleManager::with_config(config.lifecycle.clone());
    for desc in &config.modules {
        manager.register(FnModule::noop(desc.clone())).await?;
    }

    info!(count = config.modules.len(), "开始启动全部模块");
    manager.start_all().await?;
    print_states(&manager).await?;

    manager.stop_all().await?;
    info!("全部模块已停止");
    Ok(())
}

async fn print_states(manager: &LifecycleManager) -> Result<(), Box<dyn std::error::Error>> {
    let order = manager.load_order().await?;
    let states = manager.get_all_module_states().await;

    println!();
    println!("模块状态");
    println!("═══════════════════════════════════════");
    for name in &order {
        if let Some(reg) = states.get(name) {
            println!(
                "  {:<20} {:<8} {:<10} {}",
                name,
                reg.descriptor.version,
                reg.state,
                reg.last_state_change.format("%H:%M:%S%.3f")
            );
            if let Some(ref err) = reg.last_error {
                println!("      错误: {}", err);
            }
        }
    }
    println!("═══════════════════════════════════════");
    println!();
    Ok(())
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("Chips Orchestrator - 薯片模块编排器");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", chips_orchestrator::VERSION);
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            print_version();
        }

        // 检查配置文件不需要日志
        Some(Commands::CheckConfig { config }) => {
            let config_path = config.unwrap_or(cli.config);
            check_config(&config_path).await?;
        }

        Some(Commands::Order) => {
            let config = load_config(&cli.config).await?;
            let _guard = init_logging(&config, cli.log_level.as_deref(), cli.dev);
            show_order(&config)?;
        }

        // 默认命令：演练启动流程
        Some(Commands::Boot) | None => {
            let config = load_config(&cli.config).await?;
            let _guard = init_logging(&config, cli.log_level.as_deref(), cli.dev);
            run_boot(config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_config_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.yaml");

        let config = load_config(&path).await.unwrap();
        assert!(config.modules.is_empty());
        assert_eq!(config.logging.level, OrchestratorConfig::default().logging.level);
    }
}
