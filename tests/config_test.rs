//! 配置加载集成测试
//!
//! 测试从 YAML/JSON 文件加载编排器配置，并用模块清单引导生命周期管理器

use chips_orchestrator::{
    CoreError, DependencyFailurePolicy, FnModule, LifecycleManager, LoggerConfig,
    ModuleState, OrchestratorConfig, RotationStrategy,
};
use tempfile::TempDir;

const MANIFEST_YAML: &str = r#"
logging:
  level: debug
  json_format: true
  rotation: hourly
lifecycle:
  start_timeout_ms: 1000
  dependency_failure: abort
modules:
  - name: Reporting
    version: "2.0.0"
    required_module: Auth
  - name: Auth
    priority: 1
    critical: true
  - name: Search
    priority: 50
"#;

/// 测试完整的 YAML 加载与引导流程
#[tokio::test]
async fn test_yaml_manifest_bootstrap() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("orchestrator.yaml");
    tokio::fs::write(&path, MANIFEST_YAML).await.unwrap();

    let config = OrchestratorConfig::from_file(&path).await.unwrap();
    config.validate().unwrap();
    assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(config.lifecycle.dependency_failure, DependencyFailurePolicy::Abort);
    assert_eq!(config.modules.len(), 3);

    let logger_config = LoggerConfig::from_log_config(&config.logging);
    assert_eq!(logger_config.level, "debug");
    assert!(logger_config.json_format);
    assert_eq!(logger_config.rotation, RotationStrategy::Hourly);
    assert!(logger_config.file_output.is_none());

    let manager = LifecycleManager::with_config(config.lifecycle.clone());
    for desc in &config.modules {
        manager.register(FnModule::noop(desc.clone())).await.unwrap();
    }

    assert_eq!(
        manager.load_order().await.unwrap(),
        vec!["Auth", "Search", "Reporting"]
    );

    manager.start_all().await.unwrap();
    assert_eq!(manager.get_modules_by_state(ModuleState::Loaded).await.len(), 3);

    manager.stop_all().await.unwrap();
    assert_eq!(manager.get_modules_by_state(ModuleState::NotLoaded).await.len(), 3);
}

/// JSON 按扩展名识别
#[tokio::test]
async fn test_json_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("orchestrator.json");
    let json = serde_json::json!({
        "lifecycle": { "stop_timeout_ms": 500 },
        "modules": [
            { "name": "Auth", "priority": 1 },
            { "name": "Reporting", "required_module": "Auth", "is_critical": true }
        ]
    });
    tokio::fs::write(&path, serde_json::to_string_pretty(&json).unwrap())
        .await
        .unwrap();

    let config = OrchestratorConfig::from_file(&path).await.unwrap();
    assert_eq!(config.lifecycle.stop_timeout_ms, Some(500));
    assert_eq!(config.lifecycle.dependency_failure, DependencyFailurePolicy::Proceed);
    assert_eq!(config.logging.level, "info");
    assert!(config.modules[1].is_critical);
    assert_eq!(config.modules[1].version, "0.0.0");
}

#[tokio::test]
async fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = OrchestratorConfig::from_file(temp_dir.path().join("missing.yaml")).await;
    assert!(matches!(result, Err(CoreError::ConfigLoadFailed(_))));
}

#[tokio::test]
async fn test_malformed_yaml() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.yaml");
    tokio::fs::write(&path, "modules: [ { name: Auth, priority: high } ]")
        .await
        .unwrap();

    let err = OrchestratorConfig::from_file(&path).await.unwrap_err();
    assert!(matches!(err, CoreError::Yaml(_)));
    assert_eq!(err.error_code(), "CONFIG-001");
}

/// 清单中的依赖错误在解析阶段报告，而不是在加载配置时
#[tokio::test]
async fn test_manifest_with_unknown_dependency() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("orchestrator.yaml");
    tokio::fs::write(
        &path,
        "modules:\n  - name: Reporting\n    required_module: Ledger\n",
    )
    .await
    .unwrap();

    let config = OrchestratorConfig::from_file(&path).await.unwrap();
    assert!(config.validate().is_ok());

    let manager = LifecycleManager::with_config(config.lifecycle.clone());
    for desc in &config.modules {
        manager.register(FnModule::noop(desc.clone())).await.unwrap();
    }
    assert!(matches!(
        manager.start_all().await,
        Err(CoreError::DependencyNotFound { .. })
    ));
}
