//! 依赖解析与生命周期性能基准测试
//!
//! 使用 Criterion 框架进行性能测试，包括：
//! - 不同规模模块集合的加载顺序解析
//! - 长依赖链的传递依赖查询
//! - 批量启动/停止空钩子模块

use chips_orchestrator::module::DependencyResolver;
use chips_orchestrator::{FnModule, LifecycleManager, ModuleDescriptor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

// ============================================================================
// 测试辅助函数
// ============================================================================

/// 构造 `count` 个模块，每隔几个模块开始一条新依赖链
fn descriptors(count: usize) -> Vec<ModuleDescriptor> {
    (0..count)
        .map(|i| {
            let desc = ModuleDescriptor::new(format!("module_{}", i), "1.0.0")
                .with_priority((i % 7) as i32);
            if i % 5 == 0 {
                desc
            } else {
                desc.requires(format!("module_{}", i - 1))
            }
        })
        .collect()
}

fn resolver_with(descs: &[ModuleDescriptor]) -> DependencyResolver {
    let mut resolver = DependencyResolver::new();
    for desc in descs {
        resolver.register_module(desc.clone());
    }
    resolver
}

// ============================================================================
// 基准测试
// ============================================================================

fn bench_resolve_load_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_load_order");

    for size in [10usize, 100, 1000] {
        let resolver = resolver_with(&descriptors(size));
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &resolver, |b, resolver| {
            b.iter(|| black_box(resolver.resolve_load_order().unwrap()))
        });
    }

    group.finish();
}

fn bench_transitive_dependencies(c: &mut Criterion) {
    let chain: Vec<ModuleDescriptor> = (0..200)
        .map(|i| {
            let desc = ModuleDescriptor::new(format!("link_{}", i), "1.0.0");
            if i == 0 {
                desc
            } else {
                desc.requires(format!("link_{}", i - 1))
            }
        })
        .collect();
    let resolver = resolver_with(&chain);

    c.bench_function("transitive_dependencies_chain_200", |b| {
        b.iter(|| black_box(resolver.get_transitive_dependencies("link_199").unwrap()))
    });
}

fn bench_start_stop_all(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let descs = descriptors(100);

    c.bench_function("start_stop_all_100", |b| {
        b.to_async(&runtime).iter(|| {
            let descs = descs.clone();
            async move {
                let manager = LifecycleManager::new();
                for desc in descs {
                    manager.register(FnModule::noop(desc)).await.unwrap();
                }
                manager.start_all().await.unwrap();
                manager.stop_all().await.unwrap();
            }
        })
    });
}

criterion_group!(
    benches,
    bench_resolve_load_order,
    bench_transitive_dependencies,
    bench_start_stop_all
);
criterion_main!(benches);
