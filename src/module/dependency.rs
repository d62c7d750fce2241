//! 模块依赖管理
//!
//! 本模块提供模块依赖关系的图结构和解析器。
//!
//! # 主要组件
//!
//! - [`DependencyGraph`] - 依赖关系图，按需从描述快照重建，不做持久化
//! - [`DependencyResolver`] - 依赖解析器，持有描述登记表并计算加载顺序
//!
//! # 示例
//!
//! ```rust
//! use chips_orchestrator::module::dependency::DependencyResolver;
//! use chips_orchestrator::module::ModuleDescriptor;
//!
//! let mut resolver = DependencyResolver::new();
//! resolver.register_module(ModuleDescriptor::new("Reporting", "1.0.0").with_priority(100).requires("Auth"));
//! resolver.register_module(ModuleDescriptor::new("Auth", "1.0.0").with_priority(1));
//!
//! assert_eq!(resolver.resolve_load_order().unwrap(), vec!["Auth", "Reporting"]);
//! ```

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::module::metadata::ModuleDescriptor;
use crate::utils::{CoreError, Result};

/// 排序键：(优先级, 登记序号)
type OrderKey = (i32, usize);

/// 模块依赖关系图
///
/// 节点为模块，边由 `required_module` 指向被依赖方。
/// 节点保留登记顺序，保证环检测与拓扑排序的结果在相同输入下完全一致。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 按登记顺序排列的节点
    nodes: Vec<String>,
    /// 节点排序键
    keys: HashMap<String, OrderKey>,
    /// 正向边：模块 -> 该模块依赖的模块列表
    edges: HashMap<String, Vec<String>>,
    /// 反向边：模块 -> 依赖该模块的模块列表
    reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// 创建一个空的依赖图
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加模块节点，已存在时不重复添加
    pub fn add_module(&mut self, module: &str, priority: i32) {
        if self.keys.contains_key(module) {
            return;
        }
        let seq = self.nodes.len();
        self.nodes.push(module.to_string());
        self.keys.insert(module.to_string(), (priority, seq));
        self.edges.entry(module.to_string()).or_default();
        self.reverse_edges.entry(module.to_string()).or_default();
    }

    /// 添加依赖关系：`module` 依赖于 `dependency`
    ///
    /// 两端节点都必须已经通过 [`add_module`](Self::add_module) 加入。
    pub fn add_dependency(&mut self, module: &str, dependency: &str) {
        if let Some(deps) = self.edges.get_mut(module) {
            if !deps.iter().any(|d| d == dependency) {
                deps.push(dependency.to_string());
            }
        }
        if let Some(dependents) = self.reverse_edges.get_mut(dependency) {
            if !dependents.iter().any(|d| d == module) {
                dependents.push(module.to_string());
            }
        }
    }

    /// 获取模块的直接依赖
    pub fn get_dependencies(&self, module: &str) -> Vec<String> {
        self.edges.get(module).cloned().unwrap_or_default()
    }

    /// 获取直接依赖该模块的模块
    pub fn get_dependents(&self, module: &str) -> Vec<String> {
        self.reverse_edges.get(module).cloned().unwrap_or_default()
    }

    /// 图中模块数量
    pub fn module_count(&self) -> usize {
        self.nodes.len()
    }

    /// 查找循环依赖路径
    ///
    /// 按登记顺序做深度优先搜索，返回首个发现的环（首尾为同一模块）。
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();

        for node in &self.nodes {
            if let Some(cycle) = self.find_cycle_util(node, &mut visited, &mut on_stack, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn find_cycle_util(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        on_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if on_stack.contains(node) {
            let start = path.iter().position(|n| n == node).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        if !visited.insert(node.to_string()) {
            return None;
        }

        on_stack.insert(node.to_string());
        path.push(node.to_string());

        for neighbor in self.edges.get(node).into_iter().flatten() {
            if let Some(cycle) = self.find_cycle_util(neighbor, visited, on_stack, path) {
                return Some(cycle);
            }
        }

        path.pop();
        on_stack.remove(node);
        None
    }

    /// 拓扑排序（Kahn 算法）
    ///
    /// 就绪集合按 `(优先级, 登记顺序)` 取最小者，被依赖方总是排在依赖方之前。
    ///
    /// # 错误
    ///
    /// 存在循环依赖时返回 `CoreError::CyclicDependency`。
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        if let Some(path) = self.find_cycle() {
            return Err(CoreError::CyclicDependency { path });
        }

        // 入度 = 该模块依赖的模块数
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), self.edges.get(n).map_or(0, Vec::len)))
            .collect();

        let mut ready: BinaryHeap<Reverse<(OrderKey, &str)>> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&node, _)| Reverse((self.keys[node], node)))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, node))) = ready.pop() {
            result.push(node.to_string());

            for dependent in self.reverse_edges.get(node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse((self.keys[dependent.as_str()], dependent.as_str())));
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            let path = self
                .nodes
                .iter()
                .filter(|n| !result.contains(*n))
                .cloned()
                .collect();
            return Err(CoreError::CyclicDependency { path });
        }

        Ok(result)
    }
}

/// 登记表条目
#[derive(Debug, Clone)]
struct Registered {
    seq: usize,
    descriptor: ModuleDescriptor,
}

/// 依赖解析器
///
/// 持有模块描述登记表，按需推导加载顺序；除登记表外不持有可变状态。
/// 登记不会触发排序，排序在请求时惰性计算。
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    descriptors: HashMap<String, Registered>,
    next_seq: usize,
}

impl DependencyResolver {
    /// 创建空的解析器
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记或替换模块描述
    ///
    /// 替换时保留首次登记的顺序，用于优先级相同时的稳定排序。
    /// 返回被替换的旧描述。
    pub fn register_module(&mut self, descriptor: ModuleDescriptor) -> Option<ModuleDescriptor> {
        match self.descriptors.get_mut(&descriptor.name) {
            Some(existing) => Some(std::mem::replace(&mut existing.descriptor, descriptor)),
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.descriptors
                    .insert(descriptor.name.clone(), Registered { seq, descriptor });
                None
            }
        }
    }

    /// 已登记的描述数量
    pub fn module_count(&self) -> usize {
        self.descriptors.len()
    }

    /// 是否已登记
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// 获取模块描述
    pub fn descriptor(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.descriptors.get(name).map(|r| &r.descriptor)
    }

    /// 按登记顺序返回所有描述
    pub fn descriptors(&self) -> Vec<&ModuleDescriptor> {
        let mut entries: Vec<&Registered> = self.descriptors.values().collect();
        entries.sort_by_key(|r| r.seq);
        entries.into_iter().map(|r| &r.descriptor).collect()
    }

    /// 校验引用完整性并构建依赖图
    ///
    /// 1. 每个 `required_module` 必须已登记
    /// 2. 依赖链不得成环
    pub fn build_dependency_graph(&self) -> Result<DependencyGraph> {
        let ordered = self.descriptors();

        for desc in &ordered {
            if let Some(ref dep) = desc.required_module {
                if !self.descriptors.contains_key(dep) {
                    return Err(CoreError::DependencyNotFound {
                        module: desc.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut graph = DependencyGraph::new();
        for desc in &ordered {
            graph.add_module(&desc.name, desc.priority);
        }
        for desc in &ordered {
            if let Some(ref dep) = desc.required_module {
                graph.add_dependency(&desc.name, dep);
            }
        }

        if let Some(path) = graph.find_cycle() {
            return Err(CoreError::CyclicDependency { path });
        }

        Ok(graph)
    }

    /// 计算完整的加载顺序
    ///
    /// # 错误
    ///
    /// - `CoreError::DependencyNotFound` - 依赖模块未登记
    /// - `CoreError::CyclicDependency` - 存在循环依赖
    pub fn resolve_load_order(&self) -> Result<Vec<String>> {
        self.build_dependency_graph()?.topological_sort()
    }

    /// 卸载顺序（加载顺序的反序）
    pub fn get_unload_order(&self) -> Result<Vec<String>> {
        let mut order = self.resolve_load_order()?;
        order.reverse();
        Ok(order)
    }

    /// 获取模块的传递依赖链
    ///
    /// 沿 `required_module` 向根方向遍历，返回按启动顺序排列的链：
    /// 根依赖在前，`name` 本身在最后。
    ///
    /// # 错误
    ///
    /// - `CoreError::ModuleNotFound` - `name` 未登记
    /// - `CoreError::DependencyNotFound` - 链上某个依赖未登记
    /// - `CoreError::CyclicDependency` - 链上重复访问了同一模块
    pub fn get_transitive_dependencies(&self, name: &str) -> Result<Vec<String>> {
        let mut current = self
            .descriptor(name)
            .ok_or_else(|| CoreError::ModuleNotFound(name.to_string()))?;
        let mut chain = vec![name.to_string()];

        while let Some(ref dep) = current.required_module {
            if let Some(pos) = chain.iter().position(|n| n == dep) {
                let mut path = chain[pos..].to_vec();
                path.push(dep.clone());
                return Err(CoreError::CyclicDependency { path });
            }
            current = self.descriptor(dep).ok_or_else(|| CoreError::DependencyNotFound {
                module: current.name.clone(),
                dependency: dep.clone(),
            })?;
            chain.push(dep.clone());
        }

        chain.reverse();
        Ok(chain)
    }

    /// 获取直接依赖该模块的模块（按登记顺序）
    pub fn get_dependents(&self, name: &str) -> Vec<String> {
        self.descriptors()
            .into_iter()
            .filter(|d| d.required_module.as_deref() == Some(name))
            .map(|d| d.name.clone())
            .collect()
    }
}
