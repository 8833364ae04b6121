//! 可热重建的 Runner 句柄
//!
//! Runner = 一棵不可变的 AgentTree + 模型后端。get() 返回当前快照，回合开始时取一次并用到回合结束；
//! rebuild() 在锁外完成合并 / 校验 / 构建，只在替换指针时持写锁。失败时旧 Runner 保持不变。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::agents::{AgentRegistry, AgentTree, RouterBuilder};
use crate::core::RegistryError;
use crate::llm::ModelBackend;

/// 一次构建的产物（不可变）
pub struct Runner {
    pub tree: Arc<AgentTree>,
    pub backend: Arc<dyn ModelBackend>,
    /// 构建序号，从 1 开始
    pub generation: u64,
    pub built_at: DateTime<Utc>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("generation", &self.generation)
            .field("agents", &self.tree.len())
            .field("backend", &self.backend.name())
            .field("built_at", &self.built_at)
            .finish()
    }
}

/// 当前 Runner 的共享句柄
pub struct RunnerHandle {
    registry: AgentRegistry,
    router_builder: RouterBuilder,
    backend: Arc<dyn ModelBackend>,
    current: RwLock<Arc<Runner>>,
    /// 串行化重建，避免较早开始的重建覆盖较新的结果
    rebuild_lock: Mutex<()>,
    generation: AtomicU64,
}

impl RunnerHandle {
    /// 构建首个 Runner；Agent 集合不合法时启动失败
    pub async fn new(
        registry: AgentRegistry,
        router_builder: RouterBuilder,
        backend: Arc<dyn ModelBackend>,
    ) -> Result<Self, RegistryError> {
        let first = build_runner(&registry, &router_builder, &backend, 1).await?;
        tracing::info!(
            "Runner ready: {} agent(s), generation 1",
            first.tree.len()
        );
        Ok(Self {
            registry,
            router_builder,
            backend,
            current: RwLock::new(Arc::new(first)),
            rebuild_lock: Mutex::new(()),
            generation: AtomicU64::new(1),
        })
    }

    /// 当前快照
    pub async fn get(&self) -> Arc<Runner> {
        self.current.read().await.clone()
    }

    /// 重新合并并替换；失败时保留旧 Runner 并返回错误
    pub async fn rebuild(&self) -> Result<Arc<Runner>, RegistryError> {
        let _serial = self.rebuild_lock.lock().await;
        let generation = self.generation.load(Ordering::SeqCst) + 1;

        let runner = match build_runner(&self.registry, &self.router_builder, &self.backend, generation).await {
            Ok(r) => Arc::new(r),
            Err(e) => {
                tracing::error!("Runner rebuild failed, keeping previous agent set: {}", e);
                return Err(e);
            }
        };

        *self.current.write().await = runner.clone();
        self.generation.store(generation, Ordering::SeqCst);
        tracing::info!(
            "Runner rebuilt: generation {}, agents [{}]",
            generation,
            runner
                .tree
                .agents()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(runner)
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

async fn build_runner(
    registry: &AgentRegistry,
    router_builder: &RouterBuilder,
    backend: &Arc<dyn ModelBackend>,
    generation: u64,
) -> Result<Runner, RegistryError> {
    let merged = registry.merged_agents().await?;
    let router = router_builder.build(&merged.specialists, &merged.fallback);
    Ok(Runner {
        tree: Arc::new(AgentTree::new(router, merged)),
        backend: backend.clone(),
        generation,
        built_at: Utc::now(),
    })
}
