//! 切面注册表
//!
//! 进程级的切面存储：负责按 id 管理切面，并为一次调用找出所有
//! 匹配的（切面, 切点, 通知）三元组。注册表只做匹配，
//! 排序和执行是 MethodInvoker 的职责。
//!
//! # 并发模型
//!
//! 参考设计假定单写者引导阶段：所有 `register` 在并发请求开始前完成。
//! 内部使用读写锁，运行期与在途调用并发的修改不会破坏内存安全，
//! 但语义上不受支持，除非调用方在外部自行加锁序列化。
//! 每次修改都会推进 epoch，供调用方的链缓存失效使用。

use crate::advice::{Advice, AdviceType};
use crate::aspect::Aspect;
use crate::error::AopError;
use crate::method::MethodDescriptor;
use crate::pointcut::Pointcut;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 全局 AOP 注册表
///
/// 首次访问时初始化，并加载所有通过 inventory 提交的切面。
static GLOBAL_ASPECT_REGISTRY: Lazy<Arc<AspectRegistry>> = Lazy::new(|| {
    let registry = AspectRegistry::new();
    registry.auto_load_aspects();
    Arc::new(registry)
});

/// 获取全局 AOP 注册表
///
/// 引擎自身不依赖全局状态：注册表总是以显式实例注入
/// MethodInvoker/ProxyFactory；这里只是给宿主的组装根提供一个
/// 现成的单例。
pub fn get_global_registry() -> &'static Arc<AspectRegistry> {
    &GLOBAL_ASPECT_REGISTRY
}

/// 一条匹配结果：（切面, 切点, 通知）三元组
///
/// 附带切面的注册序号与条目下标，供 MethodInvoker 做确定性排序。
#[derive(Debug, Clone)]
pub struct AdviceMatch {
    /// 通知所属的切面
    pub aspect: Arc<Aspect>,

    /// 命中的切点
    pub pointcut: Pointcut,

    /// 命中的通知
    pub advice: Advice,

    /// 切面的注册序号（单调递增，切面被移除后不复用）
    pub registration: usize,

    /// 条目在切面内的下标
    pub entry: usize,
}

impl AdviceMatch {
    /// 生效优先级：通知自带优先级，否则继承切面优先级
    pub fn effective_priority(&self) -> i32 {
        self.advice.priority().unwrap_or(self.aspect.priority())
    }
}

struct RegisteredAspect {
    aspect: Arc<Aspect>,
    sequence: usize,
}

struct RegistryInner {
    aspects: Vec<RegisteredAspect>,
    next_sequence: usize,
}

/// 切面注册表
pub struct AspectRegistry {
    inner: RwLock<RegistryInner>,
    epoch: AtomicU64,
}

impl AspectRegistry {
    /// 创建新的切面注册表
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                aspects: Vec::new(),
                next_sequence: 0,
            }),
            epoch: AtomicU64::new(0),
        }
    }

    /// 注册切面
    ///
    /// id 冲突时拒绝并返回 DuplicateAspect，不做静默覆盖。
    pub fn register(&self, aspect: Aspect) -> Result<(), AopError> {
        let mut inner = self.inner.write();
        if inner.aspects.iter().any(|r| r.aspect.id() == aspect.id()) {
            return Err(AopError::DuplicateAspect(aspect.id().to_string()));
        }

        tracing::debug!("Registering aspect: {}", aspect.id());
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.aspects.push(RegisteredAspect {
            aspect: Arc::new(aspect),
            sequence,
        });
        drop(inner);

        self.bump_epoch();
        Ok(())
    }

    /// 批量注册切面
    pub fn register_all(
        &self,
        aspects: impl IntoIterator<Item = Aspect>,
    ) -> Result<(), AopError> {
        for aspect in aspects {
            self.register(aspect)?;
        }
        Ok(())
    }

    /// 按 id 移除切面
    pub fn remove_aspect(&self, id: &str) -> Result<(), AopError> {
        let mut inner = self.inner.write();
        let position = inner
            .aspects
            .iter()
            .position(|r| r.aspect.id() == id)
            .ok_or_else(|| AopError::AspectNotFound(id.to_string()))?;
        inner.aspects.remove(position);
        drop(inner);

        tracing::debug!("Removed aspect: {}", id);
        self.bump_epoch();
        Ok(())
    }

    /// 清除所有切面
    pub fn clear(&self) {
        self.inner.write().aspects.clear();
        self.bump_epoch();
    }

    /// 找出匹配指定连接点的所有通知三元组
    ///
    /// 返回结果不排序：注册表只负责匹配，排序在 MethodInvoker 里做。
    pub fn find_matching_advices(
        &self,
        method: &MethodDescriptor,
        instance: Option<&(dyn Any + Send + Sync)>,
        type_filter: Option<AdviceType>,
    ) -> Vec<AdviceMatch> {
        let inner = self.inner.read();
        let mut matches = Vec::new();

        for registered in &inner.aspects {
            for (entry_index, entry) in registered.aspect.entries().iter().enumerate() {
                if let Some(filter) = type_filter {
                    if entry.advice.advice_type() != filter {
                        continue;
                    }
                }
                if entry.pointcut.matches(method, instance) {
                    matches.push(AdviceMatch {
                        aspect: registered.aspect.clone(),
                        pointcut: entry.pointcut.clone(),
                        advice: entry.advice.clone(),
                        registration: registered.sequence,
                        entry: entry_index,
                    });
                }
            }
        }

        matches
    }

    /// 当前 epoch
    ///
    /// 每次 register/remove_aspect/clear 都会推进；
    /// 解析好的调用链缓存以此判断是否失效。
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::Release);
    }

    /// 获取注册的切面数量
    pub fn len(&self) -> usize {
        self.inner.read().aspects.len()
    }

    /// 检查是否没有注册任何切面
    pub fn is_empty(&self) -> bool {
        self.inner.read().aspects.is_empty()
    }

    /// 从 inventory 自动加载所有提交的切面
    ///
    /// 扫描编译期提交的 AspectRegistration 并逐个注册。
    /// id 冲突的切面会被记录并跳过（引导阶段的重复提交属于装配错误）。
    pub fn auto_load_aspects(&self) -> usize {
        let registrations: Vec<_> = crate::aspect::get_all_aspect_registrations().collect();
        tracing::info!("Auto-loading {} aspect(s) from registry", registrations.len());

        let mut loaded = 0;
        for registration in registrations {
            tracing::debug!("  ├─ Loading aspect: {}", registration.name);
            match self.register(registration.create_instance()) {
                Ok(()) => loaded += 1,
                Err(err) => {
                    tracing::warn!("  ├─ Skipping aspect '{}': {}", registration.name, err);
                }
            }
        }

        tracing::info!("Auto-loaded {} aspect(s)", loaded);
        loaded
    }
}

impl Default for AspectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
