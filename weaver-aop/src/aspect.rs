//! 切面（Aspect）定义
//!
//! 切面是横切关注点的模块化：一个带唯一 id 和优先级的
//! （切点, 通知）条目集合。切面在启动阶段构建并注册，之后不可变。

use crate::advice::Advice;
use crate::pointcut::Pointcut;

/// 切面中的一个条目
#[derive(Debug, Clone)]
pub struct AdviceEntry {
    /// 决定通知适用范围的切点
    pub pointcut: Pointcut,

    /// 通知本体
    pub advice: Advice,
}

/// 切面
///
/// id 在注册表内唯一且不可变；优先级数值越小，
/// 通知越先执行/包裹越外层（通知自带优先级时覆盖切面优先级）。
#[derive(Debug, Clone)]
pub struct Aspect {
    id: String,
    priority: i32,
    entries: Vec<AdviceEntry>,
}

impl Aspect {
    /// 创建新的切面，默认优先级 0
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            entries: Vec::new(),
        }
    }

    /// 设置切面优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// 追加一个（切点, 通知）条目
    pub fn advise(mut self, pointcut: Pointcut, advice: Advice) -> Self {
        self.entries.push(AdviceEntry { pointcut, advice });
        self
    }

    /// 切面 id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 切面优先级
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// 所有条目
    pub fn entries(&self) -> &[AdviceEntry] {
        &self.entries
    }
}

/// 切面注册器
///
/// 用于 inventory 自动收集切面：消费方在编译期提交一个构造函数，
/// 注册表启动时统一加载。与手动 `register` 等价，只是省去装配代码。
pub struct AspectRegistration {
    /// 切面名称（用于日志）
    pub name: &'static str,

    /// 创建切面实例的函数
    pub creator: fn() -> Aspect,
}

impl AspectRegistration {
    /// 创建新的切面注册器
    pub const fn new(name: &'static str, creator: fn() -> Aspect) -> Self {
        Self { name, creator }
    }

    /// 创建切面实例
    pub fn create_instance(&self) -> Aspect {
        (self.creator)()
    }
}

// 使用 inventory 收集所有切面注册器
inventory::collect!(AspectRegistration);

/// 获取所有注册的切面注册器
pub fn get_all_aspect_registrations() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>()
}
