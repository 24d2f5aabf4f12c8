//! 通知（Advice）定义
//!
//! 通知是附着在切点上的带类型回调，按类型决定相对于目标方法的执行时机。
//! 每条通知可以携带自己的优先级，未设置时继承所属切面的优先级。

use crate::joinpoint::{AdviceResult, JoinPoint, ProceedingJoinPoint, Value};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdviceType {
    /// 前置通知：目标方法执行前，可修改参数
    Before,
    /// 后置通知：无论成功还是失败都执行，不能改变结果
    After,
    /// 返回后通知：成功返回时执行，可替换返回值
    AfterReturning,
    /// 异常通知：抛出错误时执行，可替换错误
    AfterThrowing,
    /// 环绕通知：完全控制目标方法的执行
    Around,
}

/// 前置通知 Trait
#[async_trait]
pub trait BeforeAdvice: Send + Sync {
    /// 通知名称（用于日志与 AdviceExecution 错误定位）
    fn name(&self) -> &str;

    /// 在目标方法执行前调用，可以通过连接点修改参数列表。
    /// 返回错误会跳过目标方法。
    async fn before(&self, join_point: &JoinPoint) -> anyhow::Result<()>;
}

/// 后置通知 Trait
#[async_trait]
pub trait AfterAdvice: Send + Sync {
    fn name(&self) -> &str;

    /// 在目标方法执行后调用（无论成功还是失败），不能改变结果。
    async fn after(&self, join_point: &JoinPoint) -> anyhow::Result<()>;
}

/// 返回后通知 Trait
#[async_trait]
pub trait AfterReturningAdvice: Send + Sync {
    fn name(&self) -> &str;

    /// 在目标方法成功返回后调用，返回值即后续各层看到的结果，
    /// 可以原样返回也可以替换。
    async fn after_returning(&self, join_point: &JoinPoint, result: Value)
        -> anyhow::Result<Value>;
}

/// 异常通知 Trait
#[async_trait]
pub trait AfterThrowingAdvice: Send + Sync {
    fn name(&self) -> &str;

    /// 在目标方法抛出错误时调用。
    /// `Ok(e)` 是继续向外传播的（可被替换的）错误，
    /// `Err` 表示通知自身失败，会被包装为 AdviceExecution。
    async fn after_throwing(
        &self,
        join_point: &JoinPoint,
        error: anyhow::Error,
    ) -> anyhow::Result<anyhow::Error>;
}

/// 环绕通知 Trait
#[async_trait]
pub trait AroundAdvice: Send + Sync {
    fn name(&self) -> &str;

    /// 完全控制目标方法的执行：可以不调用 `proceed()`（短路）、
    /// 调用一次，或调用多次（重试），也可以捕获/转换内层错误。
    async fn around(&self, pjp: ProceedingJoinPoint) -> AdviceResult;
}

// ============================================================================
// 闭包适配器
// ============================================================================

struct FnBefore<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F> BeforeAdvice for FnBefore<F>
where
    F: Fn(&JoinPoint) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn before(&self, join_point: &JoinPoint) -> anyhow::Result<()> {
        (self.func)(join_point)
    }
}

struct FnAfter<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F> AfterAdvice for FnAfter<F>
where
    F: Fn(&JoinPoint) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn after(&self, join_point: &JoinPoint) -> anyhow::Result<()> {
        (self.func)(join_point)
    }
}

struct FnAfterReturning<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F> AfterReturningAdvice for FnAfterReturning<F>
where
    F: Fn(&JoinPoint, Value) -> anyhow::Result<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn after_returning(
        &self,
        join_point: &JoinPoint,
        result: Value,
    ) -> anyhow::Result<Value> {
        (self.func)(join_point, result)
    }
}

struct FnAfterThrowing<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F> AfterThrowingAdvice for FnAfterThrowing<F>
where
    F: Fn(&JoinPoint, anyhow::Error) -> anyhow::Result<anyhow::Error> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn after_throwing(
        &self,
        join_point: &JoinPoint,
        error: anyhow::Error,
    ) -> anyhow::Result<anyhow::Error> {
        (self.func)(join_point, error)
    }
}

struct FnAround<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F> AroundAdvice for FnAround<F>
where
    F: Fn(ProceedingJoinPoint) -> BoxFuture<'static, AdviceResult> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn around(&self, pjp: ProceedingJoinPoint) -> AdviceResult {
        (self.func)(pjp).await
    }
}

// ============================================================================
// Advice：类型 + 回调 + 可选优先级
// ============================================================================

/// 通知回调
#[derive(Clone)]
pub enum AdviceKind {
    Before(Arc<dyn BeforeAdvice>),
    After(Arc<dyn AfterAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn AfterThrowingAdvice>),
    Around(Arc<dyn AroundAdvice>),
}

/// 通知：恰好一种类型的回调，加可选的优先级
///
/// 优先级未设置时使用所属切面的优先级；数值越小越先执行/包裹越外层。
#[derive(Clone)]
pub struct Advice {
    kind: AdviceKind,
    priority: Option<i32>,
}

impl Advice {
    /// 从前置通知实现创建
    pub fn before(advice: Arc<dyn BeforeAdvice>) -> Self {
        Self {
            kind: AdviceKind::Before(advice),
            priority: None,
        }
    }

    /// 从后置通知实现创建
    pub fn after(advice: Arc<dyn AfterAdvice>) -> Self {
        Self {
            kind: AdviceKind::After(advice),
            priority: None,
        }
    }

    /// 从返回后通知实现创建
    pub fn after_returning(advice: Arc<dyn AfterReturningAdvice>) -> Self {
        Self {
            kind: AdviceKind::AfterReturning(advice),
            priority: None,
        }
    }

    /// 从异常通知实现创建
    pub fn after_throwing(advice: Arc<dyn AfterThrowingAdvice>) -> Self {
        Self {
            kind: AdviceKind::AfterThrowing(advice),
            priority: None,
        }
    }

    /// 从环绕通知实现创建
    pub fn around(advice: Arc<dyn AroundAdvice>) -> Self {
        Self {
            kind: AdviceKind::Around(advice),
            priority: None,
        }
    }

    /// 用闭包创建前置通知
    pub fn before_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&JoinPoint) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::before(Arc::new(FnBefore {
            name: name.into(),
            func,
        }))
    }

    /// 用闭包创建后置通知
    pub fn after_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&JoinPoint) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::after(Arc::new(FnAfter {
            name: name.into(),
            func,
        }))
    }

    /// 用闭包创建返回后通知
    pub fn after_returning_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&JoinPoint, Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::after_returning(Arc::new(FnAfterReturning {
            name: name.into(),
            func,
        }))
    }

    /// 用闭包创建异常通知
    pub fn after_throwing_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&JoinPoint, anyhow::Error) -> anyhow::Result<anyhow::Error> + Send + Sync + 'static,
    {
        Self::after_throwing(Arc::new(FnAfterThrowing {
            name: name.into(),
            func,
        }))
    }

    /// 用返回 BoxFuture 的闭包创建环绕通知
    pub fn around_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(ProceedingJoinPoint) -> BoxFuture<'static, AdviceResult> + Send + Sync + 'static,
    {
        Self::around(Arc::new(FnAround {
            name: name.into(),
            func,
        }))
    }

    /// 设置通知级优先级（覆盖切面优先级）
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// 通知级优先级
    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    /// 通知类型
    pub fn advice_type(&self) -> AdviceType {
        match &self.kind {
            AdviceKind::Before(_) => AdviceType::Before,
            AdviceKind::After(_) => AdviceType::After,
            AdviceKind::AfterReturning(_) => AdviceType::AfterReturning,
            AdviceKind::AfterThrowing(_) => AdviceType::AfterThrowing,
            AdviceKind::Around(_) => AdviceType::Around,
        }
    }

    /// 通知名称
    pub fn name(&self) -> &str {
        match &self.kind {
            AdviceKind::Before(a) => a.name(),
            AdviceKind::After(a) => a.name(),
            AdviceKind::AfterReturning(a) => a.name(),
            AdviceKind::AfterThrowing(a) => a.name(),
            AdviceKind::Around(a) => a.name(),
        }
    }

    /// 回调本体
    pub fn kind(&self) -> &AdviceKind {
        &self.kind
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advice")
            .field("type", &self.advice_type())
            .field("name", &self.name())
            .field("priority", &self.priority)
            .finish()
    }
}
