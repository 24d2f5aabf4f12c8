//! Weaver AOP - 面向切面编程拦截引擎
//!
//! 让独立声明的横切行为（日志、缓存、事务、审计等）附着到任意方法调用上，
//! 而不修改被调用代码。提供：
//! - 切点匹配（方法模式、声明式标记、组合切点）
//! - 多种通知类型（Before、After、AfterReturning、AfterThrowing、Around）
//!   的确定性编排与洋葱式嵌套执行
//! - 连接点表示与可重入的 proceed()
//! - 基于装饰器的调用拦截代理
//!
//! 依赖注入容器、HTTP 栈和标记声明语法都是外部协作方；
//! 引擎只消费元数据，不硬编码任何业务行为。

pub mod advice;
pub mod aspect;
pub mod error;
pub mod invoker;
pub mod joinpoint;
pub mod method;
pub mod pointcut;
pub mod proxy;
pub mod registry;

// 重新导出核心类型
pub use advice::{
    Advice, AdviceKind, AdviceType, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice,
    AroundAdvice, BeforeAdvice,
};
pub use aspect::{AdviceEntry, Aspect, AspectRegistration};
pub use error::AopError;
pub use invoker::{MethodInvoker, TargetFn};
pub use joinpoint::{
    unpack, value, AdviceResult, JoinPoint, JoinPointState, Layer, ProceedingJoinPoint, Value,
};
pub use method::{ClassMetadata, Marker, MethodDescriptor};
pub use pointcut::{CompositeOp, NamePattern, Pointcut};
pub use proxy::{AopProxy, Interceptable, ProxyDefinition, ProxyFactory};
pub use registry::{get_global_registry, AdviceMatch, AspectRegistry};

// 导出 inventory 供宏使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::{
        Advice, AdviceType, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, AroundAdvice,
        BeforeAdvice,
    };
    pub use crate::aspect::{Aspect, AspectRegistration};
    pub use crate::error::AopError;
    pub use crate::invoker::{MethodInvoker, TargetFn};
    pub use crate::joinpoint::{
        unpack, value, AdviceResult, JoinPoint, JoinPointState, ProceedingJoinPoint, Value,
    };
    pub use crate::method::{ClassMetadata, Marker, MethodDescriptor};
    pub use crate::pointcut::Pointcut;
    pub use crate::proxy::{AopProxy, Interceptable, ProxyFactory};
    pub use crate::registry::{get_global_registry, AspectRegistry};
}
