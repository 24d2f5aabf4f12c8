//! 方法调用器（MethodInvoker）
//!
//! 通知编排的核心：拿到一次调用的全部匹配通知后，
//! 按单一全序（生效优先级 → 切面注册序号 → 条目下标，均升序）排序，
//! 构建洋葱式嵌套调用链并执行。
//!
//! 调用链结构（由内向外）：
//! - 最内层是终端层：Before（升序）→ 目标方法 → 成功时 AfterReturning（升序，
//!   可替换返回值）+ After（升序）；失败时 AfterThrowing(升序，可替换错误) +
//!   After（无条件）→ 错误继续向外抛。
//! - Around 通知按优先级从高到低依次包裹，优先级最低的在最外层；
//!   每层拿到绑定了下一内层的 ProceedingJoinPoint。
//!
//! 固定的切面集合加固定的调用，执行顺序永远一致。

use crate::advice::{
    AdviceKind, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, AroundAdvice,
    BeforeAdvice,
};
use crate::error::AopError;
use crate::joinpoint::{AdviceResult, JoinPoint, Layer, ProceedingJoinPoint};
use crate::method::MethodDescriptor;
use crate::registry::{AdviceMatch, AspectRegistry};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// 目标方法调用：从连接点读取当前参数列表并执行真实方法
pub type TargetFn =
    Arc<dyn Fn(Arc<JoinPoint>) -> BoxFuture<'static, AdviceResult> + Send + Sync>;

/// 排好序、按类型分组后的一条通知
struct BoundAdvice<T: ?Sized> {
    aspect_id: String,
    advice_name: String,
    advice: Arc<T>,
}

/// 一次调用的通知分组（已排序）
struct AdviceGroups {
    arounds: Vec<BoundAdvice<dyn AroundAdvice>>,
    befores: Arc<Vec<BoundAdvice<dyn BeforeAdvice>>>,
    returnings: Arc<Vec<BoundAdvice<dyn AfterReturningAdvice>>>,
    throwings: Arc<Vec<BoundAdvice<dyn AfterThrowingAdvice>>>,
    afters: Arc<Vec<BoundAdvice<dyn AfterAdvice>>>,
}

struct CachedPlan {
    epoch: u64,
    matches: Arc<Vec<AdviceMatch>>,
}

/// 方法调用器
///
/// 每个调用使用自己的连接点和调用链，调用之间没有共享可变状态。
/// 按方法签名缓存解析好的匹配列表，注册表 epoch 变化时重新计算。
pub struct MethodInvoker {
    registry: Arc<AspectRegistry>,
    plans: RwLock<HashMap<String, CachedPlan>>,
}

impl MethodInvoker {
    /// 创建新的方法调用器
    pub fn new(registry: Arc<AspectRegistry>) -> Self {
        Self {
            registry,
            plans: RwLock::new(HashMap::new()),
        }
    }

    /// 所属的注册表
    pub fn registry(&self) -> &Arc<AspectRegistry> {
        &self.registry
    }

    /// 执行一次被拦截的调用
    ///
    /// 没有任何匹配通知时直接调用目标方法，等价于零通知的退化调用链。
    pub async fn invoke(&self, join_point: Arc<JoinPoint>, target: TargetFn) -> AdviceResult {
        let matches = self.resolved_matches(
            join_point.method(),
            join_point.target().map(|t| t.as_ref()),
        );

        if matches.is_empty() {
            tracing::trace!("No matching advice for {}, calling target directly", join_point);
            join_point.enter();
            let result = target(join_point.clone()).await;
            join_point.finish(result.is_ok());
            return result;
        }

        let groups = Self::group_advices(&matches);
        let mut layer = Self::terminal_layer(join_point.clone(), target, &groups);

        // Around 按优先级从高到低包裹，最低优先级成为最外层
        for bound in groups.arounds.into_iter().rev() {
            let jp = join_point.clone();
            let inner = layer.clone();
            let advice = bound.advice;
            layer = Arc::new(move || {
                let pjp = ProceedingJoinPoint::new(jp.clone(), inner.clone());
                let advice = advice.clone();
                Box::pin(async move { advice.around(pjp).await })
            });
        }

        let result = layer().await;
        join_point.finish(result.is_ok());
        result
    }

    /// 解析并缓存一次调用的匹配列表（已按单一全序排序）
    fn resolved_matches(
        &self,
        method: &MethodDescriptor,
        instance: Option<&(dyn Any + Send + Sync)>,
    ) -> Arc<Vec<AdviceMatch>> {
        let epoch = self.registry.epoch();
        let signature = method.signature();

        if let Some(plan) = self.plans.read().get(&signature) {
            if plan.epoch == epoch {
                return plan.matches.clone();
            }
        }

        let mut matches = self.registry.find_matching_advices(method, instance, None);
        matches.sort_by_key(|m| (m.effective_priority(), m.registration, m.entry));
        let matches = Arc::new(matches);

        self.plans.write().insert(
            signature,
            CachedPlan {
                epoch,
                matches: matches.clone(),
            },
        );
        matches
    }

    fn group_advices(matches: &[AdviceMatch]) -> AdviceGroups {
        let mut arounds = Vec::new();
        let mut befores = Vec::new();
        let mut returnings = Vec::new();
        let mut throwings = Vec::new();
        let mut afters = Vec::new();

        for m in matches {
            let aspect_id = m.aspect.id().to_string();
            let advice_name = m.advice.name().to_string();
            match m.advice.kind() {
                AdviceKind::Around(a) => arounds.push(BoundAdvice {
                    aspect_id,
                    advice_name,
                    advice: a.clone(),
                }),
                AdviceKind::Before(a) => befores.push(BoundAdvice {
                    aspect_id,
                    advice_name,
                    advice: a.clone(),
                }),
                AdviceKind::AfterReturning(a) => returnings.push(BoundAdvice {
                    aspect_id,
                    advice_name,
                    advice: a.clone(),
                }),
                AdviceKind::AfterThrowing(a) => throwings.push(BoundAdvice {
                    aspect_id,
                    advice_name,
                    advice: a.clone(),
                }),
                AdviceKind::After(a) => afters.push(BoundAdvice {
                    aspect_id,
                    advice_name,
                    advice: a.clone(),
                }),
            }
        }

        AdviceGroups {
            arounds,
            befores: Arc::new(befores),
            returnings: Arc::new(returnings),
            throwings: Arc::new(throwings),
            afters: Arc::new(afters),
        }
    }

    fn terminal_layer(join_point: Arc<JoinPoint>, target: TargetFn, groups: &AdviceGroups) -> Layer {
        let befores = groups.befores.clone();
        let returnings = groups.returnings.clone();
        let throwings = groups.throwings.clone();
        let afters = groups.afters.clone();

        Arc::new(move || {
            let jp = join_point.clone();
            let target = target.clone();
            let befores = befores.clone();
            let returnings = returnings.clone();
            let throwings = throwings.clone();
            let afters = afters.clone();
            Box::pin(async move {
                Self::run_terminal(jp, target, &befores, &returnings, &throwings, &afters).await
            })
        })
    }

    /// 终端层：Before → 目标方法 → AfterReturning/AfterThrowing → After
    async fn run_terminal(
        jp: Arc<JoinPoint>,
        target: TargetFn,
        befores: &[BoundAdvice<dyn BeforeAdvice>],
        returnings: &[BoundAdvice<dyn AfterReturningAdvice>],
        throwings: &[BoundAdvice<dyn AfterThrowingAdvice>],
        afters: &[BoundAdvice<dyn AfterAdvice>],
    ) -> AdviceResult {
        jp.enter();

        // 前置通知：出错则跳过目标方法，走失败路径
        for bound in befores {
            if let Err(err) = bound.advice.before(&jp).await {
                let err: anyhow::Error =
                    AopError::advice_execution(&bound.aspect_id, &bound.advice_name, err).into();
                return Self::run_failure_path(&jp, err, throwings, afters).await;
            }
        }

        // 目标方法：使用当前（可能被前置通知修改过的）参数
        match target(jp.clone()).await {
            Ok(mut value) => {
                // 返回后通知：逐个执行，替换后的值对后续通知可见
                for bound in returnings {
                    match bound.advice.after_returning(&jp, value).await {
                        Ok(replacement) => value = replacement,
                        Err(err) => {
                            let err: anyhow::Error = AopError::advice_execution(
                                &bound.aspect_id,
                                &bound.advice_name,
                                err,
                            )
                            .into();
                            if let Some(after_err) = Self::run_after_advices(&jp, afters).await {
                                tracing::error!(
                                    "After advice failed while unwinding {}: {}",
                                    jp,
                                    after_err
                                );
                            }
                            return Err(err);
                        }
                    }
                }

                match Self::run_after_advices(&jp, afters).await {
                    None => Ok(value),
                    Some(err) => Err(err),
                }
            }
            Err(err) => Self::run_failure_path(&jp, err, throwings, afters).await,
        }
    }

    /// 失败路径：AfterThrowing（可替换错误）→ After（无条件）→ 抛出最终错误
    async fn run_failure_path(
        jp: &Arc<JoinPoint>,
        mut err: anyhow::Error,
        throwings: &[BoundAdvice<dyn AfterThrowingAdvice>],
        afters: &[BoundAdvice<dyn AfterAdvice>],
    ) -> AdviceResult {
        for bound in throwings {
            match bound.advice.after_throwing(jp, err).await {
                Ok(replacement) => err = replacement,
                Err(own) => {
                    // 通知自身失败：包装后成为当前错误，继续向后传
                    err = AopError::advice_execution(&bound.aspect_id, &bound.advice_name, own)
                        .into();
                }
            }
        }

        if let Some(after_err) = Self::run_after_advices(jp, afters).await {
            // 主错误优先传播，后置通知的失败记录日志而非覆盖
            tracing::error!("After advice failed while unwinding {}: {}", jp, after_err);
        }

        Err(err)
    }

    /// 执行全部后置通知
    ///
    /// 全部执行完后返回第一个自身失败（已包装），后续失败记录日志。
    async fn run_after_advices(
        jp: &Arc<JoinPoint>,
        afters: &[BoundAdvice<dyn AfterAdvice>],
    ) -> Option<anyhow::Error> {
        let mut first = None;
        for bound in afters {
            if let Err(err) = bound.advice.after(jp).await {
                let wrapped: anyhow::Error =
                    AopError::advice_execution(&bound.aspect_id, &bound.advice_name, err).into();
                if first.is_none() {
                    first = Some(wrapped);
                } else {
                    tracing::error!("Additional After advice failure in {}: {}", jp, wrapped);
                }
            }
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::aspect::Aspect;
    use crate::joinpoint::{unpack, value, JoinPointState};
    use crate::method::MethodDescriptor;
    use crate::pointcut::Pointcut;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn new_log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    /// 初始化测试日志输出（重复调用安全）
    fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("weaver_aop=trace")
            .with_test_writer()
            .try_init();
    }

    fn save_join_point(arg: u32) -> Arc<JoinPoint> {
        Arc::new(JoinPoint::new(
            Arc::new(MethodDescriptor::new("OrderRepository", "save").with_params(["u32"])),
            None,
            vec![value(arg)],
        ))
    }

    /// 目标方法：记录调用并返回 参数+1
    fn recording_target(log: Log) -> TargetFn {
        Arc::new(move |jp: Arc<JoinPoint>| {
            let log = log.clone();
            Box::pin(async move {
                let n = jp.arg::<u32>(0).unwrap_or(0);
                log.lock().push(format!("target({})", n));
                Ok(value(n + 1))
            })
        })
    }

    fn failing_target(log: Log) -> TargetFn {
        Arc::new(move |_jp: Arc<JoinPoint>| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().push("target".to_string());
                Err(anyhow::anyhow!("boom"))
            })
        })
    }

    fn logging_before(log: Log, label: &str) -> Advice {
        let label = label.to_string();
        Advice::before_fn(label.clone(), move |_| {
            log.lock().push(label.clone());
            Ok(())
        })
    }

    fn logging_after(log: Log, label: &str) -> Advice {
        let label = label.to_string();
        Advice::after_fn(label.clone(), move |_| {
            log.lock().push(label.clone());
            Ok(())
        })
    }

    fn logging_around(log: Log, label: &str) -> Advice {
        let label = label.to_string();
        Advice::around_fn(label.clone(), move |pjp| {
            let log = log.clone();
            let label = label.clone();
            Box::pin(async move {
                log.lock().push(format!("{}:pre", label));
                let result = pjp.proceed().await;
                log.lock().push(format!("{}:post", label));
                result
            })
        })
    }

    fn invoker_with(aspects: Vec<Aspect>) -> (Arc<AspectRegistry>, MethodInvoker) {
        let registry = Arc::new(AspectRegistry::new());
        for aspect in aspects {
            registry.register(aspect).unwrap();
        }
        let invoker = MethodInvoker::new(registry.clone());
        (registry, invoker)
    }

    #[tokio::test]
    async fn test_zero_advice_direct_call() {
        let log = new_log();
        let (_registry, invoker) = invoker_with(vec![]);
        let jp = save_join_point(1);

        let result = invoker.invoke(jp.clone(), recording_target(log.clone())).await;
        assert_eq!(unpack::<u32>(result.unwrap()).unwrap(), 2);
        assert_eq!(*log.lock(), vec!["target(1)"]);
        assert_eq!(jp.state(), JoinPointState::Completed);
    }

    #[tokio::test]
    async fn test_before_mutation_reaches_target() {
        let log = new_log();
        let aspect = Aspect::new("Mutate").advise(
            Pointcut::method("save"),
            Advice::before_fn("bump_arg", |jp| {
                let n = jp.arg::<u32>(0).unwrap_or(0);
                jp.set_arguments(vec![value(n + 100)]);
                Ok(())
            }),
        );
        let (_registry, invoker) = invoker_with(vec![aspect]);

        let result = invoker
            .invoke(save_join_point(1), recording_target(log.clone()))
            .await;
        assert_eq!(unpack::<u32>(result.unwrap()).unwrap(), 102);
        assert_eq!(*log.lock(), vec!["target(101)"]);
    }

    #[tokio::test]
    async fn test_after_returning_substitution_is_chained() {
        let log = new_log();
        let aspect = Aspect::new("Sub")
            .advise(
                Pointcut::method("save"),
                Advice::after_returning_fn("double", |_, r| {
                    let n = unpack::<u32>(r)?;
                    Ok(value(n * 2))
                })
                .with_priority(1),
            )
            .advise(
                Pointcut::method("save"),
                Advice::after_returning_fn("add_one", |_, r| {
                    let n = unpack::<u32>(r)?;
                    Ok(value(n + 1))
                })
                .with_priority(2),
            );
        let (_registry, invoker) = invoker_with(vec![aspect]);

        // target(1) = 2, double = 4, add_one = 5；后续通知看到替换后的值
        let result = invoker
            .invoke(save_join_point(1), recording_target(log))
            .await;
        assert_eq!(unpack::<u32>(result.unwrap()).unwrap(), 5);
    }

    #[tokio::test]
    async fn test_around_nesting_lower_priority_wraps_outer() {
        let log = new_log();
        let a = Aspect::new("A").advise(
            Pointcut::method("save"),
            logging_around(log.clone(), "A").with_priority(1),
        );
        let b = Aspect::new("B").advise(
            Pointcut::method("save"),
            logging_around(log.clone(), "B").with_priority(2),
        );
        let (_registry, invoker) = invoker_with(vec![a, b]);

        invoker
            .invoke(save_join_point(1), recording_target(log.clone()))
            .await
            .unwrap();
        assert_eq!(
            *log.lock(),
            vec!["A:pre", "B:pre", "target(1)", "B:post", "A:post"]
        );
    }

    #[tokio::test]
    async fn test_equal_priority_ties_break_by_registration_order() {
        let log = new_log();
        let x = Aspect::new("X").with_priority(5).advise(
            Pointcut::method("save"),
            logging_before(log.clone(), "X"),
        );
        let y = Aspect::new("Y").with_priority(5).advise(
            Pointcut::method("save"),
            logging_before(log.clone(), "Y"),
        );
        let (_registry, invoker) = invoker_with(vec![x, y]);

        invoker
            .invoke(save_join_point(1), recording_target(log.clone()))
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["X", "Y", "target(1)"]);
    }

    #[tokio::test]
    async fn test_execution_order_is_deterministic() {
        let log = new_log();
        let aspect = Aspect::new("Mix")
            .advise(Pointcut::method("save"), logging_around(log.clone(), "around"))
            .advise(Pointcut::method("save"), logging_before(log.clone(), "before"))
            .advise(Pointcut::method("save"), logging_after(log.clone(), "after"));
        let (_registry, invoker) = invoker_with(vec![aspect]);

        let mut runs = Vec::new();
        for i in 0..3 {
            log.lock().clear();
            invoker
                .invoke(save_join_point(i), recording_target(log.clone()))
                .await
                .unwrap();
            let mut events = log.lock().clone();
            // 参数不同导致 target 行不同，归一化后比较顺序
            for event in &mut events {
                if event.starts_with("target(") {
                    *event = "target".to_string();
                }
            }
            runs.push(events);
        }
        assert_eq!(runs[0], runs[1]);
        assert_eq!(runs[1], runs[2]);
        assert_eq!(
            runs[0],
            vec!["around:pre", "before", "target", "after", "around:post"]
        );
    }

    #[tokio::test]
    async fn test_around_short_circuit_skips_target() {
        let log = new_log();
        let aspect = Aspect::new("Breaker").advise(
            Pointcut::method("save"),
            Advice::around_fn("short_circuit", |_pjp| {
                Box::pin(async move { Ok(value(0u32)) })
            }),
        );
        let (_registry, invoker) = invoker_with(vec![aspect]);

        let jp = save_join_point(1);
        let result = invoker.invoke(jp.clone(), recording_target(log.clone())).await;
        assert_eq!(unpack::<u32>(result.unwrap()).unwrap(), 0);
        assert!(log.lock().is_empty());
        // proceed 从未被调用，调用仍然正常结束
        assert_eq!(jp.state(), JoinPointState::Completed);
    }

    #[tokio::test]
    async fn test_around_retry_reexecutes_inner_layer() {
        let log = new_log();
        let aspect = Aspect::new("Retry").advise(
            Pointcut::method("save"),
            Advice::around_fn("retry_twice", |pjp| {
                Box::pin(async move {
                    let first = pjp.proceed().await?;
                    drop(first);
                    pjp.proceed().await
                })
            }),
        );
        let (_registry, invoker) = invoker_with(vec![aspect]);

        invoker
            .invoke(save_join_point(1), recording_target(log.clone()))
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["target(1)", "target(1)"]);
    }

    #[tokio::test]
    async fn test_after_throwing_substitutes_error() {
        let log = new_log();
        let aspect = Aspect::new("Rewrite")
            .advise(
                Pointcut::method("save"),
                Advice::after_throwing_fn("replace", |_, _original| {
                    Ok(anyhow::anyhow!("replaced"))
                }),
            )
            .advise(Pointcut::method("save"), logging_after(log.clone(), "after"));
        let (_registry, invoker) = invoker_with(vec![aspect]);

        let jp = save_join_point(1);
        let err = invoker
            .invoke(jp.clone(), failing_target(log.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "replaced");
        assert_eq!(*log.lock(), vec!["target", "after"]);
        assert_eq!(jp.state(), JoinPointState::Failed);
    }

    #[tokio::test]
    async fn test_before_error_skips_target_but_after_still_runs() {
        let log = new_log();
        let aspect = Aspect::new("Guard")
            .advise(
                Pointcut::method("save"),
                Advice::before_fn("reject", |_| Err(anyhow::anyhow!("denied"))),
            )
            .advise(Pointcut::method("save"), logging_after(log.clone(), "after"));
        let (_registry, invoker) = invoker_with(vec![aspect]);

        let jp = save_join_point(1);
        let err = invoker
            .invoke(jp.clone(), recording_target(log.clone()))
            .await
            .unwrap_err();

        // 目标方法未执行，After 仍执行一次
        assert_eq!(*log.lock(), vec!["after"]);
        assert_eq!(jp.state(), JoinPointState::Failed);

        // 前置通知自身的失败被包装为 AdviceExecution
        match err.downcast_ref::<AopError>() {
            Some(AopError::AdviceExecution { aspect, advice, .. }) => {
                assert_eq!(aspect, "Guard");
                assert_eq!(advice, "reject");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_after_returning_own_failure_skips_rest_but_after_still_runs() {
        let log = new_log();
        let skipped = log.clone();
        let aspect = Aspect::new("Returning")
            .advise(
                Pointcut::method("save"),
                Advice::after_returning_fn("broken", |_, _| Err(anyhow::anyhow!("own failure")))
                    .with_priority(1),
            )
            .advise(
                Pointcut::method("save"),
                Advice::after_returning_fn("skipped", move |_, r| {
                    skipped.lock().push("skipped".to_string());
                    Ok(r)
                })
                .with_priority(2),
            )
            .advise(Pointcut::method("save"), logging_after(log.clone(), "after"));
        let (_registry, invoker) = invoker_with(vec![aspect]);

        let jp = save_join_point(1);
        let err = invoker
            .invoke(jp.clone(), recording_target(log.clone()))
            .await
            .unwrap_err();

        // 后续 AfterReturning 被跳过，After 仍执行，错误被包装
        assert_eq!(*log.lock(), vec!["target(1)", "after"]);
        assert_eq!(jp.state(), JoinPointState::Failed);
        match err.downcast_ref::<AopError>() {
            Some(AopError::AdviceExecution { aspect, advice, .. }) => {
                assert_eq!(aspect, "Returning");
                assert_eq!(advice, "broken");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_after_throwing_own_failure_becomes_current_error() {
        let log = new_log();
        let observed = log.clone();
        let aspect = Aspect::new("Throwing")
            .advise(
                Pointcut::method("save"),
                Advice::after_throwing_fn("explode", |_, _| Err(anyhow::anyhow!("own failure")))
                    .with_priority(1),
            )
            .advise(
                Pointcut::method("save"),
                Advice::after_throwing_fn("observe", move |_, error| {
                    // 后续异常通知看到的是前一条通知被包装后的自身失败
                    if matches!(
                        error.downcast_ref::<AopError>(),
                        Some(AopError::AdviceExecution { .. })
                    ) {
                        observed.lock().push("saw_wrapped".to_string());
                    }
                    Ok(error)
                })
                .with_priority(2),
            );
        let (_registry, invoker) = invoker_with(vec![aspect]);

        let err = invoker
            .invoke(save_join_point(1), failing_target(log.clone()))
            .await
            .unwrap_err();

        assert!(log.lock().contains(&"saw_wrapped".to_string()));
        match err.downcast_ref::<AopError>() {
            Some(AopError::AdviceExecution { aspect, advice, .. }) => {
                assert_eq!(aspect, "Throwing");
                assert_eq!(advice, "explode");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_after_own_failure_on_success_path_propagates() {
        init_test_logging();
        let log = new_log();
        let aspect = Aspect::new("Finish")
            .advise(
                Pointcut::method("save"),
                Advice::after_fn("broken", |_| Err(anyhow::anyhow!("after failure")))
                    .with_priority(1),
            )
            .advise(
                Pointcut::method("save"),
                logging_after(log.clone(), "second").with_priority(2),
            );
        let (_registry, invoker) = invoker_with(vec![aspect]);

        let jp = save_join_point(1);
        let err = invoker
            .invoke(jp.clone(), recording_target(log.clone()))
            .await
            .unwrap_err();

        // 第一条 After 失败后剩余 After 仍执行，成功调用随之变为失败
        assert_eq!(*log.lock(), vec!["target(1)", "second"]);
        assert_eq!(jp.state(), JoinPointState::Failed);
        match err.downcast_ref::<AopError>() {
            Some(AopError::AdviceExecution { aspect, advice, .. }) => {
                assert_eq!(aspect, "Finish");
                assert_eq!(advice, "broken");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_after_own_failure_on_failure_path_keeps_primary_error() {
        init_test_logging();
        let log = new_log();
        let aspect = Aspect::new("Unwind").advise(
            Pointcut::method("save"),
            Advice::after_fn("broken", |_| Err(anyhow::anyhow!("after failure"))),
        );
        let (_registry, invoker) = invoker_with(vec![aspect]);

        // 目标方法的错误优先传播，After 的自身失败只记录日志
        let err = invoker
            .invoke(save_join_point(1), failing_target(log))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_after_runs_exactly_once_on_success_and_failure() {
        let log = new_log();
        let aspect = Aspect::new("Count").advise(
            Pointcut::method("save"),
            logging_after(log.clone(), "after"),
        );
        let (_registry, invoker) = invoker_with(vec![aspect]);

        invoker
            .invoke(save_join_point(1), recording_target(log.clone()))
            .await
            .unwrap();
        assert_eq!(log.lock().iter().filter(|e| *e == "after").count(), 1);

        log.lock().clear();
        invoker
            .invoke(save_join_point(1), failing_target(log.clone()))
            .await
            .unwrap_err();
        assert_eq!(log.lock().iter().filter(|e| *e == "after").count(), 1);
    }

    #[tokio::test]
    async fn test_around_observes_after_returning_substitution() {
        let log = new_log();
        let aspect = Aspect::new("Layered")
            .advise(
                Pointcut::method("save"),
                Advice::around_fn("observe", |pjp| {
                    Box::pin(async move {
                        let result = pjp.proceed().await?;
                        let n = unpack::<u32>(result)?;
                        Ok(value(n + 1000))
                    })
                }),
            )
            .advise(
                Pointcut::method("save"),
                Advice::after_returning_fn("double", |_, r| {
                    let n = unpack::<u32>(r)?;
                    Ok(value(n * 2))
                }),
            );
        let (_registry, invoker) = invoker_with(vec![aspect]);

        // target(1)=2, AfterReturning 替换为 4，Around 的 proceed() 观察到 4
        let result = invoker
            .invoke(save_join_point(1), recording_target(log))
            .await;
        assert_eq!(unpack::<u32>(result.unwrap()).unwrap(), 1004);
    }

    #[tokio::test]
    async fn test_audit_scenario_register_then_remove() {
        let log = new_log();
        let audit = Aspect::new("Audit").with_priority(10).advise(
            Pointcut::execution("*Repository", "save*"),
            logging_around(log.clone(), "audit"),
        );
        let (registry, invoker) = invoker_with(vec![audit]);

        invoker
            .invoke(save_join_point(1), recording_target(log.clone()))
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["audit:pre", "target(1)", "audit:post"]);

        // 移除后，下一次调用直接执行，没有任何包裹（链缓存随 epoch 失效）
        registry.remove_aspect("Audit").unwrap();
        log.lock().clear();
        invoker
            .invoke(save_join_point(1), recording_target(log.clone()))
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["target(1)"]);
    }

    #[tokio::test]
    async fn test_plan_cache_invalidated_by_registration() {
        let log = new_log();
        let (registry, invoker) = invoker_with(vec![]);

        invoker
            .invoke(save_join_point(1), recording_target(log.clone()))
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["target(1)"]);

        registry
            .register(Aspect::new("Late").advise(
                Pointcut::method("save"),
                logging_before(log.clone(), "late"),
            ))
            .unwrap();

        log.lock().clear();
        invoker
            .invoke(save_join_point(1), recording_target(log.clone()))
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["late", "target(1)"]);
    }
}
