//! 连接点（JoinPoint）定义
//!
//! 连接点是一次被拦截的方法调用：目标实例、方法描述符、
//! 可替换的参数列表以及调用状态。每次调用创建一个，调用结束即丢弃。

use crate::method::MethodDescriptor;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 类型擦除的参数/返回值
pub type Value = Box<dyn Any + Send + Sync>;

/// 通知链中流动的结果：返回值或业务错误
pub type AdviceResult = Result<Value, anyhow::Error>;

/// 调用链中的一层：可重复执行的内层调用
///
/// `ProceedingJoinPoint::proceed` 每次调用都会重新执行同一个预绑定的内层。
pub type Layer = Arc<dyn Fn() -> BoxFuture<'static, AdviceResult> + Send + Sync>;

/// 包装一个具体值为类型擦除的 [`Value`]
pub fn value<T: Send + Sync + 'static>(v: T) -> Value {
    Box::new(v)
}

/// 从类型擦除的 [`Value`] 还原具体类型
pub fn unpack<T: Send + Sync + 'static>(v: Value) -> anyhow::Result<T> {
    v.downcast::<T>().map(|b| *b).map_err(|_| {
        anyhow::anyhow!(
            "unexpected value type: expected {}",
            std::any::type_name::<T>()
        )
    })
}

/// 连接点状态
///
/// 状态只前进不后退：NotStarted → InProgress → Completed | Failed。
/// 短路的 Around 通知可能在从未 proceed 的情况下正常返回，
/// 因此允许 NotStarted 直接进入 Completed。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPointState {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl JoinPointState {
    fn is_terminal(self) -> bool {
        matches!(self, JoinPointState::Completed | JoinPointState::Failed)
    }
}

/// 连接点
///
/// 每次调用创建一次，被该调用的所有通知层共享。
/// 参数列表以整体替换的方式修改：`arguments()` 取快照，
/// `set_arguments()` 换入新列表，目标方法看到的是调用时刻的当前列表。
pub struct JoinPoint {
    method: Arc<MethodDescriptor>,
    target: Option<Arc<dyn Any + Send + Sync>>,
    args: Mutex<Arc<Vec<Value>>>,
    state: Mutex<JoinPointState>,
}

impl JoinPoint {
    /// 创建新的连接点
    pub fn new(
        method: Arc<MethodDescriptor>,
        target: Option<Arc<dyn Any + Send + Sync>>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            method,
            target,
            args: Mutex::new(Arc::new(args)),
            state: Mutex::new(JoinPointState::NotStarted),
        }
    }

    /// 方法描述符
    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    /// 目标实例（静态调用时为 None）
    pub fn target(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.target.as_ref()
    }

    /// 当前参数列表的快照
    pub fn arguments(&self) -> Arc<Vec<Value>> {
        self.args.lock().clone()
    }

    /// 整体替换参数列表
    pub fn set_arguments(&self, args: Vec<Value>) {
        *self.args.lock() = Arc::new(args);
    }

    /// 按下标读取一个参数的拷贝
    pub fn arg<T: Clone + Send + Sync + 'static>(&self, index: usize) -> Option<T> {
        self.args.lock().get(index)?.downcast_ref::<T>().cloned()
    }

    /// 当前调用状态
    pub fn state(&self) -> JoinPointState {
        *self.state.lock()
    }

    /// 完整的方法签名
    pub fn signature(&self) -> String {
        self.method.signature()
    }

    /// 进入执行：NotStarted → InProgress
    pub(crate) fn enter(&self) {
        let mut state = self.state.lock();
        if *state == JoinPointState::NotStarted {
            *state = JoinPointState::InProgress;
        }
    }

    /// 调用结束：进入终态，终态之间不再切换
    pub(crate) fn finish(&self, success: bool) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = if success {
                JoinPointState::Completed
            } else {
                JoinPointState::Failed
            };
        }
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("signature", &self.signature())
            .field("arg_count", &self.args.lock().len())
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// 环绕通知的执行句柄
///
/// 每个 Around 层拿到一个，绑定共享的连接点和该层的下一内层。
/// `proceed()` 可以调用零次（短路）、一次或多次（重试），
/// 每次调用都完整地重新执行同一个内层。
pub struct ProceedingJoinPoint {
    join_point: Arc<JoinPoint>,
    proceed_fn: Layer,
}

impl ProceedingJoinPoint {
    /// 创建环绕句柄
    pub fn new(join_point: Arc<JoinPoint>, proceed_fn: Layer) -> Self {
        Self {
            join_point,
            proceed_fn,
        }
    }

    /// 连接点信息
    pub fn join_point(&self) -> &Arc<JoinPoint> {
        &self.join_point
    }

    /// 执行下一内层
    pub async fn proceed(&self) -> AdviceResult {
        self.join_point.enter();
        (self.proceed_fn)().await
    }
}

impl fmt::Debug for ProceedingJoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedingJoinPoint")
            .field("join_point", &self.join_point)
            .finish()
    }
}
