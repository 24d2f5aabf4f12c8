//! AOP 引擎的错误类型
//!
//! 引擎自身的错误与目标方法抛出的业务错误严格区分：
//! 业务错误以 `anyhow::Error` 的形式在通知链中穿透传递，
//! 引擎错误使用下面的枚举，可以通过 downcast 恢复。

use thiserror::Error;

/// AOP 引擎错误
#[derive(Debug, Error)]
pub enum AopError {
    /// 切点表达式格式错误
    #[error("invalid pointcut expression '{expression}': {reason}")]
    PointcutParse {
        expression: String,
        reason: String,
    },

    /// 切面 id 冲突（注册表拒绝覆盖已有切面）
    #[error("aspect '{0}' is already registered")]
    DuplicateAspect(String),

    /// 按 id 查找/移除切面失败
    #[error("aspect '{0}' is not registered")]
    AspectNotFound(String),

    /// 目标类型无法被代理
    #[error("cannot generate proxy for '{class}': {reason}")]
    ProxyGeneration {
        class: String,
        reason: String,
    },

    /// 方法未在目标类的元数据表中注册
    #[error("method '{method}' is not registered on '{class}'")]
    MethodNotFound {
        class: String,
        method: String,
    },

    /// 通知自身执行失败
    ///
    /// 用于区分"通知代码出错"和"目标方法出错"两种情况。
    /// Around 通知的自身错误不做包装，按目标错误同样的路径向外传播。
    #[error("advice '{advice}' of aspect '{aspect}' failed: {source}")]
    AdviceExecution {
        aspect: String,
        advice: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AopError {
    /// 构造切点解析错误
    pub fn pointcut_parse(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        AopError::PointcutParse {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    /// 构造代理生成错误
    pub fn proxy_generation(class: impl Into<String>, reason: impl Into<String>) -> Self {
        AopError::ProxyGeneration {
            class: class.into(),
            reason: reason.into(),
        }
    }

    /// 包装通知自身的失败
    pub fn advice_execution(
        aspect: impl Into<String>,
        advice: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        AopError::AdviceExecution {
            aspect: aspect.into(),
            advice: advice.into(),
            source,
        }
    }
}
