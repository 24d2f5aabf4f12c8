//! 代理工厂（ProxyFactory）
//!
//! Rust 没有运行时动态代理，代理按装饰器建模：AopProxy 持有真实目标
//! 实例和 MethodInvoker 的引用，把每次调用路由进通知链，原类型不被修改。
//! 目标类型通过 [`Interceptable`] 暴露显式的方法元数据表和分发入口
//! （手写或由宏生成），工厂据此为每个目标类型构建并缓存一份代理定义。

use crate::error::AopError;
use crate::invoker::{MethodInvoker, TargetFn};
use crate::joinpoint::{AdviceResult, JoinPoint, Value};
use crate::method::{ClassMetadata, MethodDescriptor};
use crate::registry::AspectRegistry;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 可代理的目标类型
///
/// 两项能力：提供类型元数据表（方法名、参数签名、声明式标记），
/// 以及按方法名分发一次真实调用。参数以类型擦除快照传入，
/// 实现方负责 downcast。
#[async_trait]
pub trait Interceptable: Send + Sync + 'static {
    /// 类型元数据表
    fn class_metadata(&self) -> Arc<ClassMetadata>;

    /// 执行真实方法
    async fn invoke_method(&self, method_name: &str, args: Arc<Vec<Value>>) -> AdviceResult;
}

/// 每个目标类型一份的代理定义
///
/// 构建时校验元数据并把类型级标记合并进每个方法描述符，
/// 之后按方法名查找描述符是纯读操作。
pub struct ProxyDefinition {
    metadata: Arc<ClassMetadata>,
    methods: HashMap<String, Arc<MethodDescriptor>>,
}

impl ProxyDefinition {
    fn build(metadata: Arc<ClassMetadata>) -> Result<Self, AopError> {
        let class_name = metadata.class_name();

        if class_name.is_empty() {
            return Err(AopError::proxy_generation("<unnamed>", "empty class name"));
        }
        if metadata.is_sealed() {
            return Err(AopError::proxy_generation(
                class_name,
                "class is declared sealed and cannot be proxied",
            ));
        }
        if metadata.methods().is_empty() {
            return Err(AopError::proxy_generation(
                class_name,
                "no interceptable methods registered",
            ));
        }

        let mut methods = HashMap::new();
        for descriptor in metadata.methods() {
            let enriched = descriptor
                .clone()
                .with_class_markers(metadata.markers().to_vec());
            if methods
                .insert(descriptor.method_name().to_string(), Arc::new(enriched))
                .is_some()
            {
                return Err(AopError::proxy_generation(
                    class_name,
                    format!("duplicate method name '{}'", descriptor.method_name()),
                ));
            }
        }

        Ok(Self { metadata, methods })
    }

    /// 类型元数据
    pub fn metadata(&self) -> &Arc<ClassMetadata> {
        &self.metadata
    }

    /// 按方法名查找描述符（已合并类型级标记）
    pub fn method(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.get(name)
    }
}

/// AOP 代理
///
/// 目标实例的转发替身：每次 `call` 构建新的连接点并交给 MethodInvoker。
/// 没有匹配通知的方法由调用器直接转发，语义上等价于零通知调用链。
pub struct AopProxy<T: Interceptable> {
    target: Arc<T>,
    definition: Arc<ProxyDefinition>,
    invoker: Arc<MethodInvoker>,
}

impl<T: Interceptable> AopProxy<T> {
    /// 调用被代理的方法
    pub async fn call(&self, method_name: &str, args: Vec<Value>) -> AdviceResult {
        let descriptor = self.definition.method(method_name).ok_or_else(|| {
            AopError::MethodNotFound {
                class: self.definition.metadata().class_name().to_string(),
                method: method_name.to_string(),
            }
        })?;

        let join_point = Arc::new(JoinPoint::new(
            descriptor.clone(),
            Some(self.target.clone() as Arc<dyn Any + Send + Sync>),
            args,
        ));

        let target = self.target.clone();
        let name = descriptor.method_name().to_string();
        let target_fn: TargetFn = Arc::new(move |jp: Arc<JoinPoint>| {
            let target = target.clone();
            let name = name.clone();
            // 目标方法看到调用时刻的当前参数快照
            Box::pin(async move { target.invoke_method(&name, jp.arguments()).await })
        });

        self.invoker.invoke(join_point, target_fn).await
    }

    /// 被代理的真实实例
    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    /// 本代理使用的定义
    pub fn definition(&self) -> &Arc<ProxyDefinition> {
        &self.definition
    }
}

impl<T: Interceptable> fmt::Debug for AopProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AopProxy")
            .field("class", &self.definition.metadata().class_name())
            .field("methods", &self.definition.methods.len())
            .finish()
    }
}

/// 代理工厂
///
/// 每个目标类型只构建一次代理定义（按 TypeId 缓存），
/// 不可代理的类型以 ProxyGeneration 错误拒绝，绝不静默退回未代理实例。
pub struct ProxyFactory {
    invoker: Arc<MethodInvoker>,
    definitions: RwLock<HashMap<TypeId, Arc<ProxyDefinition>>>,
}

impl ProxyFactory {
    /// 用现成的调用器创建工厂
    pub fn new(invoker: Arc<MethodInvoker>) -> Self {
        Self {
            invoker,
            definitions: RwLock::new(HashMap::new()),
        }
    }

    /// 用注册表创建工厂（内部构建调用器）
    pub fn with_registry(registry: Arc<AspectRegistry>) -> Self {
        Self::new(Arc::new(MethodInvoker::new(registry)))
    }

    /// 为目标实例创建代理
    pub fn make_proxy<T: Interceptable>(&self, target: Arc<T>) -> Result<AopProxy<T>, AopError> {
        let definition = self.definition_for::<T>(&target)?;
        Ok(AopProxy {
            target,
            definition,
            invoker: self.invoker.clone(),
        })
    }

    fn definition_for<T: Interceptable>(
        &self,
        target: &Arc<T>,
    ) -> Result<Arc<ProxyDefinition>, AopError> {
        let type_id = TypeId::of::<T>();

        if let Some(definition) = self.definitions.read().get(&type_id) {
            return Ok(definition.clone());
        }

        let definition = Arc::new(ProxyDefinition::build(target.class_metadata())?);
        tracing::debug!(
            "Generated proxy definition for {} ({} method(s))",
            definition.metadata().class_name(),
            definition.methods.len()
        );

        Ok(self
            .definitions
            .write()
            .entry(type_id)
            .or_insert(definition)
            .clone())
    }
}
