//! 方法元数据（MethodDescriptor）能力契约
//!
//! Rust 没有运行时反射，方法的名称、所属类型、参数签名以及声明式标记
//! 通过显式注册表（ClassMetadata）提供。切点匹配与通知编排只依赖这里的
//! 数据结构，不关心元数据是手写的还是由宏生成的。

use serde::{Deserialize, Serialize};
use serde_json::Value as MarkerData;

/// 声明式标记（类似 Java 注解）
///
/// 标记是只读输入数据：引擎只负责用它做切点匹配，
/// 标记对应的实际行为由消费方注册的通知提供。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// 标记类型名，例如 "Audited"、"Cacheable"
    pub name: String,

    /// 标记携带的属性数据（可为空）
    #[serde(default)]
    pub data: MarkerData,
}

impl Marker {
    /// 创建不带属性数据的标记
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: MarkerData::Null,
        }
    }

    /// 附加属性数据
    pub fn with_data(mut self, data: MarkerData) -> Self {
        self.data = data;
        self
    }
}

/// 方法描述符
///
/// 一次可拦截方法的完整静态视图：方法名、所属类型名、参数签名，
/// 以及方法级和类型级的声明式标记。
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    class_name: String,
    method_name: String,
    param_types: Vec<String>,
    method_markers: Vec<Marker>,
    class_markers: Vec<Marker>,
}

impl MethodDescriptor {
    /// 创建新的方法描述符
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            param_types: Vec::new(),
            method_markers: Vec::new(),
            class_markers: Vec::new(),
        }
    }

    /// 设置参数类型签名
    pub fn with_params(mut self, params: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.param_types = params.into_iter().map(Into::into).collect();
        self
    }

    /// 附加方法级标记
    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.method_markers.push(marker);
        self
    }

    /// 附加类型级标记（通常由 ClassMetadata 在构建代理定义时合并进来）
    pub fn with_class_markers(mut self, markers: impl IntoIterator<Item = Marker>) -> Self {
        self.class_markers.extend(markers);
        self
    }

    /// 所属类型名
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// 方法名
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// 参数类型签名
    pub fn param_types(&self) -> &[String] {
        &self.param_types
    }

    /// 方法级标记
    pub fn method_markers(&self) -> &[Marker] {
        &self.method_markers
    }

    /// 类型级标记
    pub fn class_markers(&self) -> &[Marker] {
        &self.class_markers
    }

    /// 方法或其所属类型是否携带指定标记
    pub fn has_marker(&self, name: &str) -> bool {
        self.method_markers.iter().any(|m| m.name == name)
            || self.class_markers.iter().any(|m| m.name == name)
    }

    /// 查询标记的属性数据
    ///
    /// 方法级标记优先于类型级标记。
    pub fn marker_data(&self, name: &str) -> Option<&MarkerData> {
        self.method_markers
            .iter()
            .find(|m| m.name == name)
            .or_else(|| self.class_markers.iter().find(|m| m.name == name))
            .map(|m| &m.data)
    }

    /// 完整的方法签名，例如 `OrderRepository::save(Order)`
    pub fn signature(&self) -> String {
        format!(
            "{}::{}({})",
            self.class_name,
            self.method_name,
            self.param_types.join(", ")
        )
    }
}

impl std::fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// 类型元数据注册表
///
/// 一个可代理类型对外暴露的完整方法表。由目标类型（手写或宏生成）
/// 提供，ProxyFactory 据此构建并缓存代理定义。
#[derive(Debug, Clone)]
pub struct ClassMetadata {
    class_name: String,
    markers: Vec<Marker>,
    methods: Vec<MethodDescriptor>,
    sealed: bool,
}

impl ClassMetadata {
    /// 创建新的类型元数据
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            markers: Vec::new(),
            methods: Vec::new(),
            sealed: false,
        }
    }

    /// 附加类型级标记
    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// 注册一个方法
    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// 声明类型不可代理
    ///
    /// 对应宿主环境里"类型声明为不可扩展"的情况，
    /// ProxyFactory 遇到此标志会以 ProxyGeneration 错误拒绝。
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    /// 类型名
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// 类型级标记
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// 已注册的方法表
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// 类型是否声明为不可代理
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}
