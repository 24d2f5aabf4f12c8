//! 切点（Pointcut）表达式系统
//!
//! 切点是作用在（方法描述符, 可选目标实例）上的纯谓词，
//! 决定一条通知适用于哪些连接点。匹配无状态：相同输入永远得到相同结果。

use crate::error::AopError;
use crate::method::MethodDescriptor;
use regex::Regex;
use std::any::Any;

/// 支持 `*` 通配符的名称模式
///
/// 支持的模式：
/// - `*` - 匹配任意字符串
/// - `save*` - 以 save 开头
/// - `*Repository` - 以 Repository 结尾
/// - `*Service*` - 包含 Service
///
/// 不含通配符时要求完全相等。通配符在构造时编译为锚定正则，
/// 其余字符按字面量转义。
#[derive(Debug, Clone)]
pub struct NamePattern {
    raw: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    /// 无通配符：完全相等
    Exact,
    /// 含通配符：锚定正则
    Wildcard(Regex),
    /// 通配符编译失败：永不匹配
    ///
    /// 实践中不可达（见 [`NamePattern::new`] 的不变量），
    /// 保留此分支是为了不把失败静默回退成字面量比较。
    Never,
}

impl NamePattern {
    /// 编译名称模式
    ///
    /// 通配符模式由转义后的字面量段以 `.*` 连接并加 `^`/`$` 锚定而成，
    /// 结果必然是合法正则；编译失败不可达，万一发生会记录日志并按
    /// 永不匹配处理。
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let matcher = if raw.contains('*') {
            let mut pattern = String::from("^");
            for (i, segment) in raw.split('*').enumerate() {
                if i > 0 {
                    pattern.push_str(".*");
                }
                pattern.push_str(&regex::escape(segment));
            }
            pattern.push('$');
            match Regex::new(&pattern) {
                Ok(regex) => Matcher::Wildcard(regex),
                Err(err) => {
                    tracing::error!("Failed to compile wildcard pattern '{}': {}", raw, err);
                    Matcher::Never
                }
            }
        } else {
            Matcher::Exact
        };

        Self { raw, matcher }
    }

    /// 原始模式字符串
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// 检查目标名称是否匹配
    pub fn matches(&self, target: &str) -> bool {
        match &self.matcher {
            Matcher::Exact => self.raw == target,
            Matcher::Wildcard(regex) => regex.is_match(target),
            Matcher::Never => false,
        }
    }
}

/// 组合切点的运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    /// 所有子切点都匹配
    And,
    /// 至少一个子切点匹配
    Or,
}

/// 切点表达式
#[derive(Debug, Clone)]
pub enum Pointcut {
    /// 按方法名（可选加所属类型名）匹配
    ///
    /// 例如：MethodPattern("save*", Some("*Repository"))
    MethodPattern {
        method: NamePattern,
        class: Option<NamePattern>,
    },

    /// 按声明式标记匹配
    ///
    /// 方法自身携带标记，或其所属类型携带标记时匹配。
    Annotation { marker: String },

    /// 组合切点
    ///
    /// 空子列表永远不匹配（fail-closed）。
    Composite {
        op: CompositeOp,
        children: Vec<Pointcut>,
    },
}

impl Pointcut {
    /// 仅按方法名匹配
    pub fn method(pattern: impl Into<String>) -> Self {
        Pointcut::MethodPattern {
            method: NamePattern::new(pattern),
            class: None,
        }
    }

    /// 按类型名和方法名匹配
    ///
    /// 例如：execution("*Repository", "save*")
    pub fn execution(class: impl Into<String>, method: impl Into<String>) -> Self {
        Pointcut::MethodPattern {
            method: NamePattern::new(method),
            class: Some(NamePattern::new(class)),
        }
    }

    /// 按声明式标记匹配
    pub fn annotation(marker: impl Into<String>) -> Self {
        Pointcut::Annotation {
            marker: marker.into(),
        }
    }

    /// 与运算
    pub fn and(self, other: Pointcut) -> Self {
        Pointcut::Composite {
            op: CompositeOp::And,
            children: vec![self, other],
        }
    }

    /// 或运算
    pub fn or(self, other: Pointcut) -> Self {
        Pointcut::Composite {
            op: CompositeOp::Or,
            children: vec![self, other],
        }
    }

    /// 所有子切点都匹配时才匹配
    pub fn all_of(children: Vec<Pointcut>) -> Self {
        Pointcut::Composite {
            op: CompositeOp::And,
            children,
        }
    }

    /// 任一子切点匹配即匹配
    pub fn any_of(children: Vec<Pointcut>) -> Self {
        Pointcut::Composite {
            op: CompositeOp::Or,
            children,
        }
    }

    /// 解析切点表达式
    ///
    /// 支持的格式：
    /// - `"ClassPattern.methodPattern"` - 类型加方法模式，例如 `"*Repository.save*"`
    /// - `"methodPattern"` - 仅方法模式，例如 `"save*"`
    /// - `"@Marker"` - 标记切点，例如 `"@Audited"`
    ///
    /// 方法部分允许携带 `(..)` 后缀，解析时忽略。
    pub fn parse(expression: &str) -> Result<Pointcut, AopError> {
        let expr = expression.trim();

        if expr.is_empty() {
            return Err(AopError::pointcut_parse(expression, "empty expression"));
        }
        if expr.chars().any(char::is_whitespace) {
            return Err(AopError::pointcut_parse(
                expression,
                "unexpected whitespace",
            ));
        }

        if let Some(marker) = expr.strip_prefix('@') {
            if marker.is_empty() {
                return Err(AopError::pointcut_parse(expression, "empty marker name"));
            }
            if !marker.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return Err(AopError::pointcut_parse(
                    expression,
                    "marker name must be an identifier",
                ));
            }
            return Ok(Pointcut::annotation(marker));
        }

        if let Some((class_pattern, method_pattern)) = expr.split_once('.') {
            let method_pattern = method_pattern.trim_end_matches("(..)");
            if class_pattern.is_empty() || method_pattern.is_empty() {
                return Err(AopError::pointcut_parse(
                    expression,
                    "class and method patterns must both be non-empty",
                ));
            }
            return Ok(Pointcut::execution(class_pattern, method_pattern));
        }

        let method_pattern = expr.trim_end_matches("(..)");
        if method_pattern.is_empty() {
            return Err(AopError::pointcut_parse(expression, "empty method pattern"));
        }
        Ok(Pointcut::method(method_pattern))
    }

    /// 检查连接点是否匹配
    ///
    /// 纯函数：不修改任何状态，相同输入永远返回相同结果。
    /// `instance` 是可选的目标实例，内建切点不检查它，但它属于匹配契约，
    /// 留给未来的实例敏感切点使用。
    pub fn matches(
        &self,
        method: &MethodDescriptor,
        instance: Option<&(dyn Any + Send + Sync)>,
    ) -> bool {
        match self {
            Pointcut::MethodPattern {
                method: method_pattern,
                class,
            } => {
                if !method_pattern.matches(method.method_name()) {
                    return false;
                }
                match class {
                    Some(class_pattern) => class_pattern.matches(method.class_name()),
                    None => true,
                }
            }

            Pointcut::Annotation { marker } => method.has_marker(marker),

            Pointcut::Composite { op, children } => {
                if children.is_empty() {
                    // fail-closed
                    return false;
                }
                match op {
                    CompositeOp::And => children.iter().all(|c| c.matches(method, instance)),
                    CompositeOp::Or => children.iter().any(|c| c.matches(method, instance)),
                }
            }
        }
    }
}
