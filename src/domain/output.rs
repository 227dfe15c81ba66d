//! 延迟值
//!
//! 资源属性（容器 hostname、镜像 digest、卷名等）在声明时还不存在，
//! 只有上游资源真正创建之后才能得到。`Output` 把字面量和对其他资源属性的
//! 引用按顺序拼接起来，在 apply 阶段再统一解析。

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::resource::ResourceId;
use crate::error::ResolveError;
use crate::state::outputs::ResolvedOutputs;

/// 预览时替代密文的占位符
pub const SECRET_PLACEHOLDER: &str = "[secret]";

/// 资源可被引用的输出属性
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Id,
    Name,
    Hostname,
    Sha256Digest,
    RepoDigest,
    ImageName,
    Mountpoint,
    MetadataName,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Id => "id",
            Attribute::Name => "name",
            Attribute::Hostname => "hostname",
            Attribute::Sha256Digest => "sha256_digest",
            Attribute::RepoDigest => "repo_digest",
            Attribute::ImageName => "image_name",
            Attribute::Mountpoint => "mountpoint",
            Attribute::MetadataName => "metadata_name",
        }
    }
}

/// 对某个资源某个属性的引用
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputRef {
    pub resource: ResourceId,
    pub attr: Attribute,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Part {
    Literal(String),
    Ref(OutputRef),
}

/// 延迟解析的字符串值
///
/// 任何一个参与拼接的值是 secret，结果就是 secret。
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Output {
    parts: Vec<Part>,
    secret: bool,
}

impl Output {
    /// 普通字面量
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Literal(value.into())],
            secret: false,
        }
    }

    /// 已知但敏感的值（密码、token 等）
    pub fn secret(value: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Literal(value.into())],
            secret: true,
        }
    }

    /// 引用另一个资源的输出属性
    pub fn reference(resource: ResourceId, attr: Attribute) -> Self {
        Self {
            parts: vec![Part::Ref(OutputRef { resource, attr })],
            secret: false,
        }
    }

    pub fn is_secret(&self) -> bool {
        self.secret
    }

    /// 标记为 secret
    pub fn into_secret(mut self) -> Self {
        self.secret = true;
        self
    }

    /// 不包含任何引用，声明时即可知道具体值
    pub fn is_known(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Literal(_)))
    }

    /// 已知值；含引用时返回 None
    pub fn known_value(&self) -> Option<String> {
        if !self.is_known() {
            return None;
        }
        Some(
            self.parts
                .iter()
                .map(|p| match p {
                    Part::Literal(s) => s.as_str(),
                    Part::Ref(_) => "",
                })
                .collect(),
        )
    }

    /// 已知且为空字符串
    pub fn is_blank(&self) -> bool {
        self.known_value().map(|v| v.trim().is_empty()).unwrap_or(false)
    }

    /// 在末尾追加
    pub fn append(mut self, other: impl Into<Output>) -> Self {
        let other = other.into();
        self.secret |= other.secret;
        for part in other.parts {
            self.push(part);
        }
        self
    }

    /// 按顺序拼接多个值
    pub fn concat(items: impl IntoIterator<Item = Output>) -> Self {
        items
            .into_iter()
            .fold(Output::default(), |acc, item| acc.append(item))
    }

    /// 模板插值，`{}` 依次替换为参数
    ///
    /// 参数不足时剩余的 `{}` 原样保留；多余的参数被忽略。
    /// 一般通过 [`interpolate!`](crate::interpolate) 调用。
    pub fn interpolate(template: &str, args: &[&Output]) -> Self {
        let mut out = Output::default();
        let mut args = args.iter();
        let mut rest = template;

        while let Some(idx) = rest.find("{}") {
            match args.next() {
                Some(arg) => {
                    out = out.append(Output::literal(&rest[..idx]));
                    out = out.append((*arg).clone());
                }
                None => {
                    out = out.append(Output::literal(&rest[..idx + 2]));
                }
            }
            rest = &rest[idx + 2..];
        }
        out.append(Output::literal(rest))
    }

    /// 值中引用到的所有资源
    pub fn references(&self) -> BTreeSet<ResourceId> {
        self.refs().map(|r| r.resource.clone()).collect()
    }

    /// 值中的所有属性引用
    pub fn refs(&self) -> impl Iterator<Item = &OutputRef> {
        self.parts.iter().filter_map(|p| match p {
            Part::Ref(r) => Some(r),
            Part::Literal(_) => None,
        })
    }

    /// 使用已创建资源的输出解析为具体字符串
    pub fn resolve(&self, outputs: &ResolvedOutputs) -> Result<String, ResolveError> {
        let mut value = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(s) => value.push_str(s),
                Part::Ref(r) => {
                    let resolved = outputs.get(&r.resource, r.attr).ok_or_else(|| {
                        ResolveError::Unresolved {
                            resource: r.resource.clone(),
                            attr: r.attr,
                        }
                    })?;
                    value.push_str(resolved);
                }
            }
        }
        Ok(value)
    }

    /// 预览用的文本形式，引用显示为 `${name.attr}`
    pub fn render(&self, reveal_secrets: bool) -> String {
        if self.secret && !reveal_secrets {
            return SECRET_PLACEHOLDER.to_string();
        }
        self.parts
            .iter()
            .map(|p| match p {
                Part::Literal(s) => s.clone(),
                Part::Ref(r) => format!("${{{}.{}}}", r.resource.name(), r.attr.as_str()),
            })
            .collect()
    }

    fn push(&mut self, part: Part) {
        match part {
            Part::Literal(s) if s.is_empty() => {}
            Part::Literal(s) => {
                if let Some(Part::Literal(last)) = self.parts.last_mut() {
                    last.push_str(&s);
                } else {
                    self.parts.push(Part::Literal(s));
                }
            }
            part => self.parts.push(part),
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Output({:?})", self.render(false))
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

impl Serialize for Output {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.render(false))
    }
}

impl From<&str> for Output {
    fn from(value: &str) -> Self {
        Output::literal(value)
    }
}

impl From<String> for Output {
    fn from(value: String) -> Self {
        Output::literal(value)
    }
}

impl From<&String> for Output {
    fn from(value: &String) -> Self {
        Output::literal(value.clone())
    }
}

impl From<&Output> for Output {
    fn from(value: &Output) -> Self {
        value.clone()
    }
}

/// 模板插值
///
/// ```
/// use homelab_stack::{interpolate, domain::output::Output};
///
/// let password = Output::secret("hunter2");
/// let env = interpolate!("POSTGRES_PASSWORD={}", password);
/// assert!(env.is_secret());
/// ```
#[macro_export]
macro_rules! interpolate {
    ($template:expr $(,)?) => {
        $crate::domain::output::Output::literal($template)
    };
    ($template:expr, $($arg:expr),+ $(,)?) => {
        $crate::domain::output::Output::interpolate(
            $template,
            &[$(&$crate::domain::output::Output::from($arg)),+],
        )
    };
}
