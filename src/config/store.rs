//! 分层键值配置
//!
//! TOML 文件中的嵌套表被展开为点分键（`[sftp] host = ".."` → `sftp.host`），
//! 环境变量 `HOMELAB_<SECTION>_<KEY>` 覆盖文件中的值。

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::env::constants::ENV_PREFIX;
use crate::domain::output::Output;
use crate::error::ConfigError;

#[derive(Clone, Debug, PartialEq)]
enum Value {
    Scalar(String),
    List(Vec<String>),
}

/// 配置存储
#[derive(Clone, Debug, Default)]
pub struct ConfigStore {
    values: BTreeMap<String, Value>,
    overrides: BTreeMap<String, String>,
}

impl ConfigStore {
    /// 从文件加载，并应用当前进程的环境变量覆盖
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), keys = store.values.len(), "Config loaded");
        Ok(store.with_env_overrides(std::env::vars()))
    }

    /// 文件不存在时退化为只读环境变量
    pub fn load_or_env(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }
        tracing::warn!(path = %path.display(), "Config file not found, using environment only");
        Ok(Self::default().with_env_overrides(std::env::vars()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let table: toml::Table = content.parse()?;
        let mut values = BTreeMap::new();
        flatten(None, &table, &mut values);
        Ok(Self {
            values,
            overrides: BTreeMap::new(),
        })
    }

    /// 收集 `HOMELAB_` 前缀的变量作为覆盖
    pub fn with_env_overrides<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.overrides.extend(
            vars.into_iter()
                .filter(|(name, _)| name.starts_with(ENV_PREFIX)),
        );
        self
    }

    /// 直接设置一个值（CLI 参数覆盖、测试），优先于同名环境变量
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.overrides.remove(&env_key(key));
        self.values
            .insert(key.to_string(), Value::Scalar(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(v) = self.overrides.get(&env_key(key)) {
            return Some(v.clone());
        }
        match self.values.get(key)? {
            Value::Scalar(s) => Some(s.clone()),
            Value::List(items) => Some(items.join(",")),
        }
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    pub fn get_secret(&self, key: &str) -> Option<Output> {
        self.get(key).map(Output::secret)
    }

    pub fn require_secret(&self, key: &str) -> Result<Output, ConfigError> {
        self.require(key).map(Output::secret)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::Invalid {
                key: key.to_string(),
                reason: format!("expected a boolean, got `{}`", raw),
            }),
        }
    }

    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        raw.trim().parse().map(Some).map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("cannot parse `{}`", raw),
        })
    }

    /// 列表值；字符串按逗号拆分
    pub fn get_list(&self, key: &str) -> Vec<String> {
        if let Some(v) = self.overrides.get(&env_key(key)) {
            return split_list(v);
        }
        match self.values.get(key) {
            Some(Value::List(items)) => items.clone(),
            Some(Value::Scalar(s)) => split_list(s),
            None => Vec::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 所有键（不含仅来自环境变量的键）
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// `sftp.base_path` → `HOMELAB_SFTP_BASE_PATH`
pub fn env_key(key: &str) -> String {
    let suffix: String = key
        .chars()
        .map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("{}{}", ENV_PREFIX, suffix)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn flatten(prefix: Option<&str>, table: &toml::Table, out: &mut BTreeMap<String, Value>) {
    for (k, v) in table {
        let key = match prefix {
            Some(p) => format!("{}.{}", p, k),
            None => k.clone(),
        };
        match v {
            toml::Value::Table(inner) => flatten(Some(&key), inner, out),
            toml::Value::Array(items) => {
                out.insert(key, Value::List(items.iter().map(scalar_string).collect()));
            }
            other => {
                out.insert(key, Value::Scalar(scalar_string(other)));
            }
        }
    }
}

fn scalar_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
