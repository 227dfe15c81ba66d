//! 已解析的资源输出
//!
//! provisioner 创建资源后把属性（hostname、digest、mountpoint 等）写入这里，
//! 后续 wave 中的延迟值据此解析。

use std::collections::{BTreeMap, HashMap};

use crate::domain::output::Attribute;
use crate::domain::resource::ResourceId;

#[derive(Clone, Debug, Default)]
pub struct ResolvedOutputs {
    values: HashMap<ResourceId, BTreeMap<Attribute, String>>,
}

impl ResolvedOutputs {
    pub fn get(&self, resource: &ResourceId, attr: Attribute) -> Option<&str> {
        self.values
            .get(resource)
            .and_then(|attrs| attrs.get(&attr))
            .map(String::as_str)
    }

    pub fn insert(&mut self, resource: &ResourceId, attr: Attribute, value: impl Into<String>) {
        self.values
            .entry(resource.clone())
            .or_default()
            .insert(attr, value.into());
    }

    /// 某个资源的全部输出
    pub fn attrs(&self, resource: &ResourceId) -> Option<&BTreeMap<Attribute, String>> {
        self.values.get(resource)
    }

    pub fn contains(&self, resource: &ResourceId) -> bool {
        self.values.contains_key(resource)
    }

    /// 合并另一个资源的输出，同名属性以新值为准
    pub fn extend_resource(&mut self, resource: &ResourceId, attrs: BTreeMap<Attribute, String>) {
        self.values.entry(resource.clone()).or_default().extend(attrs);
    }

    pub fn remove(&mut self, resource: &ResourceId) {
        self.values.remove(resource);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::ResourceKind;

    #[test]
    fn test_insert_and_merge() {
        let id = ResourceId::new(ResourceKind::Volume, "grafana-data");
        let mut outputs = ResolvedOutputs::default();
        outputs.insert(&id, Attribute::Name, "grafana-data");

        outputs.extend_resource(
            &id,
            BTreeMap::from([(Attribute::Mountpoint, "/var/lib/docker/volumes/x".to_string())]),
        );

        assert_eq!(outputs.get(&id, Attribute::Name), Some("grafana-data"));
        assert_eq!(
            outputs.get(&id, Attribute::Mountpoint),
            Some("/var/lib/docker/volumes/x")
        );
        assert_eq!(outputs.len(), 1);
        assert!(outputs.get(&id, Attribute::Hostname).is_none());
    }
}
