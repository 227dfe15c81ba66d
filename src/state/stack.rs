//! 声明注册表
//!
//! `Stack` 按声明顺序保存所有资源。服务通过 [`ComponentScope`] 声明子资源，
//! scope 在 `finish()` 时才把资源写入 stack；中途出错直接丢弃 scope，
//! stack 中不会留下半个组件。

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::domain::output::Output;
use crate::domain::resource::{Resource, ResourceId, ResourceOptions, ResourceRef, ResourceSpec};
use crate::error::DeclareError;

/// 组件：一个服务声明出的资源集合
#[derive(Clone, Debug, Serialize)]
pub struct Component {
    /// 组件类型（如 `homelab:docker:Coder`）
    pub component_type: String,
    pub name: String,
    pub urn: String,
    /// 按声明顺序排列的子资源
    pub resources: Vec<ResourceId>,
    /// 对外暴露的值（数据库 hostname、访问地址等）
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub exports: BTreeMap<String, Output>,
}

impl Component {
    /// 组件键：`type::name`
    pub fn key(&self) -> String {
        format!("{}::{}", self.component_type, self.name)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains(id)
    }

    pub fn export(&self, key: &str) -> Option<&Output> {
        self.exports.get(key)
    }
}

/// 资源声明注册表
#[derive(Debug, Default)]
pub struct Stack {
    name: String,
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
    components: Vec<Component>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 声明不属于任何组件的资源（如共享的 proxy 网络）
    pub fn declare(
        &mut self,
        name: &str,
        spec: impl Into<ResourceSpec>,
        opts: ResourceOptions,
    ) -> Result<ResourceRef, DeclareError> {
        let resource = build_resource(&self.name, None, name, spec.into(), opts);
        self.ensure_free(&resource.id)?;
        let handle = ResourceRef::new(resource.id.clone());
        self.insert(resource);
        Ok(handle)
    }

    /// 打开组件作用域
    pub fn component(
        &mut self,
        component_type: &str,
        name: &str,
    ) -> Result<ComponentScope<'_>, DeclareError> {
        let component = Component {
            component_type: component_type.to_string(),
            name: name.to_string(),
            urn: format!("urn:homelab:{}::{}::{}", self.name, component_type, name),
            resources: Vec::new(),
            exports: BTreeMap::new(),
        };

        if self.components.iter().any(|c| c.key() == component.key()) {
            return Err(DeclareError::DuplicateComponent(component.key()));
        }

        Ok(ComponentScope {
            stack: self,
            component,
            pending: Vec::new(),
        })
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// 按声明顺序的所有资源
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// 按名称查找组件
    pub fn find_component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// 组件的子资源
    pub fn children<'a>(&'a self, component: &'a Component) -> impl Iterator<Item = &'a Resource> {
        component.resources.iter().filter_map(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn ensure_free(&self, id: &ResourceId) -> Result<(), DeclareError> {
        if self.index.contains_key(id) {
            return Err(DeclareError::DuplicateResource(id.clone()));
        }
        Ok(())
    }

    fn insert(&mut self, resource: Resource) {
        self.index.insert(resource.id.clone(), self.resources.len());
        self.resources.push(resource);
    }
}

/// 组件声明作用域
pub struct ComponentScope<'a> {
    stack: &'a mut Stack,
    component: Component,
    pending: Vec<Resource>,
}

impl ComponentScope<'_> {
    pub fn component_name(&self) -> &str {
        &self.component.name
    }

    /// 声明子资源
    pub fn declare(
        &mut self,
        name: &str,
        spec: impl Into<ResourceSpec>,
        opts: ResourceOptions,
    ) -> Result<ResourceRef, DeclareError> {
        let parent = self.component.key();
        let resource = build_resource(&self.stack.name, Some(parent), name, spec.into(), opts);

        self.stack.ensure_free(&resource.id)?;
        if self.pending.iter().any(|r| r.id == resource.id) {
            return Err(DeclareError::DuplicateResource(resource.id));
        }

        let handle = ResourceRef::new(resource.id.clone());
        self.component.resources.push(resource.id.clone());
        self.pending.push(resource);
        Ok(handle)
    }

    /// 导出一个值
    pub fn export(&mut self, key: &str, value: impl Into<Output>) {
        self.component.exports.insert(key.to_string(), value.into());
    }

    /// 提交到 stack，返回组件清单
    pub fn finish(self) -> Component {
        let ComponentScope {
            stack,
            component,
            pending,
        } = self;

        for resource in pending {
            stack.insert(resource);
        }
        stack.components.push(component.clone());

        tracing::debug!(
            component = %component.key(),
            resources = component.resources.len(),
            "Component declared"
        );
        component
    }
}

fn build_resource(
    stack: &str,
    parent: Option<String>,
    name: &str,
    spec: ResourceSpec,
    opts: ResourceOptions,
) -> Resource {
    let kind = spec.kind();
    let id = ResourceId::new(kind, name);
    let urn = match &parent {
        Some(parent) => {
            let component_type = parent.split("::").next().unwrap_or(parent);
            format!(
                "urn:homelab:{}::{}${}::{}",
                stack,
                component_type,
                kind.type_token(),
                name
            )
        }
        None => format!("urn:homelab:{}::{}::{}", stack, kind.type_token(), name),
    };

    Resource {
        id,
        urn,
        parent,
        depends_on: opts.depends_on,
        provider: opts.provider,
        spec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::docker::{NetworkSpec, RegistryImageSpec};
    use crate::domain::resource::ResourceKind;

    #[test]
    fn test_component_records_children_in_order() {
        let mut stack = Stack::new("home");
        let mut scope = stack.component("homelab:docker:Grafana", "grafana").unwrap();
        let image = scope
            .declare("grafana", RegistryImageSpec::new("grafana/grafana-oss:latest"), ResourceOptions::new())
            .unwrap();
        let net = scope
            .declare("grafana-internal", NetworkSpec::default(), ResourceOptions::new())
            .unwrap();
        let component = scope.finish();

        assert_eq!(component.resources, vec![image.id().clone(), net.id().clone()]);
        assert_eq!(stack.len(), 2);
        let children: Vec<_> = stack.children(&component).map(|r| r.name()).collect();
        assert_eq!(children, vec!["grafana", "grafana-internal"]);

        let resource = stack.get(image.id()).unwrap();
        assert_eq!(resource.parent.as_deref(), Some("homelab:docker:Grafana::grafana"));
        assert_eq!(
            resource.urn,
            "urn:homelab:home::homelab:docker:Grafana$docker:index:RegistryImage::grafana"
        );
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let mut stack = Stack::new("home");
        stack
            .declare("proxy", NetworkSpec::default(), ResourceOptions::new())
            .unwrap();

        let err = stack
            .declare("proxy", NetworkSpec::default(), ResourceOptions::new())
            .unwrap_err();
        assert!(matches!(err, DeclareError::DuplicateResource(id) if id.name() == "proxy"));

        let mut scope = stack.component("homelab:docker:Test", "test").unwrap();
        let err = scope
            .declare("proxy", NetworkSpec::default(), ResourceOptions::new())
            .unwrap_err();
        assert!(matches!(err, DeclareError::DuplicateResource(_)));
    }

    #[test]
    fn test_dropped_scope_leaves_stack_untouched() {
        let mut stack = Stack::new("home");
        {
            let mut scope = stack.component("homelab:docker:Test", "test").unwrap();
            scope
                .declare("test", RegistryImageSpec::new("busybox"), ResourceOptions::new())
                .unwrap();
        }
        assert!(stack.is_empty());
        assert!(stack.components().is_empty());
    }

    #[test]
    fn test_duplicate_component_rejected() {
        let mut stack = Stack::new("home");
        stack.component("homelab:docker:Test", "test").unwrap().finish();
        assert!(matches!(
            stack.component("homelab:docker:Test", "test"),
            Err(DeclareError::DuplicateComponent(_))
        ));
    }

    #[test]
    fn test_same_name_different_kinds() {
        let mut stack = Stack::new("home");
        stack
            .declare("ollama", RegistryImageSpec::new("ollama/ollama"), ResourceOptions::new())
            .unwrap();
        stack
            .declare("ollama", NetworkSpec::default(), ResourceOptions::new())
            .unwrap();
        assert!(stack.contains(&ResourceId::new(ResourceKind::Network, "ollama")));
        assert_eq!(stack.len(), 2);
    }
}
