//! Dependency lint and execution planning
//!
//! A plan groups the stack into waves: every resource lands in the first wave
//! after all of its dependencies. Resources inside a wave keep declaration
//! order, so the same stack always yields the same plan.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::domain::output::Output;
use crate::domain::resource::{Resource, ResourceId};
use crate::error::{DeclareError, RenderError, ResolveError};
use crate::state::Stack;

/// Problem found by [`check_dependencies`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum DependencyIssue {
    /// Referenced through an interpolated value but not listed in `depends_on`
    MissingDependency {
        resource: ResourceId,
        dependency: ResourceId,
    },
    /// Listed in `depends_on` but never declared
    UnknownDependency {
        resource: ResourceId,
        dependency: ResourceId,
    },
}

impl fmt::Display for DependencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyIssue::MissingDependency {
                resource,
                dependency,
            } => write!(f, "{} references {} without depending on it", resource, dependency),
            DependencyIssue::UnknownDependency {
                resource,
                dependency,
            } => write!(f, "{} depends on undeclared {}", resource, dependency),
        }
    }
}

/// Checks that every referenced resource is an explicit, declared dependency
pub fn check_dependencies(stack: &Stack) -> Vec<DependencyIssue> {
    let mut issues = Vec::new();
    for resource in stack.resources() {
        for referenced in resource.spec.referenced_ids() {
            if !resource.depends_on.contains(&referenced) {
                issues.push(DependencyIssue::MissingDependency {
                    resource: resource.id.clone(),
                    dependency: referenced,
                });
            }
        }
        for dependency in &resource.depends_on {
            if !stack.contains(dependency) {
                issues.push(DependencyIssue::UnknownDependency {
                    resource: resource.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }
    issues
}

/// Output format of [`Plan::render`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlanFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl FromStr for PlanFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(PlanFormat::Table),
            "json" => Ok(PlanFormat::Json),
            "yaml" | "yml" => Ok(PlanFormat::Yaml),
            other => Err(format!("unknown format `{}` (table, json, yaml)", other)),
        }
    }
}

/// Ordered execution plan
#[derive(Clone, Debug)]
pub struct Plan {
    stack: String,
    waves: Vec<Vec<ResourceId>>,
}

impl Plan {
    /// Layers the stack by dependency depth
    ///
    /// Both `depends_on` and interpolated references count as edges; edges
    /// to undeclared resources are left to [`check_dependencies`].
    pub fn build(stack: &Stack) -> Result<Self, DeclareError> {
        let resources = stack.resources();
        let index: HashMap<&ResourceId, usize> = resources
            .iter()
            .enumerate()
            .map(|(i, r)| (&r.id, i))
            .collect();

        let deps: Vec<BTreeSet<usize>> = resources
            .iter()
            .map(|r| {
                r.depends_on
                    .iter()
                    .cloned()
                    .chain(r.spec.referenced_ids())
                    .filter_map(|id| index.get(&id).copied())
                    .collect()
            })
            .collect();

        let mut wave_of: Vec<Option<usize>> = vec![None; resources.len()];
        let mut waves: Vec<Vec<ResourceId>> = Vec::new();
        loop {
            let ready: Vec<usize> = (0..resources.len())
                .filter(|&i| wave_of[i].is_none())
                .filter(|&i| deps[i].iter().all(|&d| wave_of[d].is_some()))
                .collect();
            if ready.is_empty() {
                break;
            }
            for &i in &ready {
                wave_of[i] = Some(waves.len());
            }
            waves.push(ready.into_iter().map(|i| resources[i].id.clone()).collect());
        }

        let blocked: Vec<usize> = (0..resources.len())
            .filter(|&i| wave_of[i].is_none())
            .collect();
        if !blocked.is_empty() {
            let cycle = cycle_members(&deps, blocked);
            return Err(DeclareError::DependencyCycle(
                cycle.into_iter().map(|i| resources[i].id.clone()).collect(),
            ));
        }

        tracing::debug!(
            stack = %stack.name(),
            resources = resources.len(),
            waves = waves.len(),
            "Plan built"
        );
        Ok(Self {
            stack: stack.name().to_string(),
            waves,
        })
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn waves(&self) -> &[Vec<ResourceId>] {
        &self.waves
    }

    pub fn len(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    /// `(wave, id)` in execution order
    pub fn steps(&self) -> impl Iterator<Item = (usize, &ResourceId)> {
        self.waves
            .iter()
            .enumerate()
            .flat_map(|(wave, ids)| ids.iter().map(move |id| (wave, id)))
    }

    /// Waves in teardown order: dependents before their dependencies
    pub fn reversed(&self) -> Vec<Vec<ResourceId>> {
        self.waves.iter().rev().cloned().collect()
    }

    /// Preview of the plan
    ///
    /// Secret values print as `[secret]` unless `reveal_secrets` is set;
    /// unresolved references print as `${name.attr}`.
    pub fn render(
        &self,
        stack: &Stack,
        format: PlanFormat,
        reveal_secrets: bool,
    ) -> Result<String, RenderError> {
        match format {
            PlanFormat::Table => Ok(self.render_table(stack)),
            PlanFormat::Json => Ok(serde_json::to_string_pretty(
                &self.to_value(stack, reveal_secrets)?,
            )?),
            PlanFormat::Yaml => Ok(serde_yaml::to_string(&self.to_value(stack, reveal_secrets)?)?),
        }
    }

    fn to_value(&self, stack: &Stack, reveal_secrets: bool) -> Result<Value, ResolveError> {
        let resolve = |o: &Output| -> Result<String, ResolveError> { Ok(o.render(reveal_secrets)) };

        let mut waves = Vec::with_capacity(self.waves.len());
        for (wave, ids) in self.waves.iter().enumerate() {
            let mut entries = Vec::with_capacity(ids.len());
            for resource in ids.iter().filter_map(|id| stack.get(id)) {
                entries.push(json!({
                    "id": resource.id,
                    "urn": resource.urn,
                    "parent": resource.parent,
                    "depends_on": resource.depends_on,
                    "spec": resource.spec.render(resource.name(), &resolve)?,
                }));
            }
            waves.push(json!({ "wave": wave, "resources": entries }));
        }

        Ok(json!({ "stack": self.stack, "waves": waves }))
    }

    fn render_table(&self, stack: &Stack) -> String {
        let rows: Vec<[String; 5]> = self
            .steps()
            .filter_map(|(wave, id)| stack.get(id).map(|r| (wave, r)))
            .map(|(wave, r)| table_row(wave, r))
            .collect();

        let header = ["WAVE", "KIND", "NAME", "COMPONENT", "DEPENDS ON"].map(String::from);
        let mut widths = header.clone().map(|h| h.len());
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }

        let mut out = String::new();
        for row in std::iter::once(&header).chain(&rows) {
            let line: Vec<String> = row
                .iter()
                .zip(widths)
                .map(|(cell, w)| format!("{:<w$}", cell, w = w))
                .collect();
            out.push_str(line.join("  ").trim_end());
            out.push('\n');
        }
        out.push_str(&format!(
            "\n{} resources in {} waves\n",
            self.len(),
            self.waves.len()
        ));
        out
    }
}

fn table_row(wave: usize, resource: &Resource) -> [String; 5] {
    let deps = resource
        .depends_on
        .iter()
        .map(|d| d.name())
        .collect::<Vec<_>>()
        .join(",");
    [
        wave.to_string(),
        resource.kind().as_str().to_string(),
        resource.name().to_string(),
        resource.parent.clone().unwrap_or_else(|| "-".to_string()),
        if deps.is_empty() { "-".to_string() } else { deps },
    ]
}

/// Narrows blocked nodes down to those on a cycle
///
/// Repeatedly drops nodes no other blocked node depends on; what remains
/// either lies on a cycle or sits between two of them.
fn cycle_members(deps: &[BTreeSet<usize>], mut blocked: Vec<usize>) -> Vec<usize> {
    loop {
        let before = blocked.len();
        let snapshot = blocked.clone();
        blocked.retain(|&i| snapshot.iter().any(|&j| deps[j].contains(&i)));
        if blocked.len() == before {
            return blocked;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::docker::{ContainerSpec, NetworkSpec, RegistryImageSpec, VolumeSpec};
    use crate::domain::resource::{ResourceKind, ResourceOptions};
    use crate::interpolate;

    fn container(name: &str) -> ResourceId {
        ResourceId::new(ResourceKind::Container, name)
    }

    /// image + volume + network, a database, and an app depending on it
    fn app_stack() -> Stack {
        let mut stack = Stack::new("home");
        let net = stack
            .declare("proxy", NetworkSpec::default(), ResourceOptions::new())
            .unwrap();
        let image = stack
            .declare("app", RegistryImageSpec::new("app:1"), ResourceOptions::new())
            .unwrap();
        let volume = stack
            .declare("app-data", VolumeSpec::default(), ResourceOptions::new())
            .unwrap();
        let db = stack
            .declare(
                "app-db",
                ContainerSpec::new(Output::literal("postgres:14"))
                    .env(Output::secret("POSTGRES_PASSWORD=pw"))
                    .volume(volume.name(), "/var/lib/postgresql/data"),
                ResourceOptions::new().depends_on([&volume]),
            )
            .unwrap();
        stack
            .declare(
                "app",
                ContainerSpec::new(image.sha256_digest())
                    .env(interpolate!("DB_HOST={}", db.hostname()))
                    .network(net.output_id()),
                ResourceOptions::new().depends_on([&net, &image, &db]),
            )
            .unwrap();
        stack
    }

    #[test]
    fn test_waves_follow_dependency_depth() {
        let stack = app_stack();
        let plan = Plan::build(&stack).unwrap();

        let names: Vec<Vec<&str>> = plan
            .waves()
            .iter()
            .map(|w| w.iter().map(|id| id.name()).collect())
            .collect();
        assert_eq!(
            names,
            vec![vec!["proxy", "app", "app-data"], vec!["app-db"], vec!["app"]]
        );
        assert_eq!(plan.len(), 5);
        assert_eq!(plan.reversed()[0], vec![container("app")]);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let first = Plan::build(&app_stack()).unwrap();
        let second = Plan::build(&app_stack()).unwrap();
        assert_eq!(first.waves(), second.waves());
    }

    #[test]
    fn test_clean_stack_has_no_issues() {
        assert!(check_dependencies(&app_stack()).is_empty());
    }

    #[test]
    fn test_missing_and_unknown_dependencies() {
        let mut stack = Stack::new("home");
        let db = stack
            .declare("db", ContainerSpec::new(Output::literal("postgres")), ResourceOptions::new())
            .unwrap();
        let mut opts = ResourceOptions::new();
        opts.depends_on.push(container("ghost"));
        stack
            .declare(
                "app",
                ContainerSpec::new(Output::literal("app")).env(interpolate!("DB={}", db.hostname())),
                opts,
            )
            .unwrap();

        let issues = check_dependencies(&stack);
        assert_eq!(
            issues,
            vec![
                DependencyIssue::MissingDependency {
                    resource: container("app"),
                    dependency: container("db"),
                },
                DependencyIssue::UnknownDependency {
                    resource: container("app"),
                    dependency: container("ghost"),
                },
            ]
        );

        // the plan still orders by the reference
        let plan = Plan::build(&stack).unwrap();
        assert_eq!(plan.waves().len(), 2);
    }

    #[test]
    fn test_cycle_reports_members_only() {
        let mut stack = Stack::new("home");
        let opts = |dep: &str| {
            let mut o = ResourceOptions::new();
            o.depends_on.push(container(dep));
            o
        };
        let image = |n: &str| ContainerSpec::new(Output::literal(n));
        stack.declare("a", image("a"), opts("b")).unwrap();
        stack.declare("b", image("b"), opts("a")).unwrap();
        stack.declare("c", image("c"), opts("a")).unwrap();
        stack.declare("d", image("d"), ResourceOptions::new()).unwrap();

        match Plan::build(&stack) {
            Err(DeclareError::DependencyCycle(ids)) => {
                assert_eq!(ids, vec![container("a"), container("b")]);
            }
            other => panic!("expected a cycle, got {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_render_formats() {
        let stack = app_stack();
        let plan = Plan::build(&stack).unwrap();

        let table = plan.render(&stack, PlanFormat::Table, false).unwrap();
        assert!(table.starts_with("WAVE"));
        assert!(table.contains("app-db"));
        assert!(table.ends_with("5 resources in 3 waves\n"));

        let json = plan.render(&stack, PlanFormat::Json, false).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        let db = &value["waves"][1]["resources"][0];
        assert_eq!(db["id"], "container::app-db");
        assert_eq!(db["spec"]["envs"][0], "[secret]");
        assert_eq!(
            value["waves"][2]["resources"][0]["spec"]["envs"][0],
            "DB_HOST=${app-db.hostname}"
        );

        let revealed = plan.render(&stack, PlanFormat::Json, true).unwrap();
        assert!(revealed.contains("POSTGRES_PASSWORD=pw"));

        let yaml = plan.render(&stack, PlanFormat::Yaml, false).unwrap();
        assert!(yaml.contains("stack: home"));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("YAML".parse::<PlanFormat>().unwrap(), PlanFormat::Yaml);
        assert!("xml".parse::<PlanFormat>().is_err());
    }
}
