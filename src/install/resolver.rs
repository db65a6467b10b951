//! Install-order resolution.
//!
//! Pure planning: walks the declared dependency graph depth-first against
//! an installed-state snapshot and emits a flat, deduplicated action list.
//! The installer executes the list in order, so everything a component
//! needs lands strictly before the component itself. A visited set keyed
//! by (module, kind) makes cyclic declarations terminate; the cycle is the
//! catalog author's bug, not a crash.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::catalog::{Catalog, ComponentKind, ModuleId, ModuleType, ScopedRegistry};
use crate::install::status::InstallStatus;

/// One step of an install plan.
#[derive(Debug, Clone, PartialEq)]
pub enum InstallAction {
    /// Add an external package by source identifier.
    AddPackage(String),
    /// Add a registry package by name.
    AddRegistry(String),
    /// Add a scoped registry to the host manifest.
    AddScopedRegistry(ScopedRegistry),
    /// Materialize one module component's blobs.
    Component {
        module_type: ModuleType,
        module: String,
        kind: ComponentKind,
    },
}

/// Ordered, deduplicated actions ending with the requested component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallPlan {
    pub actions: Vec<InstallAction>,
    /// Dependency module ids that were declared but absent from the
    /// catalog; each edge is dropped after a warning.
    pub missing_modules: Vec<ModuleId>,
}

impl InstallPlan {
    /// Component actions in plan order.
    pub fn components(&self) -> impl Iterator<Item = (&str, ComponentKind)> + '_ {
        self.actions.iter().filter_map(|action| match action {
            InstallAction::Component { module, kind, .. } => Some((module.as_str(), *kind)),
            _ => None,
        })
    }
}

/// Resolves everything that must happen, in order, to install the given
/// component: module dependencies first, then external adds, then
/// same-module pre-components ascending by kind, then the target itself.
pub fn resolve_install_order(
    catalog: &Catalog,
    status: &InstallStatus,
    module_type: ModuleType,
    module_name: &str,
    kind: ComponentKind,
) -> InstallPlan {
    let mut resolver = Resolver {
        catalog,
        status,
        plan: InstallPlan::default(),
        visited: HashSet::new(),
        externals: HashSet::new(),
    };
    resolver.visit(module_type, module_name, kind);
    resolver.plan
}

struct Resolver<'a> {
    catalog: &'a Catalog,
    status: &'a InstallStatus,
    plan: InstallPlan,
    visited: HashSet<(String, ComponentKind)>,
    externals: HashSet<String>,
}

impl Resolver<'_> {
    fn visit(&mut self, module_type: ModuleType, module_name: &str, kind: ComponentKind) {
        if !self.visited.insert((module_name.to_string(), kind)) {
            return;
        }
        let catalog = self.catalog;
        let Some(component) = catalog.component(module_name, kind) else {
            debug!("{module_name}/{kind} is not declared, nothing to plan");
            return;
        };

        for dep in &component.dependency_modules {
            let Some((dep_type, dep_module)) = catalog.module_entry(dep.module_id) else {
                warn!(
                    "{module_name}/{kind} depends on module {} which is not in the catalog, \
                     dropping the edge",
                    dep.module_id
                );
                if !self.plan.missing_modules.contains(&dep.module_id) {
                    self.plan.missing_modules.push(dep.module_id);
                }
                continue;
            };
            if self.status.component_installed(&dep_module.name, dep.kind) {
                continue;
            }
            if dep_module.component(dep.kind).is_none() {
                debug!(
                    "dependency {}/{} is not declared on that module, skipping",
                    dep_module.name, dep.kind
                );
                continue;
            }
            self.visit(dep_type, &dep_module.name, dep.kind);
        }

        for url in &component.dependency_urls {
            if self.status.url_added(url) {
                continue;
            }
            if self.externals.insert(format!("url:{url}")) {
                self.plan.actions.push(InstallAction::AddPackage(url.clone()));
            }
        }
        for name in &component.dependency_registries {
            if self.status.registry_added(name) {
                continue;
            }
            if self.externals.insert(format!("registry:{name}")) {
                self.plan
                    .actions
                    .push(InstallAction::AddRegistry(name.clone()));
            }
        }
        for registry in &component.scoped_registries {
            if self.status.scoped_registry_added(&registry.name) {
                continue;
            }
            if self.externals.insert(format!("scoped:{}", registry.name)) {
                self.plan
                    .actions
                    .push(InstallAction::AddScopedRegistry(registry.clone()));
            }
        }

        if let Some(module) = catalog.module_by_name(module_name) {
            for pre in ComponentKind::ALL {
                if pre >= kind {
                    break;
                }
                if self.status.component_installed(module_name, pre) {
                    continue;
                }
                if module.component(pre).is_some() {
                    self.visit(module_type, module_name, pre);
                }
            }
        }

        self.plan.actions.push(InstallAction::Component {
            module_type,
            module: module_name.to_string(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::catalog::{CatalogConfig, Component, Module, ModuleDependency};

    struct ModuleSpec {
        ty: ModuleType,
        id: ModuleId,
        name: &'static str,
        components: Vec<(ComponentKind, Component)>,
    }

    fn catalog_of(specs: Vec<ModuleSpec>) -> Catalog {
        let mut grouped: BTreeMap<ModuleType, Vec<Module>> = BTreeMap::new();
        for spec in specs {
            grouped.entry(spec.ty).or_default().push(Module {
                id: spec.id,
                name: spec.name.into(),
                version: "1.0.0".into(),
                description: String::new(),
                footnote: String::new(),
                components: spec.components.into_iter().collect(),
            });
        }
        Catalog::new(CatalogConfig {
            modules: grouped,
            tools: Vec::new(),
        })
        .unwrap()
    }

    fn with_paths(kind_paths: &[&str]) -> Component {
        Component {
            paths: kind_paths.iter().map(|p| p.to_string()).collect(),
            ..Component::default()
        }
    }

    fn depends_on(id: ModuleId, kind: ComponentKind, paths: &[&str]) -> Component {
        Component {
            dependency_modules: vec![ModuleDependency {
                module_id: id,
                kind,
            }],
            paths: paths.iter().map(|p| p.to_string()).collect(),
            ..Component::default()
        }
    }

    fn plan_for(
        catalog: &Catalog,
        status: &InstallStatus,
        name: &str,
        kind: ComponentKind,
    ) -> InstallPlan {
        resolve_install_order(catalog, status, ModuleType::Core, name, kind)
    }

    #[test]
    fn lone_component_plans_only_itself() {
        let catalog = catalog_of(vec![ModuleSpec {
            ty: ModuleType::Core,
            id: 1,
            name: "core",
            components: vec![(ComponentKind::Core, with_paths(&["lib/core"]))],
        }]);
        let plan = plan_for(&catalog, &InstallStatus::default(), "core", ComponentKind::Core);
        assert_eq!(
            plan.actions,
            vec![InstallAction::Component {
                module_type: ModuleType::Core,
                module: "core".into(),
                kind: ComponentKind::Core,
            }]
        );
        assert!(plan.missing_modules.is_empty());
    }

    #[test]
    fn pre_components_come_first_in_ascending_order() {
        let catalog = catalog_of(vec![ModuleSpec {
            ty: ModuleType::Core,
            id: 1,
            name: "core",
            components: vec![
                (ComponentKind::Core, with_paths(&["lib/core"])),
                (ComponentKind::Editor, with_paths(&["tools/panel"])),
                (ComponentKind::Optional, with_paths(&["extras/samples"])),
            ],
        }]);
        let plan = plan_for(
            &catalog,
            &InstallStatus::default(),
            "core",
            ComponentKind::Optional,
        );
        let order: Vec<(&str, ComponentKind)> = plan.components().collect();
        assert_eq!(
            order,
            vec![
                ("core", ComponentKind::Core),
                ("core", ComponentKind::Editor),
                ("core", ComponentKind::Optional),
            ]
        );
    }

    #[test]
    fn installed_pre_components_are_skipped() {
        let catalog = catalog_of(vec![ModuleSpec {
            ty: ModuleType::Core,
            id: 1,
            name: "core",
            components: vec![
                (ComponentKind::Core, with_paths(&["lib/core"])),
                (ComponentKind::Editor, with_paths(&["tools/panel"])),
            ],
        }]);
        let status = InstallStatus::default().with_component("core", ComponentKind::Core, true);
        let plan = plan_for(&catalog, &status, "core", ComponentKind::Editor);
        let order: Vec<(&str, ComponentKind)> = plan.components().collect();
        assert_eq!(order, vec![("core", ComponentKind::Editor)]);
    }

    #[test]
    fn module_dependencies_install_before_the_target() {
        let catalog = catalog_of(vec![
            ModuleSpec {
                ty: ModuleType::Core,
                id: 1,
                name: "core",
                components: vec![(ComponentKind::Core, with_paths(&["lib/core"]))],
            },
            ModuleSpec {
                ty: ModuleType::Extension,
                id: 2,
                name: "ui",
                components: vec![(
                    ComponentKind::Core,
                    depends_on(1, ComponentKind::Core, &["lib/ui"]),
                )],
            },
        ]);
        let plan = plan_for(&catalog, &InstallStatus::default(), "ui", ComponentKind::Core);
        let order: Vec<(&str, ComponentKind)> = plan.components().collect();
        assert_eq!(
            order,
            vec![("core", ComponentKind::Core), ("ui", ComponentKind::Core)]
        );
        // the dependency keeps its own partition type in the plan
        assert_eq!(
            plan.actions[0],
            InstallAction::Component {
                module_type: ModuleType::Core,
                module: "core".into(),
                kind: ComponentKind::Core,
            }
        );
    }

    #[test]
    fn installed_dependencies_are_not_replanned() {
        let catalog = catalog_of(vec![
            ModuleSpec {
                ty: ModuleType::Core,
                id: 1,
                name: "core",
                components: vec![(ComponentKind::Core, with_paths(&["lib/core"]))],
            },
            ModuleSpec {
                ty: ModuleType::Extension,
                id: 2,
                name: "ui",
                components: vec![(
                    ComponentKind::Core,
                    depends_on(1, ComponentKind::Core, &["lib/ui"]),
                )],
            },
        ]);
        let status = InstallStatus::default().with_component("core", ComponentKind::Core, true);
        let plan = plan_for(&catalog, &status, "ui", ComponentKind::Core);
        let order: Vec<(&str, ComponentKind)> = plan.components().collect();
        assert_eq!(order, vec![("ui", ComponentKind::Core)]);
    }

    #[test]
    fn missing_dependency_module_drops_the_edge_and_is_recorded() {
        let catalog = catalog_of(vec![ModuleSpec {
            ty: ModuleType::Core,
            id: 1,
            name: "ui",
            components: vec![(
                ComponentKind::Core,
                depends_on(99, ComponentKind::Core, &["lib/ui"]),
            )],
        }]);
        let plan = plan_for(&catalog, &InstallStatus::default(), "ui", ComponentKind::Core);
        let order: Vec<(&str, ComponentKind)> = plan.components().collect();
        assert_eq!(order, vec![("ui", ComponentKind::Core)]);
        assert_eq!(plan.missing_modules, vec![99]);
    }

    #[test]
    fn dependency_on_undeclared_component_is_skipped() {
        let catalog = catalog_of(vec![
            ModuleSpec {
                ty: ModuleType::Core,
                id: 1,
                name: "core",
                components: vec![(ComponentKind::Core, with_paths(&["lib/core"]))],
            },
            ModuleSpec {
                ty: ModuleType::Extension,
                id: 2,
                name: "ui",
                components: vec![(
                    ComponentKind::Core,
                    depends_on(1, ComponentKind::Editor, &["lib/ui"]),
                )],
            },
        ]);
        let plan = plan_for(&catalog, &InstallStatus::default(), "ui", ComponentKind::Core);
        let order: Vec<(&str, ComponentKind)> = plan.components().collect();
        assert_eq!(order, vec![("ui", ComponentKind::Core)]);
        assert!(plan.missing_modules.is_empty());
    }

    #[test]
    fn cyclic_dependencies_terminate_with_each_edge_once() {
        let catalog = catalog_of(vec![
            ModuleSpec {
                ty: ModuleType::Core,
                id: 1,
                name: "a",
                components: vec![(
                    ComponentKind::Core,
                    depends_on(2, ComponentKind::Core, &["lib/a"]),
                )],
            },
            ModuleSpec {
                ty: ModuleType::Core,
                id: 2,
                name: "b",
                components: vec![(
                    ComponentKind::Core,
                    depends_on(1, ComponentKind::Core, &["lib/b"]),
                )],
            },
        ]);
        let plan = plan_for(&catalog, &InstallStatus::default(), "a", ComponentKind::Core);
        let order: Vec<(&str, ComponentKind)> = plan.components().collect();
        assert_eq!(
            order,
            vec![("b", ComponentKind::Core), ("a", ComponentKind::Core)]
        );
    }

    #[test]
    fn external_actions_precede_their_component_and_deduplicate() {
        let shared_registry = ScopedRegistry {
            name: "internal".into(),
            url: "https://packages.example.com".into(),
            scopes: vec!["com.example".into()],
        };
        let mut core = with_paths(&["lib/core"]);
        core.dependency_urls = vec!["pkg://x".into()];
        core.scoped_registries = vec![shared_registry.clone()];
        let mut editor = with_paths(&["tools/panel"]);
        editor.dependency_urls = vec!["pkg://x".into()];
        editor.dependency_registries = vec!["tools.analyzer".into()];
        editor.scoped_registries = vec![shared_registry.clone()];

        let catalog = catalog_of(vec![ModuleSpec {
            ty: ModuleType::Core,
            id: 1,
            name: "core",
            components: vec![
                (ComponentKind::Core, core),
                (ComponentKind::Editor, editor),
            ],
        }]);
        let plan = plan_for(
            &catalog,
            &InstallStatus::default(),
            "core",
            ComponentKind::Editor,
        );

        assert_eq!(
            plan.actions,
            vec![
                InstallAction::AddPackage("pkg://x".into()),
                InstallAction::AddRegistry("tools.analyzer".into()),
                InstallAction::AddScopedRegistry(shared_registry),
                InstallAction::Component {
                    module_type: ModuleType::Core,
                    module: "core".into(),
                    kind: ComponentKind::Core,
                },
                InstallAction::Component {
                    module_type: ModuleType::Core,
                    module: "core".into(),
                    kind: ComponentKind::Editor,
                },
            ]
        );
    }

    #[test]
    fn already_added_externals_are_left_out() {
        let mut core = with_paths(&["lib/core"]);
        core.dependency_urls = vec!["pkg://x".into()];
        core.dependency_registries = vec!["tools.analyzer".into()];
        let catalog = catalog_of(vec![ModuleSpec {
            ty: ModuleType::Core,
            id: 1,
            name: "core",
            components: vec![(ComponentKind::Core, core)],
        }]);
        let status = InstallStatus::default()
            .with_url("pkg://x", true)
            .with_registry("tools.analyzer", true);
        let plan = plan_for(&catalog, &status, "core", ComponentKind::Core);
        assert_eq!(
            plan.actions,
            vec![InstallAction::Component {
                module_type: ModuleType::Core,
                module: "core".into(),
                kind: ComponentKind::Core,
            }]
        );
    }

    #[test]
    fn unknown_target_produces_an_empty_plan() {
        let catalog = catalog_of(vec![ModuleSpec {
            ty: ModuleType::Core,
            id: 1,
            name: "core",
            components: vec![(ComponentKind::Core, with_paths(&["lib/core"]))],
        }]);
        let plan = plan_for(
            &catalog,
            &InstallStatus::default(),
            "ghost",
            ComponentKind::Core,
        );
        assert!(plan.actions.is_empty());
    }
}
