//! Catalog data model and binary config codec.
//!
//! The catalog config is the authored description of every installable
//! module: identity, grouping by [`ModuleType`], and per-[`ComponentKind`]
//! component declarations (dependencies, install paths, uninstall symbols).
//! It is distributed as a bincode blob next to the per-type partitions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KitbagError, Result};

/// Stable module identifier, unique across the whole catalog.
pub type ModuleId = u32;

/// Catalog grouping axis; one binary partition exists per type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum ModuleType {
    #[default]
    Core,
    Extension,
    Primary,
    Secondary,
    Tertiary,
    ThirdParty,
}

impl ModuleType {
    /// Every type in catalog order.
    pub const ALL: [ModuleType; 6] = [
        ModuleType::Core,
        ModuleType::Extension,
        ModuleType::Primary,
        ModuleType::Secondary,
        ModuleType::Tertiary,
        ModuleType::ThirdParty,
    ];
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleType::Core => "Core",
            ModuleType::Extension => "Extension",
            ModuleType::Primary => "Primary",
            ModuleType::Secondary => "Secondary",
            ModuleType::Tertiary => "Tertiary",
            ModuleType::ThirdParty => "ThirdParty",
        };
        f.write_str(name)
    }
}

impl FromStr for ModuleType {
    type Err = KitbagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Core" => Ok(ModuleType::Core),
            "Extension" => Ok(ModuleType::Extension),
            "Primary" => Ok(ModuleType::Primary),
            "Secondary" => Ok(ModuleType::Secondary),
            "Tertiary" => Ok(ModuleType::Tertiary),
            "ThirdParty" => Ok(ModuleType::ThirdParty),
            other => Err(KitbagError::CatalogParse(format!(
                "unknown module type: {other}"
            ))),
        }
    }
}

/// Component tier of a module. The declaration order is the install order:
/// lower kinds install before higher ones, and uninstall removes higher
/// kinds before lower ones. Both directions rely on this single `Ord`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum ComponentKind {
    #[default]
    Core,
    Editor,
    Optional,
    ThirdParty,
}

impl ComponentKind {
    /// Every kind in ascending install order.
    pub const ALL: [ComponentKind; 4] = [
        ComponentKind::Core,
        ComponentKind::Editor,
        ComponentKind::Optional,
        ComponentKind::ThirdParty,
    ];
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Core => "Core",
            ComponentKind::Editor => "Editor",
            ComponentKind::Optional => "Optional",
            ComponentKind::ThirdParty => "ThirdParty",
        };
        f.write_str(name)
    }
}

impl FromStr for ComponentKind {
    type Err = KitbagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Core" => Ok(ComponentKind::Core),
            "Editor" => Ok(ComponentKind::Editor),
            "Optional" => Ok(ComponentKind::Optional),
            "ThirdParty" => Ok(ComponentKind::ThirdParty),
            other => Err(KitbagError::CatalogParse(format!(
                "unknown component kind: {other}"
            ))),
        }
    }
}

/// Cross-module prerequisite: a specific component of another module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDependency {
    pub module_id: ModuleId,
    pub kind: ComponentKind,
}

/// External package source restricted to a set of name scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedRegistry {
    pub name: String,
    pub url: String,
    pub scopes: Vec<String>,
}

/// The smallest installable slice of a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Components of other modules that must be installed first.
    pub dependency_modules: Vec<ModuleDependency>,
    /// Opaque package-source identifiers added through the package client.
    pub dependency_urls: Vec<String>,
    /// Registry package names added through the package client.
    pub dependency_registries: Vec<String>,
    /// Scoped registries added to the host manifest.
    pub scoped_registries: Vec<ScopedRegistry>,
    /// Filesystem locations this component installs into; all of them must
    /// exist for the component to count as installed. A component with no
    /// declared paths is never reported installed.
    pub paths: Vec<String>,
    /// Build define symbols retracted from every platform group on
    /// uninstall.
    pub delete_symbols: Vec<String>,
}

/// A named, versioned installable unit composed of ordered components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Unique id, stable across catalog revisions.
    pub id: ModuleId,
    /// Unique name, used as the join key in blob names and status maps.
    pub name: String,
    pub version: String,
    pub description: String,
    /// Free-text remark shown alongside the module.
    pub footnote: String,
    pub components: BTreeMap<ComponentKind, Component>,
}

impl Module {
    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.get(&kind)
    }
}

/// Name + url link surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLink {
    pub name: String,
    pub url: String,
}

/// Serialized catalog root: modules grouped by type, plus tool links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub modules: BTreeMap<ModuleType, Vec<Module>>,
    pub tools: Vec<ToolLink>,
}

impl CatalogConfig {
    /// Decodes a catalog config blob.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        bincode::deserialize(raw)
            .map_err(|err| KitbagError::CatalogParse(format!("catalog config: {err}")))
    }

    /// Encodes the config for distribution next to its partitions.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn component_kinds_order_ascending() {
        assert!(ComponentKind::Core < ComponentKind::Editor);
        assert!(ComponentKind::Editor < ComponentKind::Optional);
        assert!(ComponentKind::Optional < ComponentKind::ThirdParty);

        let mut sorted = ComponentKind::ALL;
        sorted.sort();
        assert_eq!(sorted, ComponentKind::ALL);
    }

    #[test]
    fn module_types_order_matches_catalog_order() {
        let mut sorted = ModuleType::ALL;
        sorted.sort();
        assert_eq!(sorted, ModuleType::ALL);
    }

    #[test]
    fn display_names_parse_back() {
        for kind in ComponentKind::ALL {
            assert_eq!(kind.to_string().parse::<ComponentKind>().unwrap(), kind);
        }
        for ty in ModuleType::ALL {
            assert_eq!(ty.to_string().parse::<ModuleType>().unwrap(), ty);
        }
        assert!("Weird".parse::<ComponentKind>().is_err());
        assert!("Weird".parse::<ModuleType>().is_err());
    }

    #[test]
    fn config_round_trips_through_bincode() {
        let mut components = BTreeMap::new();
        components.insert(
            ComponentKind::Core,
            Component {
                dependency_urls: vec!["https://example.com/pkg.git".into()],
                paths: vec!["lib/core".into()],
                ..Component::default()
            },
        );
        let mut modules = BTreeMap::new();
        modules.insert(
            ModuleType::Core,
            vec![Module {
                id: 1,
                name: "core".into(),
                version: "1.2.0".into(),
                description: "runtime core".into(),
                footnote: String::new(),
                components,
            }],
        );
        let config = CatalogConfig {
            modules,
            tools: vec![ToolLink {
                name: "docs".into(),
                url: "https://example.com/docs".into(),
            }],
        };

        let decoded = CatalogConfig::from_bytes(&config.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn malformed_config_is_a_parse_error() {
        let err = CatalogConfig::from_bytes(&[0xff, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, KitbagError::CatalogParse(_)));
    }
}
