use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lifecycle::FabricationMode;
use crate::model::key::{BindingKey, Dependency, TypeRef};

/// Opaque source location token passed through for later reporting
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(pub String);

impl Location {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a provider produces its value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    /// A factory method taking parameters
    Method { name: String },
    /// A computed property, no parameters
    Property { name: String },
    /// A stored field or constant, no parameters
    Reference { name: String },
    /// Derived from a type's constructor by auto-wiring
    Synthesized { ty: TypeRef, constructor: usize },
}

impl ProviderKind {
    /// Member name used in identities and generated code
    pub fn member_name(&self) -> String {
        match self {
            ProviderKind::Method { name }
            | ProviderKind::Property { name }
            | ProviderKind::Reference { name } => name.clone(),
            ProviderKind::Synthesized { constructor, .. } => format!("new#{}", constructor),
        }
    }

    /// Check if this kind accepts parameters
    pub fn accepts_parameters(&self) -> bool {
        matches!(
            self,
            ProviderKind::Method { .. } | ProviderKind::Synthesized { .. }
        )
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self, ProviderKind::Synthesized { .. })
    }
}

/// Shape of a partial provider's contribution to an aggregated binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PartialContribution {
    /// One element of a collection type with a single generic argument
    Element,
    /// One entry of a map type with two generic arguments
    Entry { key: String },
}

impl PartialContribution {
    /// Generic arity the aggregated type must have
    pub fn expected_arity(&self) -> usize {
        match self {
            PartialContribution::Element => 1,
            PartialContribution::Entry { .. } => 2,
        }
    }
}

/// Declared source of a binding key's value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    #[serde(flatten)]
    pub kind: ProviderKind,
    pub produces: BindingKey,
    #[serde(default)]
    pub parameters: Vec<Dependency>,
    #[serde(default)]
    pub mode: FabricationMode,
    #[serde(default)]
    pub partial: Option<PartialContribution>,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Provider {
    /// Create a method provider with recurrent mode
    pub fn method(name: impl Into<String>, produces: BindingKey) -> Self {
        Self::with_kind(ProviderKind::Method { name: name.into() }, produces)
    }

    /// Create a property provider with recurrent mode
    pub fn property(name: impl Into<String>, produces: BindingKey) -> Self {
        Self::with_kind(ProviderKind::Property { name: name.into() }, produces)
    }

    /// Create a reference (field) provider with recurrent mode
    pub fn reference(name: impl Into<String>, produces: BindingKey) -> Self {
        Self::with_kind(ProviderKind::Reference { name: name.into() }, produces)
    }

    fn with_kind(kind: ProviderKind, produces: BindingKey) -> Self {
        Self {
            kind,
            produces,
            parameters: Vec::new(),
            mode: FabricationMode::Recurrent,
            partial: None,
            is_static: false,
            location: None,
        }
    }

    /// Add a direct parameter
    pub fn param(mut self, key: BindingKey) -> Self {
        self.parameters.push(Dependency::direct(key));
        self
    }

    /// Add a deferred parameter
    pub fn deferred_param(mut self, key: BindingKey) -> Self {
        self.parameters.push(Dependency::deferred(key));
        self
    }

    /// Set the fabrication mode
    pub fn with_mode(mut self, mode: FabricationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Mark as a partial element contribution
    pub fn element(mut self) -> Self {
        self.partial = Some(PartialContribution::Element);
        self
    }

    /// Mark as a partial map entry contribution
    pub fn entry(mut self, key: impl Into<String>) -> Self {
        self.partial = Some(PartialContribution::Entry { key: key.into() });
        self
    }

    /// Mark as static
    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Attach a source location
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(Location::new(location));
        self
    }

    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }
}

/// How a builder applies itself to an instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuilderKind {
    Method { name: String },
    Property { name: String },
    Reference { name: String },
}

impl BuilderKind {
    pub fn member_name(&self) -> &str {
        match self {
            BuilderKind::Method { name }
            | BuilderKind::Property { name }
            | BuilderKind::Reference { name } => name,
        }
    }

    pub fn accepts_parameters(&self) -> bool {
        matches!(self, BuilderKind::Method { .. })
    }
}

/// In-place configurer of an existing instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Builder {
    #[serde(flatten)]
    pub kind: BuilderKind,
    pub target: BindingKey,
    #[serde(default)]
    pub parameters: Vec<Dependency>,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Builder {
    /// Create a method builder
    pub fn method(name: impl Into<String>, target: BindingKey) -> Self {
        Self {
            kind: BuilderKind::Method { name: name.into() },
            target,
            parameters: Vec::new(),
            is_static: false,
            location: None,
        }
    }

    /// Add a direct parameter
    pub fn param(mut self, key: BindingKey) -> Self {
        self.parameters.push(Dependency::direct(key));
        self
    }

    /// Mark as static
    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// Alias: a request for `target` is satisfied by the value bound to `source`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub source: BindingKey,
    pub target: BindingKey,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Link {
    pub fn new(source: BindingKey, target: BindingKey) -> Self {
        Self {
            source,
            target,
            location: None,
        }
    }
}

/// Stable identity of a provider: owning declaration plus member name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId {
    pub owner: TypeRef,
    pub member: String,
}

impl ProviderId {
    pub fn new(owner: TypeRef, member: impl Into<String>) -> Self {
        Self {
            owner,
            member: member.into(),
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_yaml_record() {
        let yaml = r#"
kind: method
name: leaf_a
produces: List<Leaf>
parameters: [Int]
mode: container_scoped
partial:
  shape: element
location: "spec.cs:12"
"#;
        let provider: Provider = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(provider.kind, ProviderKind::Method { name: "leaf_a".to_string() });
        assert_eq!(provider.produces.to_string(), "List<Leaf>");
        assert_eq!(provider.mode, FabricationMode::ContainerScoped);
        assert_eq!(provider.partial, Some(PartialContribution::Element));
        assert!(!provider.is_static);
        assert_eq!(provider.location, Some(Location::new("spec.cs:12")));
    }

    #[test]
    fn test_provider_builder_helpers() {
        let provider = Provider::method("create", BindingKey::named("Service"))
            .param(BindingKey::named("Config"))
            .deferred_param(BindingKey::named("Clock"))
            .with_mode(FabricationMode::Scoped)
            .entry("primary");

        assert_eq!(provider.parameters.len(), 2);
        assert!(provider.parameters[1].deferred);
        assert_eq!(provider.partial.as_ref().map(|p| p.expected_arity()), Some(2));
        assert!(provider.kind.accepts_parameters());
        assert!(!ProviderKind::Property { name: "x".into() }.accepts_parameters());
    }

    #[test]
    fn test_provider_id_display() {
        let id = ProviderId::new(TypeRef::named("app::Spec"), "create");
        assert_eq!(id.to_string(), "app::Spec::create");
    }
}
