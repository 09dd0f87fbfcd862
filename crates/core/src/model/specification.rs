use serde::{Deserialize, Serialize};

use crate::model::declaration::{Builder, Link, Location, Provider, ProviderId};
use crate::model::key::{BindingKey, TypeRef};

/// Whether a specification needs a caller-supplied instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstantiationMode {
    /// Every member is static, no instance required
    Static,
    /// Non-static members are invoked on a caller-supplied instance
    Instantiated,
}

impl Default for InstantiationMode {
    fn default() -> Self {
        InstantiationMode::Instantiated
    }
}

/// Named, ordered collection of providers, builders and links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default)]
    pub mode: InstantiationMode,
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub builders: Vec<Builder>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Specification {
    /// Create an empty instantiated specification
    pub fn new(ty: TypeRef) -> Self {
        Self {
            ty,
            mode: InstantiationMode::Instantiated,
            providers: Vec::new(),
            builders: Vec::new(),
            links: Vec::new(),
            location: None,
        }
    }

    /// Create an empty specification by type name
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(TypeRef::named(name))
    }

    /// Switch to static mode; every member must then be static
    pub fn static_mode(mut self) -> Self {
        self.mode = InstantiationMode::Static;
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn builder(mut self, builder: Builder) -> Self {
        self.builders.push(builder);
        self
    }

    pub fn link(mut self, source: BindingKey, target: BindingKey) -> Self {
        self.links.push(Link::new(source, target));
        self
    }

    /// Identity of one of this specification's providers
    pub fn provider_id(&self, provider: &Provider) -> ProviderId {
        ProviderId::new(self.ty.clone(), provider.kind.member_name())
    }

    /// Check if any member needs a caller-supplied instance
    pub fn requires_instance(&self) -> bool {
        self.mode == InstantiationMode::Instantiated
            && (self.providers.iter().any(|p| !p.is_static)
                || self.builders.iter().any(|b| !b.is_static))
    }
}

/// One member of a dependency contract, treated as a pre-supplied provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMember {
    pub name: String,
    pub produces: BindingKey,
    #[serde(default)]
    pub location: Option<Location>,
}

/// External interface boundary whose values originate outside the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyContract {
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default)]
    pub members: Vec<ContractMember>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl DependencyContract {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            ty: TypeRef::named(name),
            members: Vec::new(),
            location: None,
        }
    }

    pub fn member(mut self, name: impl Into<String>, produces: BindingKey) -> Self {
        self.members.push(ContractMember {
            name: name.into(),
            produces,
            location: None,
        });
        self
    }
}
