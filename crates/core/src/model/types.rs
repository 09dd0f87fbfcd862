use serde::{Deserialize, Serialize};

use crate::lifecycle::FabricationMode;
use crate::model::declaration::Location;
use crate::model::key::{BindingKey, Dependency, TypeRef};

/// Accessibility of a constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Internal,
    Protected,
    Private,
}

impl Visibility {
    /// Only public and internal constructors may be auto-wired
    pub fn is_eligible(&self) -> bool {
        matches!(self, Visibility::Public | Visibility::Internal)
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Public
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constructor {
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub parameters: Vec<Dependency>,
    #[serde(default)]
    pub location: Option<Location>,
}

/// A settable member that must be assigned after construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredMember {
    pub name: String,
    pub dependency: Dependency,
}

/// Type metadata used when synthesizing bindings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default, rename = "generic")]
    pub is_generic: bool,
    #[serde(default, rename = "interface")]
    pub is_interface: bool,
    #[serde(default)]
    pub constructors: Vec<Constructor>,
    #[serde(default)]
    pub required_members: Vec<RequiredMember>,
    /// Mode annotation on the type itself
    #[serde(default)]
    pub mode: Option<FabricationMode>,
    /// Keys this type declares itself bound as
    #[serde(default)]
    pub links: Vec<BindingKey>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl TypeDescriptor {
    pub fn concrete(name: impl Into<String>) -> Self {
        Self {
            ty: TypeRef::named(name),
            is_abstract: false,
            is_generic: false,
            is_interface: false,
            constructors: Vec::new(),
            required_members: Vec::new(),
            mode: None,
            links: Vec::new(),
            location: None,
        }
    }

    pub fn constructor(mut self, visibility: Visibility, parameters: Vec<BindingKey>) -> Self {
        self.constructors.push(Constructor {
            visibility,
            parameters: parameters.into_iter().map(Dependency::direct).collect(),
            location: None,
        });
        self
    }

    pub fn required_member(mut self, name: impl Into<String>, key: BindingKey) -> Self {
        self.required_members.push(RequiredMember {
            name: name.into(),
            dependency: Dependency::direct(key),
        });
        self
    }

    pub fn links_to(mut self, key: BindingKey) -> Self {
        self.links.push(key);
        self
    }

    pub fn with_mode(mut self, mode: FabricationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Concrete, non-generic, non-abstract and not an interface
    pub fn is_constructible(&self) -> bool {
        !self.is_abstract && !self.is_generic && !self.is_interface && self.ty.args.is_empty()
    }

    /// Constructors eligible for auto-wiring, with their declaration index
    pub fn eligible_constructors(&self) -> Vec<(usize, &Constructor)> {
        self.constructors
            .iter()
            .enumerate()
            .filter(|(_, ctor)| ctor.visibility.is_eligible())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligible_constructors() {
        let descriptor = TypeDescriptor::concrete("Service")
            .constructor(Visibility::Private, vec![])
            .constructor(Visibility::Internal, vec![BindingKey::named("Config")]);

        let eligible = descriptor.eligible_constructors();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].0, 1);
        assert!(descriptor.is_constructible());
    }

    #[test]
    fn test_generic_types_are_not_constructible() {
        let mut descriptor = TypeDescriptor::concrete("Repository");
        descriptor.is_generic = true;
        assert!(!descriptor.is_constructible());

        let mut descriptor = TypeDescriptor::concrete("IRepository");
        descriptor.is_interface = true;
        assert!(!descriptor.is_constructible());
    }
}
