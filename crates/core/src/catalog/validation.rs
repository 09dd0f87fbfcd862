use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::model::{
    DependencyContract, Injector, InstantiationMode, Location, Specification, TypeRef,
};

fn invalid(message: String, location: Option<&Location>) -> Diagnostic {
    Diagnostic::error(DiagnosticKind::InvalidSpecification, message).at(location)
}

/// Structural checks run while the catalog is assembled
///
/// Each check looks at one declaration in isolation, so an error in one
/// specification never blocks validation of another.
#[derive(Debug, Default)]
pub struct StructuralValidator;

impl StructuralValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate one specification and return every violation found
    pub fn validate_specification(&self, spec: &Specification) -> Vec<Diagnostic> {
        let mut errors = Vec::new();

        errors.extend(self.validate_static_members(spec));
        errors.extend(self.validate_member_arity(spec));
        errors.extend(self.validate_partials(spec));
        errors.extend(self.validate_links(spec));
        errors.extend(self.validate_member_names(spec));

        errors
    }

    /// Static specifications cannot declare members that need an instance
    fn validate_static_members(&self, spec: &Specification) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        if spec.mode != InstantiationMode::Static {
            return errors;
        }

        for provider in spec.providers.iter().filter(|p| !p.is_static) {
            errors.push(invalid(
                format!(
                    "static specification {} declares non-static provider '{}'",
                    spec.ty,
                    provider.kind.member_name()
                ),
                provider.location.as_ref().or(spec.location.as_ref()),
            ));
        }
        for builder in spec.builders.iter().filter(|b| !b.is_static) {
            errors.push(invalid(
                format!(
                    "static specification {} declares non-static builder '{}'",
                    spec.ty,
                    builder.kind.member_name()
                ),
                builder.location.as_ref().or(spec.location.as_ref()),
            ));
        }

        errors
    }

    /// Properties and references take no parameters; synthesized kinds are never declared
    fn validate_member_arity(&self, spec: &Specification) -> Vec<Diagnostic> {
        let mut errors = Vec::new();

        for provider in &spec.providers {
            if provider.kind.is_synthesized() {
                errors.push(invalid(
                    format!(
                        "specification {} declares a synthesized provider for '{}'",
                        spec.ty, provider.produces
                    ),
                    provider.location.as_ref(),
                ));
            } else if !provider.kind.accepts_parameters() && !provider.parameters.is_empty() {
                errors.push(invalid(
                    format!(
                        "provider '{}' in {} cannot declare parameters",
                        provider.kind.member_name(),
                        spec.ty
                    ),
                    provider.location.as_ref(),
                ));
            }
        }

        for builder in &spec.builders {
            if !builder.kind.accepts_parameters() && !builder.parameters.is_empty() {
                errors.push(invalid(
                    format!(
                        "builder '{}' in {} cannot declare parameters",
                        builder.kind.member_name(),
                        spec.ty
                    ),
                    builder.location.as_ref(),
                ));
            }
        }

        errors
    }

    /// Partial contributions must target a collection of the matching arity
    fn validate_partials(&self, spec: &Specification) -> Vec<Diagnostic> {
        spec.providers
            .iter()
            .filter_map(|provider| {
                let partial = provider.partial.as_ref()?;
                let expected = partial.expected_arity();
                if provider.produces.ty.arity() == expected {
                    return None;
                }
                Some(invalid(
                    format!(
                        "partial provider '{}' in {} produces '{}' but its contribution needs a type with {} generic argument(s)",
                        provider.kind.member_name(),
                        spec.ty,
                        provider.produces,
                        expected
                    ),
                    provider.location.as_ref(),
                ))
            })
            .collect()
    }

    fn validate_links(&self, spec: &Specification) -> Vec<Diagnostic> {
        spec.links
            .iter()
            .filter(|link| link.source == link.target)
            .map(|link| {
                invalid(
                    format!("link in {} aliases '{}' to itself", spec.ty, link.source),
                    link.location.as_ref(),
                )
            })
            .collect()
    }

    fn validate_member_names(&self, spec: &Specification) -> Vec<Diagnostic> {
        let mut seen = HashSet::new();
        let mut errors = Vec::new();

        let members = spec
            .providers
            .iter()
            .map(|p| (p.kind.member_name(), p.location.as_ref()))
            .chain(
                spec.builders
                    .iter()
                    .map(|b| (b.kind.member_name().to_string(), b.location.as_ref())),
            );

        for (name, location) in members {
            if !seen.insert(name.clone()) {
                errors.push(invalid(
                    format!("specification {} declares member '{}' twice", spec.ty, name),
                    location,
                ));
            }
        }

        errors
    }

    /// Validate one dependency contract
    pub fn validate_contract(&self, contract: &DependencyContract) -> Vec<Diagnostic> {
        let mut seen = HashSet::new();
        contract
            .members
            .iter()
            .filter(|member| !seen.insert(member.name.as_str()))
            .map(|member| {
                invalid(
                    format!(
                        "dependency contract {} declares member '{}' twice",
                        contract.ty, member.name
                    ),
                    member.location.as_ref(),
                )
            })
            .collect()
    }

    /// Validate one injector against the declarations known to the catalog
    pub fn validate_injector(
        &self,
        injector: &Injector,
        specifications: &BTreeSet<TypeRef>,
        contracts: &BTreeSet<TypeRef>,
        injectors: &BTreeSet<TypeRef>,
    ) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        let location = injector.location.as_ref();

        for spec in &injector.specifications {
            if !specifications.contains(spec) {
                errors.push(invalid(
                    format!("injector {} composes unknown specification {}", injector.ty, spec),
                    location,
                ));
            }
        }

        for contract in &injector.contracts {
            if !contracts.contains(contract) {
                errors.push(invalid(
                    format!("injector {} uses unknown dependency contract {}", injector.ty, contract),
                    location,
                ));
            }
        }

        for child in &injector.children {
            if !injectors.contains(&child.injector) {
                errors.push(invalid(
                    format!(
                        "child factory '{}' of {} produces unknown injector {}",
                        child.name, injector.ty, child.injector
                    ),
                    child.location.as_ref().or(location),
                ));
            }
        }

        let mut names = HashSet::new();
        let entry_points = injector
            .outputs
            .iter()
            .map(|o| (o.name.as_str(), o.location.as_ref()))
            .chain(injector.builders.iter().map(|b| (b.name.as_str(), b.location.as_ref())))
            .chain(injector.children.iter().map(|c| (c.name.as_str(), c.location.as_ref())));

        for (name, entry_location) in entry_points {
            if !names.insert(name) {
                errors.push(invalid(
                    format!("injector {} declares entry point '{}' twice", injector.ty, name),
                    entry_location.or(location),
                ));
            }
        }

        errors
    }

    /// Find child-injector reference cycles, each reported once as its path
    pub fn detect_child_cycles(&self, injectors: &BTreeMap<TypeRef, Injector>) -> Vec<Vec<TypeRef>> {
        let mut cycles = Vec::new();
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for ty in injectors.keys() {
            if !visited.contains(ty) {
                self.detect_cycle(ty, injectors, &mut visited, &mut rec_stack, &mut path, &mut cycles);
            }
        }

        cycles
    }

    fn detect_cycle(
        &self,
        ty: &TypeRef,
        injectors: &BTreeMap<TypeRef, Injector>,
        visited: &mut HashSet<TypeRef>,
        rec_stack: &mut HashSet<TypeRef>,
        path: &mut Vec<TypeRef>,
        cycles: &mut Vec<Vec<TypeRef>>,
    ) {
        visited.insert(ty.clone());
        rec_stack.insert(ty.clone());
        path.push(ty.clone());

        if let Some(injector) = injectors.get(ty) {
            for child in &injector.children {
                if !visited.contains(&child.injector) {
                    self.detect_cycle(&child.injector, injectors, visited, rec_stack, path, cycles);
                } else if rec_stack.contains(&child.injector) {
                    let start = path.iter().position(|t| t == &child.injector).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(child.injector.clone());
                    cycles.push(cycle);
                }
            }
        }

        rec_stack.remove(ty);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BindingKey, Builder, Provider, TypeRef};

    fn key(name: &str) -> BindingKey {
        BindingKey::named(name)
    }

    #[test]
    fn test_valid_specification() {
        let spec = Specification::named("AppSpec")
            .provider(Provider::method("database", key("Database")).param(key("Config")))
            .provider(Provider::property("config", key("Config")))
            .link(key("Database"), key("IDatabase"));

        assert!(StructuralValidator::new().validate_specification(&spec).is_empty());
    }

    #[test]
    fn test_static_specification_with_instance_members() {
        let spec = Specification::named("Statics")
            .static_mode()
            .provider(Provider::method("ok", key("A")).as_static())
            .provider(Provider::method("bad", key("B")))
            .builder(Builder::method("configure", key("C")));

        let errors = StructuralValidator::new().validate_specification(&spec);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind == DiagnosticKind::InvalidSpecification));
    }

    #[test]
    fn test_wrong_arity() {
        let list = BindingKey::of(TypeRef::generic("List", [TypeRef::named("Leaf")]));
        let spec = Specification::named("Arity")
            .provider(Provider::property("value", key("A")).param(key("B")))
            .provider(Provider::method("entry", list).entry("first"));

        let errors = StructuralValidator::new().validate_specification(&spec);
        assert_eq!(errors.len(), 2);
        assert!(errors[1].message.contains("2 generic argument"));
    }

    #[test]
    fn test_self_link_and_duplicate_members() {
        let spec = Specification::named("Dupes")
            .provider(Provider::method("make", key("A")))
            .provider(Provider::method("make", key("B")))
            .link(key("A"), key("A"));

        let errors = StructuralValidator::new().validate_specification(&spec);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_injector_references() {
        let injector = Injector::named("App")
            .compose("Missing")
            .output("a", key("A"))
            .output("a", key("B"));
        let known = BTreeSet::new();

        let errors = StructuralValidator::new().validate_injector(&injector, &known, &known, &known);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_child_cycles() {
        let mut injectors = BTreeMap::new();
        let a = Injector::named("A").child("b", "B", []);
        let b = Injector::named("B").child("a", "A", []);
        let c = Injector::named("C");
        injectors.insert(a.ty.clone(), a);
        injectors.insert(b.ty.clone(), b);
        injectors.insert(c.ty.clone(), c);

        let cycles = StructuralValidator::new().detect_child_cycles(&injectors);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 3);
    }
}
