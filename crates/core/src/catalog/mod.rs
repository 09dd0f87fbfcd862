//! Immutable declaration catalog of one linker pass.

pub mod records;
pub mod validation;

pub use records::CatalogRecords;
pub use validation::StructuralValidator;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::model::{DependencyContract, Injector, Specification, TypeDescriptor, TypeRef};

/// Normalized declarations shared read-only by every resolver pass
#[derive(Debug, Default)]
pub struct DeclarationCatalog {
    specifications: BTreeMap<TypeRef, Specification>,
    contracts: BTreeMap<TypeRef, DependencyContract>,
    injectors: BTreeMap<TypeRef, Injector>,
    types: HashMap<TypeRef, TypeDescriptor>,
    /// Structural errors per declaration; a declaration listed here is invalid
    structural: BTreeMap<TypeRef, Vec<Diagnostic>>,
}

impl DeclarationCatalog {
    /// Assemble and structurally validate the catalog
    ///
    /// Returns every structural diagnostic found. A declaration with errors
    /// stays in the catalog but blocks the injectors that use it.
    pub fn build(records: CatalogRecords) -> (Arc<Self>, Diagnostics) {
        let validator = StructuralValidator::new();
        let mut catalog = Self::default();

        for spec in records.specifications {
            if catalog.specifications.contains_key(&spec.ty) {
                catalog.record(
                    &spec.ty.clone(),
                    duplicate_declaration("specification", &spec.ty, spec.location.as_ref()),
                );
                continue;
            }
            for diagnostic in validator.validate_specification(&spec) {
                catalog.record(&spec.ty, diagnostic);
            }
            catalog.specifications.insert(spec.ty.clone(), spec);
        }

        for contract in records.contracts {
            if catalog.contracts.contains_key(&contract.ty) {
                catalog.record(
                    &contract.ty.clone(),
                    duplicate_declaration("dependency contract", &contract.ty, contract.location.as_ref()),
                );
                continue;
            }
            for diagnostic in validator.validate_contract(&contract) {
                catalog.record(&contract.ty, diagnostic);
            }
            catalog.contracts.insert(contract.ty.clone(), contract);
        }

        for descriptor in records.types {
            if catalog.types.contains_key(&descriptor.ty) {
                catalog.record(
                    &descriptor.ty.clone(),
                    duplicate_declaration("type descriptor", &descriptor.ty, descriptor.location.as_ref()),
                );
                continue;
            }
            catalog.types.insert(descriptor.ty.clone(), descriptor);
        }

        for injector in records.injectors {
            if catalog.injectors.contains_key(&injector.ty) {
                catalog.record(
                    &injector.ty.clone(),
                    duplicate_declaration("injector", &injector.ty, injector.location.as_ref()),
                );
                continue;
            }
            catalog.injectors.insert(injector.ty.clone(), injector);
        }

        let specification_names: BTreeSet<TypeRef> = catalog.specifications.keys().cloned().collect();
        let contract_names: BTreeSet<TypeRef> = catalog.contracts.keys().cloned().collect();
        let injector_names: BTreeSet<TypeRef> = catalog.injectors.keys().cloned().collect();

        let mut injector_errors = Vec::new();
        for injector in catalog.injectors.values() {
            for diagnostic in validator.validate_injector(
                injector,
                &specification_names,
                &contract_names,
                &injector_names,
            ) {
                injector_errors.push((injector.ty.clone(), diagnostic.in_injector(&injector.ty)));
            }
        }

        for cycle in validator.detect_child_cycles(&catalog.injectors) {
            let rendered = cycle
                .iter()
                .map(|ty| ty.to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            for ty in cycle.iter().collect::<BTreeSet<_>>() {
                let location = catalog.injectors.get(ty).and_then(|i| i.location.as_ref());
                injector_errors.push((
                    ty.clone(),
                    Diagnostic::error(
                        DiagnosticKind::InvalidSpecification,
                        format!("child injector cycle: {}", rendered),
                    )
                    .at(location)
                    .in_injector(ty),
                ));
            }
        }

        for (ty, diagnostic) in injector_errors {
            catalog.record(&ty, diagnostic);
        }

        let diagnostics: Diagnostics = catalog.structural.values().flatten().cloned().collect();

        tracing::info!(
            "Built declaration catalog: {} specifications, {} contracts, {} injectors, {} types",
            catalog.specifications.len(),
            catalog.contracts.len(),
            catalog.injectors.len(),
            catalog.types.len()
        );
        if !diagnostics.is_empty() {
            tracing::warn!(
                "Catalog has {} structural diagnostic(s) across {} declaration(s)",
                diagnostics.len(),
                catalog.structural.len()
            );
        }

        (Arc::new(catalog), diagnostics)
    }

    fn record(&mut self, ty: &TypeRef, diagnostic: Diagnostic) {
        self.structural.entry(ty.clone()).or_default().push(diagnostic);
    }

    pub fn specification(&self, ty: &TypeRef) -> Option<&Specification> {
        self.specifications.get(ty)
    }

    pub fn contract(&self, ty: &TypeRef) -> Option<&DependencyContract> {
        self.contracts.get(ty)
    }

    pub fn injector(&self, ty: &TypeRef) -> Option<&Injector> {
        self.injectors.get(ty)
    }

    pub fn type_descriptor(&self, ty: &TypeRef) -> Option<&TypeDescriptor> {
        self.types.get(ty)
    }

    pub fn specifications(&self) -> impl Iterator<Item = &Specification> {
        self.specifications.values()
    }

    pub fn injectors(&self) -> impl Iterator<Item = &Injector> {
        self.injectors.values()
    }

    pub fn type_descriptors(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    /// Check if a declaration has structural errors
    pub fn is_invalid(&self, ty: &TypeRef) -> bool {
        self.structural.contains_key(ty)
    }

    /// Structural errors that block `injector`: its own plus those of every
    /// specification and contract it composes
    pub fn blocking_diagnostics(&self, injector: &Injector) -> Diagnostics {
        std::iter::once(&injector.ty)
            .chain(injector.specifications.iter())
            .chain(injector.contracts.iter())
            .filter_map(|ty| self.structural.get(ty))
            .flatten()
            .map(|diagnostic| {
                let mut diagnostic = diagnostic.clone();
                diagnostic.injector = Some(injector.ty.clone());
                diagnostic
            })
            .collect()
    }

    /// Injectors not produced by any child factory, in name order
    pub fn root_injectors(&self) -> Vec<&Injector> {
        let children: BTreeSet<&TypeRef> = self
            .injectors
            .values()
            .flat_map(|injector| injector.children.iter().map(|child| &child.injector))
            .collect();

        self.injectors
            .values()
            .filter(|injector| !children.contains(&injector.ty))
            .collect()
    }
}

fn duplicate_declaration(
    what: &str,
    ty: &TypeRef,
    location: Option<&crate::model::Location>,
) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::InvalidSpecification,
        format!("{} {} is declared more than once", what, ty),
    )
    .at(location)
}
