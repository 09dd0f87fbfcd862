use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::catalog::DeclarationCatalog;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::lifecycle::FabricationMode;
use crate::model::{
    BindingKey, Link, Provider, ProviderId, ProviderKind, TypeDescriptor, TypeRef,
};

/// A provider derived from a type's constructor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedBinding {
    pub id: ProviderId,
    pub provider: Provider,
    /// Links the type declares for itself, owned by the type
    pub links: Vec<Link>,
}

impl SynthesizedBinding {
    pub fn key(&self) -> &BindingKey {
        &self.provider.produces
    }
}

/// Result of trying to synthesize one key
#[derive(Debug)]
enum Attempt {
    Synthesized(SynthesizedBinding),
    Failed(Diagnostic),
    Unavailable,
}

/// Outcome of an auto-wiring run
#[derive(Debug, Default)]
pub struct SynthesisReport {
    pub bindings: Vec<SynthesizedBinding>,
    /// Keys whose synthesis failed, with the diagnostic explaining why
    pub failures: BTreeMap<BindingKey, Diagnostic>,
    /// Keys several constructible types declare links to
    pub contested: BTreeMap<BindingKey, Vec<TypeRef>>,
    /// Keys whose only implementor failed synthesis, with that implementor
    pub blocked: BTreeMap<BindingKey, BindingKey>,
}

/// Auto-wiring worklist over the gap of one injector
pub struct AutoWirer<'a> {
    catalog: &'a DeclarationCatalog,
    /// Constructible types by the keys they declare links to
    implementors: BTreeMap<BindingKey, Vec<TypeRef>>,
}

impl<'a> AutoWirer<'a> {
    pub fn new(catalog: &'a DeclarationCatalog) -> Self {
        let mut implementors: BTreeMap<BindingKey, Vec<TypeRef>> = BTreeMap::new();
        for descriptor in catalog.type_descriptors().filter(|d| d.is_constructible()) {
            for target in &descriptor.links {
                implementors.entry(target.clone()).or_default().push(descriptor.ty.clone());
            }
        }
        for types in implementors.values_mut() {
            types.sort();
        }

        Self {
            catalog,
            implementors,
        }
    }

    /// Synthesize bindings until no missing key can be satisfied any more
    ///
    /// `provided` holds every key the injector already has a source for.
    /// Each key is attempted at most once, so construction cycles between
    /// synthesized types terminate here and are reported by the cycle check.
    pub fn run(&self, gap: BTreeSet<BindingKey>, provided: &HashSet<BindingKey>) -> SynthesisReport {
        let mut report = SynthesisReport::default();
        let mut provided = provided.clone();
        let mut attempted = HashSet::new();
        let mut queue: VecDeque<BindingKey> = gap.into_iter().collect();

        loop {
            let mut pending = BTreeSet::new();

            while let Some(key) = queue.pop_front() {
                if provided.contains(&key) || !attempted.insert(key.clone()) {
                    continue;
                }

                match self.attempt(&key) {
                    Attempt::Synthesized(mut binding) => {
                        tracing::debug!("Synthesized binding for {} from {}", key, binding.id);
                        provided.insert(key.clone());
                        binding.links.retain(|link| provided.insert(link.target.clone()));
                        for parameter in &binding.provider.parameters {
                            if !provided.contains(&parameter.key) {
                                queue.push_back(parameter.key.clone());
                            }
                        }
                        report.bindings.push(binding);
                    }
                    Attempt::Failed(diagnostic) => {
                        report.failures.insert(key, diagnostic);
                    }
                    Attempt::Unavailable => {
                        pending.insert(key);
                    }
                }
            }

            // A key no type can be built for directly may still be reached
            // through a constructible type that declares a link to it.
            let mut progressed = false;
            for key in pending {
                if provided.contains(&key) {
                    continue;
                }
                match self.implementors.get(&key).map(Vec::as_slice) {
                    Some([single]) => {
                        let implementor = BindingKey::of(single.clone());
                        if report.failures.contains_key(&implementor) {
                            report.blocked.insert(key, implementor);
                            continue;
                        }
                        if !attempted.contains(&implementor) && !provided.contains(&implementor) {
                            queue.push_back(implementor);
                            progressed = true;
                        }
                        // Retry once the implementor has declared its links.
                        attempted.remove(&key);
                        queue.push_back(key);
                    }
                    Some(several) if several.len() > 1 => {
                        report.contested.insert(key, several.to_vec());
                    }
                    _ => {}
                }
            }

            if !progressed {
                break;
            }
        }

        report
    }

    fn attempt(&self, key: &BindingKey) -> Attempt {
        if !key.is_unqualified() {
            return Attempt::Unavailable;
        }
        let Some(descriptor) = self.catalog.type_descriptor(&key.ty) else {
            return Attempt::Unavailable;
        };
        if !descriptor.is_constructible() {
            return Attempt::Unavailable;
        }

        let eligible = descriptor.eligible_constructors();
        match eligible.as_slice() {
            [] => Attempt::Failed(
                Diagnostic::error(
                    DiagnosticKind::NoEligibleConstructor,
                    format!("cannot synthesize {}: no public or internal constructor", key),
                )
                .at(descriptor.location.as_ref())
                .about(key),
            ),
            [(index, _)] => Attempt::Synthesized(synthesize(descriptor, *index, key)),
            several => Attempt::Failed(
                Diagnostic::error(
                    DiagnosticKind::AmbiguousConstructor,
                    format!(
                        "cannot synthesize {}: {} eligible constructors",
                        key,
                        several.len()
                    ),
                )
                .at(descriptor.location.as_ref())
                .about(key),
            ),
        }
    }
}

fn synthesize(descriptor: &TypeDescriptor, index: usize, key: &BindingKey) -> SynthesizedBinding {
    let constructor = &descriptor.constructors[index];
    let kind = ProviderKind::Synthesized {
        ty: descriptor.ty.clone(),
        constructor: index,
    };
    let id = ProviderId::new(descriptor.ty.clone(), kind.member_name());

    let parameters = constructor
        .parameters
        .iter()
        .cloned()
        .chain(descriptor.required_members.iter().map(|m| m.dependency.clone()))
        .collect();

    let provider = Provider {
        kind,
        produces: key.clone(),
        parameters,
        mode: descriptor.mode.unwrap_or(FabricationMode::Recurrent),
        partial: None,
        is_static: true,
        location: constructor
            .location
            .clone()
            .or_else(|| descriptor.location.clone()),
    };

    let links = descriptor
        .links
        .iter()
        .filter(|target| *target != key)
        .map(|target| Link {
            source: key.clone(),
            target: target.clone(),
            location: descriptor.location.clone(),
        })
        .collect();

    SynthesizedBinding { id, provider, links }
}
