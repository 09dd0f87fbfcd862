use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::catalog::DeclarationCatalog;
use crate::config::LinkerSettings;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::errors::CoreError;
use crate::lifecycle::FabricationMode;
use crate::model::{
    BindingKey, ChildInjectorFactory, ContractMember, Dependency, DependencyContract, Injector,
    Link, Location, PartialContribution, Provider, ProviderId, Specification, TypeRef,
};
use crate::resolver::graph::{
    BindingSource, Contribution, ResolvedBinding, ResolvedBuilder, ResolvedGraph,
};
use crate::resolver::synthesis::AutoWirer;

/// The parent a child injector is resolved against
#[derive(Debug, Clone, Copy)]
pub struct ParentContext<'a> {
    pub graph: &'a ResolvedGraph,
    /// Factory on the parent that creates the child
    pub factory: &'a ChildInjectorFactory,
}

/// Graph and diagnostics of one injector pass
#[derive(Debug, Clone)]
pub struct ResolverOutput {
    pub graph: ResolvedGraph,
    pub diagnostics: Diagnostics,
}

/// A declared source competing for a key
#[derive(Debug, Clone)]
enum Candidate {
    Provider { id: ProviderId, provider: Provider },
    Link { link: Link, owner: TypeRef },
    Contract { contract: TypeRef, member: ContractMember },
    ChildParameter { factory: String, location: Option<Location> },
}

impl Candidate {
    fn partial(&self) -> Option<&PartialContribution> {
        match self {
            Candidate::Provider { provider, .. } => provider.partial.as_ref(),
            _ => None,
        }
    }

    fn location(&self) -> Option<&Location> {
        match self {
            Candidate::Provider { provider, .. } => provider.location.as_ref(),
            Candidate::Link { link, .. } => link.location.as_ref(),
            Candidate::Contract { member, .. } => member.location.as_ref(),
            Candidate::ChildParameter { location, .. } => location.as_ref(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Candidate::Provider { id, .. } => format!("provider {}", id),
            Candidate::Link { link, owner } => format!("link {} -> {} in {}", link.source, link.target, owner),
            Candidate::Contract { contract, member } => format!("contract member {}::{}", contract, member.name),
            Candidate::ChildParameter { factory, .. } => format!("parameter of child factory '{}'", factory),
        }
    }

    fn into_binding(self, key: BindingKey) -> ResolvedBinding {
        let location = self.location().cloned();
        let (source, dependencies, mode) = match self {
            Candidate::Provider { id, provider } => {
                let dependencies = provider.parameters.clone();
                let mode = provider.mode;
                (BindingSource::Provider { id, provider }, dependencies, mode)
            }
            Candidate::Link { link, owner } => {
                let dependencies = vec![Dependency::direct(link.source.clone())];
                (BindingSource::Link { link, owner }, dependencies, FabricationMode::Recurrent)
            }
            Candidate::Contract { contract, member } => (
                BindingSource::Contract {
                    contract,
                    member: member.name,
                },
                Vec::new(),
                FabricationMode::Recurrent,
            ),
            Candidate::ChildParameter { factory, .. } => (
                BindingSource::ChildParameter { factory },
                Vec::new(),
                FabricationMode::Recurrent,
            ),
        };

        ResolvedBinding {
            key,
            source,
            dependencies,
            mode,
            location,
        }
    }
}

/// Per-injector resolution state
#[derive(Default)]
struct Workspace {
    candidates: BTreeMap<BindingKey, Vec<Candidate>>,
    /// Needed keys with the first declaration that asked for them
    needed: BTreeMap<BindingKey, String>,
}

impl Workspace {
    fn offer(&mut self, key: BindingKey, candidate: Candidate) {
        self.candidates.entry(key).or_default().push(candidate);
    }

    fn need(&mut self, key: &BindingKey, requester: impl FnOnce() -> String) {
        if !self.needed.contains_key(key) {
            self.needed.insert(key.clone(), requester());
        }
    }
}

/// Computes the binding graph of one injector
pub struct BindingResolver<'a> {
    catalog: &'a DeclarationCatalog,
    settings: &'a LinkerSettings,
}

impl<'a> BindingResolver<'a> {
    pub fn new(catalog: &'a DeclarationCatalog, settings: &'a LinkerSettings) -> Self {
        Self { catalog, settings }
    }

    /// Resolve `injector`, optionally as a child of `parent`
    ///
    /// Gaps, conflicts and cycles are aggregated into the returned
    /// diagnostics. `Err` is reserved for broken resolver invariants.
    pub fn resolve(
        &self,
        injector: &Injector,
        parent: Option<ParentContext<'_>>,
    ) -> Result<ResolverOutput, CoreError> {
        tracing::debug!("Resolving injector {}", injector.ty);

        let specifications = self.specifications_of(injector)?;
        let contracts = self.contracts_of(injector)?;
        let mut diagnostics = Diagnostics::new();
        let mut workspace = Workspace::default();

        for spec in &specifications {
            self.collect_specification(spec, &mut workspace);
        }

        for contract in &contracts {
            for member in &contract.members {
                workspace.offer(
                    member.produces.clone(),
                    Candidate::Contract {
                        contract: contract.ty.clone(),
                        member: member.clone(),
                    },
                );
            }
        }

        if let Some(context) = parent {
            for key in &context.factory.parameters {
                workspace.offer(
                    key.clone(),
                    Candidate::ChildParameter {
                        factory: context.factory.name.clone(),
                        location: context.factory.location.clone(),
                    },
                );
            }
        }

        for output in &injector.outputs {
            workspace.need(&output.key, || format!("output '{}'", output.name));
        }

        // Own declarations shadow the parent's bindings.
        let inherited: BTreeSet<BindingKey> = parent
            .map(|context| {
                context
                    .graph
                    .keys()
                    .filter(|key| !workspace.candidates.contains_key(*key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut synthesis_failures = BTreeMap::new();
        let mut contested = BTreeMap::new();
        let mut blocked: BTreeMap<BindingKey, BindingKey> = BTreeMap::new();
        if self.settings.auto_wiring {
            let provided: HashSet<BindingKey> = workspace
                .candidates
                .keys()
                .chain(inherited.iter())
                .cloned()
                .collect();
            let gap: BTreeSet<BindingKey> = workspace
                .needed
                .keys()
                .filter(|key| !provided.contains(*key))
                .cloned()
                .collect();

            if !gap.is_empty() {
                let report = AutoWirer::new(self.catalog).run(gap, &provided);
                tracing::debug!(
                    "Auto-wiring synthesized {} binding(s) for {}",
                    report.bindings.len(),
                    injector.ty
                );

                for binding in report.bindings {
                    for parameter in &binding.provider.parameters {
                        workspace.need(&parameter.key, || format!("synthesized {}", binding.id));
                    }
                    for link in binding.links {
                        workspace.offer(
                            link.target.clone(),
                            Candidate::Link {
                                link,
                                owner: binding.id.owner.clone(),
                            },
                        );
                    }
                    workspace.offer(
                        binding.provider.produces.clone(),
                        Candidate::Provider {
                            id: binding.id,
                            provider: binding.provider,
                        },
                    );
                }
                synthesis_failures = report.failures;
                contested = report.contested;
                blocked = report.blocked;
            }
        }

        let unbound = |key: &BindingKey| {
            workspace.needed.contains_key(key) && !workspace.candidates.contains_key(key)
        };
        let mut failed: BTreeSet<&BindingKey> = synthesis_failures.keys().filter(|key| unbound(*key)).collect();
        failed.extend(
            blocked
                .iter()
                .filter(|(key, _)| unbound(*key))
                .map(|(_, implementor)| implementor),
        );
        for key in failed {
            if let Some(diagnostic) = synthesis_failures.get(key) {
                diagnostics.push(diagnostic.clone());
            }
        }

        for (key, requester) in &workspace.needed {
            if workspace.candidates.contains_key(key)
                || inherited.contains(key)
                || synthesis_failures.contains_key(key)
            {
                continue;
            }
            let mut message = format!(
                "no binding for '{}' required by {} in {}",
                key, requester, injector.ty
            );
            if let Some(implementor) = blocked.get(key) {
                message.push_str(&format!(
                    "; its only implementor {} cannot be synthesized",
                    implementor
                ));
            }
            if let Some(types) = contested.get(key) {
                let names: Vec<String> = types.iter().map(|t| t.to_string()).collect();
                message.push_str(&format!(
                    "; several types declare a link to it: {}",
                    names.join(", ")
                ));
            }
            diagnostics.push(
                Diagnostic::error(DiagnosticKind::IncompleteSpecification, message)
                    .at(injector.location.as_ref())
                    .about(key),
            );
        }

        let parent_ty = parent.map(|context| context.graph.injector.clone());
        let mut graph = ResolvedGraph::new(injector.ty.clone(), parent_ty, injector.generated_name());

        for (key, candidates) in std::mem::take(&mut workspace.candidates) {
            let binding = self.select(&key, candidates, &mut diagnostics)?;
            graph.insert(binding);
        }

        if let Some(context) = parent {
            for key in &inherited {
                let mode = context
                    .graph
                    .binding(key)
                    .map(|binding| binding.mode)
                    .ok_or_else(|| CoreError::internal(format!("inherited key {} vanished from parent", key)))?;
                graph.insert(ResolvedBinding {
                    key: key.clone(),
                    source: BindingSource::Inherited {
                        parent: context.graph.injector.clone(),
                    },
                    dependencies: Vec::new(),
                    mode,
                    location: None,
                });
            }
        }

        graph.finish();

        for cycle in graph.detect_cycles() {
            let mut diagnostic = Diagnostic::error(
                DiagnosticKind::CyclicDependency,
                format!("construction cycle: {}", cycle.path_string()),
            );
            if let Some(first) = cycle.keys.first() {
                let location = graph.binding(first).and_then(|b| b.location.as_ref());
                diagnostic = diagnostic.at(location).about(first);
            }
            diagnostics.push(diagnostic);
        }

        for entry in &injector.builders {
            let builders: Vec<_> = specifications
                .iter()
                .flat_map(|spec| {
                    spec.builders
                        .iter()
                        .filter(|builder| builder.target == entry.target)
                        .map(|builder| {
                            (
                                ProviderId::new(spec.ty.clone(), builder.kind.member_name()),
                                builder.clone(),
                            )
                        })
                })
                .collect();

            if builders.is_empty() {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::IncompleteSpecification,
                        format!(
                            "no builder declared for '{}' required by builder entry '{}' in {}",
                            entry.target, entry.name, injector.ty
                        ),
                    )
                    .at(entry.location.as_ref().or(injector.location.as_ref()))
                    .about(&entry.target),
                );
            }

            graph.builders.push(ResolvedBuilder {
                name: entry.name.clone(),
                target: entry.target.clone(),
                builders,
            });
        }

        graph.outputs = injector.outputs.clone();
        graph.children = injector.children.clone();
        graph.instances = specifications
            .iter()
            .filter(|spec| spec.requires_instance())
            .map(|spec| spec.ty.clone())
            .collect();

        self.check_closure(&graph, &workspace.needed, &diagnostics)?;

        diagnostics.attribute_to(&injector.ty);
        tracing::debug!(
            "Resolved injector {}: {} binding(s), {} diagnostic(s)",
            injector.ty,
            graph.len(),
            diagnostics.len()
        );

        Ok(ResolverOutput { graph, diagnostics })
    }

    fn specifications_of(&self, injector: &Injector) -> Result<Vec<&'a Specification>, CoreError> {
        injector
            .specifications
            .iter()
            .map(|ty| {
                self.catalog.specification(ty).ok_or_else(|| {
                    CoreError::internal(format!(
                        "injector {} composes unregistered specification {}",
                        injector.ty, ty
                    ))
                })
            })
            .collect()
    }

    fn contracts_of(&self, injector: &Injector) -> Result<Vec<&'a DependencyContract>, CoreError> {
        injector
            .contracts
            .iter()
            .map(|ty| {
                self.catalog.contract(ty).ok_or_else(|| {
                    CoreError::internal(format!(
                        "injector {} uses unregistered contract {}",
                        injector.ty, ty
                    ))
                })
            })
            .collect()
    }

    fn collect_specification(&self, spec: &Specification, workspace: &mut Workspace) {
        for provider in &spec.providers {
            let id = spec.provider_id(provider);
            for parameter in &provider.parameters {
                workspace.need(&parameter.key, || format!("provider {}", id));
            }
            workspace.offer(
                provider.produces.clone(),
                Candidate::Provider {
                    id,
                    provider: provider.clone(),
                },
            );
        }

        for builder in &spec.builders {
            for parameter in &builder.parameters {
                workspace.need(&parameter.key, || {
                    format!("builder {}::{}", spec.ty, builder.kind.member_name())
                });
            }
        }

        for link in &spec.links {
            workspace.need(&link.source, || {
                format!("link {} -> {} in {}", link.source, link.target, spec.ty)
            });
            workspace.offer(
                link.target.clone(),
                Candidate::Link {
                    link: link.clone(),
                    owner: spec.ty.clone(),
                },
            );
        }
    }

    /// Pick the source for one key, reporting conflicts
    ///
    /// A conflicting key still gets a binding so the rest of the graph can
    /// be checked; the diagnostic keeps the injector from being emitted.
    fn select(
        &self,
        key: &BindingKey,
        candidates: Vec<Candidate>,
        diagnostics: &mut Diagnostics,
    ) -> Result<ResolvedBinding, CoreError> {
        let (partials, sources): (Vec<Candidate>, Vec<Candidate>) =
            candidates.into_iter().partition(|c| c.partial().is_some());

        if sources.len() > 1 {
            let described: Vec<String> = sources.iter().map(Candidate::describe).collect();
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::DuplicateBinding,
                    format!("'{}' is bound more than once: {}", key, described.join(", ")),
                )
                .at(sources[1].location())
                .about(key),
            );
        }

        if !sources.is_empty() && !partials.is_empty() {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::DuplicateBinding,
                    format!(
                        "'{}' has a non-partial source next to {} partial contribution(s)",
                        key,
                        partials.len()
                    ),
                )
                .at(sources[0].location())
                .about(key),
            );
        }

        if let Some(source) = sources.into_iter().next() {
            return Ok(source.into_binding(key.clone()));
        }

        let mut contributions = Vec::with_capacity(partials.len());
        for candidate in partials {
            match candidate {
                Candidate::Provider { id, provider } => contributions.push(Contribution { id, provider }),
                other => {
                    return Err(CoreError::internal(format!(
                        "{} was classified as a partial contribution to {}",
                        other.describe(),
                        key
                    )))
                }
            }
        }
        contributions.sort_by(|a, b| a.id.cmp(&b.id));

        let mut entry_keys: BTreeMap<&str, Vec<&ProviderId>> = BTreeMap::new();
        for contribution in &contributions {
            if let Some(PartialContribution::Entry { key: entry }) = contribution.shape() {
                entry_keys.entry(entry.as_str()).or_default().push(&contribution.id);
            }
        }
        for (entry, ids) in entry_keys.iter().filter(|(_, ids)| ids.len() > 1) {
            let described: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::DuplicateBinding,
                    format!(
                        "map entry '{}' of '{}' is contributed more than once: {}",
                        entry,
                        key,
                        described.join(", ")
                    ),
                )
                .about(key),
            );
        }

        let dependencies = contributions
            .iter()
            .flat_map(|contribution| contribution.provider.parameters.iter().cloned())
            .collect();
        let location = contributions.first().and_then(|c| c.provider.location.clone());

        Ok(ResolvedBinding {
            key: key.clone(),
            source: BindingSource::Aggregate { contributions },
            dependencies,
            mode: FabricationMode::Recurrent,
            location,
        })
    }

    /// Every needed key must end up bound or reported
    fn check_closure(
        &self,
        graph: &ResolvedGraph,
        needed: &BTreeMap<BindingKey, String>,
        diagnostics: &Diagnostics,
    ) -> Result<(), CoreError> {
        for key in needed.keys() {
            if graph.contains(key) {
                continue;
            }
            let reported = diagnostics.iter().any(|d| d.key.as_ref() == Some(key));
            if !reported {
                return Err(CoreError::internal(format!(
                    "needed key {} in {} is neither bound nor reported",
                    key, graph.injector
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRecords;
    use crate::model::{TypeDescriptor, Visibility};

    fn key(name: &str) -> BindingKey {
        BindingKey::named(name)
    }

    fn resolve(records: CatalogRecords, auto_wiring: bool) -> ResolverOutput {
        let injector = records.injectors[0].clone();
        let (catalog, diagnostics) = DeclarationCatalog::build(records);
        assert!(diagnostics.is_empty(), "{}", diagnostics);
        let settings = LinkerSettings::new().with_auto_wiring(auto_wiring);
        BindingResolver::new(&catalog, &settings)
            .resolve(&injector, None)
            .unwrap()
    }

    #[test]
    fn test_missing_key_reported_once_per_key() {
        let records = CatalogRecords::new()
            .specification(
                Specification::named("Spec")
                    .provider(Provider::method("a", key("A")).param(key("Missing")))
                    .provider(Provider::method("b", key("B")).param(key("Missing"))),
            )
            .injector(Injector::named("App").compose("Spec").output("a", key("A")));

        let output = resolve(records, false);
        assert_eq!(output.diagnostics.count_of(DiagnosticKind::IncompleteSpecification), 1);
        assert!(output
            .diagnostics
            .mentions(DiagnosticKind::IncompleteSpecification, &key("Missing")));
        assert!(output.diagnostics.iter().all(|d| d.injector == Some(TypeRef::named("App"))));
    }

    #[test]
    fn test_deferred_parameter_is_the_same_need() {
        let records = CatalogRecords::new()
            .specification(
                Specification::named("Spec")
                    .provider(Provider::method("a", key("A")).deferred_param(key("B")).param(key("B")))
                    .provider(Provider::method("b", key("B"))),
            )
            .injector(Injector::named("App").compose("Spec").output("a", key("A")));

        let output = resolve(records, false);
        assert!(output.diagnostics.is_empty());
        assert_eq!(output.graph.len(), 2);
    }

    #[test]
    fn test_duplicate_across_specifications() {
        let records = CatalogRecords::new()
            .specification(Specification::named("One").provider(Provider::method("a", key("A"))))
            .specification(Specification::named("Two").provider(Provider::property("a", key("A"))))
            .injector(Injector::named("App").compose("One").compose("Two").output("a", key("A")));

        let output = resolve(records, false);
        assert_eq!(output.diagnostics.count_of(DiagnosticKind::DuplicateBinding), 1);
        assert!(output.graph.contains(&key("A")));
    }

    #[test]
    fn test_synthesis_failure_not_double_reported() {
        let records = CatalogRecords::new()
            .type_descriptor(
                TypeDescriptor::concrete("Service")
                    .constructor(Visibility::Public, vec![])
                    .constructor(Visibility::Public, vec![key("Int")]),
            )
            .injector(Injector::named("App").output("service", key("Service")));

        let output = resolve(records, true);
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics.count_of(DiagnosticKind::AmbiguousConstructor), 1);
    }

    #[test]
    fn test_failed_implementor_explains_missing_link_target() {
        let records = CatalogRecords::new()
            .type_descriptor(
                TypeDescriptor::concrete("SqlStore")
                    .constructor(Visibility::Public, vec![])
                    .constructor(Visibility::Public, vec![key("Url")])
                    .links_to(key("IStore")),
            )
            .injector(Injector::named("App").output("store", key("IStore")));

        let output = resolve(records, true);
        assert_eq!(output.diagnostics.count_of(DiagnosticKind::AmbiguousConstructor), 1);
        assert!(output
            .diagnostics
            .mentions(DiagnosticKind::AmbiguousConstructor, &key("SqlStore")));
        let missing: Vec<_> = output
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::IncompleteSpecification)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].key, Some(key("IStore")));
        assert!(missing[0].message.contains("SqlStore"));
    }

    #[test]
    fn test_builder_entry_needs_builder_declaration() {
        let records = CatalogRecords::new()
            .specification(
                Specification::named("Spec")
                    .provider(Provider::method("clock", key("Clock")))
                    .builder(crate::model::Builder::method("inject_page", key("Page")).param(key("Clock"))),
            )
            .injector(
                Injector::named("App")
                    .compose("Spec")
                    .builder("build_page", key("Page"))
                    .builder("build_view", key("View")),
            );

        let output = resolve(records, false);
        assert_eq!(output.diagnostics.count_of(DiagnosticKind::IncompleteSpecification), 1);
        assert!(output
            .diagnostics
            .mentions(DiagnosticKind::IncompleteSpecification, &key("View")));
        assert_eq!(output.graph.builder("build_page").map(|b| b.builders.len()), Some(1));
        assert_eq!(output.graph.instances, vec![TypeRef::named("Spec")]);
    }
}
