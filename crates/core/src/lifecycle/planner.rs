use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::lifecycle::FabricationMode;
use crate::model::{BindingKey, Dependency, Provider, TypeRef};
use crate::resolver::{BindingSource, ResolvedBinding, ResolvedGraph};

/// Where a binding's value is cached
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "discipline", rename_all = "snake_case")]
pub enum CacheDiscipline {
    /// Built on every request
    Uncached,
    /// Built once per injector instance
    InjectorCache,
    /// Opens a fresh container scope for each call
    OpensContainer,
    /// Built once per innermost container scope
    ContainerCache,
    /// Supplied by the caller, never built
    External,
    /// Cached by the parent injector
    Parent,
    /// Alias of the terminal binding of a link chain
    Delegated { to: BindingKey },
}

impl CacheDiscipline {
    fn for_mode(mode: FabricationMode) -> Self {
        match mode {
            FabricationMode::Recurrent => CacheDiscipline::Uncached,
            FabricationMode::Scoped => CacheDiscipline::InjectorCache,
            FabricationMode::Container => CacheDiscipline::OpensContainer,
            FabricationMode::ContainerScoped => CacheDiscipline::ContainerCache,
        }
    }
}

/// Lifecycle decision for one binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingPlan {
    pub key: BindingKey,
    pub mode: FabricationMode,
    pub discipline: CacheDiscipline,
    /// Recurrent or container-scoped dependencies a scoped binding captures
    /// at its first construction
    pub pinned: Vec<BindingKey>,
    /// Reached from some output without an open container scope
    pub reached_outside_container: bool,
}

/// Lifecycle decision for one injector output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPlan {
    pub name: String,
    pub key: BindingKey,
    /// Output-level override, if declared
    pub mode: Option<FabricationMode>,
}

impl OutputPlan {
    pub fn opens_container(&self) -> bool {
        self.mode == Some(FabricationMode::Container)
    }
}

/// Caching disciplines of one injector and the scope problems found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecyclePlan {
    pub injector: TypeRef,
    pub parent: Option<TypeRef>,
    bindings: BTreeMap<BindingKey, BindingPlan>,
    pub outputs: Vec<OutputPlan>,
    pub diagnostics: Diagnostics,
}

impl LifecyclePlan {
    pub fn binding(&self, key: &BindingKey) -> Option<&BindingPlan> {
        self.bindings.get(key)
    }

    pub fn discipline(&self, key: &BindingKey) -> Option<&CacheDiscipline> {
        self.bindings.get(key).map(|plan| &plan.discipline)
    }

    pub fn output(&self, name: &str) -> Option<&OutputPlan> {
        self.outputs.iter().find(|output| output.name == name)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &BindingPlan> {
        self.bindings.values()
    }
}

/// Assigns caching disciplines and validates scope nesting
#[derive(Debug, Default)]
pub struct LifecyclePlanner;

impl LifecyclePlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn plan(&self, graph: &ResolvedGraph) -> LifecyclePlan {
        let mut diagnostics = Diagnostics::new();

        let mut bindings: BTreeMap<BindingKey, BindingPlan> = graph
            .ordered()
            .map(|binding| {
                let plan = BindingPlan {
                    key: binding.key.clone(),
                    mode: binding.mode,
                    discipline: self.discipline(graph, binding),
                    pinned: self.pinned(graph, binding),
                    reached_outside_container: false,
                };
                (binding.key.clone(), plan)
            })
            .collect();

        let reach = self.container_reach(graph);
        for key in &reach.outside {
            if let Some(plan) = bindings.get_mut(key) {
                plan.reached_outside_container = true;
            }
        }
        diagnostics.extend(reach.violations.into_values());

        diagnostics.extend(self.deferred_violations(graph));

        let outputs: Vec<OutputPlan> = graph
            .outputs
            .iter()
            .map(|output| OutputPlan {
                name: output.name.clone(),
                key: output.key.clone(),
                mode: output.mode,
            })
            .collect();

        for output in graph.outputs.iter().filter(|o| o.mode == Some(FabricationMode::ContainerScoped)) {
            diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::ScopeViolation,
                    format!(
                        "output '{}' is container-scoped but no container scope is open at an output",
                        output.name
                    ),
                )
                .at(output.location.as_ref())
                .about(&output.key),
            );
        }

        diagnostics.attribute_to(&graph.injector);
        tracing::debug!(
            "Planned lifecycles for {}: {} binding(s), {} scope diagnostic(s)",
            graph.injector,
            bindings.len(),
            diagnostics.len()
        );

        LifecyclePlan {
            injector: graph.injector.clone(),
            parent: graph.parent.clone(),
            bindings,
            outputs,
            diagnostics,
        }
    }

    fn discipline(&self, graph: &ResolvedGraph, binding: &ResolvedBinding) -> CacheDiscipline {
        match &binding.source {
            BindingSource::Link { .. } => match graph.terminal(&binding.key) {
                Some(terminal) => CacheDiscipline::Delegated {
                    to: terminal.key.clone(),
                },
                None => CacheDiscipline::Uncached,
            },
            BindingSource::Contract { .. } | BindingSource::ChildParameter { .. } => {
                CacheDiscipline::External
            }
            BindingSource::Inherited { .. } => CacheDiscipline::Parent,
            BindingSource::Provider { .. } | BindingSource::Aggregate { .. } => {
                CacheDiscipline::for_mode(binding.mode)
            }
        }
    }

    /// First-access pinning: what a scoped binding freezes when first built
    fn pinned(&self, graph: &ResolvedGraph, binding: &ResolvedBinding) -> Vec<BindingKey> {
        if binding.mode != FabricationMode::Scoped || matches!(binding.source, BindingSource::Link { .. }) {
            return Vec::new();
        }

        let mut pinned: Vec<BindingKey> = binding
            .construction_edges()
            .filter(|key| {
                graph.terminal(key).map_or(false, |dependency| {
                    matches!(
                        dependency.source,
                        BindingSource::Provider { .. } | BindingSource::Aggregate { .. }
                    ) && matches!(
                        dependency.mode,
                        FabricationMode::Recurrent | FabricationMode::ContainerScoped
                    )
                })
            })
            .cloned()
            .collect();
        pinned.sort();
        pinned.dedup();
        pinned
    }

    /// Walks every output and builder entry, tracking whether a container
    /// scope is open and how each value is held. A container-scoped value
    /// held live outside any container is an error; one requested straight
    /// at an output is only suspicious.
    fn container_reach(&self, graph: &ResolvedGraph) -> ContainerReach {
        let mut visited: HashSet<(BindingKey, bool, Holding)> = HashSet::new();
        let mut reach = ContainerReach::default();
        let mut stack: Vec<Step> = graph
            .outputs
            .iter()
            .map(|output| Step {
                key: output.key.clone(),
                inside: output.mode == Some(FabricationMode::Container),
                holding: Holding::Output,
                holder: format!("output '{}'", output.name),
            })
            .collect();

        for entry in &graph.builders {
            for (id, builder) in &entry.builders {
                stack.extend(builder.parameters.iter().map(|d| Step {
                    key: d.key.clone(),
                    inside: false,
                    holding: if d.deferred { Holding::Deferred } else { Holding::Live },
                    holder: format!("builder {}", id),
                }));
            }
        }

        while let Some(step) = stack.pop() {
            if !visited.insert((step.key.clone(), step.inside, step.holding)) {
                continue;
            }
            let Some(binding) = graph.binding(&step.key) else {
                continue;
            };
            if matches!(binding.source, BindingSource::Inherited { .. }) {
                continue;
            }
            if !step.inside && binding.mode != FabricationMode::Container {
                reach.outside.insert(step.key.clone());
            }

            match &binding.source {
                BindingSource::Link { link, .. } => stack.push(Step {
                    key: link.source.clone(),
                    ..step
                }),
                BindingSource::Provider { provider, .. } => {
                    if provider.mode == FabricationMode::ContainerScoped && !step.inside {
                        reach.flag(binding, step.holding, &step.holder);
                    }
                    follow(&mut stack, &step, provider, format!("'{}'", binding.key));
                }
                BindingSource::Aggregate { contributions } => {
                    let holding = match step.holding {
                        Holding::Pinned | Holding::Deferred => step.holding,
                        Holding::Output | Holding::Live => Holding::Live,
                    };
                    let held = Step {
                        holding,
                        holder: format!("aggregate '{}'", binding.key),
                        ..step.clone()
                    };
                    for contribution in contributions {
                        if contribution.provider.mode == FabricationMode::ContainerScoped && !step.inside {
                            reach.flag(binding, held.holding, &held.holder);
                        }
                        follow(&mut stack, &held, &contribution.provider, format!("contribution {}", contribution.id));
                    }
                }
                _ => {}
            }
        }

        reach
    }

    /// Deferred factories that could outlive the container scope their
    /// target is cached in
    fn deferred_violations(&self, graph: &ResolvedGraph) -> Vec<Diagnostic> {
        let mut holders: Vec<(String, FabricationMode, &[Dependency], Option<&crate::model::Location>)> =
            Vec::new();

        for binding in graph.ordered() {
            match &binding.source {
                BindingSource::Provider { provider, .. } => holders.push((
                    format!("'{}'", binding.key),
                    provider.mode,
                    provider.parameters.as_slice(),
                    provider.location.as_ref(),
                )),
                BindingSource::Aggregate { contributions } => {
                    for contribution in contributions {
                        holders.push((
                            format!("contribution {}", contribution.id),
                            contribution.provider.mode,
                            contribution.provider.parameters.as_slice(),
                            contribution.provider.location.as_ref(),
                        ));
                    }
                }
                _ => {}
            }
        }

        for entry in &graph.builders {
            for (id, builder) in &entry.builders {
                holders.push((
                    format!("builder {}", id),
                    FabricationMode::Recurrent,
                    builder.parameters.as_slice(),
                    builder.location.as_ref(),
                ));
            }
        }

        let mut violations = Vec::new();
        for (holder, mode, parameters, location) in holders {
            if mode == FabricationMode::ContainerScoped {
                continue;
            }
            for dependency in parameters.iter().filter(|d| d.deferred) {
                if self.requires_container_cache(graph, &dependency.key, &mut HashSet::new()) {
                    violations.push(
                        Diagnostic::error(
                            DiagnosticKind::ScopeViolation,
                            format!(
                                "{} binding {} holds a deferred factory of '{}', which needs a container-scoped cache that may be gone when the factory runs",
                                mode, holder, dependency.key
                            ),
                        )
                        .at(location)
                        .about(&dependency.key),
                    );
                }
            }
        }

        violations
    }

    /// Whether building `key` touches a container-scoped cache, directly or
    /// through uncached links and recurrent providers
    fn requires_container_cache(
        &self,
        graph: &ResolvedGraph,
        key: &BindingKey,
        visited: &mut HashSet<BindingKey>,
    ) -> bool {
        if !visited.insert(key.clone()) {
            return false;
        }
        let Some(binding) = graph.binding(key) else {
            return false;
        };

        match &binding.source {
            BindingSource::Link { link, .. } => {
                self.requires_container_cache(graph, &link.source, visited)
            }
            BindingSource::Provider { provider, .. } => match provider.mode {
                FabricationMode::ContainerScoped => true,
                FabricationMode::Recurrent => provider
                    .parameters
                    .iter()
                    .filter(|d| !d.deferred)
                    .any(|d| self.requires_container_cache(graph, &d.key, visited)),
                _ => false,
            },
            BindingSource::Aggregate { contributions } => {
                contributions.iter().any(|contribution| match contribution.provider.mode {
                    FabricationMode::ContainerScoped => true,
                    FabricationMode::Recurrent => contribution
                        .provider
                        .parameters
                        .iter()
                        .filter(|d| !d.deferred)
                        .any(|d| self.requires_container_cache(graph, &d.key, visited)),
                    _ => false,
                })
            }
            _ => false,
        }
    }
}

/// How a value is held by whatever requested it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Holding {
    /// Requested at an output, possibly through links
    Output,
    /// Captured by a scoped binding at its first construction
    Pinned,
    /// Behind a deferred factory, checked by `deferred_violations`
    Deferred,
    /// Held by a recurrent binding, aggregate or builder entry
    Live,
}

#[derive(Debug, Clone)]
struct Step {
    key: BindingKey,
    inside: bool,
    holding: Holding,
    holder: String,
}

#[derive(Debug, Default)]
struct ContainerReach {
    outside: BTreeSet<BindingKey>,
    violations: BTreeMap<BindingKey, Diagnostic>,
}

impl ContainerReach {
    fn flag(&mut self, binding: &ResolvedBinding, holding: Holding, holder: &str) {
        let diagnostic = match holding {
            Holding::Pinned | Holding::Deferred => return,
            Holding::Output => Diagnostic::warning(
                DiagnosticKind::ScopeViolation,
                format!(
                    "container-scoped '{}' is requested by {} outside any container scope and is rebuilt on every request there",
                    binding.key, holder
                ),
            ),
            Holding::Live => Diagnostic::error(
                DiagnosticKind::ScopeViolation,
                format!(
                    "{} holds container-scoped '{}' outside any container scope without pinning it",
                    holder, binding.key
                ),
            ),
        }
        .at(binding.location.as_ref())
        .about(&binding.key);

        let replace = self
            .violations
            .get(&binding.key)
            .map_or(true, |existing| !existing.is_error() && diagnostic.is_error());
        if replace {
            self.violations.insert(binding.key.clone(), diagnostic);
        }
    }
}

/// Queues the parameters of `provider` as held by it
fn follow(stack: &mut Vec<Step>, step: &Step, provider: &Provider, holder: String) {
    let inside = step.inside || provider.mode == FabricationMode::Container;
    for dependency in &provider.parameters {
        let (inside, holding) = if dependency.deferred {
            (inside && provider.mode == FabricationMode::ContainerScoped, Holding::Deferred)
        } else if provider.mode == FabricationMode::Scoped {
            (inside, Holding::Pinned)
        } else {
            match step.holding {
                Holding::Pinned | Holding::Deferred => (inside, step.holding),
                Holding::Output | Holding::Live => (inside, Holding::Live),
            }
        };
        stack.push(Step {
            key: dependency.key.clone(),
            inside,
            holding,
            holder: holder.clone(),
        });
    }
}
