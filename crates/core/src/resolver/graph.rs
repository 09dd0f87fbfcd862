use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::lifecycle::FabricationMode;
use crate::model::{
    BindingKey, Builder, ChildInjectorFactory, Dependency, InjectorOutput, Link, Location,
    PartialContribution, Provider, ProviderId, TypeRef,
};

/// One partial provider feeding an aggregated collection or map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contribution {
    pub id: ProviderId,
    pub provider: Provider,
}

impl Contribution {
    pub fn shape(&self) -> Option<&PartialContribution> {
        self.provider.partial.as_ref()
    }
}

/// What satisfies a resolved binding key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BindingSource {
    /// A declared or synthesized provider
    Provider { id: ProviderId, provider: Provider },
    /// An alias of `link.source`, declared by `owner`
    Link { link: Link, owner: TypeRef },
    /// Partial contributions aggregated into one collection or map
    Aggregate { contributions: Vec<Contribution> },
    /// A member of a dependency contract, supplied by the caller
    Contract { contract: TypeRef, member: String },
    /// A parameter of the child factory that created this injector
    ChildParameter { factory: String },
    /// Resolved by the parent injector
    Inherited { parent: TypeRef },
}

impl BindingSource {
    /// Short label used in reports and graph dumps
    pub fn label(&self) -> String {
        match self {
            BindingSource::Provider { id, provider } if provider.kind.is_synthesized() => {
                format!("synthesized {}", id)
            }
            BindingSource::Provider { id, .. } => format!("provider {}", id),
            BindingSource::Link { link, .. } => format!("link from {}", link.source),
            BindingSource::Aggregate { contributions } => {
                format!("aggregate of {} contribution(s)", contributions.len())
            }
            BindingSource::Contract { contract, member } => format!("contract {}::{}", contract, member),
            BindingSource::ChildParameter { factory } => format!("child parameter of '{}'", factory),
            BindingSource::Inherited { parent } => format!("inherited from {}", parent),
        }
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self, BindingSource::Provider { provider, .. } if provider.kind.is_synthesized())
    }
}

/// A binding key paired with its source and fabrication mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedBinding {
    pub key: BindingKey,
    pub source: BindingSource,
    /// Requirements of the source, in parameter order
    pub dependencies: Vec<Dependency>,
    /// Declared mode; a link takes the mode of its terminal source
    pub mode: FabricationMode,
    pub location: Option<Location>,
}

impl ResolvedBinding {
    /// Dependencies that are constructed together with this binding
    pub fn construction_edges(&self) -> impl Iterator<Item = &BindingKey> {
        self.dependencies
            .iter()
            .filter(|dependency| !dependency.deferred)
            .map(|dependency| &dependency.key)
    }
}

/// An injector builder entry point with the declarations that implement it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedBuilder {
    pub name: String,
    pub target: BindingKey,
    pub builders: Vec<(ProviderId, Builder)>,
}

/// Resolution result for one injector, consumed by the emission layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedGraph {
    pub injector: TypeRef,
    pub parent: Option<TypeRef>,
    pub generated_name: String,
    bindings: BTreeMap<BindingKey, ResolvedBinding>,
    /// Binding keys with dependencies first
    order: Vec<BindingKey>,
    pub outputs: Vec<InjectorOutput>,
    pub builders: Vec<ResolvedBuilder>,
    pub children: Vec<ChildInjectorFactory>,
    /// Specifications whose instance the caller must supply
    pub instances: Vec<TypeRef>,
}

impl ResolvedGraph {
    pub fn new(injector: TypeRef, parent: Option<TypeRef>, generated_name: String) -> Self {
        Self {
            injector,
            parent,
            generated_name,
            bindings: BTreeMap::new(),
            order: Vec::new(),
            outputs: Vec::new(),
            builders: Vec::new(),
            children: Vec::new(),
            instances: Vec::new(),
        }
    }

    /// Insert a binding; the order is recomputed by `finish`
    pub fn insert(&mut self, binding: ResolvedBinding) {
        self.bindings.insert(binding.key.clone(), binding);
    }

    /// Resolve link modes and compute the emission order
    pub fn finish(&mut self) {
        let link_modes: Vec<(BindingKey, FabricationMode)> = self
            .bindings
            .values()
            .filter(|binding| matches!(binding.source, BindingSource::Link { .. }))
            .filter_map(|binding| {
                let terminal = self.terminal(&binding.key)?;
                Some((binding.key.clone(), terminal.mode))
            })
            .collect();
        for (key, mode) in link_modes {
            if let Some(binding) = self.bindings.get_mut(&key) {
                binding.mode = mode;
            }
        }

        self.order = self.topological_order();
    }

    pub fn binding(&self, key: &BindingKey) -> Option<&ResolvedBinding> {
        self.bindings.get(key)
    }

    pub fn contains(&self, key: &BindingKey) -> bool {
        self.bindings.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &BindingKey> {
        self.bindings.keys()
    }

    /// Bindings in emission order, dependencies first
    pub fn ordered(&self) -> impl Iterator<Item = &ResolvedBinding> {
        self.order.iter().filter_map(|key| self.bindings.get(key))
    }

    pub fn order(&self) -> &[BindingKey] {
        &self.order
    }

    pub fn output(&self, name: &str) -> Option<&InjectorOutput> {
        self.outputs.iter().find(|output| output.name == name)
    }

    pub fn builder(&self, name: &str) -> Option<&ResolvedBuilder> {
        self.builders.iter().find(|builder| builder.name == name)
    }

    /// Keys on the link chain starting at `key`, ending at the terminal source
    pub fn link_chain(&self, key: &BindingKey) -> Vec<BindingKey> {
        let mut chain = vec![key.clone()];
        let mut seen = HashSet::new();
        seen.insert(key.clone());

        let mut current = key;
        while let Some(BindingSource::Link { link, .. }) = self.bindings.get(current).map(|b| &b.source) {
            if !seen.insert(link.source.clone()) {
                break;
            }
            chain.push(link.source.clone());
            current = &link.source;
        }

        chain
    }

    /// The non-link binding a link chain ends at
    pub fn terminal(&self, key: &BindingKey) -> Option<&ResolvedBinding> {
        let chain = self.link_chain(key);
        let binding = chain.last().and_then(|last| self.bindings.get(last))?;
        match binding.source {
            BindingSource::Link { .. } => None,
            _ => Some(binding),
        }
    }

    /// Keys synthesized by auto-wiring
    pub fn synthesized(&self) -> impl Iterator<Item = &BindingKey> {
        self.bindings
            .values()
            .filter(|binding| binding.source.is_synthesized())
            .map(|binding| &binding.key)
    }

    /// Find construction cycles, each reported once as its full path
    pub fn detect_cycles(&self) -> Vec<ResolutionPath> {
        let mut cycles = Vec::new();
        let mut seen_cycles = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut in_progress = HashSet::new();

        for key in self.bindings.keys() {
            if !visited.contains(key) {
                let mut path = ResolutionPath::new();
                self.detect_cycle_dfs(
                    key,
                    &mut visited,
                    &mut in_progress,
                    &mut path,
                    &mut cycles,
                    &mut seen_cycles,
                );
            }
        }

        cycles
    }

    fn detect_cycle_dfs(
        &self,
        key: &BindingKey,
        visited: &mut HashSet<BindingKey>,
        in_progress: &mut HashSet<BindingKey>,
        path: &mut ResolutionPath,
        cycles: &mut Vec<ResolutionPath>,
        seen_cycles: &mut BTreeSet<Vec<BindingKey>>,
    ) {
        if in_progress.contains(key) {
            let start = path.position(key).unwrap_or(0);
            let mut cycle = ResolutionPath {
                keys: path.keys[start..].to_vec(),
            };
            if seen_cycles.insert(cycle.canonical()) {
                cycle.push(key.clone());
                cycles.push(cycle);
            }
            return;
        }

        if visited.contains(key) {
            return;
        }

        in_progress.insert(key.clone());
        path.push(key.clone());

        if let Some(binding) = self.bindings.get(key) {
            for dependency in binding.construction_edges() {
                self.detect_cycle_dfs(dependency, visited, in_progress, path, cycles, seen_cycles);
            }
        }

        path.pop();
        in_progress.remove(key);
        visited.insert(key.clone());
    }

    /// Kahn's algorithm over construction edges with sorted tie-breaks;
    /// keys left on cycles are appended in key order
    fn topological_order(&self) -> Vec<BindingKey> {
        let mut in_degree: BTreeMap<&BindingKey, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&BindingKey, Vec<&BindingKey>> = BTreeMap::new();

        for (key, binding) in &self.bindings {
            let edges: BTreeSet<&BindingKey> = binding
                .construction_edges()
                .filter(|dependency| self.bindings.contains_key(*dependency))
                .collect();
            in_degree.insert(key, edges.len());
            for dependency in edges {
                dependents.entry(dependency).or_default().push(key);
            }
        }

        let mut ready: BTreeSet<&BindingKey> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(key, _)| *key)
            .collect();
        let mut result = Vec::with_capacity(self.bindings.len());

        while let Some(key) = ready.pop_first() {
            result.push(key.clone());
            for dependent in dependents.get(key).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if result.len() != self.bindings.len() {
            let placed: HashSet<BindingKey> = result.iter().cloned().collect();
            result.extend(self.bindings.keys().filter(|key| !placed.contains(*key)).cloned());
        }

        result
    }
}

/// A chain of binding keys, used to report cycles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionPath {
    pub keys: Vec<BindingKey>,
}

impl ResolutionPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: BindingKey) {
        self.keys.push(key);
    }

    pub fn pop(&mut self) -> Option<BindingKey> {
        self.keys.pop()
    }

    fn position(&self, key: &BindingKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    /// Rotation starting at the smallest key, identifying a cycle regardless
    /// of where the walk entered it
    fn canonical(&self) -> Vec<BindingKey> {
        let start = self
            .keys
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mut rotated = self.keys[start..].to_vec();
        rotated.extend_from_slice(&self.keys[..start]);
        rotated
    }

    pub fn path_string(&self) -> String {
        self.keys
            .iter()
            .map(|key| key.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provided(name: &str, deps: &[Dependency]) -> ResolvedBinding {
        let key = BindingKey::named(name);
        let mut provider = Provider::method(name.to_lowercase(), key.clone());
        provider.parameters = deps.to_vec();
        ResolvedBinding {
            key,
            source: BindingSource::Provider {
                id: ProviderId::new(TypeRef::named("Spec"), name.to_lowercase()),
                provider,
            },
            dependencies: deps.to_vec(),
            mode: FabricationMode::Recurrent,
            location: None,
        }
    }

    fn direct(name: &str) -> Dependency {
        Dependency::direct(BindingKey::named(name))
    }

    fn graph(bindings: Vec<ResolvedBinding>) -> ResolvedGraph {
        let mut graph = ResolvedGraph::new(TypeRef::named("App"), None, "GeneratedApp".into());
        for binding in bindings {
            graph.insert(binding);
        }
        graph.finish();
        graph
    }

    #[test]
    fn test_topological_order() {
        let graph = graph(vec![
            provided("A", &[direct("B")]),
            provided("B", &[direct("C")]),
            provided("C", &[]),
            provided("D", &[]),
        ]);

        let order: Vec<String> = graph.order().iter().map(|k| k.to_string()).collect();
        assert_eq!(order, vec!["C", "B", "A", "D"]);
    }

    #[test]
    fn test_cycle_reported_once() {
        let graph = graph(vec![
            provided("A", &[direct("B")]),
            provided("B", &[direct("C")]),
            provided("C", &[direct("A")]),
        ]);

        let cycles = graph.detect_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].path_string(), "A -> B -> C -> A");
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.order().len(), 3);
    }

    #[test]
    fn test_deferred_edges_break_cycles() {
        let graph = graph(vec![
            provided("A", &[direct("B")]),
            provided("B", &[Dependency::deferred(BindingKey::named("A"))]),
        ]);

        assert!(graph.detect_cycles().is_empty());
        let order: Vec<String> = graph.order().iter().map(|k| k.to_string()).collect();
        assert_eq!(order, vec!["B", "A"]);
    }

    #[test]
    fn test_link_chain_and_terminal_mode() {
        let mut leaf = provided("Leaf", &[]);
        leaf.mode = FabricationMode::Scoped;
        let link = |source: &str, target: &str| ResolvedBinding {
            key: BindingKey::named(target),
            source: BindingSource::Link {
                link: Link::new(BindingKey::named(source), BindingKey::named(target)),
                owner: TypeRef::named("Spec"),
            },
            dependencies: vec![direct(source)],
            mode: FabricationMode::Recurrent,
            location: None,
        };

        let graph = graph(vec![leaf, link("Leaf", "ILeaf"), link("ILeaf", "INode")]);
        let chain: Vec<String> = graph
            .link_chain(&BindingKey::named("INode"))
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(chain, vec!["INode", "ILeaf", "Leaf"]);
        assert_eq!(
            graph.binding(&BindingKey::named("INode")).map(|b| b.mode),
            Some(FabricationMode::Scoped)
        );
    }
}
