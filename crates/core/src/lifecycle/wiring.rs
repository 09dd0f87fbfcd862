use std::any::{type_name, Any};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::errors::CoreError;
use crate::lifecycle::planner::LifecyclePlan;
use crate::lifecycle::runtime::{CacheSlot, InjectorScope, Instance, Resolution};
use crate::lifecycle::FabricationMode;
use crate::model::{BindingKey, Dependency, PartialContribution, ProviderId};
use crate::resolver::{BindingSource, Contribution, ResolvedGraph};

/// Provider implementation: builds a value from resolved arguments
pub type Factory = Arc<dyn Fn(&Arguments) -> Result<Instance, CoreError> + Send + Sync>;

/// Builder implementation: configures a caller-supplied instance
pub type BuilderFn = Arc<dyn Fn(&Instance, &Arguments) -> Result<(), CoreError> + Send + Sync>;

/// Aggregated value of element contributions
pub type Elements = Vec<Instance>;

/// Aggregated value of map entry contributions
pub type Entries = BTreeMap<String, Instance>;

fn downcast<T: Any + Send + Sync>(key: &BindingKey, instance: Instance) -> Result<Arc<T>, CoreError> {
    instance.downcast::<T>().map_err(|_| CoreError::TypeMismatch {
        key: key.to_string(),
        expected: type_name::<T>(),
    })
}

/// A lazily resolved dependency
#[derive(Clone)]
pub struct Deferred {
    wiring: Wiring,
    resolution: Resolution,
    key: BindingKey,
}

impl Deferred {
    pub fn key(&self) -> &BindingKey {
        &self.key
    }

    /// Resolve the dependency now
    pub fn get(&self) -> Result<Instance, CoreError> {
        self.wiring.resolve(&self.resolution, &self.key)
    }

    pub fn get_as<T: Any + Send + Sync>(&self) -> Result<Arc<T>, CoreError> {
        downcast(&self.key, self.get()?)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").field("key", &self.key).finish()
    }
}

#[derive(Debug, Clone)]
pub enum Argument {
    Value(Instance),
    Deferred(Deferred),
}

/// Resolved parameters handed to a factory, in declaration order
#[derive(Debug, Clone)]
pub struct Arguments {
    key: BindingKey,
    values: Vec<(BindingKey, Argument)>,
}

impl Arguments {
    /// Key of the binding being built
    pub fn key(&self) -> &BindingKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn argument(&self, index: usize) -> Result<&(BindingKey, Argument), CoreError> {
        self.values.get(index).ok_or_else(|| {
            CoreError::factory_failed(&self.key, format!("no argument at position {}", index))
        })
    }

    /// Untyped direct argument
    pub fn instance(&self, index: usize) -> Result<Instance, CoreError> {
        match self.argument(index)? {
            (_, Argument::Value(instance)) => Ok(Arc::clone(instance)),
            (key, Argument::Deferred(_)) => Err(CoreError::factory_failed(
                &self.key,
                format!("argument {} ({}) is deferred", index, key),
            )),
        }
    }

    /// Typed direct argument
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, CoreError> {
        let key = self.argument(index)?.0.clone();
        downcast(&key, self.instance(index)?)
    }

    /// Deferred argument
    pub fn deferred(&self, index: usize) -> Result<&Deferred, CoreError> {
        match self.argument(index)? {
            (_, Argument::Deferred(deferred)) => Ok(deferred),
            (key, Argument::Value(_)) => Err(CoreError::factory_failed(
                &self.key,
                format!("argument {} ({}) is not deferred", index, key),
            )),
        }
    }
}

struct WiringInner {
    graph: ResolvedGraph,
    plan: LifecyclePlan,
    factories: HashMap<ProviderId, Factory>,
    builders: HashMap<ProviderId, BuilderFn>,
    parent: Option<Wiring>,
}

/// A resolved graph bound to provider implementations
///
/// Cheap to clone; every clone shares the same factories.
#[derive(Clone)]
pub struct Wiring {
    inner: Arc<WiringInner>,
}

impl fmt::Debug for Wiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wiring")
            .field("injector", &self.inner.graph.injector)
            .field("factories", &self.inner.factories.len())
            .field("builders", &self.inner.builders.len())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

/// Collects factories before a `Wiring` is sealed
pub struct WiringBuilder {
    graph: ResolvedGraph,
    plan: LifecyclePlan,
    factories: HashMap<ProviderId, Factory>,
    builders: HashMap<ProviderId, BuilderFn>,
    parent: Option<Wiring>,
}

impl WiringBuilder {
    /// Register the implementation of a provider
    pub fn factory<F>(mut self, id: ProviderId, factory: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Instance, CoreError> + Send + Sync + 'static,
    {
        self.factories.insert(id, Arc::new(factory));
        self
    }

    /// Register the implementation of a builder declaration
    pub fn builder<F>(mut self, id: ProviderId, builder: F) -> Self
    where
        F: Fn(&Instance, &Arguments) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        self.builders.insert(id, Arc::new(builder));
        self
    }

    /// Wiring of the parent injector, required for child graphs
    pub fn parent(mut self, parent: Wiring) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Seal the wiring, checking every provider and builder has an implementation
    pub fn build(self) -> Result<Wiring, CoreError> {
        for binding in self.graph.ordered() {
            match &binding.source {
                BindingSource::Provider { id, .. } => self.require_factory(id)?,
                BindingSource::Aggregate { contributions } => {
                    for contribution in contributions {
                        self.require_factory(&contribution.id)?;
                    }
                }
                _ => {}
            }
        }

        for entry in &self.graph.builders {
            for (id, _) in &entry.builders {
                if !self.builders.contains_key(id) {
                    return Err(CoreError::FactoryNotRegistered {
                        provider: id.to_string(),
                    });
                }
            }
        }

        if self.graph.parent.is_some() && self.parent.is_none() {
            return Err(CoreError::scope(format!(
                "child injector {} needs the wiring of its parent",
                self.graph.injector
            )));
        }

        tracing::debug!(
            "Sealed wiring for {}: {} factory(ies), {} builder(s)",
            self.graph.injector,
            self.factories.len(),
            self.builders.len()
        );

        Ok(Wiring {
            inner: Arc::new(WiringInner {
                graph: self.graph,
                plan: self.plan,
                factories: self.factories,
                builders: self.builders,
                parent: self.parent,
            }),
        })
    }

    fn require_factory(&self, id: &ProviderId) -> Result<(), CoreError> {
        if self.factories.contains_key(id) {
            Ok(())
        } else {
            Err(CoreError::FactoryNotRegistered {
                provider: id.to_string(),
            })
        }
    }
}

impl Wiring {
    pub fn builder(graph: ResolvedGraph, plan: LifecyclePlan) -> WiringBuilder {
        WiringBuilder {
            graph,
            plan,
            factories: HashMap::new(),
            builders: HashMap::new(),
            parent: None,
        }
    }

    pub fn graph(&self) -> &ResolvedGraph {
        &self.inner.graph
    }

    pub fn plan(&self) -> &LifecyclePlan {
        &self.inner.plan
    }

    /// Create an injector instance of a root graph
    pub fn root_scope(&self, supplied: HashMap<BindingKey, Instance>) -> Arc<InjectorScope> {
        InjectorScope::root(self.inner.graph.injector.clone(), supplied)
    }

    /// Create a child injector instance under `parent`
    pub fn child_scope(
        &self,
        parent: &Arc<InjectorScope>,
        supplied: HashMap<BindingKey, Instance>,
    ) -> Arc<InjectorScope> {
        InjectorScope::child(parent, self.inner.graph.injector.clone(), supplied)
    }

    /// Call an output of the injector
    pub fn output(&self, scope: &Arc<InjectorScope>, name: &str) -> Result<Instance, CoreError> {
        let output = self
            .inner
            .plan
            .output(name)
            .ok_or_else(|| CoreError::binding_not_found(format!("output '{}'", name)))?;
        let resolution = Resolution::new(Arc::clone(scope));

        match output.mode {
            None | Some(FabricationMode::Recurrent) => self.resolve(&resolution, &output.key),
            Some(mode) => resolution.fabricate(CacheSlot::Output(output.name.clone()), mode, |r| {
                self.resolve(r, &output.key)
            }),
        }
    }

    pub fn output_as<T: Any + Send + Sync>(
        &self,
        scope: &Arc<InjectorScope>,
        name: &str,
    ) -> Result<Arc<T>, CoreError> {
        let key = self
            .inner
            .plan
            .output(name)
            .map(|output| output.key.clone())
            .ok_or_else(|| CoreError::binding_not_found(format!("output '{}'", name)))?;
        downcast(&key, self.output(scope, name)?)
    }

    /// Resolve a binding key with the given scope handle
    pub fn resolve(&self, resolution: &Resolution, key: &BindingKey) -> Result<Instance, CoreError> {
        let binding = self
            .inner
            .graph
            .binding(key)
            .ok_or_else(|| CoreError::binding_not_found(key))?;

        match &binding.source {
            BindingSource::Link { link, .. } => self.resolve(resolution, &link.source),
            BindingSource::Contract { .. } | BindingSource::ChildParameter { .. } => resolution
                .injector()
                .supplied(key)
                .ok_or_else(|| CoreError::scope(format!("no value supplied for '{}'", key))),
            BindingSource::Inherited { .. } => {
                let parent = self.inner.parent.as_ref().ok_or_else(|| {
                    CoreError::internal(format!("inherited '{}' without parent wiring", key))
                })?;
                parent.resolve(&resolution.for_parent()?, key)
            }
            BindingSource::Provider { id, provider } => resolution.fabricate(
                CacheSlot::Binding(key.clone()),
                provider.mode,
                |r| self.invoke(r, key, id, provider.mode, &provider.parameters),
            ),
            BindingSource::Aggregate { contributions } => {
                self.aggregate(resolution, key, contributions)
            }
        }
    }

    pub fn resolve_as<T: Any + Send + Sync>(
        &self,
        resolution: &Resolution,
        key: &BindingKey,
    ) -> Result<Arc<T>, CoreError> {
        downcast(key, self.resolve(resolution, key)?)
    }

    /// Resolve an element aggregate as typed values
    pub fn collect<T: Any + Send + Sync>(
        &self,
        resolution: &Resolution,
        key: &BindingKey,
    ) -> Result<Vec<Arc<T>>, CoreError> {
        let elements = self.resolve_as::<Elements>(resolution, key)?;
        elements
            .iter()
            .map(|element| downcast(key, Arc::clone(element)))
            .collect()
    }

    /// Resolve a map aggregate as typed values
    pub fn collect_map<V: Any + Send + Sync>(
        &self,
        resolution: &Resolution,
        key: &BindingKey,
    ) -> Result<BTreeMap<String, Arc<V>>, CoreError> {
        let entries = self.resolve_as::<Entries>(resolution, key)?;
        entries
            .iter()
            .map(|(name, value)| Ok((name.clone(), downcast(key, Arc::clone(value))?)))
            .collect()
    }

    /// Run every builder declared for an injector builder entry point
    pub fn build_up(
        &self,
        scope: &Arc<InjectorScope>,
        name: &str,
        instance: &Instance,
    ) -> Result<(), CoreError> {
        let entry = self
            .inner
            .graph
            .builder(name)
            .ok_or_else(|| CoreError::binding_not_found(format!("builder entry '{}'", name)))?;
        let resolution = Resolution::new(Arc::clone(scope));

        for (id, builder) in &entry.builders {
            let arguments = self.arguments(
                &resolution,
                &entry.target,
                FabricationMode::Recurrent,
                &builder.parameters,
            )?;
            let apply = self.inner.builders.get(id).ok_or_else(|| CoreError::FactoryNotRegistered {
                provider: id.to_string(),
            })?;
            apply(instance, &arguments)?;
        }

        Ok(())
    }

    fn invoke(
        &self,
        resolution: &Resolution,
        key: &BindingKey,
        id: &ProviderId,
        mode: FabricationMode,
        parameters: &[Dependency],
    ) -> Result<Instance, CoreError> {
        tracing::trace!("Invoking {} for {}", id, key);
        let arguments = self.arguments(resolution, key, mode, parameters)?;
        let factory = self.inner.factories.get(id).ok_or_else(|| CoreError::FactoryNotRegistered {
            provider: id.to_string(),
        })?;
        factory(&arguments)
    }

    fn arguments(
        &self,
        resolution: &Resolution,
        key: &BindingKey,
        holder: FabricationMode,
        parameters: &[Dependency],
    ) -> Result<Arguments, CoreError> {
        let mut values = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let argument = if parameter.deferred {
                // Only a container-scoped holder dies with the container it
                // was built in, so only it may keep that container.
                let captured = if holder == FabricationMode::ContainerScoped {
                    resolution.clone()
                } else {
                    resolution.without_container()
                };
                Argument::Deferred(Deferred {
                    wiring: self.clone(),
                    resolution: captured,
                    key: parameter.key.clone(),
                })
            } else {
                Argument::Value(self.resolve(resolution, &parameter.key)?)
            };
            values.push((parameter.key.clone(), argument));
        }

        Ok(Arguments {
            key: key.clone(),
            values,
        })
    }

    fn aggregate(
        &self,
        resolution: &Resolution,
        key: &BindingKey,
        contributions: &[Contribution],
    ) -> Result<Instance, CoreError> {
        let mut elements = Elements::new();
        let mut entries = Entries::new();

        for contribution in contributions {
            let provider = &contribution.provider;
            let value = resolution.fabricate(
                CacheSlot::Contribution(contribution.id.clone()),
                provider.mode,
                |r| self.invoke(r, key, &contribution.id, provider.mode, &provider.parameters),
            )?;
            match contribution.shape() {
                Some(PartialContribution::Entry { key: entry }) => {
                    entries.insert(entry.clone(), value);
                }
                _ => elements.push(value),
            }
        }

        if entries.is_empty() {
            Ok(Arc::new(elements))
        } else {
            Ok(Arc::new(entries))
        }
    }
}
