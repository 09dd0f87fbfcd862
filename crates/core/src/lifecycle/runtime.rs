use once_cell::sync::OnceCell;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::errors::CoreError;
use crate::lifecycle::FabricationMode;
use crate::model::{BindingKey, ProviderId, TypeRef};

/// A fabricated value
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Identity of one cache cell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheSlot {
    /// A non-partial binding
    Binding(BindingKey),
    /// One partial contribution of an aggregate
    Contribution(ProviderId),
    /// An output with its own mode override
    Output(String),
}

/// Once-per-slot cells; the map lock is held only to fetch the cell, so a
/// slow constructor never blocks unrelated slots
#[derive(Debug, Default)]
struct SlotCache {
    cells: Mutex<HashMap<CacheSlot, Arc<OnceCell<Instance>>>>,
}

impl SlotCache {
    fn get_or_try_init<F>(&self, slot: CacheSlot, resource: &str, init: F) -> Result<Instance, CoreError>
    where
        F: FnOnce() -> Result<Instance, CoreError>,
    {
        let cell = {
            let mut cells = self.cells.lock().map_err(|_| CoreError::lock(resource))?;
            cells.entry(slot).or_default().clone()
        };
        cell.get_or_try_init(init).map(Arc::clone)
    }

    fn len(&self) -> usize {
        self.cells
            .lock()
            .map(|cells| cells.values().filter(|cell| cell.get().is_some()).count())
            .unwrap_or(0)
    }
}

/// Scoped cache of one injector instance
#[derive(Debug)]
pub struct InjectorScope {
    id: Uuid,
    injector: TypeRef,
    parent: Option<Arc<InjectorScope>>,
    /// Values supplied by the caller: contract members and child parameters
    supplied: HashMap<BindingKey, Instance>,
    cache: SlotCache,
}

impl InjectorScope {
    /// Create the scope of a root injector instance
    pub fn root(injector: TypeRef, supplied: HashMap<BindingKey, Instance>) -> Arc<Self> {
        Self::create(injector, None, supplied)
    }

    /// Create the scope of a child injector instance
    pub fn child(
        parent: &Arc<InjectorScope>,
        injector: TypeRef,
        supplied: HashMap<BindingKey, Instance>,
    ) -> Arc<Self> {
        Self::create(injector, Some(Arc::clone(parent)), supplied)
    }

    fn create(
        injector: TypeRef,
        parent: Option<Arc<InjectorScope>>,
        supplied: HashMap<BindingKey, Instance>,
    ) -> Arc<Self> {
        let scope = Self {
            id: Uuid::new_v4(),
            injector,
            parent,
            supplied,
            cache: SlotCache::default(),
        };
        tracing::debug!("Created injector scope {} for {}", scope.id, scope.injector);
        Arc::new(scope)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn injector(&self) -> &TypeRef {
        &self.injector
    }

    pub fn parent(&self) -> Option<&Arc<InjectorScope>> {
        self.parent.as_ref()
    }

    pub fn supplied(&self, key: &BindingKey) -> Option<Instance> {
        self.supplied.get(key).cloned()
    }

    /// Number of values cached so far
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

/// Ephemeral cache of one container call tree
#[derive(Debug)]
pub struct ContainerScope {
    id: Uuid,
    cache: SlotCache,
}

impl ContainerScope {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            cache: SlotCache::default(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

/// Explicit scope handle threaded through every cache lookup
#[derive(Debug, Clone)]
pub struct Resolution {
    injector: Arc<InjectorScope>,
    container: Option<Arc<ContainerScope>>,
}

impl Resolution {
    pub fn new(injector: Arc<InjectorScope>) -> Self {
        Self {
            injector,
            container: None,
        }
    }

    pub fn injector(&self) -> &Arc<InjectorScope> {
        &self.injector
    }

    pub fn container(&self) -> Option<&Arc<ContainerScope>> {
        self.container.as_ref()
    }

    /// The same handle with a fresh container scope open
    pub fn open_container(&self) -> Self {
        let container = ContainerScope::new();
        tracing::trace!("Opened container scope {}", container.id);
        Self {
            injector: Arc::clone(&self.injector),
            container: Some(container),
        }
    }

    /// The same handle without a container scope
    pub fn without_container(&self) -> Self {
        Self::new(Arc::clone(&self.injector))
    }

    /// The handle the parent injector resolves with; the open container,
    /// if any, stays with the call
    pub fn for_parent(&self) -> Result<Self, CoreError> {
        let parent = self.injector.parent().ok_or_else(|| {
            CoreError::scope(format!("injector {} has no parent scope", self.injector.injector))
        })?;
        Ok(Self {
            injector: Arc::clone(parent),
            container: self.container.clone(),
        })
    }

    /// Apply `mode` to a value built by `build`
    pub fn fabricate<F>(&self, slot: CacheSlot, mode: FabricationMode, build: F) -> Result<Instance, CoreError>
    where
        F: FnOnce(&Resolution) -> Result<Instance, CoreError>,
    {
        match mode {
            FabricationMode::Recurrent => build(self),
            FabricationMode::Scoped => {
                self.injector
                    .cache
                    .get_or_try_init(slot, "injector scope", || build(self))
            }
            FabricationMode::Container => build(&self.open_container()),
            FabricationMode::ContainerScoped => match &self.container {
                Some(container) => container
                    .cache
                    .get_or_try_init(slot, "container scope", || build(self)),
                None => build(self),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn slot(name: &str) -> CacheSlot {
        CacheSlot::Binding(BindingKey::named(name))
    }

    fn counting(counter: &AtomicUsize) -> Result<Instance, CoreError> {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(n))
    }

    #[test]
    fn test_scoped_is_built_once_per_injector() {
        let counter = AtomicUsize::new(0);
        let resolution = Resolution::new(InjectorScope::root(TypeRef::named("App"), HashMap::new()));

        let a = resolution
            .fabricate(slot("Service"), FabricationMode::Scoped, |_| counting(&counter))
            .unwrap();
        let b = resolution
            .fabricate(slot("Service"), FabricationMode::Scoped, |_| counting(&counter))
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let other = Resolution::new(InjectorScope::root(TypeRef::named("App"), HashMap::new()));
        let c = other
            .fabricate(slot("Service"), FabricationMode::Scoped, |_| counting(&counter))
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_container_scoped_shares_within_one_container_only() {
        let counter = AtomicUsize::new(0);
        let root = Resolution::new(InjectorScope::root(TypeRef::named("App"), HashMap::new()));

        let first = root.open_container();
        let a = first
            .fabricate(slot("Leaf"), FabricationMode::ContainerScoped, |_| counting(&counter))
            .unwrap();
        let b = first
            .fabricate(slot("Leaf"), FabricationMode::ContainerScoped, |_| counting(&counter))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let second = root.open_container();
        let c = second
            .fabricate(slot("Leaf"), FabricationMode::ContainerScoped, |_| counting(&counter))
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));

        // Outside any container the value is rebuilt each time.
        root.fabricate(slot("Leaf"), FabricationMode::ContainerScoped, |_| counting(&counter))
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(root.injector().cached_count(), 0);
    }

    #[test]
    fn test_container_mode_opens_fresh_scope() {
        let root = Resolution::new(InjectorScope::root(TypeRef::named("App"), HashMap::new()));
        let ids: Vec<Uuid> = (0..2)
            .map(|_| {
                let mut id = None;
                root.fabricate(slot("Node"), FabricationMode::Container, |inner| {
                    id = inner.container().map(|c| c.id());
                    Ok(Arc::new(()) as Instance)
                })
                .unwrap();
                id.unwrap()
            })
            .collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_concurrent_scoped_access_builds_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let resolution = Resolution::new(InjectorScope::root(TypeRef::named("App"), HashMap::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolution = resolution.clone();
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    resolution
                        .fabricate(slot("Shared"), FabricationMode::Scoped, |_| {
                            thread::sleep(std::time::Duration::from_millis(5));
                            counting(&counter)
                        })
                        .unwrap()
                })
            })
            .collect();

        let values: Vec<Instance> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(values.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_concurrent_calls_in_one_container_build_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let root = Resolution::new(InjectorScope::root(TypeRef::named("App"), HashMap::new()));
        let call = root.open_container();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let call = call.clone();
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    call.fabricate(slot("Leaf"), FabricationMode::ContainerScoped, |_| {
                        thread::sleep(std::time::Duration::from_millis(5));
                        counting(&counter)
                    })
                    .unwrap()
                })
            })
            .collect();

        let values: Vec<Instance> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(values.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(call.container().map(|c| c.cached_count()), Some(1));
        assert_eq!(root.injector().cached_count(), 0);
    }

    #[test]
    fn test_failed_construction_is_not_cached() {
        let resolution = Resolution::new(InjectorScope::root(TypeRef::named("App"), HashMap::new()));
        let failed = resolution.fabricate(slot("Flaky"), FabricationMode::Scoped, |_| {
            Err(CoreError::factory_failed("Flaky", "not yet"))
        });
        assert!(failed.is_err());

        let value = resolution
            .fabricate(slot("Flaky"), FabricationMode::Scoped, |_| Ok(Arc::new(7u32) as Instance))
            .unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&7));
    }

    #[test]
    fn test_parent_handle() {
        let parent = InjectorScope::root(TypeRef::named("App"), HashMap::new());
        let child = InjectorScope::child(&parent, TypeRef::named("Request"), HashMap::new());
        let resolution = Resolution::new(child).open_container();

        let up = resolution.for_parent().unwrap();
        assert_eq!(up.injector().id(), parent.id());
        assert!(up.container().is_some());
        assert!(Resolution::new(parent).for_parent().is_err());
    }
}
