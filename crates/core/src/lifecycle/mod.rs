//! Fabrication modes, lifecycle planning and the runtime cache contracts
//! generated injectors honor.

pub mod mode;
pub mod planner;
pub mod runtime;
pub mod wiring;

pub use mode::FabricationMode;
pub use planner::{BindingPlan, CacheDiscipline, LifecyclePlan, LifecyclePlanner, OutputPlan};
pub use runtime::{CacheSlot, ContainerScope, InjectorScope, Instance, Resolution};
pub use wiring::{
    Argument, Arguments, BuilderFn, Deferred, Elements, Entries, Factory, Wiring, WiringBuilder,
};
