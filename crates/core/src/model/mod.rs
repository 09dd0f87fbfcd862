//! Declarative metadata handed in by the extraction layer.
//!
//! Every type here is an immutable value object: the catalog is assembled
//! once per pass and never mutated afterwards.

pub mod declaration;
pub mod injector;
pub mod key;
pub mod specification;
pub mod types;

pub use declaration::{
    Builder, BuilderKind, Link, Location, PartialContribution, Provider, ProviderId, ProviderKind,
};
pub use injector::{ChildInjectorFactory, Injector, InjectorBuilder, InjectorOutput};
pub use key::{BindingKey, Dependency, Qualifier, TypeRef};
pub use specification::{ContractMember, DependencyContract, InstantiationMode, Specification};
pub use types::{Constructor, RequiredMember, TypeDescriptor, Visibility};
