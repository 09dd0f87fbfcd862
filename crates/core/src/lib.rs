pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod lifecycle;
pub mod linker;
pub mod model;
pub mod resolver;

// Re-export key types for convenience
pub use catalog::{CatalogRecords, DeclarationCatalog};
pub use config::{ConfigError, LinkerSettings, SettingSource};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use errors::CoreError;
pub use lifecycle::{
    CacheDiscipline, FabricationMode, InjectorScope, Instance, LifecyclePlan, LifecyclePlanner,
    Resolution, Wiring,
};
pub use linker::{LinkReport, LinkedInjector, Linker};
pub use model::{
    BindingKey, Builder, DependencyContract, Injector, Provider, ProviderId, Qualifier,
    Specification, TypeDescriptor, TypeRef,
};
pub use resolver::{BindingResolver, BindingSource, ResolvedBinding, ResolvedGraph};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
