//! Binding graph resolution: closure of needed keys, link expansion,
//! auto-wiring and conflict detection, per injector.

pub mod binding_resolver;
pub mod graph;
pub mod synthesis;
pub mod visualization;

pub use binding_resolver::{BindingResolver, ParentContext, ResolverOutput};
pub use graph::{
    BindingSource, Contribution, ResolutionPath, ResolvedBinding, ResolvedBuilder, ResolvedGraph,
};
pub use synthesis::{AutoWirer, SynthesisReport, SynthesizedBinding};
pub use visualization::{to_dot, VisualizationStyle};
