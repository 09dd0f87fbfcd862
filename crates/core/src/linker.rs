use rayon::prelude::*;
use std::fmt;

use crate::catalog::{CatalogRecords, DeclarationCatalog};
use crate::config::LinkerSettings;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::lifecycle::{LifecyclePlan, LifecyclePlanner};
use crate::model::{Injector, TypeRef};
use crate::resolver::{BindingResolver, ParentContext, ResolvedGraph};

/// Linker result for one injector and, recursively, its children
#[derive(Debug, Clone)]
pub struct LinkedInjector {
    pub injector: TypeRef,
    pub parent: Option<TypeRef>,
    pub generated_name: String,
    /// Absent when the injector was blocked or its pass aborted
    pub graph: Option<ResolvedGraph>,
    pub plan: Option<LifecyclePlan>,
    pub diagnostics: Diagnostics,
    pub children: Vec<LinkedInjector>,
}

impl LinkedInjector {
    /// Check if the emission layer may generate code for this injector
    pub fn is_emittable(&self, warnings_as_errors: bool) -> bool {
        if self.graph.is_none() || self.plan.is_none() || self.diagnostics.has_errors() {
            return false;
        }
        !(warnings_as_errors && self.diagnostics.warnings().next().is_some())
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a LinkedInjector>) {
        out.push(self);
        for child in &self.children {
            child.collect(out);
        }
    }
}

/// Outcome of one linker pass
#[derive(Debug, Clone)]
pub struct LinkReport {
    /// Structural diagnostics found while building the catalog
    pub catalog_diagnostics: Diagnostics,
    /// Root injectors, each carrying its children
    pub injectors: Vec<LinkedInjector>,
    warnings_as_errors: bool,
}

impl LinkReport {
    /// Every linked injector, parents before children
    pub fn all(&self) -> Vec<&LinkedInjector> {
        let mut out = Vec::new();
        for injector in &self.injectors {
            injector.collect(&mut out);
        }
        out
    }

    /// First linked injector of the given type, in depth-first order
    pub fn find(&self, ty: &TypeRef) -> Option<&LinkedInjector> {
        self.all().into_iter().find(|linked| &linked.injector == ty)
    }

    /// Injectors the emission layer may generate code for
    pub fn emittable(&self) -> Vec<&LinkedInjector> {
        self.all()
            .into_iter()
            .filter(|linked| linked.is_emittable(self.warnings_as_errors))
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.catalog_diagnostics.has_errors()
            || self.all().iter().any(|linked| linked.diagnostics.has_errors())
    }

    /// Per-injector diagnostics of the whole pass
    pub fn diagnostics(&self) -> Diagnostics {
        self.all()
            .into_iter()
            .flat_map(|linked| linked.diagnostics.iter().cloned())
            .collect()
    }
}

impl fmt::Display for LinkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let all = self.all();
        writeln!(
            f,
            "Link report: {} injector(s), {} emittable",
            all.len(),
            self.emittable().len()
        )?;

        if !self.catalog_diagnostics.is_empty() {
            writeln!(f, "Catalog:")?;
            write!(f, "{}", self.catalog_diagnostics)?;
        }

        for linked in all {
            let status = if linked.is_emittable(self.warnings_as_errors) {
                "ok"
            } else if linked.graph.is_none() {
                "blocked"
            } else {
                "failed"
            };
            let bindings = linked.graph.as_ref().map_or(0, |graph| graph.len());
            match &linked.parent {
                Some(parent) => writeln!(
                    f,
                    "[{}] {} (child of {}) -> {}: {} binding(s)",
                    status, linked.injector, parent, linked.generated_name, bindings
                )?,
                None => writeln!(
                    f,
                    "[{}] {} -> {}: {} binding(s)",
                    status, linked.injector, linked.generated_name, bindings
                )?,
            }
            write!(f, "{}", linked.diagnostics)?;
        }

        Ok(())
    }
}

/// Drives one pass: catalog, resolution, lifecycle planning
#[derive(Debug, Clone, Default)]
pub struct Linker {
    settings: LinkerSettings,
}

impl Linker {
    pub fn new(settings: LinkerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LinkerSettings {
        &self.settings
    }

    /// Link every injector in `records`
    pub fn link(&self, records: CatalogRecords) -> LinkReport {
        for (field, source) in self.settings.sources() {
            tracing::debug!("Setting {} from {}", field, source);
        }

        let (catalog, catalog_diagnostics) = DeclarationCatalog::build(records);
        let roots = catalog.root_injectors();

        tracing::info!(
            "Linking {} root injector(s), auto-wiring {}",
            roots.len(),
            if self.settings.auto_wiring { "enabled" } else { "disabled" }
        );

        let injectors: Vec<LinkedInjector> = if self.settings.parallel {
            match self.thread_pool() {
                Some(pool) => pool.install(|| {
                    roots
                        .par_iter()
                        .map(|injector| self.link_tree(&catalog, injector, None))
                        .collect()
                }),
                None => roots
                    .par_iter()
                    .map(|injector| self.link_tree(&catalog, injector, None))
                    .collect(),
            }
        } else {
            roots
                .iter()
                .map(|injector| self.link_tree(&catalog, injector, None))
                .collect()
        };

        let report = LinkReport {
            catalog_diagnostics,
            injectors,
            warnings_as_errors: self.settings.warnings_as_errors,
        };

        tracing::info!(
            "Linked {} injector(s), {} emittable",
            report.all().len(),
            report.emittable().len()
        );

        report
    }

    fn thread_pool(&self) -> Option<rayon::ThreadPool> {
        let threads = self.settings.max_threads?;
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => Some(pool),
            Err(error) => {
                tracing::warn!("Falling back to the global thread pool: {}", error);
                None
            }
        }
    }

    fn link_tree(
        &self,
        catalog: &DeclarationCatalog,
        injector: &Injector,
        parent: Option<ParentContext<'_>>,
    ) -> LinkedInjector {
        let mut linked = LinkedInjector {
            injector: injector.ty.clone(),
            parent: parent.map(|context| context.graph.injector.clone()),
            generated_name: injector.generated_name(),
            graph: None,
            plan: None,
            diagnostics: catalog.blocking_diagnostics(injector),
            children: Vec::new(),
        };

        if !linked.diagnostics.is_empty() {
            tracing::warn!(
                "Injector {} is blocked by {} structural diagnostic(s)",
                injector.ty,
                linked.diagnostics.len()
            );
            return linked;
        }

        let resolver = BindingResolver::new(catalog, &self.settings);
        let output = match resolver.resolve(injector, parent) {
            Ok(output) => output,
            Err(error) => {
                tracing::warn!("Resolution of {} aborted: {}", injector.ty, error);
                linked.diagnostics.push(
                    Diagnostic::error(DiagnosticKind::InternalError, error.to_string())
                        .at(injector.location.as_ref())
                        .in_injector(&injector.ty),
                );
                return linked;
            }
        };

        let plan = LifecyclePlanner::new().plan(&output.graph);
        linked.diagnostics.extend(output.diagnostics);
        linked.diagnostics.extend(plan.diagnostics.iter().cloned());
        linked.diagnostics.sort();

        for factory in &injector.children {
            match catalog.injector(&factory.injector) {
                Some(child) => {
                    let context = ParentContext {
                        graph: &output.graph,
                        factory,
                    };
                    linked.children.push(self.link_tree(catalog, child, Some(context)));
                }
                None => linked.diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::InternalError,
                        format!("child injector {} vanished from the catalog", factory.injector),
                    )
                    .in_injector(&injector.ty),
                ),
            }
        }

        if linked.diagnostics.is_empty() {
            tracing::debug!("Injector {} linked cleanly", injector.ty);
        } else {
            tracing::warn!(
                "Injector {} has {} error(s) and {} warning(s)",
                injector.ty,
                linked.diagnostics.errors().count(),
                linked.diagnostics.warnings().count()
            );
        }

        linked.graph = Some(output.graph);
        linked.plan = Some(plan);
        linked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BindingKey, Provider, Specification};

    fn key(name: &str) -> BindingKey {
        BindingKey::named(name)
    }

    #[test]
    fn test_report_separates_emittable_injectors() {
        let records = CatalogRecords::new()
            .specification(Specification::named("Spec").provider(Provider::method("a", key("A"))))
            .injector(Injector::named("Good").compose("Spec").output("a", key("A")))
            .injector(Injector::named("Bad").compose("Spec").output("b", key("B")));

        for parallel in [true, false] {
            let report = Linker::new(LinkerSettings::new().with_parallel(parallel)).link(records.clone());
            let emittable: Vec<String> = report.emittable().iter().map(|l| l.injector.to_string()).collect();
            assert_eq!(emittable, vec!["Good"]);
            assert!(report.has_errors());
            assert!(report.to_string().contains("[failed] Bad -> GeneratedBad"));
        }
    }

    #[test]
    fn test_sized_thread_pool() {
        let records = (0..4).fold(
            CatalogRecords::new()
                .specification(Specification::named("Spec").provider(Provider::method("a", key("A")))),
            |records, i| {
                records.injector(Injector::named(format!("App{}", i)).compose("Spec").output("a", key("A")))
            },
        );

        let report = Linker::new(LinkerSettings::new().with_max_threads(2)).link(records);
        assert_eq!(report.emittable().len(), 4);
        assert_eq!(report.injectors[0].injector, TypeRef::named("App0"));
    }

    #[test]
    fn test_blocked_injector_has_no_graph() {
        let records = CatalogRecords::new()
            .injector(Injector::named("App").compose("Missing"));

        let report = Linker::default().link(records);
        let linked = report.find(&TypeRef::named("App")).unwrap();
        assert!(linked.graph.is_none());
        assert_eq!(linked.diagnostics.count_of(DiagnosticKind::InvalidSpecification), 1);
        assert!(report.to_string().contains("[blocked] App"));
    }

    #[test]
    fn test_warnings_as_errors() {
        let records = CatalogRecords::new()
            .specification(
                Specification::named("Spec")
                    .provider(
                        Provider::method("leaf", key("Leaf"))
                            .with_mode(crate::lifecycle::FabricationMode::ContainerScoped),
                    ),
            )
            .injector(Injector::named("App").compose("Spec").output("leaf", key("Leaf")));

        let lenient = Linker::default().link(records.clone());
        assert_eq!(lenient.emittable().len(), 1);

        let strict = Linker::new(LinkerSettings::new().with_warnings_as_errors(true)).link(records);
        assert!(strict.emittable().is_empty());
    }

    #[test]
    fn test_unpinned_container_scoped_value_blocks_emission() {
        let records = CatalogRecords::new()
            .specification(
                Specification::named("Spec")
                    .provider(
                        Provider::method("leaf", key("Leaf"))
                            .with_mode(crate::lifecycle::FabricationMode::ContainerScoped),
                    )
                    .provider(Provider::method("node", key("Node")).param(key("Leaf"))),
            )
            .injector(Injector::named("App").compose("Spec").output("node", key("Node")));

        let report = Linker::default().link(records);
        let linked = report.find(&TypeRef::named("App")).unwrap();
        assert!(linked.diagnostics.has_errors());
        assert_eq!(linked.diagnostics.count_of(DiagnosticKind::ScopeViolation), 1);
        assert!(report.emittable().is_empty());
    }
}
