use std::fmt::{self, Write};

use crate::lifecycle::FabricationMode;
use crate::resolver::graph::{BindingSource, ResolvedGraph};

/// Options for rendering a resolved graph
#[derive(Debug, Clone)]
pub struct VisualizationStyle {
    pub color_by_mode: bool,
    pub show_modes: bool,
    pub show_sources: bool,
}

impl Default for VisualizationStyle {
    fn default() -> Self {
        Self {
            color_by_mode: true,
            show_modes: true,
            show_sources: false,
        }
    }
}

/// Render a resolved graph in Graphviz DOT format
pub fn to_dot(graph: &ResolvedGraph, style: &VisualizationStyle) -> String {
    let mut dot = String::new();
    // Writing into a String cannot fail.
    let _ = write_dot(&mut dot, graph, style);
    dot
}

fn write_dot(dot: &mut String, graph: &ResolvedGraph, style: &VisualizationStyle) -> fmt::Result {
    writeln!(dot, "digraph \"{}\" {{", graph.generated_name)?;
    writeln!(dot, "    rankdir=TB;")?;
    writeln!(dot, "    node [shape=rectangle];")?;
    writeln!(dot)?;

    for binding in graph.ordered() {
        let mut attrs = Vec::new();

        if style.color_by_mode {
            let color = match binding.mode {
                FabricationMode::Recurrent => "lightyellow",
                FabricationMode::Scoped => "lightblue",
                FabricationMode::Container => "orange",
                FabricationMode::ContainerScoped => "lightgreen",
            };
            attrs.push(format!("fillcolor={}", color));
            attrs.push("style=filled".to_string());
        }

        let mut label = escape(&binding.key.to_string());
        if style.show_modes {
            label.push_str(&format!("\\n({})", binding.mode));
        }
        if style.show_sources {
            label.push_str(&format!("\\n{}", escape(&binding.source.label())));
        }
        attrs.push(format!("label=\"{}\"", label));

        match binding.source {
            BindingSource::Link { .. } => attrs.push("shape=ellipse".to_string()),
            BindingSource::Inherited { .. } => attrs.push("shape=box3d".to_string()),
            _ => {}
        }

        writeln!(dot, "    \"{}\" [{}];", escape(&binding.key.to_string()), attrs.join(", "))?;
    }

    writeln!(dot)?;

    for binding in graph.ordered() {
        for dependency in &binding.dependencies {
            let style_attr = if dependency.deferred { " [style=dashed]" } else { "" };
            writeln!(
                dot,
                "    \"{}\" -> \"{}\"{};",
                escape(&binding.key.to_string()),
                escape(&dependency.key.to_string()),
                style_attr
            )?;
        }
    }

    writeln!(dot, "}}")
}

fn escape(text: &str) -> String {
    text.replace('"', "\\\"")
}
