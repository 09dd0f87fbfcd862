use serde::{Deserialize, Serialize};

use crate::lifecycle::FabricationMode;
use crate::model::declaration::Location;
use crate::model::key::{BindingKey, TypeRef};

/// A provider the injector must expose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectorOutput {
    pub name: String,
    pub key: BindingKey,
    /// Output-level mode, e.g. `container` to open a scope per call
    #[serde(default)]
    pub mode: Option<FabricationMode>,
    #[serde(default)]
    pub location: Option<Location>,
}

/// A builder entry point the injector must expose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectorBuilder {
    pub name: String,
    pub target: BindingKey,
    #[serde(default)]
    pub location: Option<Location>,
}

/// Factory producing a nested injector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildInjectorFactory {
    pub name: String,
    pub injector: TypeRef,
    /// Values supplied by the caller when the child is created
    #[serde(default)]
    pub parameters: Vec<BindingKey>,
    #[serde(default)]
    pub location: Option<Location>,
}

/// Root contract composing specifications and declaring required outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Injector {
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default)]
    pub name_hint: Option<String>,
    #[serde(default)]
    pub specifications: Vec<TypeRef>,
    #[serde(default)]
    pub contracts: Vec<TypeRef>,
    #[serde(default)]
    pub outputs: Vec<InjectorOutput>,
    #[serde(default)]
    pub builders: Vec<InjectorBuilder>,
    #[serde(default)]
    pub children: Vec<ChildInjectorFactory>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Injector {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            ty: TypeRef::named(name),
            name_hint: None,
            specifications: Vec::new(),
            contracts: Vec::new(),
            outputs: Vec::new(),
            builders: Vec::new(),
            children: Vec::new(),
            location: None,
        }
    }

    pub fn compose(mut self, specification: &str) -> Self {
        self.specifications.push(TypeRef::named(specification));
        self
    }

    pub fn contract(mut self, contract: &str) -> Self {
        self.contracts.push(TypeRef::named(contract));
        self
    }

    pub fn output(mut self, name: impl Into<String>, key: BindingKey) -> Self {
        self.outputs.push(InjectorOutput {
            name: name.into(),
            key,
            mode: None,
            location: None,
        });
        self
    }

    pub fn output_with_mode(
        mut self,
        name: impl Into<String>,
        key: BindingKey,
        mode: FabricationMode,
    ) -> Self {
        self.outputs.push(InjectorOutput {
            name: name.into(),
            key,
            mode: Some(mode),
            location: None,
        });
        self
    }

    pub fn builder(mut self, name: impl Into<String>, target: BindingKey) -> Self {
        self.builders.push(InjectorBuilder {
            name: name.into(),
            target,
            location: None,
        });
        self
    }

    pub fn child(
        mut self,
        name: impl Into<String>,
        injector: &str,
        parameters: impl IntoIterator<Item = BindingKey>,
    ) -> Self {
        self.children.push(ChildInjectorFactory {
            name: name.into(),
            injector: TypeRef::named(injector),
            parameters: parameters.into_iter().collect(),
            location: None,
        });
        self
    }

    /// Name the emission layer should give the generated injector
    pub fn generated_name(&self) -> String {
        match &self.name_hint {
            Some(hint) => hint.clone(),
            None => format!("Generated{}", self.ty.short_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_name() {
        let injector = Injector::named("app::di::AppInjector");
        assert_eq!(injector.generated_name(), "GeneratedAppInjector");

        let mut hinted = injector.clone();
        hinted.name_hint = Some("AppContainer".to_string());
        assert_eq!(hinted.generated_name(), "AppContainer");
    }

    #[test]
    fn test_injector_record() {
        let yaml = r#"
type: AppInjector
specifications: [AppSpec]
outputs:
  - name: node
    key: Node
    mode: container
children:
  - name: request
    injector: RequestInjector
    parameters: [RequestId]
"#;
        let injector: Injector = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(injector.outputs[0].mode, Some(FabricationMode::Container));
        assert_eq!(injector.children[0].parameters[0], BindingKey::named("RequestId"));
        assert!(injector.builders.is_empty());
    }
}
