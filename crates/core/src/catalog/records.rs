use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::CoreError;
use crate::model::{DependencyContract, Injector, Specification, TypeDescriptor};

/// Raw declaration records of one pass, as handed in by the extraction layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogRecords {
    pub specifications: Vec<Specification>,
    pub contracts: Vec<DependencyContract>,
    pub injectors: Vec<Injector>,
    pub types: Vec<TypeDescriptor>,
}

impl CatalogRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, CoreError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load records from a `.yaml`, `.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Err(crate::config::ConfigError::UnsupportedFormat {
                path: path.display().to_string(),
            }
            .into()),
        }
    }

    pub fn specification(mut self, specification: Specification) -> Self {
        self.specifications.push(specification);
        self
    }

    pub fn contract(mut self, contract: DependencyContract) -> Self {
        self.contracts.push(contract);
        self
    }

    pub fn injector(mut self, injector: Injector) -> Self {
        self.injectors.push(injector);
        self
    }

    pub fn type_descriptor(mut self, descriptor: TypeDescriptor) -> Self {
        self.types.push(descriptor);
        self
    }
}
