use serde::{Deserialize, Serialize};

/// Caching discipline of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FabricationMode {
    /// No caching, every request re-invokes the provider
    Recurrent,
    /// Cached once per owning injector instance
    Scoped,
    /// Opens an ephemeral cache scope for the duration of one call tree
    Container,
    /// Cached within the innermost open container scope
    ContainerScoped,
}

impl FabricationMode {
    /// Check if the mode is recurrent
    pub fn is_recurrent(&self) -> bool {
        matches!(self, FabricationMode::Recurrent)
    }

    /// Check if the mode is scoped
    pub fn is_scoped(&self) -> bool {
        matches!(self, FabricationMode::Scoped)
    }

    /// Check if the mode opens a container scope
    pub fn opens_container(&self) -> bool {
        matches!(self, FabricationMode::Container)
    }

    /// Check if the mode caches inside a container scope
    pub fn is_container_scoped(&self) -> bool {
        matches!(self, FabricationMode::ContainerScoped)
    }

    /// Get the mode name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            FabricationMode::Recurrent => "recurrent",
            FabricationMode::Scoped => "scoped",
            FabricationMode::Container => "container",
            FabricationMode::ContainerScoped => "container_scoped",
        }
    }
}

impl Default for FabricationMode {
    fn default() -> Self {
        FabricationMode::Recurrent
    }
}

impl std::fmt::Display for FabricationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FabricationMode {
    type Err = crate::errors::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "recurrent" | "transient" => Ok(FabricationMode::Recurrent),
            "scoped" | "singleton" => Ok(FabricationMode::Scoped),
            "container" => Ok(FabricationMode::Container),
            "container_scoped" | "containerscoped" => Ok(FabricationMode::ContainerScoped),
            _ => Err(crate::errors::CoreError::InvalidFabricationMode {
                mode: s.to_string(),
            }),
        }
    }
}
