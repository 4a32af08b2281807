use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use stepsim_kernel::{Project, SimulatorConfig};
use stepsim_reference::{ModelLibrary, RigidWorldConfig};

/// Everything a `run` needs, as read from one YAML or JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub project: Project,
    /// Extra models, layered over the built-in library.
    #[serde(default)]
    pub models: ModelLibrary,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub engine: RigidWorldConfig,
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&text)
        } else {
            Self::from_yaml(&text)
        }
        .with_context(|| format!("parsing scenario {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Built-in models with this scenario's models on top.
    pub fn library(&self) -> anyhow::Result<ModelLibrary> {
        let mut library = ModelLibrary::builtin();
        library.merge(self.models.clone());
        library.validate()?;
        Ok(library)
    }
}
