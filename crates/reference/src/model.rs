use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One sphere link of a model, offset from the body origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub name: String,
    #[serde(default)]
    pub offset: DVec3,
    pub radius: f64,
}

impl LinkSpec {
    pub fn new(name: impl Into<String>, offset: DVec3, radius: f64) -> Self {
        Self {
            name: name.into(),
            offset,
            radius,
        }
    }
}

fn default_mass() -> f64 {
    1.0
}

/// A body model: its links, total mass, and whether it is anchored in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub links: Vec<LinkSpec>,
    #[serde(default = "default_mass")]
    pub mass: f64,
    /// Fixed bodies ignore forces and never move.
    #[serde(default)]
    pub fixed: bool,
}

impl ModelSpec {
    pub fn new(links: Vec<LinkSpec>) -> Self {
        Self {
            links,
            mass: default_mass(),
            fixed: false,
        }
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    /// A single-link model.
    pub fn sphere(radius: f64) -> Self {
        Self::new(vec![LinkSpec::new("root", DVec3::ZERO, radius)])
    }

    pub fn link_index(&self, name: &str) -> Option<usize> {
        self.links.iter().position(|l| l.name == name)
    }

    /// Check the model is physically usable. Returns a description of the
    /// first problem found.
    pub fn check(&self) -> Result<(), String> {
        if self.links.is_empty() {
            return Err("model has no links".into());
        }
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(format!("mass must be positive, got {}", self.mass));
        }
        for (i, link) in self.links.iter().enumerate() {
            if !(link.radius.is_finite() && link.radius > 0.0) {
                return Err(format!("link '{}' has radius {}", link.name, link.radius));
            }
            if !link.offset.is_finite() {
                return Err(format!("link '{}' has a non-finite offset", link.name));
            }
            if self.links[..i].iter().any(|other| other.name == link.name) {
                return Err(format!("link name '{}' is used twice", link.name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Named models available to a [`ReferenceFactory`](crate::ReferenceFactory).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelLibrary {
    models: BTreeMap<String, ModelSpec>,
}

impl ModelLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ball`, `dumbbell` and a fixed `floor` whose top surface sits at z = 0.
    pub fn builtin() -> Self {
        Self::new()
            .with_model("ball", ModelSpec::sphere(0.1))
            .with_model(
                "dumbbell",
                ModelSpec::new(vec![
                    LinkSpec::new("left", DVec3::new(-0.2, 0.0, 0.0), 0.08),
                    LinkSpec::new("right", DVec3::new(0.2, 0.0, 0.0), 0.08),
                ])
                .with_mass(2.0),
            )
            .with_model(
                "floor",
                ModelSpec::new(vec![LinkSpec::new(
                    "surface",
                    DVec3::new(0.0, 0.0, -1000.0),
                    1000.0,
                )])
                .fixed(),
            )
    }

    /// Parse a `name -> model` map and validate every entry.
    pub fn from_yaml(text: &str) -> Result<Self, ModelError> {
        let library: Self = serde_yaml::from_str(text)?;
        library.validate()?;
        Ok(library)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        for (name, model) in &self.models {
            model.check().map_err(|reason| ModelError::Invalid {
                name: name.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    pub fn with_model(mut self, name: impl Into<String>, model: ModelSpec) -> Self {
        self.insert(name, model);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, model: ModelSpec) {
        self.models.insert(name.into(), model);
    }

    /// Add every model from `other`, replacing same-named entries.
    pub fn merge(&mut self, other: ModelLibrary) {
        self.models.extend(other.models);
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
