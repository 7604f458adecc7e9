//! Plan files: one store's observed and desired facts.
//!
//! ```toml
//! kind = "gate_condition"
//! subject = "9"
//! observed = ["coverage LT 80"]
//! desired = ["coverage LT 70", "new_bugs GT 0"]
//! ```
//!
//! `scope` is an optional project key; omitted or empty means the whole
//! organization. Attributes use their string form: a permission name, a
//! login, a project key or `metric OP threshold`.

use std::path::Path;

use anyhow::{Context, Result};
use factsync_core::{FactKind, FactScope, FactSet, Scope};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PlanFile {
    kind: FactKind,
    #[serde(default)]
    scope: Option<String>,
    subject: String,
    #[serde(default)]
    observed: Vec<String>,
    #[serde(default)]
    desired: Vec<String>,
}

/// A parsed plan.
#[derive(Debug, Clone)]
pub struct Plan {
    pub store: FactScope,
    pub observed: FactSet,
    pub desired: FactSet,
}

impl Plan {
    /// Load a plan. `.json` files are read as JSON, anything else as TOML.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or if an attribute is not
    /// valid for the plan's kind.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan {}", path.display()))?;

        let file: PlanFile = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse plan {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse plan {}", path.display()))?
        };

        Self::from_file(file)
    }

    /// Parse a TOML plan.
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML or invalid attributes.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: PlanFile = toml::from_str(content).context("Failed to parse plan")?;
        Self::from_file(file)
    }

    fn from_file(file: PlanFile) -> Result<Self> {
        let store = FactScope::new(
            file.kind,
            Scope::from_project_key(file.scope),
            file.subject,
        );
        let observed = parse_facts(&store, &file.observed).context("Invalid observed facts")?;
        let desired = parse_facts(&store, &file.desired).context("Invalid desired facts")?;
        Ok(Self {
            store,
            observed,
            desired,
        })
    }
}

fn parse_facts(store: &FactScope, values: &[String]) -> Result<FactSet> {
    values
        .iter()
        .map(|value| {
            store
                .kind
                .parse_attribute(value)
                .map(|attribute| store.fact(attribute))
                .with_context(|| format!("'{value}' is not a valid {} attribute", store.kind))
        })
        .collect()
}
