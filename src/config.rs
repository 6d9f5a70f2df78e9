use anyhow::{Context, Result, bail};
use declarative::{
    Declaration, ExecuteOptions, OutputRef, RawValue, ResourceRef, ResourceSchema,
    ResourceTypeRegistry, StateSnapshot,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Table key marking a reference to a whole resource
pub const REF_KEY: &str = "$ref";
/// Table key marking a reference to one output, written `resource.field`
pub const OUTPUT_KEY: &str = "$output";
/// Table key marking a reference to a resource's backend identifier
pub const REMOTE_ID_KEY: &str = "$remote_id";

// ============================================================================
// Plan File
// ============================================================================

/// A declarative plan file
///
/// ```toml
/// [engine]
/// create_missing = true
///
/// [types.server]
/// immutable = ["size"]
/// outputs = ["created_at"]
/// needs_remote_id = true
/// delete_at_end = true
///
/// [[resources]]
/// type = "server"
/// name = "serv"
/// properties = { size = "B" }
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub types: IndexMap<String, ResourceSchema>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

/// Compile-time engine settings
///
/// Run pacing (`poll_interval`, `max_steps`) belongs to whoever drives
/// `Engine::run`; the CLI only compiles, so the plan file does not carry it.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub create_missing: bool,
}

impl EngineConfig {
    pub fn options(&self) -> ExecuteOptions {
        ExecuteOptions {
            create_missing: self.create_missing,
            ..ExecuteOptions::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceEntry {
    #[serde(rename = "type")]
    pub type_id: String,
    pub name: String,
    #[serde(default)]
    pub properties: IndexMap<String, Value>,
}

impl PlanFile {
    /// Load a plan file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid plan file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Registry holding every declared type, for compilation only
    pub fn registry(&self) -> ResourceTypeRegistry {
        let mut registry = ResourceTypeRegistry::new();
        for (id, schema) in &self.types {
            registry.register_descriptor(id.clone(), schema.clone());
        }
        registry
    }

    /// Declare every resource in file order
    ///
    /// References may only point at resources declared earlier in the file.
    pub fn declare<'r>(&self, registry: &'r ResourceTypeRegistry) -> Result<Declaration<'r>> {
        let mut declaration = Declaration::new(registry);
        let mut declared: IndexMap<String, ResourceRef> = IndexMap::new();

        for entry in &self.resources {
            let mut values = Vec::with_capacity(entry.properties.len());
            for (field, value) in &entry.properties {
                let raw = raw_value(value, &declared)
                    .with_context(|| format!("In {}.{}", entry.name, field))?;
                values.push((field.as_str(), raw));
            }

            let resource = declaration
                .resource(&entry.type_id, &entry.name, |builder| {
                    for (field, raw) in values {
                        builder.set(field, raw)?;
                    }
                    Ok(())
                })
                .with_context(|| format!("Could not declare '{}'", entry.name))?;
            declared.insert(entry.name.clone(), resource);
        }

        Ok(declaration)
    }
}

fn lookup<'a>(declared: &'a IndexMap<String, ResourceRef>, name: &str) -> Result<&'a ResourceRef> {
    declared
        .get(name)
        .with_context(|| format!("'{name}' is not declared before this reference"))
}

/// Convert a plan value, expanding reference tables
fn raw_value(value: &Value, declared: &IndexMap<String, ResourceRef>) -> Result<RawValue> {
    match value {
        Value::Array(items) => Ok(RawValue::List(
            items
                .iter()
                .map(|item| raw_value(item, declared))
                .collect::<Result<_>>()?,
        )),
        Value::Object(map) if map.len() == 1 => {
            let (key, target) = map.iter().next().context("empty table")?;
            let Some(target) = target.as_str() else {
                return raw_table(map, declared);
            };
            match key.as_str() {
                REF_KEY => Ok(RawValue::Resource(lookup(declared, target)?.clone())),
                REMOTE_ID_KEY => Ok(RawValue::Output(
                    lookup(declared, target)?.remote_identifier(),
                )),
                OUTPUT_KEY => {
                    let Some((resource, field)) = target.split_once('.') else {
                        bail!("'{target}' must be written as resource.field");
                    };
                    let output: OutputRef = lookup(declared, resource)?.output(field)?;
                    Ok(RawValue::Output(output))
                }
                _ => raw_table(map, declared),
            }
        }
        Value::Object(map) => raw_table(map, declared),
        other => Ok(RawValue::Json(other.clone())),
    }
}

fn raw_table(
    map: &serde_json::Map<String, Value>,
    declared: &IndexMap<String, ResourceRef>,
) -> Result<RawValue> {
    Ok(RawValue::Map(
        map.iter()
            .map(|(k, v)| Ok((k.clone(), raw_value(v, declared)?)))
            .collect::<Result<_>>()?,
    ))
}

// ============================================================================
// Prior State
// ============================================================================

/// Load a prior-state snapshot; a missing path means nothing is tracked
pub fn load_state(path: Option<&Path>) -> Result<StateSnapshot> {
    let Some(path) = path else {
        return Ok(StateSnapshot::new());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&content).context("Invalid state snapshot format")
}
