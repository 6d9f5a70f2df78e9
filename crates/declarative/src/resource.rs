//! Backend contracts for provisioned resources
//!
//! A [`ResourceDesc`] describes the shape of a resource type: which fields
//! can be set at create time, which can change in place, and which are
//! produced by the backend. A [`Resource`] is one live handle to a backend
//! object, built from an optional remote identifier.

use crate::types::Properties;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A handle to one backend object
///
/// Handles are short-lived: the machine builds a fresh one from the tracked
/// remote id for every instruction. Long-running operations are modeled by
/// the `*_complete` predicates, which the machine polls until they return
/// `true`.
///
/// # Example
///
/// ```ignore
/// use declarative::{Properties, Resource};
///
/// #[derive(Debug)]
/// struct Bucket { id: Option<serde_json::Value> }
///
/// impl Resource for Bucket {
///     fn remote_id(&self) -> Option<serde_json::Value> { self.id.clone() }
///     fn create(&mut self, props: &Properties) -> anyhow::Result<()> {
///         self.id = props.get("name").cloned();
///         Ok(())
///     }
///     fn read(&self, _fields: &[String]) -> anyhow::Result<Properties> { Ok(Properties::new()) }
///     fn update(&mut self, _props: &Properties) -> anyhow::Result<()> { Ok(()) }
///     fn delete(&mut self) -> anyhow::Result<()> { Ok(()) }
/// }
/// ```
pub trait Resource: fmt::Debug {
    /// Backend identifier of this object, if it has one yet
    fn remote_id(&self) -> Option<Value>;

    /// Start creating the object
    fn create(&mut self, properties: &Properties) -> Result<()>;

    /// Read the current value of the named fields
    fn read(&self, fields: &[String]) -> Result<Properties>;

    /// Start updating mutable fields in place
    fn update(&mut self, properties: &Properties) -> Result<()>;

    /// Start deleting the object
    fn delete(&mut self) -> Result<()>;

    /// Backend-produced output fields
    fn outputs(&self) -> Result<Properties> {
        Ok(Properties::new())
    }

    /// Whether the object still exists remotely
    fn exists(&self) -> Result<bool> {
        Ok(true)
    }

    fn create_complete(&self) -> Result<bool> {
        Ok(true)
    }

    fn update_complete(&self) -> Result<bool> {
        Ok(true)
    }

    fn delete_complete(&self) -> Result<bool> {
        Ok(true)
    }
}

/// A boxed resource handle
pub type BoxedResource = Box<dyn Resource>;

/// Static description of a resource type
pub trait ResourceDesc: Send + Sync + fmt::Debug {
    /// Fields accepted by create and update
    fn mutable_fields(&self) -> &[String];

    /// Fields accepted by create only; changing one forces a recreate
    fn immutable_fields(&self) -> &[String];

    /// Fields produced by the backend
    fn output_fields(&self) -> &[String];

    /// Mutable or immutable fields that cannot be omitted
    fn required_fields(&self) -> &[String] {
        &[]
    }

    /// Whether the backend assigns its own identifier
    fn needs_remote_id(&self) -> bool {
        false
    }

    /// Whether deletion must wait until the end of the program
    fn delete_at_end(&self) -> bool {
        false
    }
}

/// Extension helpers over any descriptor
pub trait ResourceDescExt {
    /// Fields a declaration may bind
    fn is_settable(&self, field: &str) -> bool;

    /// Fields read back when reconciling: immutable first, then mutable
    fn readable_fields(&self) -> Vec<String>;
}

impl<D: ResourceDesc + ?Sized> ResourceDescExt for D {
    fn is_settable(&self, field: &str) -> bool {
        self.mutable_fields().iter().any(|f| f == field)
            || self.immutable_fields().iter().any(|f| f == field)
    }

    fn readable_fields(&self) -> Vec<String> {
        self.immutable_fields()
            .iter()
            .chain(self.mutable_fields())
            .cloned()
            .collect()
    }
}

/// Data-only descriptor, deserialisable from plan files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchema {
    #[serde(default)]
    pub mutable: Vec<String>,
    #[serde(default)]
    pub immutable: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub needs_remote_id: bool,
    #[serde(default)]
    pub delete_at_end: bool,
}

impl ResourceSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutable = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn immutable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.immutable = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn outputs<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_remote_id(mut self) -> Self {
        self.needs_remote_id = true;
        self
    }

    pub fn deleted_at_end(mut self) -> Self {
        self.delete_at_end = true;
        self
    }
}

impl ResourceDesc for ResourceSchema {
    fn mutable_fields(&self) -> &[String] {
        &self.mutable
    }

    fn immutable_fields(&self) -> &[String] {
        &self.immutable
    }

    fn output_fields(&self) -> &[String] {
        &self.outputs
    }

    fn required_fields(&self) -> &[String] {
        &self.required
    }

    fn needs_remote_id(&self) -> bool {
        self.needs_remote_id
    }

    fn delete_at_end(&self) -> bool {
        self.delete_at_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_fields_order() {
        let schema = ResourceSchema::new()
            .mutable(["contents"])
            .immutable(["name"]);
        assert_eq!(schema.readable_fields(), vec!["name", "contents"]);
        assert!(schema.is_settable("contents"));
        assert!(!schema.is_settable("created_at"));
    }

    #[test]
    fn test_schema_field_defaults() {
        let schema: ResourceSchema = serde_json::from_str(r#"{"mutable": ["a"]}"#).unwrap();
        assert_eq!(schema.mutable, vec!["a"]);
        assert!(schema.immutable.is_empty());
        assert!(!schema.needs_remote_id);
        assert!(!schema.delete_at_end);
    }
}
