//! Typed expression trees for declared values
//!
//! Raw values bound to resource fields are resolved into a
//! [`Representation`]: literals, arrays, hashes, references to whole
//! resources, or references to one output of a resource. Every
//! representation knows which resources it depends on.

use crate::error::CompileError;
use crate::resource::ResourceDesc;
use crate::types::REMOTE_ID_FIELD;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A resolved declared value
#[derive(Debug, Clone, PartialEq)]
pub enum Representation {
    Literal(Value),
    Array(Vec<Representation>),
    Hash(IndexMap<String, Representation>),
    Resource(ResourceRef),
    Output(OutputRef),
}

impl Representation {
    /// Names of the resources this value depends on
    pub fn dependencies(&self) -> IndexSet<String> {
        match self {
            Self::Literal(_) => IndexSet::new(),
            Self::Array(items) => items.iter().flat_map(Self::dependencies).collect(),
            Self::Hash(entries) => entries.values().flat_map(Self::dependencies).collect(),
            Self::Resource(resource) => resource.dependencies(),
            Self::Output(output) => IndexSet::from([output.resource.clone()]),
        }
    }
}

/// A raw value as handed to the declaration surface
#[derive(Debug, Clone)]
pub enum RawValue {
    Json(Value),
    List(Vec<RawValue>),
    Map(IndexMap<String, RawValue>),
    Resource(ResourceRef),
    Output(OutputRef),
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<u64> for RawValue {
    fn from(value: u64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<ResourceRef> for RawValue {
    fn from(value: ResourceRef) -> Self {
        Self::Resource(value)
    }
}

impl From<&ResourceRef> for RawValue {
    fn from(value: &ResourceRef) -> Self {
        Self::Resource(value.clone())
    }
}

impl From<OutputRef> for RawValue {
    fn from(value: OutputRef) -> Self {
        Self::Output(value)
    }
}

impl<T: Into<RawValue>> From<Vec<T>> for RawValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<RawValue>> From<IndexMap<String, T>> for RawValue {
    fn from(values: IndexMap<String, T>) -> Self {
        Self::Map(values.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// Resolve a raw value into its representation
pub fn resolve(raw: RawValue) -> Result<Representation, CompileError> {
    match raw {
        RawValue::Json(value) => resolve_json(value),
        RawValue::List(items) => items
            .into_iter()
            .map(resolve)
            .collect::<Result<Vec<_>, _>>()
            .map(Representation::Array),
        RawValue::Map(entries) => entries
            .into_iter()
            .map(|(k, v)| Ok((k, resolve(v)?)))
            .collect::<Result<IndexMap<_, _>, CompileError>>()
            .map(Representation::Hash),
        RawValue::Resource(resource) => Ok(Representation::Resource(resource)),
        RawValue::Output(output) => Ok(Representation::Output(output)),
    }
}

fn resolve_json(value: Value) -> Result<Representation, CompileError> {
    match value {
        Value::String(_) | Value::Number(_) => Ok(Representation::Literal(value)),
        Value::Array(items) => items
            .into_iter()
            .map(resolve_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Representation::Array),
        Value::Object(entries) => entries
            .into_iter()
            .map(|(k, v)| Ok((k, resolve_json(v)?)))
            .collect::<Result<IndexMap<_, _>, CompileError>>()
            .map(Representation::Hash),
        Value::Null | Value::Bool(_) => Err(CompileError::InvalidValue {
            value: value.to_string(),
        }),
    }
}

/// Reference to one output field of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputRef {
    pub resource: String,
    pub field: String,
}

impl OutputRef {
    pub fn new(resource: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.field)
    }
}

struct ResourceInner {
    name: String,
    type_id: String,
    desc: Arc<dyn ResourceDesc>,
    properties: IndexMap<String, Representation>,
    capabilities: IndexMap<String, OutputRef>,
}

/// A declared resource: its name, type and bound properties
///
/// Cloning is cheap; clones share the same declaration.
#[derive(Clone)]
pub struct ResourceRef {
    inner: Arc<ResourceInner>,
}

impl ResourceRef {
    /// Build a resource reference
    ///
    /// Fails when the descriptor defers deletion but has no remote id,
    /// since the deferred delete needs a stable handle.
    pub fn new(
        name: impl Into<String>,
        type_id: impl Into<String>,
        desc: Arc<dyn ResourceDesc>,
        properties: IndexMap<String, Representation>,
    ) -> Result<Self, CompileError> {
        let name = name.into();
        if desc.delete_at_end() && !desc.needs_remote_id() {
            return Err(CompileError::DeleteOrdering { resource: name });
        }

        let capabilities = desc
            .output_fields()
            .iter()
            .map(|field| (field.clone(), OutputRef::new(name.clone(), field.clone())))
            .collect();

        Ok(Self {
            inner: Arc::new(ResourceInner {
                name,
                type_id: type_id.into(),
                desc,
                properties,
                capabilities,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn type_id(&self) -> &str {
        &self.inner.type_id
    }

    pub fn desc(&self) -> &Arc<dyn ResourceDesc> {
        &self.inner.desc
    }

    pub fn properties(&self) -> &IndexMap<String, Representation> {
        &self.inner.properties
    }

    /// Reference to a declared output field
    pub fn output(&self, field: &str) -> Result<OutputRef, CompileError> {
        self.inner
            .capabilities
            .get(field)
            .cloned()
            .ok_or_else(|| CompileError::UnknownOutput {
                resource: self.inner.name.clone(),
                field: field.to_string(),
            })
    }

    /// Reference to the backend identifier of this resource
    pub fn remote_identifier(&self) -> OutputRef {
        OutputRef::new(self.inner.name.clone(), REMOTE_ID_FIELD)
    }

    /// Ensure every required field has a bound property
    pub fn check_required_fields(&self) -> Result<(), CompileError> {
        for field in self.inner.desc.required_fields() {
            if !self.inner.properties.contains_key(field) {
                return Err(CompileError::MissingRequiredField {
                    resource: self.inner.name.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    /// This resource's own name plus everything its properties depend on
    pub fn dependencies(&self) -> IndexSet<String> {
        let mut deps = IndexSet::from([self.inner.name.clone()]);
        deps.extend(self.inner.properties.values().flat_map(Representation::dependencies));
        deps
    }

    /// Resources this one must wait for
    pub fn property_dependencies(&self) -> IndexSet<String> {
        self.inner
            .properties
            .values()
            .flat_map(Representation::dependencies)
            .filter(|dep| dep != &self.inner.name)
            .collect()
    }
}

impl PartialEq for ResourceRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.name == other.inner.name
                && self.inner.type_id == other.inner.type_id
                && self.inner.properties == other.inner.properties)
    }
}

impl fmt::Debug for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRef")
            .field("name", &self.inner.name)
            .field("type_id", &self.inner.type_id)
            .field("properties", &self.inner.properties)
            .finish()
    }
}
