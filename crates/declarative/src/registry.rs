//! Resource type registry
//!
//! Maps a symbolic type id (`"file"`, `"server"`) to its descriptor and the
//! factory that builds backend handles. The registry is handed explicitly to
//! the declaration surface and to the machine; nothing is looked up by
//! global name.

use crate::error::{CompileError, Fault};
use crate::resource::{BoxedResource, ResourceDesc};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Builds a backend handle from an optional remote id
pub type ResourceFactory = Arc<dyn Fn(Option<Value>) -> BoxedResource + Send + Sync>;

/// One registered resource type
#[derive(Clone)]
pub struct ResourceType {
    id: String,
    desc: Arc<dyn ResourceDesc>,
    factory: Option<ResourceFactory>,
}

impl ResourceType {
    pub fn desc(&self) -> &Arc<dyn ResourceDesc> {
        &self.desc
    }

    /// Build a handle for `remote_id`
    pub fn instantiate(&self, remote_id: Option<Value>) -> Result<BoxedResource, Fault> {
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| Fault::NoBackend(self.id.clone()))?;
        Ok(factory(remote_id))
    }
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceType")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .field("runnable", &self.factory.is_some())
            .finish()
    }
}

/// Registry of resource types keyed by type id
#[derive(Clone, Default, Debug)]
pub struct ResourceTypeRegistry {
    types: IndexMap<String, ResourceType>,
}

impl ResourceTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runnable type
    pub fn register<D, F>(&mut self, id: impl Into<String>, desc: D, factory: F)
    where
        D: ResourceDesc + 'static,
        F: Fn(Option<Value>) -> BoxedResource + Send + Sync + 'static,
    {
        let id = id.into();
        log::trace!("Registering resource type '{id}'");
        self.types.insert(
            id.clone(),
            ResourceType {
                id,
                desc: Arc::new(desc),
                factory: Some(Arc::new(factory)),
            },
        );
    }

    /// Register a type that can be compiled but not run
    pub fn register_descriptor<D>(&mut self, id: impl Into<String>, desc: D)
    where
        D: ResourceDesc + 'static,
    {
        let id = id.into();
        self.types.insert(
            id.clone(),
            ResourceType {
                id,
                desc: Arc::new(desc),
                factory: None,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<&ResourceType> {
        self.types.get(id)
    }

    /// Lookup used while compiling
    pub fn lookup(&self, id: &str) -> Result<&ResourceType, CompileError> {
        self.get(id).ok_or_else(|| CompileError::UnknownResourceType {
            type_id: id.to_string(),
        })
    }

    /// Lookup used while running
    pub fn resolve(&self, id: &str) -> Result<&ResourceType, Fault> {
        self.get(id)
            .ok_or_else(|| Fault::UnknownResourceType(id.to_string()))
    }
}
