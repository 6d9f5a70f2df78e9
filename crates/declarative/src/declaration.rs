//! The declaration surface: describe the resources you want
//!
//! ```ignore
//! let mut decl = Declaration::new(&registry);
//! let server = decl.resource("server", "serv", |r| {
//!     r.set("size", "B")?;
//!     Ok(())
//! })?;
//! decl.resource("ip_address", "ip", |r| {
//!     r.set("server_id", server.remote_identifier())?;
//!     Ok(())
//! })?;
//! ```

use crate::error::CompileError;
use crate::graph::DependencyGraph;
use crate::registry::ResourceTypeRegistry;
use crate::representation::{RawValue, Representation, ResourceRef, resolve};
use crate::resource::{ResourceDesc, ResourceDescExt};
use indexmap::IndexMap;
use std::sync::Arc;

/// Binds properties of one resource being declared
pub struct ResourceBuilder {
    name: String,
    desc: Arc<dyn ResourceDesc>,
    properties: IndexMap<String, Representation>,
}

impl ResourceBuilder {
    /// Bind a mutable or immutable field
    pub fn set(
        &mut self,
        field: &str,
        value: impl Into<RawValue>,
    ) -> Result<&mut Self, CompileError> {
        if !self.desc.is_settable(field) {
            return Err(CompileError::UnknownField {
                resource: self.name.clone(),
                field: field.to_string(),
            });
        }
        self.properties
            .insert(field.to_string(), resolve(value.into())?);
        Ok(self)
    }
}

/// An ordered set of declared resources
#[derive(Debug)]
pub struct Declaration<'r> {
    registry: &'r ResourceTypeRegistry,
    resources: IndexMap<String, ResourceRef>,
}

impl<'r> Declaration<'r> {
    pub fn new(registry: &'r ResourceTypeRegistry) -> Self {
        Self {
            registry,
            resources: IndexMap::new(),
        }
    }

    pub fn registry(&self) -> &'r ResourceTypeRegistry {
        self.registry
    }

    /// Declare a resource of type `type_id` and bind its properties
    pub fn resource<F>(
        &mut self,
        type_id: &str,
        name: &str,
        build: F,
    ) -> Result<ResourceRef, CompileError>
    where
        F: FnOnce(&mut ResourceBuilder) -> Result<(), CompileError>,
    {
        let ty = self.registry.lookup(type_id)?;
        if self.resources.contains_key(name) {
            return Err(CompileError::DuplicateResourceName {
                name: name.to_string(),
            });
        }

        let mut builder = ResourceBuilder {
            name: name.to_string(),
            desc: Arc::clone(ty.desc()),
            properties: IndexMap::new(),
        };
        build(&mut builder)?;

        let resource = ResourceRef::new(name, type_id, builder.desc, builder.properties)?;
        log::debug!("Declared {type_id} '{name}'");
        self.resources.insert(name.to_string(), resource.clone());
        Ok(resource)
    }

    /// Declare a resource with no bound properties
    pub fn declare(&mut self, type_id: &str, name: &str) -> Result<ResourceRef, CompileError> {
        self.resource(type_id, name, |_| Ok(()))
    }

    pub fn resources(&self) -> &IndexMap<String, ResourceRef> {
        &self.resources
    }

    pub fn get(&self, name: &str) -> Option<&ResourceRef> {
        self.resources.get(name)
    }

    /// Name → dependency set of every declared resource
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (name, resource) in &self.resources {
            graph.insert(name.clone(), resource.property_dependencies());
        }
        graph
    }
}
