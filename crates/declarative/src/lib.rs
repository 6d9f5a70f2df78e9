//! # Declarative
//!
//! A framework for declarative resource provisioning.
//!
//! Resources are declared with their desired properties; the crate compiles
//! them, together with a snapshot of what was provisioned last time, into a
//! flat program for a small virtual machine. The program is executed one
//! instruction per step, so a run can be paused, checkpointed and resumed.
//!
//! ## Core Concepts
//!
//! - **Declaration**: named resources of registered types, whose properties
//!   may refer to other resources' outputs
//! - **Compiler**: orders resources into dependency levels and emits the
//!   subroutines that create, update or delete each one
//! - **Program**: an init block (ROM, labels, prior remote ids) plus the
//!   instruction list; serialisable as a JSON artifact
//! - **Runner / Engine**: step-wise interpreter and the facade that reports
//!   progress and the resulting state snapshot
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     Declaration, Engine, ExecuteOptions, NoProgress, ResourceSchema,
//!     ResourceTypeRegistry, StateSnapshot,
//! };
//!
//! let mut registry = ResourceTypeRegistry::new();
//! registry.register(
//!     "file",
//!     ResourceSchema::new().mutable(["contents"]).immutable(["name"]),
//!     |id| Box::new(MyFile::new(id)),
//! );
//!
//! let mut decl = Declaration::new(&registry);
//! decl.resource("file", "motd", |r| {
//!     r.set("name", "motd.txt")?.set("contents", "hello")?;
//!     Ok(())
//! })?;
//!
//! let options = ExecuteOptions::default();
//! let mut engine = Engine::new(&decl, &StateSnapshot::new(), &options)?;
//! let summary = engine.run(&options, &mut NoProgress);
//! let next_prior = engine.state();
//! ```
//!
//! ## Provider Traits
//!
//! - [`Resource`]: one backend object handle
//! - [`ResourceDesc`]: field sets and deletion policy of a resource type
//! - [`ProgressCallback`]: receives progress updates from [`Engine::run`]

pub mod compiler;
pub mod context;
pub mod declaration;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod instruction;
pub mod machine;
pub mod memory;
pub mod planner;
pub mod registry;
pub mod representation;
pub mod resource;
pub mod rom;
pub mod runner;
pub mod types;

#[cfg(test)]
pub mod testing;

// Re-export main types at crate root
pub use compiler::{Compiler, InitBlock, Program};
pub use context::{NoProgress, ProgressCallback};
pub use declaration::{Declaration, ResourceBuilder};
pub use error::{CompileError, Fault};
pub use executor::Engine;
pub use graph::DependencyGraph;
pub use instruction::{Instruction, Target};
pub use memory::Memory;
pub use registry::{ResourceFactory, ResourceType, ResourceTypeRegistry};
pub use representation::{OutputRef, RawValue, Representation, ResourceRef};
pub use resource::{BoxedResource, Resource, ResourceDesc, ResourceDescExt, ResourceSchema};
pub use rom::{Rom, RomEntry};
pub use runner::Runner;
pub use types::{
    Action, ExecuteOptions, OperationRecord, Properties, RunOutcome, RunState, RunSummary,
    StateSnapshot, TrackedResource, UpdateAction,
};
