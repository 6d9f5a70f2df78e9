//! Error types for compiling and running provisioning programs.
//!
//! Errors are split by phase. A [`CompileError`] aborts compilation and the
//! virtual machine never sees it. A [`Fault`] is raised while a program runs;
//! the runner stores it in `memory.error` and halts without rollback.

use thiserror::Error;

/// Errors raised while declaring resources or compiling a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A declared value cannot be represented
    #[error("invalid value: {value}")]
    InvalidValue {
        /// Rendering of the rejected value
        value: String,
    },

    /// An output accessor named a field the descriptor does not declare
    #[error("resource '{resource}' has no output field '{field}'")]
    UnknownOutput {
        /// Resource whose outputs were accessed
        resource: String,
        /// The undeclared field
        field: String,
    },

    /// A property was bound that is neither mutable nor immutable
    #[error("resource '{resource}' has no settable field '{field}'")]
    UnknownField {
        /// Resource being declared
        resource: String,
        /// The undeclared field
        field: String,
    },

    /// A required field has no bound property
    #[error("required field '{field}' not provided in '{resource}'")]
    MissingRequiredField {
        /// Resource being compiled
        resource: String,
        /// The missing field
        field: String,
    },

    /// Deferred deletion was requested without a stable remote identifier
    #[error("resource '{resource}' deletes at end but does not need a remote id")]
    DeleteOrdering {
        /// Offending resource
        resource: String,
    },

    /// Two resources share a name
    #[error("already defined: {name}")]
    DuplicateResourceName {
        /// The duplicated name
        name: String,
    },

    /// A type id is not present in the registry
    #[error("no such resource type: {type_id}")]
    UnknownResourceType {
        /// The unregistered type id
        type_id: String,
    },

    /// The dependency graph contains a cycle
    #[error("cyclic dependency between: {}", .members.join(", "))]
    CyclicDependency {
        /// Nodes that could not be leveled
        members: Vec<String>,
    },

    /// A resource depends on a name that is neither declared nor tracked
    #[error("'{resource}' depends on unknown resource '{dependency}'")]
    UnknownDependency {
        /// The dependent resource
        resource: String,
        /// The missing dependency
        dependency: String,
    },

    /// Two flattened values landed on the same ROM address
    #[error("ROM address collision at '{address}'")]
    RomAddressCollision {
        /// The contested address
        address: String,
    },
}

/// Faults raised while executing an instruction.
///
/// Backend failures are carried as rendered messages so a `Fault` stays
/// cloneable alongside the rest of [`crate::Memory`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// A scratch parameter the instruction requires was not staged
    #[error("{instruction} requires '{key}' to be set")]
    MissingParameter {
        /// Opcode name
        instruction: String,
        /// Missing scratch key
        key: String,
    },

    /// An artifact named an opcode this machine does not know
    #[error("unknown instruction '{0}'")]
    UnknownInstruction(String),

    /// A branch or call named a label that does not exist
    #[error("label '{0}' not found")]
    LabelNotFound(String),

    /// A value was written without a staged key
    #[error("no key set")]
    NoKeySet,

    /// A ROM lookup missed
    #[error("no such ROM address '{0}'")]
    NoSuchRomAddress(String),

    /// `return` executed with an empty call stack
    #[error("at bottom of stack")]
    StackUnderflow,

    /// An operand had the wrong shape
    #[error("{instruction}: invalid operand: {message}")]
    InvalidOperand {
        /// Opcode name
        instruction: String,
        /// What was wrong
        message: String,
    },

    /// A staged descriptor id is not registered
    #[error("no such resource type: {0}")]
    UnknownResourceType(String),

    /// The type is registered for compilation only
    #[error("resource type '{0}' has no backend factory")]
    NoBackend(String),

    /// `value_update` ran before `rescmp` recorded a decision
    #[error("no update decision recorded for '{0}'")]
    UpdateDecisionMissing(String),

    /// An output was resolved before its producer stored any outputs
    #[error("outputs of '{resource}' are not available (wanted '{field}')")]
    OutputUnavailable {
        /// Producing resource
        resource: String,
        /// Requested output field
        field: String,
    },

    /// The descriptor needs a remote id but the backend returned none
    #[error("resource '{0}' expects a remote id but the backend gave none")]
    MissingRemoteId(String),

    /// Create ran while a remote id was still tracked
    #[error("remote id already set for '{0}'")]
    RemoteIdAlreadySet(String),

    /// An update tried to change immutable fields
    #[error("immutable fields changed on '{resource}': {}", .fields.join(", "))]
    ImmutableFieldChanged {
        /// Resource being updated
        resource: String,
        /// The offending fields
        fields: Vec<String>,
    },

    /// `assert` saw a result other than 1
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// The backend returned an error
    #[error("{operation} failed for '{resource}': {message}")]
    Backend {
        /// Opcode that called the backend
        operation: String,
        /// Resource the call targeted
        resource: String,
        /// Rendered error chain
        message: String,
    },
}

impl Fault {
    /// Wrap a backend error raised by `operation` on `resource`.
    pub fn backend(operation: &str, resource: &str, err: &anyhow::Error) -> Self {
        Self::Backend {
            operation: operation.to_string(),
            resource: resource.to_string(),
            message: format!("{err:#}"),
        }
    }

    /// Build an [`Fault::InvalidOperand`].
    pub fn invalid_operand(instruction: &str, message: impl Into<String>) -> Self {
        Self::InvalidOperand {
            instruction: instruction.to_string(),
            message: message.into(),
        }
    }
}
