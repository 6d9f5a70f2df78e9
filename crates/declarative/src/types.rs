//! Core types shared by the compiler, the machine and the engine

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Ordered field name → value mapping passed to and from backends
pub type Properties = serde_json::Map<String, Value>;

/// Remote id key used by output references to mean "the backend identifier"
pub const REMOTE_ID_FIELD: &str = "remote_id";

/// Prefix applied to a remote id that was marked for deferred deletion
pub const DELETABLE_PREFIX: &str = "_deletable_";

/// Name under which a deferred deletion of `name` is tracked
pub fn deletable_name(name: &str) -> String {
    format!("{DELETABLE_PREFIX}{name}")
}

/// Lifecycle action planned for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// No prior state, still declared
    Create,
    /// Prior state, still declared
    Update,
    /// Prior state, no longer declared
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of comparing a resource's current and desired fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    /// Nothing differs
    NoChange,
    /// Only mutable fields differ, update in place
    Modify,
    /// An immutable field differs, destroy then create
    Recreate,
    /// The tracked resource no longer exists remotely
    Missing,
}

impl UpdateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoChange => "no_change",
            Self::Modify => "modify",
            Self::Recreate => "recreate",
            Self::Missing => "missing",
        }
    }

    /// Parse the symbolic form written by `memwrite`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no_change" => Some(Self::NoChange),
            "modify" => Some(Self::Modify),
            "recreate" => Some(Self::Recreate),
            "missing" => Some(Self::Missing),
            _ => None,
        }
    }
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the operation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Upper-cased opcode name, e.g. `CHECK_CREATE`
    pub operation: String,
    /// Resource staged when the instruction ran
    pub resource: String,
}

impl OperationRecord {
    pub fn new(operation: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            resource: resource.into(),
        }
    }
}

/// A tracked resource as recorded in a state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedResource {
    /// Backend identifier
    pub name: Value,
    /// Registered type id of the descriptor
    pub desc: String,
    /// Names this resource depended on when it was last applied
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Prior-state snapshot consumed when compiling, and produced after a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSnapshot {
    pub resources: IndexMap<String, TrackedResource>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a resource, replacing any previous entry of the same name
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        remote_id: impl Into<Value>,
        desc: impl Into<String>,
        dependencies: Vec<String>,
    ) {
        self.resources.insert(
            name.into(),
            TrackedResource {
                name: remote_id.into(),
                desc: desc.into(),
                dependencies,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&TrackedResource> {
        self.resources.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TrackedResource)> {
        self.resources.iter()
    }
}

/// Whether a run can make further progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Ended,
}

/// How a bounded [`crate::Engine::run`] call finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunOutcome {
    /// The program reached `end`
    #[default]
    Completed,
    /// A fault halted the program
    Failed,
    /// The step budget ran out; call `run` again to continue
    Paused,
}

/// Counts of backend-facing operations performed by a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub steps: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub reads: usize,
    pub polls: usize,
}

impl RunSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Add an operation record to the summary
    pub fn add_record(&mut self, record: &OperationRecord) {
        match record.operation.as_str() {
            "CREATE" => self.created += 1,
            "UPDATE" => self.updated += 1,
            "DELETE" => self.deleted += 1,
            "READ" => self.reads += 1,
            _ => {}
        }
    }
}

/// Options for compiling and running a program
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Emit self-healing subroutines that recreate tracked resources
    /// which no longer exist remotely
    /// (compile time only, ignored by `Engine::run`)
    pub create_missing: bool,
    /// Pause between steps while a `check_*` instruction is polling
    pub poll_interval: Duration,
    /// Upper bound on steps executed by a single `run` call
    pub max_steps: Option<usize>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            create_missing: false,
            poll_interval: Duration::from_millis(500),
            max_steps: None,
        }
    }
}
