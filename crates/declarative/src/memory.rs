//! Mutable run state of one program execution
//!
//! Everything a paused run needs to resume lives here and serialises with
//! serde. The error slot is transient and never written out.

use crate::error::Fault;
use crate::types::{Properties, REMOTE_ID_FIELD, UpdateAction};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scratch slot holding the key staged by `key`
pub const STAGED_KEY: &str = "_key";

/// Scratch slot holding the result tested by branches
pub const RESULT_KEY: &str = "result";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub program_counter: usize,
    pub call_stack: Vec<usize>,
    /// Scratch values, cleared at the start of every subroutine
    pub temp: Properties,
    pub remote_ids: IndexMap<String, Value>,
    pub outputs: IndexMap<String, Properties>,
    pub update_action: IndexMap<String, UpdateAction>,
    pub deleted: Vec<String>,
    #[serde(skip)]
    pub error: Option<Fault>,
    pub end: bool,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A staged scratch value, or `MissingParameter`
    pub fn require(&self, instruction: &str, key: &str) -> Result<&Value, Fault> {
        self.temp.get(key).ok_or_else(|| Fault::MissingParameter {
            instruction: instruction.to_string(),
            key: key.to_string(),
        })
    }

    /// A staged scratch string
    pub fn require_str(&self, instruction: &str, key: &str) -> Result<&str, Fault> {
        self.require(instruction, key)?.as_str().ok_or_else(|| {
            Fault::invalid_operand(instruction, format!("'{key}' must be a string"))
        })
    }

    /// A staged scratch map
    pub fn require_object(&self, instruction: &str, key: &str) -> Result<&Properties, Fault> {
        self.require(instruction, key)?.as_object().ok_or_else(|| {
            Fault::invalid_operand(instruction, format!("'{key}' must be a map"))
        })
    }

    /// The branch result as an integer; booleans count as 0/1
    pub fn result(&self, instruction: &str) -> Result<i64, Fault> {
        match self.require(instruction, RESULT_KEY)? {
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Number(n) => n.as_i64().ok_or_else(|| {
                Fault::invalid_operand(instruction, format!("result {n} is not an integer"))
            }),
            other => Err(Fault::invalid_operand(
                instruction,
                format!("result {other} is not an integer"),
            )),
        }
    }

    pub fn set_result(&mut self, result: i64) {
        self.temp.insert(RESULT_KEY.to_string(), Value::from(result));
    }

    /// Tracked remote id of `name`, treating null as absent
    pub fn remote_id(&self, name: &str) -> Option<Value> {
        self.remote_ids.get(name).filter(|id| !id.is_null()).cloned()
    }

    /// Value of an output reference in the current run
    pub fn output_value(&self, resource: &str, field: &str) -> Result<Value, Fault> {
        if field == REMOTE_ID_FIELD {
            return Ok(self.remote_ids.get(resource).cloned().unwrap_or(Value::Null));
        }

        let outputs = self
            .outputs
            .get(resource)
            .ok_or_else(|| Fault::OutputUnavailable {
                resource: resource.to_string(),
                field: field.to_string(),
            })?;
        Ok(outputs.get(field).cloned().unwrap_or(Value::Null))
    }

    /// Whether the run has reached `end`, faulted or run off the program
    pub fn is_halted(&self, program_len: usize) -> bool {
        self.end || self.error.is_some() || self.program_counter >= program_len
    }
}
