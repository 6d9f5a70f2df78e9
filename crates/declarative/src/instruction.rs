//! The opcode vocabulary
//!
//! Bare opcodes serialise as strings (`"create"`), immediate-mode opcodes as
//! single-entry maps (`{"key": "resource_name"}`).

use crate::error::Fault;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Branch target of `goto_if`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Index(usize),
    Label(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// One instruction of a compiled program
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    /// Load the initial tables into memory
    Init,
    /// Stop the program
    End,
    /// Reset scratch
    Clear,
    /// Pop the call stack and resume after the caller
    Return,
    /// Negate the scratch result
    Invert,

    /// Stage a scratch key for the next `value*`
    Key(String),
    /// Bind a literal to the staged key
    Value(Value),
    /// Bind a resolved ROM address to the staged key
    ValueRom(String),
    /// Replace scratch with the update decision of a resource
    ValueUpdate(String),
    /// Write `memory[superkey][key] = param`
    Memwrite(Value),
    /// Set result to 1 when it equals the parameter, 0 otherwise
    Compare(Value),
    /// Fault unless result is 1
    Assert(String),
    /// Jump when result is non-zero
    GotoIf(Target),
    /// Push the counter and jump to a label
    Call(String),

    Create,
    Read,
    Update,
    Delete,
    CheckCreate,
    CheckUpdate,
    CheckDelete,
    CheckExist,
    MarkDeletable,
    Filter,
    Rescmp,
}

impl Instruction {
    /// Opcode name as it appears in artifacts
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::End => "end",
            Self::Clear => "clear",
            Self::Return => "return",
            Self::Invert => "invert",
            Self::Key(_) => "key",
            Self::Value(_) => "value",
            Self::ValueRom(_) => "value_rom",
            Self::ValueUpdate(_) => "value_update",
            Self::Memwrite(_) => "memwrite",
            Self::Compare(_) => "compare",
            Self::Assert(_) => "assert",
            Self::GotoIf(_) => "goto_if",
            Self::Call(_) => "call",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::CheckCreate => "check_create",
            Self::CheckUpdate => "check_update",
            Self::CheckDelete => "check_delete",
            Self::CheckExist => "check_exist",
            Self::MarkDeletable => "mark_deletable",
            Self::Filter => "filter",
            Self::Rescmp => "rescmp",
        }
    }

    /// Whether the instruction acts on a staged resource
    pub fn is_resource_op(&self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::Read
                | Self::Update
                | Self::Delete
                | Self::CheckCreate
                | Self::CheckUpdate
                | Self::CheckDelete
                | Self::CheckExist
                | Self::MarkDeletable
                | Self::Filter
                | Self::Rescmp
        )
    }

    /// Scratch keys that must be staged before the instruction runs
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Create | Self::Update => &["resource_name", "resource_desc", "properties"],
            Self::Filter => &["resource_name", "resource_desc", "properties", "current"],
            Self::Rescmp => &["resource_name", "resource_desc", "current"],
            Self::Memwrite(_) => &["superkey", "key"],
            _ if self.is_resource_op() => &["resource_name", "resource_desc"],
            _ => &[],
        }
    }

    /// Decode one artifact entry
    pub fn decode(value: &Value) -> Result<Self, Fault> {
        match value {
            Value::String(op) => Self::decode_bare(op),
            Value::Object(map) if map.len() == 1 => {
                let Some((op, param)) = map.iter().next() else {
                    return Err(Fault::UnknownInstruction(value.to_string()));
                };
                Self::decode_immediate(op, param)
            }
            other => Err(Fault::UnknownInstruction(other.to_string())),
        }
    }

    fn decode_bare(op: &str) -> Result<Self, Fault> {
        Ok(match op {
            "init" => Self::Init,
            "end" => Self::End,
            "clear" => Self::Clear,
            "return" => Self::Return,
            "invert" => Self::Invert,
            "create" => Self::Create,
            "read" => Self::Read,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "check_create" => Self::CheckCreate,
            "check_update" => Self::CheckUpdate,
            "check_delete" => Self::CheckDelete,
            "check_exist" => Self::CheckExist,
            "mark_deletable" => Self::MarkDeletable,
            "filter" => Self::Filter,
            "rescmp" => Self::Rescmp,
            _ => return Err(Fault::UnknownInstruction(op.to_string())),
        })
    }

    fn decode_immediate(op: &str, param: &Value) -> Result<Self, Fault> {
        let text = |param: &Value| {
            param
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Fault::invalid_operand(op, format!("expected a string, got {param}")))
        };

        Ok(match op {
            "key" => Self::Key(text(param)?),
            "value" => Self::Value(param.clone()),
            "value_rom" => Self::ValueRom(text(param)?),
            "value_update" => Self::ValueUpdate(text(param)?),
            "memwrite" => Self::Memwrite(param.clone()),
            "compare" => Self::Compare(param.clone()),
            "assert" => Self::Assert(text(param)?),
            "call" => Self::Call(text(param)?),
            "goto_if" => match param {
                Value::String(label) => Self::GotoIf(Target::Label(label.clone())),
                Value::Number(n) => {
                    let index = n
                        .as_u64()
                        .and_then(|i| usize::try_from(i).ok())
                        .ok_or_else(|| Fault::invalid_operand(op, format!("bad index {n}")))?;
                    Self::GotoIf(Target::Index(index))
                }
                other => {
                    return Err(Fault::invalid_operand(
                        op,
                        format!("expected a label or index, got {other}"),
                    ));
                }
            },
            _ => return Err(Fault::UnknownInstruction(op.to_string())),
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(p) | Self::ValueRom(p) | Self::ValueUpdate(p) | Self::Assert(p) | Self::Call(p) => {
                write!(f, "{} {p}", self.name())
            }
            Self::Value(v) | Self::Memwrite(v) | Self::Compare(v) => write!(f, "{} {v}", self.name()),
            Self::GotoIf(target) => write!(f, "goto_if {target}"),
            _ => f.write_str(self.name()),
        }
    }
}
