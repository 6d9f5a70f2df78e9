//! The ROM: a flat, address-keyed table of declared values
//!
//! Every resource's property tree is flattened once at compile time. Each
//! nested value gets a synthetic address (`parent.key`), so the machine can
//! reach any value by simple indirection. A resource's root entry lives at
//! its own name.

use crate::error::{CompileError, Fault};
use crate::memory::Memory;
use crate::representation::{OutputRef, Representation};
use crate::types::Properties;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator between address segments
pub const ADDRESS_SEPARATOR: char = '.';

/// One flattened value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RomEntry {
    Literal {
        value: Value,
    },
    Array {
        references: Vec<String>,
    },
    Hash {
        references: IndexMap<String, String>,
    },
    Output {
        resource: String,
        output: String,
    },
}

/// Address → entry table for a compiled plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rom {
    entries: IndexMap<String, RomEntry>,
}

fn child_address(parent: &str, key: &str) -> String {
    format!("{parent}{ADDRESS_SEPARATOR}{key}")
}

/// Flatten `representation` into an address → entry map rooted at `root`
pub fn flatten(representation: &Representation, root: &str) -> IndexMap<String, RomEntry> {
    let mut out = IndexMap::new();
    flatten_into(representation, root, &mut out);
    out
}

fn flatten_into(
    representation: &Representation,
    address: &str,
    out: &mut IndexMap<String, RomEntry>,
) {
    let entry = match representation {
        Representation::Literal(value) => RomEntry::Literal {
            value: value.clone(),
        },
        Representation::Array(items) => {
            let references = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let child = child_address(address, &i.to_string());
                    flatten_into(item, &child, out);
                    child
                })
                .collect();
            RomEntry::Array { references }
        }
        Representation::Hash(entries) => RomEntry::Hash {
            references: flatten_children(entries, address, out),
        },
        Representation::Resource(resource) => RomEntry::Hash {
            references: flatten_children(resource.properties(), address, out),
        },
        Representation::Output(output) => RomEntry::Output {
            resource: output.resource.clone(),
            output: output.field.clone(),
        },
    };
    out.insert(address.to_string(), entry);
}

fn flatten_children(
    entries: &IndexMap<String, Representation>,
    address: &str,
    out: &mut IndexMap<String, RomEntry>,
) -> IndexMap<String, String> {
    entries
        .iter()
        .map(|(key, value)| {
            let child = child_address(address, key);
            flatten_into(value, &child, out);
            (key.clone(), child)
        })
        .collect()
}

impl Rom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten one resource's properties under its name
    pub fn add_resource(
        &mut self,
        name: &str,
        representation: &Representation,
    ) -> Result<(), CompileError> {
        for (address, entry) in flatten(representation, name) {
            if self.entries.contains_key(&address) {
                return Err(CompileError::RomAddressCollision { address });
            }
            self.entries.insert(address, entry);
        }
        Ok(())
    }

    pub fn get(&self, address: &str) -> Result<&RomEntry, Fault> {
        self.entries
            .get(address)
            .ok_or_else(|| Fault::NoSuchRomAddress(address.to_string()))
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve an address against the current run state
    ///
    /// Arrays and hashes expand recursively; outputs read the producing
    /// resource's remote id or stored outputs.
    pub fn resolve(&self, address: &str, memory: &Memory) -> Result<Value, Fault> {
        match self.get(address)? {
            RomEntry::Literal { value } => Ok(value.clone()),
            RomEntry::Array { references } => references
                .iter()
                .map(|child| self.resolve(child, memory))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            RomEntry::Hash { references } => references
                .iter()
                .map(|(key, child)| Ok((key.clone(), self.resolve(child, memory)?)))
                .collect::<Result<Properties, Fault>>()
                .map(Value::Object),
            RomEntry::Output { resource, output } => {
                log::trace!("Resolving output {resource}.{output}");
                memory.output_value(resource, output)
            }
        }
    }

    /// Rebuild the expression stored at `address`
    ///
    /// Resource references come back as hashes of their properties, which
    /// is how they were flattened.
    pub fn expression(&self, address: &str) -> Result<Representation, Fault> {
        match self.get(address)? {
            RomEntry::Literal { value } => Ok(Representation::Literal(value.clone())),
            RomEntry::Array { references } => references
                .iter()
                .map(|child| self.expression(child))
                .collect::<Result<Vec<_>, _>>()
                .map(Representation::Array),
            RomEntry::Hash { references } => references
                .iter()
                .map(|(key, child)| Ok((key.clone(), self.expression(child)?)))
                .collect::<Result<IndexMap<_, _>, Fault>>()
                .map(Representation::Hash),
            RomEntry::Output { resource, output } => Ok(Representation::Output(
                OutputRef::new(resource.clone(), output.clone()),
            )),
        }
    }
}
