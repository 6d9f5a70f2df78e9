//! Compiler - turns a declaration and a prior-state snapshot into a program
//!
//! The program starts with a driver: `init`, then for every dependency level
//! a call to each member's `start` and `check` subroutines, then the levels
//! again in reverse calling `commit` and `finish`, then `end`. Subroutine
//! bodies follow the driver; labels point at their first instruction.

use crate::declaration::Declaration;
use crate::error::{CompileError, Fault};
use crate::graph::DependencyGraph;
use crate::instruction::Instruction;
use crate::planner::{Step, SubPlanner, Subroutine, subroutine_key};
use crate::representation::{Representation, ResourceRef};
use crate::rom::Rom;
use crate::types::{Action, ExecuteOptions, Properties, StateSnapshot};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tables loaded into memory by `init`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitBlock {
    #[serde(default)]
    pub rom: Rom,
    #[serde(default)]
    pub remote_ids: IndexMap<String, Value>,
    #[serde(default)]
    pub labels: IndexMap<String, usize>,
    #[serde(default)]
    pub outputs: IndexMap<String, Properties>,
    #[serde(default)]
    pub deleted: Vec<String>,
}

/// A compiled program: initial tables plus the flat instruction list
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Program {
    pub init: InitBlock,
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn rom(&self) -> &Rom {
        &self.init.rom
    }

    /// Address of a label
    pub fn label(&self, label: &str) -> Result<usize, Fault> {
        self.init
            .labels
            .get(label)
            .copied()
            .ok_or_else(|| Fault::LabelNotFound(label.to_string()))
    }

    /// Render as a JSON artifact
    pub fn to_artifact(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Decode a JSON artifact
    pub fn from_artifact(artifact: &Value) -> Result<Self, Fault> {
        let init = match artifact.get("init") {
            Some(init) => serde_json::from_value(init.clone())
                .map_err(|e| Fault::invalid_operand("init", e.to_string()))?,
            None => InitBlock::default(),
        };

        let instructions = match artifact.get("instructions") {
            Some(Value::Array(items)) => items
                .iter()
                .map(Instruction::decode)
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(Fault::invalid_operand(
                    "instructions",
                    format!("expected a list, got {other}"),
                ));
            }
            None => Vec::new(),
        };

        Ok(Self { init, instructions })
    }
}

/// Compiles a declaration against a prior-state snapshot
pub struct Compiler<'a, 'r> {
    declaration: &'a Declaration<'r>,
    extant: &'a StateSnapshot,
    create_missing: bool,
}

impl<'a, 'r> Compiler<'a, 'r> {
    pub fn new(
        declaration: &'a Declaration<'r>,
        extant: &'a StateSnapshot,
        options: &ExecuteOptions,
    ) -> Self {
        Self {
            declaration,
            extant,
            create_missing: options.create_missing,
        }
    }

    /// Tracked resources that are no longer declared
    fn deletables(&self) -> Result<Vec<ResourceRef>, CompileError> {
        let registry = self.declaration.registry();
        self.extant
            .iter()
            .filter(|(name, _)| self.declaration.get(name).is_none())
            .map(|(name, tracked)| {
                let ty = registry.lookup(&tracked.desc)?;
                ResourceRef::new(
                    name.clone(),
                    tracked.desc.clone(),
                    ty.desc().clone(),
                    IndexMap::new(),
                )
            })
            .collect()
    }

    /// Action planned for every resource, deletions first
    pub fn actions(&self) -> Result<Vec<(ResourceRef, Action)>, CompileError> {
        let mut actions: Vec<_> = self
            .deletables()?
            .into_iter()
            .map(|r| (r, Action::Delete))
            .collect();

        for (name, resource) in self.declaration.resources() {
            let action = if self.extant.contains(name) {
                Action::Update
            } else {
                Action::Create
            };
            actions.push((resource.clone(), action));
        }
        Ok(actions)
    }

    /// Declared edges overlaid on the tracked ones
    ///
    /// Tracked edges to names that are neither declared nor tracked are
    /// dropped.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (name, tracked) in self.extant.iter() {
            let deps = tracked
                .dependencies
                .iter()
                .filter(|dep| self.extant.contains(dep) || self.declaration.get(dep).is_some())
                .cloned()
                .collect();
            graph.insert(name.clone(), deps);
        }
        graph.merge(&self.declaration.dependency_graph());
        graph
    }

    pub fn levels(&self) -> Result<Vec<Vec<String>>, CompileError> {
        self.dependency_graph().topological_levels()
    }

    fn subroutines(
        &self,
        actions: &[(ResourceRef, Action)],
    ) -> Result<IndexMap<String, Subroutine>, CompileError> {
        let mut subroutines = IndexMap::new();
        for (resource, action) in actions {
            let planner = SubPlanner::new(resource, *action, self.create_missing);
            subroutines.extend(planner.subroutines()?);
        }
        Ok(subroutines)
    }

    fn calls<'l>(
        levels: impl Iterator<Item = &'l Vec<String>>,
        steps: [Step; 2],
        subroutines: &IndexMap<String, Subroutine>,
    ) -> Vec<Instruction> {
        let mut out = Vec::new();
        for level in levels {
            for step in steps {
                for name in level {
                    if let Some(sub) = subroutines.get(&subroutine_key(name, step.as_str())) {
                        out.push(sub.call());
                    }
                }
            }
        }
        out
    }

    fn driver(
        levels: &[Vec<String>],
        subroutines: &IndexMap<String, Subroutine>,
    ) -> Vec<Instruction> {
        let mut driver = vec![Instruction::Init];
        driver.extend(Self::calls(levels.iter(), Step::FORWARD, subroutines));
        driver.extend(Self::calls(levels.iter().rev(), Step::REVERSE, subroutines));
        driver.push(Instruction::End);
        driver
    }

    fn rom(&self) -> Result<Rom, CompileError> {
        let mut rom = Rom::new();
        for (name, resource) in self.declaration.resources() {
            rom.add_resource(name, &Representation::Resource(resource.clone()))?;
        }
        Ok(rom)
    }

    pub fn compile(&self) -> Result<Program, CompileError> {
        let levels = self.levels()?;
        let actions = self.actions()?;
        let subroutines = self.subroutines(&actions)?;
        let mut instructions = Self::driver(&levels, &subroutines);

        let mut labels = IndexMap::new();
        for sub in subroutines.values() {
            labels.insert(sub.label().to_string(), instructions.len());
            instructions.extend(sub.body());
        }

        let remote_ids = self
            .extant
            .iter()
            .map(|(name, tracked)| (name.clone(), tracked.name.clone()))
            .collect();

        log::debug!(
            "Compiled {} resources into {} instructions ({} levels, {} subroutines)",
            actions.len(),
            instructions.len(),
            levels.len(),
            labels.len()
        );

        Ok(Program {
            init: InitBlock {
                rom: self.rom()?,
                remote_ids,
                labels,
                outputs: IndexMap::new(),
                deleted: Vec::new(),
            },
            instructions,
        })
    }
}
