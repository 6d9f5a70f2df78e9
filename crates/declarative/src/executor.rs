//! Execution engine - compiles a declaration and drives its program

use crate::compiler::{Compiler, Program};
use crate::context::ProgressCallback;
use crate::declaration::Declaration;
use crate::error::{CompileError, Fault};
use crate::memory::Memory;
use crate::runner::Runner;
use crate::types::{
    DELETABLE_PREFIX, ExecuteOptions, OperationRecord, RunOutcome, RunState, RunSummary,
    StateSnapshot, TrackedResource,
};
use indexmap::IndexMap;
use std::thread;

/// A compiled declaration ready to run against its backends
///
/// ```ignore
/// let mut engine = Engine::new(&decl, &prior, &ExecuteOptions::default())?;
/// let summary = engine.run(&ExecuteOptions::default(), &mut NoProgress);
/// let next_prior = engine.state();
/// ```
pub struct Engine {
    runner: Runner,
    types: IndexMap<String, String>,
    dependencies: IndexMap<String, Vec<String>>,
}

impl Engine {
    pub fn new(
        declaration: &Declaration<'_>,
        prior: &StateSnapshot,
        options: &ExecuteOptions,
    ) -> Result<Self, CompileError> {
        let program = Compiler::new(declaration, prior, options).compile()?;

        let mut types = IndexMap::new();
        let mut dependencies = IndexMap::new();
        for (name, tracked) in prior.iter() {
            types.insert(name.clone(), tracked.desc.clone());
            dependencies.insert(name.clone(), tracked.dependencies.clone());
        }
        for (name, resource) in declaration.resources() {
            types.insert(name.clone(), resource.type_id().to_string());
            dependencies.insert(
                name.clone(),
                resource.property_dependencies().into_iter().collect(),
            );
        }

        Ok(Self {
            runner: Runner::new(program, declaration.registry().clone()),
            types,
            dependencies,
        })
    }

    pub fn program(&self) -> &Program {
        self.runner.program()
    }

    /// Execute one instruction
    pub fn step(&mut self) -> RunState {
        self.runner.step()
    }

    pub fn error(&self) -> Option<&Fault> {
        self.runner.memory().error.as_ref()
    }

    pub fn oplog(&self) -> &[OperationRecord] {
        self.runner.oplog()
    }

    pub fn memory(&self) -> &Memory {
        self.runner.memory()
    }

    /// Copy of the memory, to resume later with [`Engine::restore`]
    pub fn checkpoint(&self) -> Memory {
        self.runner.memory().clone()
    }

    /// Continue from a checkpoint taken against the same program
    pub fn restore(&mut self, memory: Memory) {
        self.runner.restore(memory);
    }

    /// Snapshot of every tracked resource
    ///
    /// A resource marked for deferred deletion is reported under its
    /// `_deletable_` name with the type and dependencies of the original.
    pub fn state(&self) -> StateSnapshot {
        let mut state = StateSnapshot::new();
        for (name, remote_id) in &self.runner.memory().remote_ids {
            let key = if self.types.contains_key(name) {
                name.as_str()
            } else {
                name.strip_prefix(DELETABLE_PREFIX).unwrap_or(name)
            };
            let Some(desc) = self.types.get(key) else {
                log::warn!("No type known for tracked resource '{name}', leaving it out");
                continue;
            };
            state.resources.insert(
                name.clone(),
                TrackedResource {
                    name: remote_id.clone(),
                    desc: desc.clone(),
                    dependencies: self.dependencies.get(key).cloned().unwrap_or_default(),
                },
            );
        }
        state
    }

    /// Step until the program ends, faults or exhausts `max_steps`
    ///
    /// Only `poll_interval` and `max_steps` are read here; `create_missing`
    /// was applied when the program was compiled in [`Engine::new`].
    pub fn run(
        &mut self,
        options: &ExecuteOptions,
        progress: &mut dyn ProgressCallback,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut seen = self.runner.oplog().len();

        while !self.runner.is_ended() {
            if options.max_steps.is_some_and(|max| summary.steps >= max) {
                break;
            }
            if self.runner.is_polling() && !options.poll_interval.is_zero() {
                thread::sleep(options.poll_interval);
            }

            self.runner.step();
            summary.steps += 1;

            let polling = self.runner.is_polling();
            for record in &self.runner.oplog()[seen..] {
                if polling {
                    summary.polls += 1;
                    progress.on_poll(record);
                } else {
                    summary.add_record(record);
                    progress.on_operation(record);
                }
            }
            seen = self.runner.oplog().len();
        }

        summary.outcome = if self.error().is_some() {
            RunOutcome::Failed
        } else if self.runner.is_ended() {
            RunOutcome::Completed
        } else {
            RunOutcome::Paused
        };

        match summary.outcome {
            RunOutcome::Completed => log::info!(
                "Run completed in {} steps ({} changes)",
                summary.steps,
                summary.total_changes()
            ),
            RunOutcome::Failed => {
                if let Some(fault) = self.error() {
                    log::error!("Run failed after {} steps: {fault}", summary.steps);
                }
            }
            RunOutcome::Paused => log::debug!("Run paused after {} steps", summary.steps),
        }

        progress.on_finish(&summary);
        summary
    }
}
