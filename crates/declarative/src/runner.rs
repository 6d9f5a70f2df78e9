//! Step-wise interpreter
//!
//! A [`Runner`] owns the memory of one run and executes exactly one
//! instruction per [`Runner::step`]. Faults are caught into
//! `memory.error`; nothing is rolled back.

use crate::compiler::Program;
use crate::machine::{Flow, Machine};
use crate::memory::Memory;
use crate::registry::ResourceTypeRegistry;
use crate::types::{OperationRecord, RunState};
use serde_json::Value;

pub struct Runner {
    program: Program,
    registry: ResourceTypeRegistry,
    memory: Memory,
    oplog: Vec<OperationRecord>,
    polling: bool,
}

impl Runner {
    pub fn new(program: Program, registry: ResourceTypeRegistry) -> Self {
        Self {
            program,
            registry,
            memory: Memory::new(),
            oplog: Vec::new(),
            polling: false,
        }
    }

    /// Build a runner from a JSON artifact
    ///
    /// An undecodable artifact yields a runner that has already ended with
    /// the decode fault in `memory.error`.
    pub fn from_artifact(artifact: &Value, registry: ResourceTypeRegistry) -> Self {
        match Program::from_artifact(artifact) {
            Ok(program) => Self::new(program, registry),
            Err(fault) => {
                log::warn!("Rejected program artifact: {fault}");
                let mut runner = Self::new(Program::default(), registry);
                runner.memory.error = Some(fault);
                runner
            }
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Replace the memory, e.g. with a checkpoint of a paused run
    pub fn restore(&mut self, memory: Memory) {
        self.memory = memory;
        self.polling = false;
    }

    pub fn oplog(&self) -> &[OperationRecord] {
        &self.oplog
    }

    /// Whether the last step left a `check_*` instruction waiting
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn is_ended(&self) -> bool {
        self.memory.is_halted(self.program.len())
    }

    pub fn state(&self) -> RunState {
        if self.is_ended() {
            RunState::Ended
        } else {
            RunState::Running
        }
    }

    /// Execute one instruction
    pub fn step(&mut self) -> RunState {
        if self.is_ended() {
            return RunState::Ended;
        }

        let pc = self.memory.program_counter;
        let Some(instruction) = self.program.instructions.get(pc) else {
            return RunState::Ended;
        };

        if instruction.is_resource_op() {
            let resource = self
                .memory
                .temp
                .get("resource_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let record = OperationRecord::new(instruction.name().to_uppercase(), resource);
            log::info!("{} {}", record.operation, record.resource);
            self.oplog.push(record);
        }

        log::debug!("[{pc}] {instruction}");
        let machine = Machine::new(&self.program, &self.registry);
        self.polling = false;
        match machine.execute(instruction, &mut self.memory) {
            Ok(Flow::Next) => self.memory.program_counter = pc + 1,
            Ok(Flow::Jump(target)) => self.memory.program_counter = target,
            Ok(Flow::Stay) => self.polling = true,
            Err(fault) => {
                log::warn!("Halted at instruction {pc} ({}): {fault}", instruction.name());
                self.memory.error = Some(fault);
            }
        }

        self.state()
    }

    /// Step until the program ends
    pub fn run_to_end(&mut self) {
        while self.step() == RunState::Running {}
    }
}
