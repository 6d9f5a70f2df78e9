//! Single-instruction executor
//!
//! [`Machine::execute`] runs exactly one instruction against a [`Memory`]
//! and reports how the program counter should move. The runner owns the
//! counter; the machine never touches it directly.

use crate::compiler::Program;
use crate::diff;
use crate::error::Fault;
use crate::instruction::{Instruction, Target};
use crate::memory::{Memory, STAGED_KEY};
use crate::registry::{ResourceType, ResourceTypeRegistry};
use crate::resource::{BoxedResource, ResourceDescExt};
use crate::types::{Properties, UpdateAction, deletable_name};
use serde_json::Value;

/// Scratch key holding the fields read back by `read`
pub const CURRENT_KEY: &str = "current";

/// How the program counter moves after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Advance to the next instruction
    Next,
    /// Continue at an absolute index
    Jump(usize),
    /// Run the same instruction again on the next step
    Stay,
}

/// The staged resource of a resource instruction
struct Staged<'m> {
    op: &'static str,
    name: String,
    ty: &'m ResourceType,
}

impl Staged<'_> {
    fn handle(&self, memory: &Memory) -> Result<BoxedResource, Fault> {
        self.ty.instantiate(memory.remote_id(&self.name))
    }

    fn fault(&self, err: &anyhow::Error) -> Fault {
        Fault::backend(self.op, &self.name, err)
    }
}

/// Executes instructions of one program against a registry
pub struct Machine<'a> {
    program: &'a Program,
    registry: &'a ResourceTypeRegistry,
}

impl<'a> Machine<'a> {
    pub fn new(program: &'a Program, registry: &'a ResourceTypeRegistry) -> Self {
        Self { program, registry }
    }

    pub fn execute(&self, instruction: &Instruction, memory: &mut Memory) -> Result<Flow, Fault> {
        let op = instruction.name();
        for key in instruction.required_keys() {
            memory.require(op, key)?;
        }

        match instruction {
            Instruction::Init => self.init(memory),
            Instruction::End => {
                memory.end = true;
                Ok(Flow::Next)
            }
            Instruction::Clear => {
                memory.temp.clear();
                Ok(Flow::Next)
            }
            Instruction::Return => {
                let caller = memory.call_stack.pop().ok_or(Fault::StackUnderflow)?;
                Ok(Flow::Jump(caller + 1))
            }
            Instruction::Invert => {
                let result = memory.result(op)?;
                memory.set_result(i64::from(result == 0));
                Ok(Flow::Next)
            }
            Instruction::Key(key) => {
                memory
                    .temp
                    .insert(STAGED_KEY.to_string(), Value::from(key.as_str()));
                Ok(Flow::Next)
            }
            Instruction::Value(value) => {
                let key = take_staged_key(memory)?;
                memory.temp.insert(key, value.clone());
                Ok(Flow::Next)
            }
            Instruction::ValueRom(address) => {
                let resolved = self.program.rom().resolve(address, memory)?;
                let key = take_staged_key(memory)?;
                memory.temp.insert(key, resolved);
                Ok(Flow::Next)
            }
            Instruction::ValueUpdate(name) => {
                let action = memory
                    .update_action
                    .get(name)
                    .ok_or_else(|| Fault::UpdateDecisionMissing(name.clone()))?;
                let mut temp = Properties::new();
                temp.insert("result".to_string(), Value::from(action.as_str()));
                memory.temp = temp;
                Ok(Flow::Next)
            }
            Instruction::Memwrite(value) => memwrite(memory, value),
            Instruction::Compare(expected) => {
                let equal = memory.temp.get("result") == Some(expected);
                memory.set_result(i64::from(equal));
                Ok(Flow::Next)
            }
            Instruction::Assert(name) => {
                if memory.result(op)? == 1 {
                    Ok(Flow::Next)
                } else {
                    Err(Fault::Assertion(name.clone()))
                }
            }
            Instruction::GotoIf(target) => {
                if memory.result(op)? == 0 {
                    return Ok(Flow::Next);
                }
                match target {
                    Target::Index(index) => Ok(Flow::Jump(*index)),
                    Target::Label(label) => Ok(Flow::Jump(self.program.label(label)?)),
                }
            }
            Instruction::Call(label) => {
                let address = self.program.label(label)?;
                memory.call_stack.push(memory.program_counter);
                Ok(Flow::Jump(address))
            }
            _ => self.resource_op(instruction, memory),
        }
    }

    fn init(&self, memory: &mut Memory) -> Result<Flow, Fault> {
        let init = &self.program.init;
        memory.remote_ids = init.remote_ids.clone();
        memory.outputs = init.outputs.clone();
        memory.deleted = init.deleted.clone();
        memory.update_action.clear();
        Ok(Flow::Next)
    }

    fn staged(&self, op: &'static str, memory: &Memory) -> Result<Staged<'a>, Fault> {
        let name = memory.require_str(op, "resource_name")?.to_string();
        let type_id = memory.require_str(op, "resource_desc")?;
        let ty = self.registry.resolve(type_id)?;
        Ok(Staged { op, name, ty })
    }

    fn resource_op(&self, instruction: &Instruction, memory: &mut Memory) -> Result<Flow, Fault> {
        let staged = self.staged(instruction.name(), memory)?;
        match instruction {
            Instruction::Create => self.create(&staged, memory),
            Instruction::Read => self.read(&staged, memory),
            Instruction::Update => self.update(&staged, memory),
            Instruction::Delete => {
                staged
                    .handle(memory)?
                    .delete()
                    .map_err(|e| staged.fault(&e))?;
                Ok(Flow::Next)
            }
            Instruction::CheckCreate => self.check_create_or_update(&staged, memory, true),
            Instruction::CheckUpdate => self.check_create_or_update(&staged, memory, false),
            Instruction::CheckDelete => self.check_delete(&staged, memory),
            Instruction::CheckExist => {
                let exists = if staged.ty.desc().needs_remote_id() {
                    staged
                        .handle(memory)?
                        .exists()
                        .map_err(|e| staged.fault(&e))?
                } else {
                    true
                };
                memory.set_result(i64::from(exists));
                Ok(Flow::Next)
            }
            Instruction::MarkDeletable => {
                let deletable = deletable_name(&staged.name);
                if memory.remote_id(&deletable).is_some() {
                    return Err(Fault::RemoteIdAlreadySet(deletable));
                }
                let remote_id = memory
                    .remote_ids
                    .shift_remove(&staged.name)
                    .unwrap_or(Value::Null);
                memory.remote_ids.insert(deletable, remote_id);
                Ok(Flow::Next)
            }
            Instruction::Filter => {
                let current = memory.require_object(staged.op, CURRENT_KEY)?;
                let desired = memory.require_object(staged.op, "properties")?;
                let filtered = diff::filter(staged.ty.desc().as_ref(), current, desired);
                memory
                    .temp
                    .insert("properties".to_string(), Value::Object(filtered));
                Ok(Flow::Next)
            }
            Instruction::Rescmp => self.rescmp(&staged, memory),
            other => Err(Fault::UnknownInstruction(other.name().to_string())),
        }
    }

    fn create(&self, staged: &Staged<'_>, memory: &mut Memory) -> Result<Flow, Fault> {
        let properties = memory.require_object(staged.op, "properties")?.clone();
        let needs_remote_id = staged.ty.desc().needs_remote_id();
        if needs_remote_id && memory.remote_id(&staged.name).is_some() {
            return Err(Fault::RemoteIdAlreadySet(staged.name.clone()));
        }

        let mut handle = staged.ty.instantiate(None)?;
        handle.create(&properties).map_err(|e| staged.fault(&e))?;

        let remote_id = handle.remote_id();
        if needs_remote_id && remote_id.is_none() {
            return Err(Fault::MissingRemoteId(staged.name.clone()));
        }
        memory
            .remote_ids
            .insert(staged.name.clone(), remote_id.unwrap_or(Value::Null));
        Ok(Flow::Next)
    }

    fn read(&self, staged: &Staged<'_>, memory: &mut Memory) -> Result<Flow, Fault> {
        let desc = staged.ty.desc();
        let fields = desc.readable_fields();
        let handle = staged.handle(memory)?;
        let results = handle.read(&fields).map_err(|e| staged.fault(&e))?;

        let current: Properties = fields
            .iter()
            .map(|field| {
                let value = results.get(field).cloned().unwrap_or(Value::Null);
                (field.clone(), value)
            })
            .collect();
        memory
            .temp
            .insert(CURRENT_KEY.to_string(), Value::Object(current));

        if !desc.output_fields().is_empty() {
            let outputs = handle.outputs().map_err(|e| staged.fault(&e))?;
            memory.outputs.insert(staged.name.clone(), outputs);
        }
        Ok(Flow::Next)
    }

    fn rescmp(&self, staged: &Staged<'_>, memory: &mut Memory) -> Result<Flow, Fault> {
        let desired = match self.program.rom().resolve(&staged.name, memory)? {
            Value::Object(map) => map,
            other => {
                return Err(Fault::invalid_operand(
                    staged.op,
                    format!("'{}' resolved to {other}, expected a map", staged.name),
                ));
            }
        };
        let current = memory.require_object(staged.op, CURRENT_KEY)?;
        let action = diff::compare(staged.ty.desc().as_ref(), current, &desired);
        log::debug!("{} compares as {action}", staged.name);
        memory.update_action.insert(staged.name.clone(), action);
        Ok(Flow::Next)
    }

    fn update(&self, staged: &Staged<'_>, memory: &mut Memory) -> Result<Flow, Fault> {
        let desc = staged.ty.desc();
        let properties = memory.require_object(staged.op, "properties")?;
        let mut handle = staged.handle(memory)?;

        let staged_immutable: Vec<String> = desc
            .immutable_fields()
            .iter()
            .filter(|field| properties.contains_key(*field))
            .cloned()
            .collect();
        if !staged_immutable.is_empty() {
            let current = handle
                .read(&staged_immutable)
                .map_err(|e| staged.fault(&e))?;
            let changed = diff::changed_immutable_fields(desc.as_ref(), &current, properties);
            if !changed.is_empty() {
                return Err(Fault::ImmutableFieldChanged {
                    resource: staged.name.clone(),
                    fields: changed,
                });
            }
        }

        let mutable: Properties = properties
            .iter()
            .filter(|(field, _)| desc.mutable_fields().contains(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        handle.update(&mutable).map_err(|e| staged.fault(&e))?;
        Ok(Flow::Next)
    }

    fn check_create_or_update(
        &self,
        staged: &Staged<'_>,
        memory: &mut Memory,
        create: bool,
    ) -> Result<Flow, Fault> {
        let handle = staged.handle(memory)?;
        let complete = if create {
            handle.create_complete()
        } else {
            handle.update_complete()
        }
        .map_err(|e| staged.fault(&e))?;

        if !complete {
            log::trace!("{} on '{}' not complete yet", staged.op, staged.name);
            return Ok(Flow::Stay);
        }

        let outputs = handle.outputs().map_err(|e| staged.fault(&e))?;
        memory.outputs.insert(staged.name.clone(), outputs);
        Ok(Flow::Next)
    }

    fn check_delete(&self, staged: &Staged<'_>, memory: &mut Memory) -> Result<Flow, Fault> {
        let complete = staged
            .handle(memory)?
            .delete_complete()
            .map_err(|e| staged.fault(&e))?;

        if !complete {
            log::trace!("delete of '{}' not complete yet", staged.name);
            return Ok(Flow::Stay);
        }

        memory.deleted.push(staged.name.clone());
        memory.remote_ids.shift_remove(&staged.name);
        memory.outputs.shift_remove(&staged.name);
        Ok(Flow::Next)
    }
}

fn take_staged_key(memory: &mut Memory) -> Result<String, Fault> {
    match memory.temp.remove(STAGED_KEY) {
        Some(Value::String(key)) => Ok(key),
        Some(other) => Err(Fault::invalid_operand(
            "value",
            format!("staged key {other} is not a string"),
        )),
        None => Err(Fault::NoKeySet),
    }
}

/// `memory[superkey][key] = value`
///
/// Only the keyed maps are writable: `remote_ids`, `outputs` and
/// `update_action`. `deleted` grows through `check_delete` alone.
fn memwrite(memory: &mut Memory, value: &Value) -> Result<Flow, Fault> {
    let superkey = memory.require_str("memwrite", "superkey")?.to_string();
    let key = memory.require_str("memwrite", "key")?.to_string();

    match superkey.as_str() {
        "remote_ids" => {
            if value.is_null() {
                memory.remote_ids.shift_remove(&key);
            } else {
                memory.remote_ids.insert(key, value.clone());
            }
        }
        "outputs" => match value {
            Value::Null => {
                memory.outputs.shift_remove(&key);
            }
            Value::Object(map) => {
                memory.outputs.insert(key, map.clone());
            }
            other => {
                return Err(Fault::invalid_operand(
                    "memwrite",
                    format!("outputs must be a map, got {other}"),
                ));
            }
        },
        "update_action" => {
            let action = value
                .as_str()
                .and_then(UpdateAction::parse)
                .ok_or_else(|| {
                    Fault::invalid_operand("memwrite", format!("bad update action {value}"))
                })?;
            memory.update_action.insert(key, action);
        }
        other => {
            return Err(Fault::invalid_operand(
                "memwrite",
                format!("cannot write into '{other}'"),
            ));
        }
    }
    Ok(Flow::Next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::Rom;
    use crate::representation::resolve;
    use crate::resource::ResourceSchema;
    use crate::testing::TestEnv;
    use serde_json::json;

    fn program_with(rom: Rom, labels: &[(&str, usize)]) -> Program {
        let mut program = Program::default();
        program.init.rom = rom;
        program.init.labels = labels.iter().map(|(l, i)| (l.to_string(), *i)).collect();
        program
    }

    fn stage(memory: &mut Memory, name: &str, type_id: &str) {
        memory.temp.insert("resource_name".into(), json!(name));
        memory.temp.insert("resource_desc".into(), json!(type_id));
    }

    #[test]
    fn test_key_value_binds_scratch() {
        let program = Program::default();
        let registry = ResourceTypeRegistry::new();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();

        assert_eq!(
            machine.execute(&Instruction::Value(json!(1)), &mut memory),
            Err(Fault::NoKeySet)
        );
        machine
            .execute(&Instruction::Key("thing".into()), &mut memory)
            .unwrap();
        machine
            .execute(&Instruction::Value(json!("x")), &mut memory)
            .unwrap();
        assert_eq!(memory.temp.get("thing"), Some(&json!("x")));
        assert!(!memory.temp.contains_key(STAGED_KEY));
    }

    #[test]
    fn test_value_rom_resolves_address() {
        let mut rom = Rom::new();
        rom.add_resource("f", &resolve(json!({"name": "a.txt"}).into()).unwrap())
            .unwrap();
        let program = program_with(rom, &[]);
        let registry = ResourceTypeRegistry::new();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();

        machine
            .execute(&Instruction::Key("properties".into()), &mut memory)
            .unwrap();
        machine
            .execute(&Instruction::ValueRom("f".into()), &mut memory)
            .unwrap();
        assert_eq!(memory.temp["properties"], json!({"name": "a.txt"}));

        machine
            .execute(&Instruction::Key("properties".into()), &mut memory)
            .unwrap();
        assert_eq!(
            machine.execute(&Instruction::ValueRom("g".into()), &mut memory),
            Err(Fault::NoSuchRomAddress("g".into()))
        );
    }

    #[test]
    fn test_control_flow() {
        let program = program_with(Rom::new(), &[("sub", 10)]);
        let registry = ResourceTypeRegistry::new();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();
        memory.program_counter = 3;

        assert_eq!(
            machine.execute(&Instruction::Call("sub".into()), &mut memory),
            Ok(Flow::Jump(10))
        );
        assert_eq!(memory.call_stack, vec![3]);
        assert_eq!(
            machine.execute(&Instruction::Return, &mut memory),
            Ok(Flow::Jump(4))
        );
        assert_eq!(
            machine.execute(&Instruction::Return, &mut memory),
            Err(Fault::StackUnderflow)
        );
        assert_eq!(
            machine.execute(&Instruction::Call("nowhere".into()), &mut memory),
            Err(Fault::LabelNotFound("nowhere".into()))
        );

        memory.set_result(0);
        assert_eq!(
            machine.execute(&Instruction::GotoIf(Target::Label("sub".into())), &mut memory),
            Ok(Flow::Next)
        );
        machine.execute(&Instruction::Invert, &mut memory).unwrap();
        assert_eq!(
            machine.execute(&Instruction::GotoIf(Target::Index(7)), &mut memory),
            Ok(Flow::Jump(7))
        );
        assert_eq!(
            machine.execute(&Instruction::Assert("still_there".into()), &mut memory),
            Ok(Flow::Next)
        );
        memory.set_result(0);
        assert_eq!(
            machine.execute(&Instruction::Assert("still_there".into()), &mut memory),
            Err(Fault::Assertion("still_there".into()))
        );
    }

    #[test]
    fn test_value_update_and_compare() {
        let program = Program::default();
        let registry = ResourceTypeRegistry::new();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();
        memory.temp.insert("resource_name".into(), json!("f"));

        assert_eq!(
            machine.execute(&Instruction::ValueUpdate("f".into()), &mut memory),
            Err(Fault::UpdateDecisionMissing("f".into()))
        );

        memory.update_action.insert("f".into(), UpdateAction::Recreate);
        machine
            .execute(&Instruction::ValueUpdate("f".into()), &mut memory)
            .unwrap();
        assert!(!memory.temp.contains_key("resource_name"));

        machine
            .execute(&Instruction::Compare(json!("modify")), &mut memory)
            .unwrap();
        assert_eq!(memory.result("compare").unwrap(), 0);

        machine
            .execute(&Instruction::ValueUpdate("f".into()), &mut memory)
            .unwrap();
        machine
            .execute(&Instruction::Compare(json!("recreate")), &mut memory)
            .unwrap();
        assert_eq!(memory.result("compare").unwrap(), 1);
    }

    #[test]
    fn test_memwrite() {
        let program = Program::default();
        let registry = ResourceTypeRegistry::new();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();
        memory.remote_ids.insert("serv".into(), json!("server0"));

        assert!(matches!(
            machine.execute(&Instruction::Memwrite(json!("missing")), &mut memory),
            Err(Fault::MissingParameter { .. })
        ));

        memory.temp.insert("superkey".into(), json!("update_action"));
        memory.temp.insert("key".into(), json!("serv"));
        machine
            .execute(&Instruction::Memwrite(json!("missing")), &mut memory)
            .unwrap();
        assert_eq!(memory.update_action["serv"], UpdateAction::Missing);

        memory.temp.insert("superkey".into(), json!("remote_ids"));
        machine
            .execute(&Instruction::Memwrite(Value::Null), &mut memory)
            .unwrap();
        assert!(memory.remote_ids.is_empty());

        memory.temp.insert("superkey".into(), json!("rom"));
        assert!(matches!(
            machine.execute(&Instruction::Memwrite(json!(1)), &mut memory),
            Err(Fault::InvalidOperand { .. })
        ));

        memory.temp.insert("superkey".into(), json!("deleted"));
        assert!(matches!(
            machine.execute(&Instruction::Memwrite(json!("serv")), &mut memory),
            Err(Fault::InvalidOperand { .. })
        ));
        assert!(memory.deleted.is_empty());
    }

    #[test]
    fn test_resource_op_requires_staging() {
        let env = TestEnv::new();
        let registry = env.registry();
        let program = Program::default();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();

        memory.temp.insert("resource_name".into(), json!("f"));
        assert_eq!(
            machine.execute(&Instruction::Create, &mut memory),
            Err(Fault::MissingParameter {
                instruction: "create".into(),
                key: "resource_desc".into()
            })
        );
        memory.temp.insert("resource_desc".into(), json!("file"));
        assert_eq!(
            machine.execute(&Instruction::Create, &mut memory),
            Err(Fault::MissingParameter {
                instruction: "create".into(),
                key: "properties".into()
            })
        );
        assert!(env.files().is_empty());

        stage(&mut memory, "f", "bucket");
        assert_eq!(
            machine.execute(&Instruction::Delete, &mut memory),
            Err(Fault::UnknownResourceType("bucket".into()))
        );
    }

    #[test]
    fn test_create_then_check_create_stores_outputs() {
        let env = TestEnv::new();
        env.set_clock("2011-01-01 00:00:00 UTC");
        let registry = env.registry();
        let program = Program::default();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();

        stage(&mut memory, "f", "file");
        memory
            .temp
            .insert("properties".into(), json!({"name": "f.txt", "contents": "123"}));
        machine.execute(&Instruction::Create, &mut memory).unwrap();
        assert_eq!(memory.remote_ids["f"], json!("f.txt"));

        assert_eq!(
            machine.execute(&Instruction::CheckCreate, &mut memory),
            Ok(Flow::Next)
        );
        assert_eq!(
            memory.outputs["f"]["created_at"],
            json!("2011-01-01 00:00:00 UTC")
        );
    }

    #[test]
    fn test_check_create_polls_until_complete() {
        let env = TestEnv::new();
        env.set_pending_polls(2);
        let registry = env.registry();
        let program = Program::default();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();

        stage(&mut memory, "serv", "server");
        memory.temp.insert("properties".into(), json!({"size": "B"}));
        machine.execute(&Instruction::Create, &mut memory).unwrap();

        assert_eq!(machine.execute(&Instruction::CheckCreate, &mut memory), Ok(Flow::Stay));
        assert_eq!(machine.execute(&Instruction::CheckCreate, &mut memory), Ok(Flow::Stay));
        assert_eq!(machine.execute(&Instruction::CheckCreate, &mut memory), Ok(Flow::Next));
    }

    #[test]
    fn test_create_refuses_tracked_remote_id() {
        let env = TestEnv::new();
        let registry = env.registry();
        let program = Program::default();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();
        memory.remote_ids.insert("serv".into(), json!("server0"));

        stage(&mut memory, "serv", "server");
        memory.temp.insert("properties".into(), json!({"size": "B"}));
        assert_eq!(
            machine.execute(&Instruction::Create, &mut memory),
            Err(Fault::RemoteIdAlreadySet("serv".into()))
        );
        assert!(env.servers().is_empty());
    }

    #[test]
    fn test_read_and_rescmp() {
        let env = TestEnv::new();
        env.add_file("ddd.txt", "asd", "2010-01-01 00:00:00 UTC");
        let registry = env.registry();

        let mut rom = Rom::new();
        rom.add_resource(
            "file",
            &resolve(json!({"name": "ddd.txt", "contents": "123"}).into()).unwrap(),
        )
        .unwrap();
        let program = program_with(rom, &[]);
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();
        memory.remote_ids.insert("file".into(), json!("ddd.txt"));

        stage(&mut memory, "file", "file");
        machine.execute(&Instruction::Read, &mut memory).unwrap();
        assert_eq!(
            memory.temp[CURRENT_KEY],
            json!({"name": "ddd.txt", "contents": "asd"})
        );
        assert_eq!(
            memory.outputs["file"]["created_at"],
            json!("2010-01-01 00:00:00 UTC")
        );

        machine.execute(&Instruction::Rescmp, &mut memory).unwrap();
        assert_eq!(memory.update_action["file"], UpdateAction::Modify);
    }

    #[test]
    fn test_update_rejects_immutable_change() {
        let env = TestEnv::new();
        env.add_file("ddd.txt", "asd", "2010-01-01 00:00:00 UTC");
        let registry = env.registry();
        let program = Program::default();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();
        memory.remote_ids.insert("file".into(), json!("ddd.txt"));

        stage(&mut memory, "file", "file");
        memory
            .temp
            .insert("properties".into(), json!({"name": "other.txt", "contents": "1"}));
        assert_eq!(
            machine.execute(&Instruction::Update, &mut memory),
            Err(Fault::ImmutableFieldChanged {
                resource: "file".into(),
                fields: vec!["name".into()]
            })
        );

        memory
            .temp
            .insert("properties".into(), json!({"name": "ddd.txt", "contents": "1"}));
        machine.execute(&Instruction::Update, &mut memory).unwrap();
        assert_eq!(env.files()["ddd.txt"]["contents"], json!("1"));
    }

    #[test]
    fn test_mark_deletable_and_check_delete() {
        let env = TestEnv::new();
        let registry = env.registry();
        let program = Program::default();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();
        memory.remote_ids.insert("serv".into(), json!("server0"));

        stage(&mut memory, "serv", "server");
        machine
            .execute(&Instruction::MarkDeletable, &mut memory)
            .unwrap();
        assert!(!memory.remote_ids.contains_key("serv"));
        assert_eq!(memory.remote_ids["_deletable_serv"], json!("server0"));

        stage(&mut memory, "_deletable_serv", "server");
        machine.execute(&Instruction::CheckDelete, &mut memory).unwrap();
        assert!(memory.remote_ids.is_empty());
        assert_eq!(memory.deleted, vec!["_deletable_serv"]);
    }

    #[test]
    fn test_mark_deletable_refuses_to_overwrite() {
        let env = TestEnv::new();
        let registry = env.registry();
        let program = Program::default();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();
        memory.remote_ids.insert("_deletable_serv".into(), json!("server0"));
        memory.remote_ids.insert("serv".into(), json!("server1"));

        stage(&mut memory, "serv", "server");
        assert_eq!(
            machine.execute(&Instruction::MarkDeletable, &mut memory),
            Err(Fault::RemoteIdAlreadySet("_deletable_serv".into()))
        );
        assert_eq!(memory.remote_ids["_deletable_serv"], json!("server0"));
        assert_eq!(memory.remote_ids["serv"], json!("server1"));

        memory.remote_ids.insert("_deletable_serv".into(), Value::Null);
        machine
            .execute(&Instruction::MarkDeletable, &mut memory)
            .unwrap();
        assert_eq!(memory.remote_ids["_deletable_serv"], json!("server1"));
    }

    #[test]
    fn test_check_exist() {
        let env = TestEnv::new();
        let registry = env.registry();
        let program = Program::default();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();
        memory.remote_ids.insert("serv".into(), json!("server3"));

        stage(&mut memory, "serv", "server");
        machine.execute(&Instruction::CheckExist, &mut memory).unwrap();
        assert_eq!(memory.result("check_exist").unwrap(), 0);

        stage(&mut memory, "f", "file");
        machine.execute(&Instruction::CheckExist, &mut memory).unwrap();
        assert_eq!(memory.result("check_exist").unwrap(), 1);
    }

    #[test]
    fn test_filter_drops_unchanged_immutable() {
        let registry = {
            let mut registry = ResourceTypeRegistry::new();
            registry.register_descriptor(
                "file",
                ResourceSchema::new().mutable(["contents"]).immutable(["name"]),
            );
            registry
        };
        let program = Program::default();
        let machine = Machine::new(&program, &registry);
        let mut memory = Memory::new();

        stage(&mut memory, "f", "file");
        memory
            .temp
            .insert(CURRENT_KEY.into(), json!({"name": "a", "contents": "x"}));
        memory
            .temp
            .insert("properties".into(), json!({"name": "a", "contents": "y"}));
        machine.execute(&Instruction::Filter, &mut memory).unwrap();
        assert_eq!(memory.temp["properties"], json!({"contents": "y"}));
    }
}
