//! Subroutine planning - decides which subroutines a resource needs and
//! generates their instruction bodies

use crate::error::CompileError;
use crate::instruction::{Instruction, Target};
use crate::representation::ResourceRef;
use crate::types::{Action, UpdateAction, deletable_name};
use serde_json::Value;

/// The four entry points the top-level driver calls for every resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Start,
    Check,
    Commit,
    Finish,
}

impl Step {
    pub const FORWARD: [Self; 2] = [Self::Start, Self::Check];
    pub const REVERSE: [Self; 2] = [Self::Commit, Self::Finish];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Check => "check",
            Self::Commit => "commit",
            Self::Finish => "finish",
        }
    }
}

/// Key under which a resource's subroutine for `step` is registered
pub fn subroutine_key(name: &str, step: &str) -> String {
    format!("{name}_{step}")
}

/// Every kind of subroutine body the compiler can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    Create,
    CheckCreate,
    CommitCreate,
    FinishCreate,
    Update,
    CheckUpdate,
    CommitUpdate,
    FinishUpdate,
    Delete,
    CheckDelete,
    CommitDelete,
    FinishDelete,
    Modify,
    ModifyCheck,
    Recreate,
    RecreateCheck,
    RecreateCommit,
    RecreateFinish,
    MissingCreate,
    MissingCreateCheck,
}

impl Routine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::CheckCreate => "check_create",
            Self::CommitCreate => "commit_create",
            Self::FinishCreate => "finish_create",
            Self::Update => "update",
            Self::CheckUpdate => "check_update",
            Self::CommitUpdate => "commit_update",
            Self::FinishUpdate => "finish_update",
            Self::Delete => "delete",
            Self::CheckDelete => "check_delete",
            Self::CommitDelete => "commit_delete",
            Self::FinishDelete => "finish_delete",
            Self::Modify => "modify",
            Self::ModifyCheck => "modify_check",
            Self::Recreate => "recreate",
            Self::RecreateCheck => "recreate_check",
            Self::RecreateCommit => "recreate_commit",
            Self::RecreateFinish => "recreate_finish",
            Self::MissingCreate => "missing_create",
            Self::MissingCreateCheck => "missing_create_check",
        }
    }

    /// Routine run by the driver for `action` at `step`
    pub fn for_step(action: Action, step: Step) -> Self {
        match (action, step) {
            (Action::Create, Step::Start) => Self::Create,
            (Action::Create, Step::Check) => Self::CheckCreate,
            (Action::Create, Step::Commit) => Self::CommitCreate,
            (Action::Create, Step::Finish) => Self::FinishCreate,
            (Action::Update, Step::Start) => Self::Update,
            (Action::Update, Step::Check) => Self::CheckUpdate,
            (Action::Update, Step::Commit) => Self::CommitUpdate,
            (Action::Update, Step::Finish) => Self::FinishUpdate,
            (Action::Delete, Step::Start) => Self::Delete,
            (Action::Delete, Step::Check) => Self::CheckDelete,
            (Action::Delete, Step::Commit) => Self::CommitDelete,
            (Action::Delete, Step::Finish) => Self::FinishDelete,
        }
    }
}

/// A labeled instruction body, wrapped in `clear` .. `return`
#[derive(Debug, Clone, PartialEq)]
pub struct Subroutine {
    label: String,
    inner: Vec<Instruction>,
}

impl Subroutine {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn body(&self) -> Vec<Instruction> {
        let mut body = Vec::with_capacity(self.inner.len() + 2);
        body.push(Instruction::Clear);
        body.extend(self.inner.iter().cloned());
        body.push(Instruction::Return);
        body
    }

    pub fn body_len(&self) -> usize {
        self.inner.len() + 2
    }

    pub fn call(&self) -> Instruction {
        Instruction::Call(self.label.clone())
    }
}

/// Generates the instruction bodies for one resource
pub struct SubroutineCompiler<'a> {
    resource: &'a ResourceRef,
    create_missing: bool,
}

impl<'a> SubroutineCompiler<'a> {
    pub fn new(resource: &'a ResourceRef, create_missing: bool) -> Self {
        Self {
            resource,
            create_missing,
        }
    }

    fn name(&self) -> &str {
        self.resource.name()
    }

    fn deferred(&self) -> bool {
        self.resource.desc().delete_at_end()
    }

    fn label(&self, routine: Routine) -> String {
        format!("{}_{}", routine.as_str(), self.name())
    }

    pub fn compile(&self, routine: Routine) -> Result<Subroutine, CompileError> {
        Ok(Subroutine {
            label: self.label(routine),
            inner: self.instructions(routine)?,
        })
    }

    fn instructions(&self, routine: Routine) -> Result<Vec<Instruction>, CompileError> {
        Ok(match routine {
            Routine::Create => self.create()?,
            Routine::CheckCreate | Routine::RecreateCheck | Routine::MissingCreateCheck => {
                self.check_create()
            }
            Routine::CommitCreate | Routine::FinishCreate => Vec::new(),
            Routine::Update => self.update(),
            Routine::CheckUpdate => self.check_update(),
            Routine::CommitUpdate => self.branch_on_recreate(Routine::RecreateCommit),
            Routine::FinishUpdate => self.branch_on_recreate(Routine::RecreateFinish),
            Routine::Delete => self.immediate_delete(Instruction::Delete),
            Routine::CheckDelete => self.immediate_delete(Instruction::CheckDelete),
            Routine::CommitDelete => self.deferred_delete(self.name(), Instruction::Delete),
            Routine::FinishDelete => self.deferred_delete(self.name(), Instruction::CheckDelete),
            Routine::Modify => self.modify(),
            Routine::ModifyCheck => self.with_resource(Instruction::CheckUpdate),
            Routine::Recreate => self.recreate()?,
            Routine::RecreateCommit => {
                self.deferred_delete(&deletable_name(self.name()), Instruction::Delete)
            }
            Routine::RecreateFinish => {
                self.deferred_delete(&deletable_name(self.name()), Instruction::CheckDelete)
            }
            Routine::MissingCreate => self.missing_create()?,
        })
    }

    fn load_as(&self, name: &str) -> Vec<Instruction> {
        vec![
            Instruction::Key("resource_name".into()),
            Instruction::Value(Value::from(name)),
            Instruction::Key("resource_desc".into()),
            Instruction::Value(Value::from(self.resource.type_id())),
        ]
    }

    fn load(&self) -> Vec<Instruction> {
        self.load_as(self.name())
    }

    fn with_resource(&self, op: Instruction) -> Vec<Instruction> {
        let mut out = self.load();
        out.push(op);
        out
    }

    fn with_properties(&self, op: Instruction) -> Vec<Instruction> {
        let mut out = self.load();
        out.push(Instruction::Key("properties".into()));
        out.push(Instruction::ValueRom(self.name().to_string()));
        out.push(op);
        out
    }

    /// `value_update X; compare <action>; goto_if <routine>_X`
    fn branch(&self, action: UpdateAction, routine: Routine) -> Vec<Instruction> {
        vec![
            Instruction::ValueUpdate(self.name().to_string()),
            Instruction::Compare(Value::from(action.as_str())),
            Instruction::GotoIf(Target::Label(self.label(routine))),
        ]
    }

    fn branch_on_recreate(&self, routine: Routine) -> Vec<Instruction> {
        self.branch(UpdateAction::Recreate, routine)
    }

    fn create(&self) -> Result<Vec<Instruction>, CompileError> {
        self.resource.check_required_fields()?;
        Ok(self.with_properties(Instruction::Create))
    }

    fn check_create(&self) -> Vec<Instruction> {
        self.with_resource(Instruction::CheckCreate)
    }

    fn update(&self) -> Vec<Instruction> {
        let mut out = Vec::new();
        if self.create_missing {
            out.extend(self.load());
            out.push(Instruction::CheckExist);
            out.push(Instruction::Invert);
            out.push(Instruction::GotoIf(Target::Label(
                self.label(Routine::MissingCreate),
            )));
        }
        out.extend(self.with_resource(Instruction::Read));
        out.extend(self.with_resource(Instruction::Rescmp));
        out.extend(self.branch(UpdateAction::Recreate, Routine::Recreate));
        out.extend(self.branch(UpdateAction::Modify, Routine::Modify));
        out
    }

    fn check_update(&self) -> Vec<Instruction> {
        let mut out = Vec::new();
        if self.create_missing {
            out.extend(self.branch(UpdateAction::Missing, Routine::MissingCreateCheck));
        }
        out.extend(self.branch(UpdateAction::Recreate, Routine::RecreateCheck));
        out.extend(self.branch(UpdateAction::Modify, Routine::ModifyCheck));
        out
    }

    fn modify(&self) -> Vec<Instruction> {
        self.with_properties(Instruction::Update)
    }

    fn recreate(&self) -> Result<Vec<Instruction>, CompileError> {
        let mut out = if self.deferred() {
            self.with_resource(Instruction::MarkDeletable)
        } else {
            let mut out = self.with_resource(Instruction::Delete);
            out.extend(self.with_resource(Instruction::CheckDelete));
            out
        };
        out.extend(self.create()?);
        Ok(out)
    }

    fn immediate_delete(&self, op: Instruction) -> Vec<Instruction> {
        if self.deferred() {
            return Vec::new();
        }
        self.with_resource(op)
    }

    fn deferred_delete(&self, name: &str, op: Instruction) -> Vec<Instruction> {
        if !self.deferred() {
            return Vec::new();
        }
        let mut out = self.load_as(name);
        out.push(op);
        out
    }

    fn memwrite(&self, superkey: &str, value: Value) -> Vec<Instruction> {
        vec![
            Instruction::Key("superkey".into()),
            Instruction::Value(Value::from(superkey)),
            Instruction::Key("key".into()),
            Instruction::Value(Value::from(self.name())),
            Instruction::Memwrite(value),
        ]
    }

    fn missing_create(&self) -> Result<Vec<Instruction>, CompileError> {
        let mut out = self.memwrite("update_action", Value::from(UpdateAction::Missing.as_str()));
        out.extend(self.memwrite("remote_ids", Value::Null));
        out.extend(self.create()?);
        Ok(out)
    }
}

/// Decides which subroutines one resource needs for its action
pub struct SubPlanner<'a> {
    resource: &'a ResourceRef,
    action: Action,
    create_missing: bool,
}

impl<'a> SubPlanner<'a> {
    pub fn new(resource: &'a ResourceRef, action: Action, create_missing: bool) -> Self {
        Self {
            resource,
            action,
            create_missing,
        }
    }

    fn extra_routines(&self) -> Vec<(&'static str, Routine)> {
        if self.action != Action::Update {
            return Vec::new();
        }

        let mut extra = vec![
            ("modify", Routine::Modify),
            ("modify_check", Routine::ModifyCheck),
            ("recreate", Routine::Recreate),
            ("recreate_check", Routine::RecreateCheck),
            ("recreate_commit", Routine::RecreateCommit),
            ("recreate_finish", Routine::RecreateFinish),
        ];
        if self.create_missing {
            extra.push(("missing_create", Routine::MissingCreate));
            extra.push(("missing_create_check", Routine::MissingCreateCheck));
        }
        extra
    }

    /// Subroutines keyed `<name>_<step>`, entry points first
    pub fn subroutines(&self) -> Result<Vec<(String, Subroutine)>, CompileError> {
        let compiler = SubroutineCompiler::new(self.resource, self.create_missing);
        let name = self.resource.name();

        let entry = [Step::Start, Step::Check, Step::Commit, Step::Finish]
            .into_iter()
            .map(|step| (step.as_str(), Routine::for_step(self.action, step)));

        entry
            .chain(self.extra_routines())
            .map(|(key, routine)| Ok((subroutine_key(name, key), compiler.compile(routine)?)))
            .collect()
    }
}
