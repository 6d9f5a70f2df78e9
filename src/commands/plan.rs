//! `plan` - preview the action taken for every resource

use anyhow::Result;
use colored::Colorize;
use declarative::{Action, Compiler, ResourceRef};

use crate::Context;
use crate::cli::PlanArgs;
use crate::commands::Loaded;
use crate::ui;

/// One line of the preview
#[derive(Debug, PartialEq, Eq)]
pub struct PlannedAction {
    pub name: String,
    pub type_id: String,
    pub action: Action,
    pub deferred_delete: bool,
}

impl PlannedAction {
    fn new(resource: &ResourceRef, action: Action) -> Self {
        Self {
            name: resource.name().to_string(),
            type_id: resource.type_id().to_string(),
            action,
            deferred_delete: resource.desc().delete_at_end(),
        }
    }

    fn note(&self) -> Option<&'static str> {
        match (self.action, self.deferred_delete) {
            (Action::Delete, true) => Some("deleted after dependents finish"),
            (Action::Update, true) => Some("a replacement keeps the old one until the end"),
            (Action::Update, false) => Some("modified in place or recreated, decided at run time"),
            _ => None,
        }
    }
}

pub fn planned_actions(loaded: &Loaded) -> Result<Vec<PlannedAction>> {
    let declaration = loaded.plan.declare(&loaded.registry)?;
    let compiler = Compiler::new(&declaration, &loaded.state, &loaded.plan.engine.options());
    Ok(compiler
        .actions()?
        .iter()
        .map(|(resource, action)| PlannedAction::new(resource, *action))
        .collect())
}

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let loaded = Loaded::from_args(args)?;
    let planned = planned_actions(&loaded)?;

    if !ctx.quiet {
        ui::header("Plan");
    }
    for item in &planned {
        println!(
            "  {} {} {}",
            ui::action_marker(item.action),
            item.name.bold(),
            format!("({}, {})", item.type_id, item.action).dimmed()
        );
        if ctx.verbose > 0
            && let Some(note) = item.note()
        {
            ui::dim(note);
        }
    }

    let count = |action| planned.iter().filter(|p| p.action == action).count();
    if !ctx.quiet {
        println!();
        ui::info(&format!(
            "{} to create, {} to update, {} to delete",
            count(Action::Create),
            count(Action::Update),
            count(Action::Delete)
        ));
    }
    Ok(())
}
