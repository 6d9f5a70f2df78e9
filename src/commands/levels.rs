//! `levels` - show the dependency levels of a plan

use anyhow::Result;
use colored::Colorize;
use declarative::Compiler;

use crate::Context;
use crate::cli::PlanArgs;
use crate::commands::Loaded;
use crate::ui;

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let loaded = Loaded::from_args(args)?;
    let declaration = loaded.plan.declare(&loaded.registry)?;
    let compiler = Compiler::new(&declaration, &loaded.state, &loaded.plan.engine.options());
    let levels = compiler.levels()?;

    if !ctx.quiet {
        ui::header(&format!("Dependency levels ({})", ui::plural(levels.len(), "level")));
    }
    for (index, level) in levels.iter().enumerate() {
        println!("  {} {}", format!("{index}:").cyan().bold(), level.join(", "));
    }

    if ctx.verbose > 0 {
        let graph = compiler.dependency_graph();
        ui::section("Edges");
        for name in graph.nodes() {
            let deps = graph
                .dependencies(name)
                .map(|deps| deps.iter().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            ui::kv(name, if deps.is_empty() { "-" } else { deps.as_str() });
        }
    }
    Ok(())
}
