//! `compile` - emit the program artifact for a plan

use anyhow::{Context as AnyhowContext, Result};
use declarative::Compiler;
use std::fs;

use crate::Context;
use crate::cli::CompileArgs;
use crate::commands::Loaded;
use crate::ui;

pub fn run(ctx: &Context, args: &CompileArgs) -> Result<()> {
    let loaded = Loaded::from_args(&args.plan)?;
    let declaration = loaded.plan.declare(&loaded.registry)?;

    let mut options = loaded.plan.engine.options();
    options.create_missing |= args.create_missing;

    let program = Compiler::new(&declaration, &loaded.state, &options)
        .compile()
        .context("Compilation failed")?;
    let rendered = serde_json::to_string_pretty(&program.to_artifact()?)?;

    match &args.output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("Could not write {}", path.display()))?;
            if !ctx.quiet {
                ui::success(&format!(
                    "Wrote {} instructions to {}",
                    program.len(),
                    path.display()
                ));
            }
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
