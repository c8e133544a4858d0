//! `flowline validate`.

use std::path::Path;

use anyhow::Result;
use console::style;
use flowline_core::workflow::definition::{load_workflow_file, validate_workflow};
use flowline_types::config::EngineConfig;
use serde_json::json;

pub fn handle_validate(file: &Path, config: &EngineConfig, json: bool) -> Result<()> {
    let checked = load_workflow_file(file).and_then(|wf| {
        validate_workflow(&wf, config)?;
        Ok(wf)
    });

    match checked {
        Ok(workflow) => {
            if json {
                let out = json!({
                    "valid": true,
                    "file": file.display().to_string(),
                    "name": workflow.name,
                    "actions": workflow.actions.len(),
                    "conditions": workflow.conditions.len(),
                    "triggers": workflow.triggers.len(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!(
                    "  {} '{}' is valid",
                    style("*").green().bold(),
                    style(&workflow.name).cyan()
                );
                println!(
                    "  {} action(s), {} condition(s), {} trigger(s)",
                    workflow.actions.len(),
                    workflow.conditions.len(),
                    workflow.triggers.len()
                );
                println!();
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let out = json!({
                    "valid": false,
                    "file": file.display().to_string(),
                    "error": e.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!("  {} {}", style("x").red().bold(), file.display());
                println!("  {e}");
                println!();
            }
            anyhow::bail!("{} is not a valid workflow", file.display())
        }
    }
}
