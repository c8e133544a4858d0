//! `flowline catalog`: what a definition can reference.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::json;

use crate::state::Engine;

pub fn handle_catalog(engine: &Engine, json: bool) -> Result<()> {
    let actions = engine.executor().actions();
    let conditions = engine.conditions().handlers();
    let triggers = engine.triggers().handlers();

    if json {
        let out = json!({
            "actions": actions.iter().map(|a| json!({
                "type": a.identifier(),
                "name": a.name(),
                "description": a.description(),
                "async": a.supports_async(),
                "timeout_secs": a.timeout_secs(),
                "config": a.config_schema(),
                "outputs": a.output_keys(),
            })).collect::<Vec<_>>(),
            "conditions": conditions.iter().map(|c| json!({
                "type": c.identifier(),
                "name": c.name(),
                "operators": c.operators(),
            })).collect::<Vec<_>>(),
            "triggers": triggers.iter().map(|t| json!({
                "type": t.identifier(),
                "name": t.name(),
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Action").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Async"),
            Cell::new("Description"),
        ]);
    for action in &actions {
        let queueable = if action.supports_async() {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(action.identifier()),
            Cell::new(action.name()),
            queueable,
            Cell::new(action.description()),
        ]);
    }
    println!();
    println!("{table}");

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Condition").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Operators"),
        ]);
    for condition in &conditions {
        table.add_row(vec![
            Cell::new(condition.identifier()),
            Cell::new(condition.name()),
            Cell::new(condition.operators().join(", ")),
        ]);
    }
    println!();
    println!("{table}");

    println!();
    let names: Vec<String> = triggers
        .iter()
        .map(|t| style(t.identifier()).cyan().to_string())
        .collect();
    println!("  Triggers: {}", names.join(", "));
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use flowline_types::config::EngineConfig;

    #[test]
    fn catalog_includes_log_action() {
        let state = AppState::init(EngineConfig::default());
        assert!(state.engine.executor().has("log"));
        assert!(state.engine.executor().has("set_variable"));
        assert!(handle_catalog(&state.engine, true).is_ok());
    }
}
