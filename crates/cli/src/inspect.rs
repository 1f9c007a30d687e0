use portico_core::{DylibBackend, HostConfig};
use serde::Serialize;
use std::sync::Arc;
use tabled::{Table, Tabled};

#[derive(Tabled, Serialize)]
struct DefinitionRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Definition")]
    name: String,
    #[tabled(rename = "Module")]
    module: String,
}

#[derive(Tabled)]
struct RouteRow {
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Owner")]
    owner: String,
}

pub fn run(config: HostConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let application = portico_runtime::build_application(&config, Arc::new(DylibBackend))?;

    let definitions: Vec<DefinitionRow> = application
        .registry
        .iter()
        .enumerate()
        .map(|(i, d)| DefinitionRow {
            position: i + 1,
            name: d.name().to_string(),
            module: d.module_name().to_string(),
        })
        .collect();

    if json {
        let output = serde_json::json!({
            "pluginPath": config.plugin_path,
            "runtime": config.host_runtime.target().to_string(),
            "report": application.report,
            "definitions": definitions,
            "routes": application.routes(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let report = &application.report;
    println!("Plugin root:      {}", config.plugin_path.display());
    println!("Runtime:          {}", config.host_runtime.target());
    println!(
        "Archives:         {} extracted, {} without payload, {} failed",
        report.archives_extracted, report.packages_without_payload, report.archives_failed
    );
    println!(
        "Modules:          {} loaded, {} failed, {} without entry",
        report.modules_loaded, report.modules_failed, report.modules_without_entry
    );
    println!();
    println!("{}", Table::new(definitions));

    let routes: Vec<RouteRow> = application
        .routes()
        .iter()
        .map(|r| RouteRow {
            method: r.method.clone(),
            path: r.path.clone(),
            owner: r.owner.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    println!("{}", Table::new(routes));
    Ok(())
}
