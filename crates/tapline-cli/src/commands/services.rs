//! Service listing command.

use anyhow::Result;
use comfy_table::{Cell, Color};
use serde::Serialize;

use super::Context;
use crate::output::{self, Format};

/// One catalog entry.
#[derive(Serialize)]
struct ServiceOutput {
    name: String,
    step: String,
    steps: Vec<String>,
    optimizations: Vec<String>,
    streaming: bool,
}

/// Run the services command.
pub fn run(ctx: &Context) -> Result<()> {
    let server = ctx.server()?;
    let registry = server.executor().registry();
    let services: Vec<ServiceOutput> = server
        .service_names()
        .iter()
        .filter_map(|name| registry.get(name))
        .map(|service| ServiceOutput {
            name: service.name.clone(),
            step: service.step_name.clone(),
            steps: service.pipeline.steps.iter().map(|s| s.name.clone()).collect(),
            optimizations: service
                .optimizations
                .iter()
                .filter(|o| o.enabled)
                .map(|o| format!("{} ({})", o.name, o.kind.type_name()))
                .collect(),
            streaming: service.streaming,
        })
        .collect();

    match Format::from(ctx.format) {
        Format::Json => output::print_json(&services, ctx.quiet)?,
        Format::Table => {
            if ctx.quiet {
                return Ok(());
            }
            let mut table = output::create_table();
            output::add_header(&mut table, &["Service", "Step", "Pipeline", "Optimizations", "Streaming"]);
            for service in &services {
                table.add_row(vec![
                    Cell::new(&service.name).fg(Color::Green),
                    Cell::new(&service.step),
                    Cell::new(service.steps.join(" → ")),
                    Cell::new(if service.optimizations.is_empty() {
                        "-".to_string()
                    } else {
                        service.optimizations.join(", ")
                    }),
                    Cell::new(service.streaming),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
