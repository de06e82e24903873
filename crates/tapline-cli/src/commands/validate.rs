//! Catalog validation command.

use anyhow::{Result, bail};
use comfy_table::{Cell, Color};
use serde::Serialize;
use tapline_engine::ServiceCatalog;

use super::Context;
use crate::output::{self, Format};

/// Validation result output.
#[derive(Serialize)]
struct ValidationOutput {
    valid: bool,
    service_count: usize,
    problems: Vec<ProblemOutput>,
}

/// One problem, attributed to its service.
#[derive(Serialize)]
struct ProblemOutput {
    service: String,
    message: String,
}

/// Run the validate command.
pub fn run(ctx: &Context) -> Result<()> {
    // The configuration is checked too, so a broken file fails here rather
    // than on the first query.
    let config = ctx.config()?;
    let mut problems: Vec<ProblemOutput> = match config.validate() {
        Ok(()) => Vec::new(),
        Err(e) => vec![ProblemOutput {
            service: "-".to_string(),
            message: e.to_string(),
        }],
    };

    let catalog = ServiceCatalog::load(&ctx.catalog)?;
    problems.extend(catalog.validate().into_iter().map(|problem| {
        match problem.split_once(": ") {
            Some((service, message)) => ProblemOutput {
                service: service.to_string(),
                message: message.to_string(),
            },
            None => ProblemOutput {
                service: "-".to_string(),
                message: problem,
            },
        }
    }));

    let output = ValidationOutput {
        valid: problems.is_empty(),
        service_count: catalog.services.len(),
        problems,
    };

    match Format::from(ctx.format) {
        Format::Json => output::print_json(&output, ctx.quiet)?,
        Format::Table => {
            if output.valid {
                output::success(
                    &format!("Catalog is valid ({} services)", output.service_count),
                    ctx.quiet,
                );
            } else if !ctx.quiet {
                let mut table = output::create_table();
                output::add_header(&mut table, &["Service", "Problem"]);
                for problem in &output.problems {
                    table.add_row(vec![
                        Cell::new(&problem.service).fg(Color::Red),
                        Cell::new(&problem.message),
                    ]);
                }
                println!("{table}");
            }
        }
    }

    if !output.valid {
        output::error(&format!("{} problem(s) found", output.problems.len()));
        bail!("catalog {} is invalid", ctx.catalog.display());
    }
    Ok(())
}
