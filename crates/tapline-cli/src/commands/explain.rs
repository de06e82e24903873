//! Optimization preview command.

use anyhow::Result;
use comfy_table::{Cell, Color};

use super::{Context, query_options};
use crate::QueryArgs;
use crate::output::{self, Format};

/// Run the explain command.
pub fn run(ctx: &Context, args: &QueryArgs) -> Result<()> {
    let server = ctx.server()?;
    let options = query_options(args)?;
    let explanation = server.executor().explain(&args.sql, &options)?;

    match Format::from(ctx.format) {
        Format::Json => output::print_json(&explanation, ctx.quiet)?,
        Format::Table => {
            if ctx.quiet {
                return Ok(());
            }
            let columns = explanation
                .schema
                .columns()
                .iter()
                .map(|c| format!("{} {}", c.name, c.logical_type))
                .collect::<Vec<_>>()
                .join(", ");
            output::print_key_value_table(
                &[
                    ("Service", explanation.service.clone()),
                    ("Step", explanation.step.clone()),
                    ("Columns", columns),
                ],
                Format::Table,
                false,
            )?;

            if explanation.optimizations.is_empty() {
                println!("No optimizations enabled");
                return Ok(());
            }
            let mut table = output::create_table();
            output::add_header(&mut table, &["Optimization", "Step", "Before", "After", "Errors"]);
            for preview in &explanation.optimizations {
                let (errors, color) = if preview.errors.is_empty() {
                    ("-".to_string(), Color::Green)
                } else {
                    (preview.errors.join("; "), Color::Red)
                };
                table.add_row(vec![
                    Cell::new(&preview.name).fg(color),
                    Cell::new(&preview.step),
                    Cell::new(&preview.before),
                    Cell::new(&preview.after),
                    Cell::new(errors),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
