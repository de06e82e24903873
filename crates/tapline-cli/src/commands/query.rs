//! Query command.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value as Json;

use super::{Context, query_options};
use crate::QueryArgs;
use crate::output::{self, Format};

/// Query result output.
#[derive(Serialize)]
struct QueryOutput {
    service: String,
    columns: Vec<String>,
    rows: Vec<Json>,
    row_count: usize,
    truncated: bool,
    from_cache: bool,
}

/// Run the query command.
pub fn run(ctx: &Context, args: &QueryArgs) -> Result<()> {
    let server = ctx.server()?;
    let options = query_options(args)?;
    let mut stream = server.executor().execute_with_options(&args.sql, &options)?;
    let schema = stream.schema().clone();
    let rows = stream.by_ref().collect::<Result<Vec<_>, _>>()?;
    let truncated = stream.truncated();
    let from_cache = stream.from_cache();
    let service = stream.service_name().to_string();
    drop(stream);

    match Format::from(ctx.format) {
        Format::Json => {
            let out = QueryOutput {
                service,
                columns: schema.names().into_iter().map(str::to_string).collect(),
                rows: output::rows_json(&schema, &rows),
                row_count: rows.len(),
                truncated,
                from_cache,
            };
            output::print_json(&out, ctx.quiet)?;
        }
        Format::Table => {
            if !ctx.quiet {
                println!("{}", output::rows_table(&schema, &rows));
            }
            let mut summary = format!("{} row(s) from '{service}'", rows.len());
            if from_cache {
                summary.push_str(", served from cache");
            }
            if truncated {
                summary.push_str(", truncated by the row or time limit");
            }
            output::status(&summary, ctx.quiet);
        }
    }
    Ok(())
}
