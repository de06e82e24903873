//! Binary result stream command.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context as _, Result};

use super::{Context, query_options};
use crate::QueryArgs;
use crate::output;

/// Run the stream command.
pub fn run(ctx: &Context, args: &QueryArgs, target: Option<&Path>) -> Result<()> {
    let server = ctx.server()?;
    let options = query_options(args)?;

    let rows = match target {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let (mut writer, rows) = server.stream(&args.sql, &options, BufWriter::new(file))?;
            writer.flush()?;
            rows
        }
        None => {
            let stdout = std::io::stdout();
            let (mut writer, rows) = server.stream(&args.sql, &options, BufWriter::new(stdout.lock()))?;
            writer.flush()?;
            rows
        }
    };

    let destination = target.map_or_else(|| "standard output".to_string(), |p| p.display().to_string());
    output::status(&format!("{rows} row(s) written to {destination}"), ctx.quiet);
    Ok(())
}
