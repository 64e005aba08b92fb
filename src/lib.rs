pub mod cli;
pub mod compare;
pub mod data;
pub mod engine;
pub mod error;
pub mod io_utils;
pub mod join;
pub mod key;
pub mod mismatch;
pub mod partition;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod result;
pub mod schema;
pub mod source;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, InputArgs, OutputFormat},
    engine::DiffOptions,
    schema::Schema,
    source::{SourceOptions, open_source},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("koala_diff", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Compare(args) => handle_compare(&args),
        Commands::Probe(args) => handle_probe(&args),
    }
}

fn handle_compare(args: &cli::CompareArgs) -> Result<()> {
    for path in [&args.old, &args.new] {
        if !path.exists() {
            return Err(anyhow!("Input file {path:?} does not exist"));
        }
    }
    let keys = args
        .keys
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| k.to_string())
        .collect::<Vec<_>>();
    debug!("Key columns: {:?}", keys);

    let old_options = source_options(&args.input, args.old_schema.as_deref())?;
    let new_options = source_options(&args.input, args.new_schema.as_deref())?;
    let old = open_source(&args.old, &old_options)
        .with_context(|| format!("Opening old input {:?}", args.old))?;
    let new = open_source(&args.new, &new_options)
        .with_context(|| format!("Opening new input {:?}", args.new))?;

    let options = DiffOptions {
        materialize_mismatches: args.mismatches.is_some(),
        sample_limit: if args.no_mismatches { 0 } else { args.sample_limit },
        max_index_rows: args.max_index_rows,
        spill_partitions: args.spill_partitions,
        spill_dir: args.spill_dir.clone(),
        prefetch_rows: args.prefetch_rows,
        ..DiffOptions::default()
    };
    let mut result = engine::compare(old, new, &keys, &options)
        .with_context(|| format!("Comparing {:?} against {:?}", args.old, args.new))?;

    match args.format {
        OutputFormat::Table => {
            print!("{}", report::render_summary(&result));
            if let Some(path) = &args.output {
                report::write_json_summary(&result, Some(path))?;
            }
        }
        OutputFormat::Json => report::write_json_summary(&result, args.output.as_deref())?,
    }

    if let Some(path) = &args.mismatches {
        let encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
        let written = report::export_mismatches(&mut result, path, args.mismatch_limit, None, encoding)
            .with_context(|| format!("Exporting mismatches to {path:?}"))?;
        info!("Exported {} mismatched row(s) to {:?}", written, path);
    }
    Ok(())
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    let options = source_options(&args.options, None)?;
    if let Some(delimiter) = options.delimiter {
        info!(
            "Probing '{}' with delimiter '{}'",
            args.input.display(),
            printable_delimiter(delimiter)
        );
    } else {
        info!("Probing '{}'", args.input.display());
    }
    let source = open_source(&args.input, &options)
        .with_context(|| format!("Inferring schema from {:?}", args.input))?;
    let schema = source.schema();
    schema
        .save(&args.schema)
        .with_context(|| format!("Writing schema to {:?}", args.schema))?;
    info!(
        "Inferred schema for {} column(s) written to {:?}",
        schema.len(),
        args.schema
    );
    Ok(())
}

fn source_options(input: &InputArgs, schema_path: Option<&Path>) -> Result<SourceOptions> {
    let schema = match schema_path {
        Some(path) => Some(
            Schema::load(path).with_context(|| format!("Loading schema from {path:?}"))?,
        ),
        None => None,
    };
    let encoding = io_utils::resolve_encoding(input.input_encoding.as_deref())?;
    Ok(SourceOptions {
        format: input.input_format,
        delimiter: input.delimiter,
        encoding,
        null_values: input.null_values.clone(),
        sample_rows: input.sample_rows,
        schema,
        infer_types: !input.no_infer,
    })
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
