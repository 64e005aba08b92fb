use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    engine::{DEFAULT_PREFETCH_ROWS, DEFAULT_SAMPLE_LIMIT},
    partition::DEFAULT_SPILL_PARTITIONS,
    source::{DEFAULT_SAMPLE_ROWS, SourceFormat},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Compare two versions of a tabular dataset by key", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compare an old and a new dataset keyed by one or more columns
    Compare(CompareArgs),
    /// Infer a schema from a file and write it as YAML
    Probe(ProbeArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Force the input format instead of choosing by file extension
    #[arg(long = "input-format", value_enum)]
    pub input_format: Option<SourceFormat>,
    /// Delimiter for delimited text (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of delimited inputs (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Text tokens read as null in delimited inputs (empty fields always are)
    #[arg(long = "null-value", action = clap::ArgAction::Append)]
    pub null_values: Vec<String>,
    /// Rows sampled when inferring types (0 means full scan)
    #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
    pub sample_rows: usize,
    /// Read every delimited column as text instead of inferring types
    #[arg(long = "no-infer")]
    pub no_infer: bool,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Old version of the dataset
    #[arg(long)]
    pub old: PathBuf,
    /// New version of the dataset
    #[arg(long)]
    pub new: PathBuf,
    /// Key columns identifying a row; comma-separated or repeated
    #[arg(short = 'k', long = "key", value_delimiter = ',', action = clap::ArgAction::Append, required = true)]
    pub keys: Vec<String>,
    /// YAML schema for the old file (delimited text only)
    #[arg(long = "old-schema")]
    pub old_schema: Option<PathBuf>,
    /// YAML schema for the new file (delimited text only)
    #[arg(long = "new-schema")]
    pub new_schema: Option<PathBuf>,
    #[command(flatten)]
    pub input: InputArgs,
    /// Summary format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
    /// Write the JSON summary to this file instead of stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
    /// Export mismatched cells (long format CSV/TSV, or JSON lines for .jsonl)
    #[arg(long)]
    pub mismatches: Option<PathBuf>,
    /// Maximum number of mismatched rows to export
    #[arg(long = "mismatch-limit")]
    pub mismatch_limit: Option<usize>,
    /// Mismatch samples kept per column in the summary
    #[arg(long = "sample-limit", default_value_t = DEFAULT_SAMPLE_LIMIT)]
    pub sample_limit: usize,
    /// Distinct keys (old index plus unmatched new keys) held in memory before spilling to disk partitions
    #[arg(long = "max-index-rows")]
    pub max_index_rows: Option<usize>,
    /// Number of disk partitions used when spilling
    #[arg(long = "spill-partitions", default_value_t = DEFAULT_SPILL_PARTITIONS)]
    pub spill_partitions: usize,
    /// Directory for spill files (system temp dir if omitted)
    #[arg(long = "spill-dir")]
    pub spill_dir: Option<PathBuf>,
    /// Rows decoded ahead on a reader thread (0 reads inline)
    #[arg(long = "prefetch-rows", default_value_t = DEFAULT_PREFETCH_ROWS)]
    pub prefetch_rows: usize,
    /// Character encoding for the mismatch export (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Keep no mismatch samples or rows; counters stay exact
    #[arg(long = "no-mismatches", conflicts_with = "mismatches")]
    pub no_mismatches: bool,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// File to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination YAML schema file
    #[arg(short, long)]
    pub schema: PathBuf,
    #[command(flatten)]
    pub options: InputArgs,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "pipe" | "|" => Ok(b'|'),
        "semicolon" | ";" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (None, _) => Err("Delimiter cannot be empty".to_string()),
                (Some(_), Some(_)) => Err("Delimiter must be a single character".to_string()),
                (Some(ch), None) if ch.is_ascii() => Ok(ch as u8),
                (Some(_), None) => Err("Delimiter must be ASCII".to_string()),
            }
        }
    }
}
