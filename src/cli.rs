use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Media file to inspect
    #[arg(short, long)]
    pub input: PathBuf,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Write the JSON export to this file
    #[arg(long, conflicts_with = "export_dir")]
    pub export: Option<PathBuf>,

    /// Write the JSON export as `<name>_mediainfo.json` into this directory
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Print the raw JSON report instead of the summary
    #[arg(long)]
    pub raw: bool,

    /// Whole-buffer threshold, in MiB (overrides config when set)
    #[arg(long)]
    pub whole_buffer_limit_mib: Option<u64>,

    /// Do not draw the progress line
    #[arg(long)]
    pub no_progress: bool,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
