use clap::{Args, Parser, Subcommand};

use crate::export::OutputFormat;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape a work and write it as a single document.
    Build(BuildArgs),
    /// Print the chapter list of a work.
    Chapters(ChaptersArgs),
    /// Print the profile metadata of a work as JSON.
    Profile(ProfileArgs),
}

#[derive(Debug, Clone, Args)]
pub struct FetchArgs {
    /// HTTP request timeout.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// URL of any chapter of the work (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Output directory for the document.
    #[arg(long, default_value = "output")]
    pub out: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Txt)]
    pub format: OutputFormat,

    /// Directory holding the regular/italic/bold/bold-italic fonts (pdf only).
    #[arg(long, default_value = "fonts")]
    pub fonts: String,

    /// Font family file prefix, e.g. `DejaVuSerif` for `DejaVuSerif-Bold.ttf`.
    #[arg(long, default_value = "DejaVuSerif")]
    pub font_family: String,

    /// Path to the pandoc binary (pdf only).
    #[arg(long, default_value = "pandoc")]
    pub pandoc: String,

    /// YAML list of genre names recognized in the stats line.
    #[arg(long)]
    pub genres: Option<String>,

    /// Delay between chapter requests (politeness).
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,

    /// Overwrite an existing document.
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Debug, Args)]
pub struct ChaptersArgs {
    /// URL of any chapter of the work.
    #[arg(long)]
    pub url: String,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// URL of any chapter of the work.
    #[arg(long)]
    pub url: String,

    /// YAML list of genre names recognized in the stats line.
    #[arg(long)]
    pub genres: Option<String>,

    #[command(flatten)]
    pub fetch: FetchArgs,
}
