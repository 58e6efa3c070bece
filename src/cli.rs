use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};

use crate::query::DEFAULT_PAGE_LIMIT;

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "wordweave")]
#[command(bin_name = "wordweave")]
#[command(version)]
#[command(about = "Build stories together, one word at a time")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'd',
        long,
        env = "WORDWEAVE_DB_PATH",
        default_value = ".wordweave/story.sqlite",
        help = "Path to the SQLite story database."
    )]
    pub db: String,

    #[arg(
        long,
        env = "WORDWEAVE_CONFIG",
        help = "Optional TOML file with capacity, word and storage settings."
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "WORDWEAVE_LOCK_FILE",
        help = "Lock file that serializes appends across processes."
    )]
    pub lock_file: Option<PathBuf>,

    #[arg(
        long,
        env = "WORDWEAVE_LOG",
        default_value = "warn",
        help = "Log filter directive written to stderr (e.g. info, wordweave=debug)."
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Append words to the open story, one at a time.")]
    Add(AddArgs),
    #[command(about = "List stories, oldest first.")]
    Ls(ListArgs),
    #[command(about = "Show one story with its paragraphs and sentences.")]
    Show(ShowArgs),
    #[command(about = "Show the story currently accepting words.")]
    Status(StatusArgs),
    #[command(about = "Print the effective capacity policy and word bound.")]
    Policy(PolicyArgs),
}

#[derive(Debug, Clone, Args)]
pub struct AddArgs {
    #[arg(required = true, help = "Words to append, in order.")]
    pub words: Vec<String>,

    #[arg(long, help = "Print each append result as JSON.")]
    pub json: bool,

    #[arg(long, help = "Print append counters after the last word.")]
    pub stats: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT, help = "Maximum stories to return.")]
    pub limit: u32,

    #[arg(long, default_value_t = 0, help = "Stories to skip before the page.")]
    pub offset: u32,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ShowArgs {
    pub id: i64,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct PolicyArgs {
    #[arg(long)]
    pub json: bool,
}
