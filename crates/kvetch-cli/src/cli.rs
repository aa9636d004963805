use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kvetch",
    about = "Kvetch: sharded object-graph storage",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Deployment config (shards and schema)
    #[arg(short, long, global = true, default_value = "kvetch.toml")]
    pub config: PathBuf,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create missing shard tables
    Init,
    /// Drop and recreate every shard table
    Nuke(NukeArgs),
    /// Backfill an index from existing objects
    BuildIndex(BuildIndexArgs),
    /// Print the resolved config and schema
    Describe,
    /// Insert an object
    Insert(InsertArgs),
    /// Merge attributes into an object
    Update(UpdateArgs),
    /// Delete an object
    Delete(ObjectArgs),
    /// Show an object
    Get(ObjectArgs),
    /// Page through objects of a type
    Scan(ScanArgs),
    /// Page through edges from an object
    Edges(EdgesArgs),
    /// Look up objects by index value
    Index(IndexArgs),
}

#[derive(Args)]
pub struct NukeArgs {
    /// Required; all data is lost
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct BuildIndexArgs {
    pub index: String,
}

#[derive(Args)]
pub struct InsertArgs {
    /// Type name or numeric type id
    pub object_type: String,
    /// Attributes as key=value
    pub attrs: Vec<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    pub id: String,
    /// Attributes as key=value
    pub attrs: Vec<String>,
}

#[derive(Args)]
pub struct ObjectArgs {
    pub id: String,
}

#[derive(Args)]
pub struct PageArgs {
    /// Exclusive cursor
    #[arg(long)]
    pub after: Option<String>,
    #[arg(short = 'n', long)]
    pub first: Option<usize>,
}

#[derive(Args)]
pub struct ScanArgs {
    pub object_type: String,
    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(Args)]
pub struct EdgesArgs {
    pub edge: String,
    pub from: String,
    #[command(flatten)]
    pub page: PageArgs,
    /// Print only target ids
    #[arg(long)]
    pub ids: bool,
}

#[derive(Args)]
pub struct IndexArgs {
    pub index: String,
    pub value: String,
    /// Print only matching ids
    #[arg(long)]
    pub ids: bool,
}
