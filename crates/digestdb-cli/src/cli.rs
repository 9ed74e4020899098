use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use digestdb_core::{ContentHash, HashAlgorithm};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Content-addressed blob store with a SQLite metadata index",
    disable_help_subcommand = true
)]
pub struct DigestCli {
    #[arg(
        long,
        value_name = "DIR",
        help = "Store root (default: $DIGESTDB_ROOT, then ~/.digestdb)",
        global = true
    )]
    pub root: Option<PathBuf>,
    #[arg(
        long,
        value_name = "N",
        help = "Shard directory depth (default: $DIGESTDB_DIR_DEPTH, then 3)",
        global = true
    )]
    pub depth: Option<usize>,
    #[arg(
        long,
        value_name = "ALGORITHM",
        help = "Digest algorithm: sha256|sha384|sha512 (default: $DIGESTDB_HASH, then sha256)",
        global = true
    )]
    pub hash: Option<HashAlgorithm>,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)", global = true)]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandCli {
    #[command(subcommand, about = "Add, list or remove categories.")]
    Category(CategoryCommand),
    #[command(about = "Store one or more files under a category.")]
    Put(PutArgs),
    #[command(about = "Write a stored payload to a file or stdout.")]
    Get(GetArgs),
    #[command(about = "Report whether a digest is indexed.")]
    Exists(DigestArgs),
    #[command(about = "Delete a record and its payload.")]
    Delete(DigestArgs),
    #[command(about = "List records, optionally filtered by category and time.")]
    Query(QueryArgs),
    #[command(about = "Compare the index against the payload tree.")]
    Check,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    #[command(about = "Register a new category.")]
    Add(CategoryAddArgs),
    #[command(about = "List categories.")]
    List(CategoryListArgs),
    #[command(about = "Remove a category no record references.")]
    Remove(CategoryRemoveArgs),
}

#[derive(Args, Debug)]
pub struct CategoryAddArgs {
    pub label: String,
    #[arg(short, long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct CategoryListArgs {
    #[arg(long, help = "Only the category with this exact label")]
    pub label: Option<String>,
    #[arg(long, value_name = "TEXT", help = "Only categories whose description contains TEXT")]
    pub contains: Option<String>,
}

#[derive(Args, Debug)]
pub struct CategoryRemoveArgs {
    pub label: String,
}

#[derive(Args, Debug)]
pub struct PutArgs {
    pub category: String,
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    #[arg(
        long,
        value_name = "RFC3339",
        value_parser = parse_timestamp,
        help = "Creation timestamp to record instead of now"
    )]
    pub at: Option<OffsetDateTime>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    pub digest: ContentHash,
    #[arg(short, long, value_name = "FILE", help = "Write to FILE instead of stdout")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DigestArgs {
    pub digest: ContentHash,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long, value_name = "RFC3339", value_parser = parse_timestamp, help = "Inclusive lower bound")]
    pub since: Option<OffsetDateTime>,
    #[arg(long, value_name = "RFC3339", value_parser = parse_timestamp, help = "Exclusive upper bound")]
    pub until: Option<OffsetDateTime>,
}

fn parse_timestamp(value: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|err| format!("expected an RFC 3339 timestamp ({err})"))
}
