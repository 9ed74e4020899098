use std::fs::File;
use std::io::{self, Write};

use anyhow::{Context, Result};
use digestdb_core::{
    Category, DigestDb, DigestQuery, DigestRecord, StoreConfig, StoreError,
};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use crate::cli::{CategoryCommand, CommandCli, DigestCli};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

impl CommandStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::UserError => 1,
            Self::Failure => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::UserError => "user-error",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    pub details: Value,
    /// Payload bytes were already written to stdout; print nothing else.
    pub passthrough: bool,
    pub is_error: bool,
}

impl ExecutionOutcome {
    fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
            passthrough: false,
            is_error: false,
        }
    }

    fn passthrough() -> Self {
        Self {
            passthrough: true,
            ..Self::success("", Value::Null)
        }
    }

    fn from_error(err: &anyhow::Error) -> Self {
        let (status, code) = match err.downcast_ref::<StoreError>() {
            Some(store) if store.is_user_error() => (CommandStatus::UserError, Some(store.code())),
            Some(store) => (CommandStatus::Failure, Some(store.code())),
            None => (CommandStatus::Failure, None),
        };
        Self {
            status,
            message: format!("{err:#}"),
            details: json!({ "code": code }),
            passthrough: false,
            is_error: true,
        }
    }
}

pub fn execute(cli: &DigestCli) -> ExecutionOutcome {
    match run(cli) {
        Ok(outcome) => outcome,
        Err(err) => {
            debug!(error = ?err, "command failed");
            ExecutionOutcome::from_error(&err)
        }
    }
}

fn store_config(cli: &DigestCli) -> Result<StoreConfig> {
    let mut config = match &cli.root {
        Some(root) => StoreConfig::from_env_with_root(root)?,
        None => StoreConfig::from_env()?,
    };
    if let Some(depth) = cli.depth {
        config = config.with_dir_depth(depth);
    }
    if let Some(hash) = cli.hash {
        config = config.with_hash(hash);
    }
    Ok(config)
}

fn run(cli: &DigestCli) -> Result<ExecutionOutcome> {
    let mut db = DigestDb::new(store_config(cli)?);
    db.open()?;
    let outcome = dispatch(&mut db, &cli.command)?;
    db.close()?;
    Ok(outcome)
}

fn dispatch(db: &mut DigestDb, command: &CommandCli) -> Result<ExecutionOutcome> {
    match command {
        CommandCli::Category(CategoryCommand::Add(args)) => {
            db.put_category(&args.label, args.description.as_deref())?;
            Ok(ExecutionOutcome::success(
                format!("added category {}", args.label),
                json!({ "label": args.label, "description": args.description }),
            ))
        }
        CommandCli::Category(CategoryCommand::List(args)) => {
            let categories = db.query_categories(args.label.as_deref(), args.contains.as_deref())?;
            let message = categories
                .iter()
                .map(category_line)
                .collect::<Vec<_>>()
                .join("\n");
            Ok(ExecutionOutcome::success(
                message,
                json!({ "categories": categories }),
            ))
        }
        CommandCli::Category(CategoryCommand::Remove(args)) => {
            db.delete_category(&args.label)?;
            Ok(ExecutionOutcome::success(
                format!("removed category {}", args.label),
                json!({ "label": args.label }),
            ))
        }
        CommandCli::Put(args) => {
            let mut lines = Vec::with_capacity(args.files.len());
            let mut stored = Vec::with_capacity(args.files.len());
            for path in &args.files {
                let digest = db.put_file_at(&args.category, path, args.at)?;
                lines.push(format!("{digest}  {}", path.display()));
                stored.push(json!({ "path": path, "digest": digest }));
            }
            Ok(ExecutionOutcome::success(
                lines.join("\n"),
                json!({ "category": args.category, "stored": stored }),
            ))
        }
        CommandCli::Get(args) => {
            let mut reader = db.open_data(&args.digest)?;
            match &args.output {
                Some(path) => {
                    let mut file = File::create(path)
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    let bytes = io::copy(&mut reader, &mut file)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    Ok(ExecutionOutcome::success(
                        format!("wrote {bytes} bytes to {}", path.display()),
                        json!({ "digest": args.digest, "path": path, "bytes": bytes }),
                    ))
                }
                None => {
                    let stdout = io::stdout();
                    let mut handle = stdout.lock();
                    io::copy(&mut reader, &mut handle).context("failed to write payload")?;
                    handle.flush().context("failed to flush stdout")?;
                    Ok(ExecutionOutcome::passthrough())
                }
            }
        }
        CommandCli::Exists(args) => {
            let exists = db.exists(&args.digest)?;
            Ok(ExecutionOutcome::success(
                exists.to_string(),
                json!({ "digest": args.digest, "exists": exists }),
            ))
        }
        CommandCli::Delete(args) => {
            db.delete_data(&args.digest)?;
            Ok(ExecutionOutcome::success(
                format!("deleted {}", args.digest),
                json!({ "digest": args.digest }),
            ))
        }
        CommandCli::Query(args) => {
            let query = DigestQuery {
                category: args.category.clone(),
                since: args.since,
                until: args.until,
            };
            let records = db.query_data(&query)?.collect::<Result<Vec<_>>>()?;
            let message = records
                .iter()
                .map(record_line)
                .collect::<Result<Vec<_>>>()?
                .join("\n");
            Ok(ExecutionOutcome::success(
                message,
                json!({ "records": records }),
            ))
        }
        CommandCli::Check => {
            let report = db.check()?;
            let mut lines = vec![
                format!("records: {}", report.records),
                format!("files: {}", report.files),
                format!("partial writes: {}", report.partials),
            ];
            lines.extend(report.orphaned_files.iter().map(|hash| format!("orphaned: {hash}")));
            lines.extend(report.missing_files.iter().map(|hash| format!("missing: {hash}")));
            let mut outcome = ExecutionOutcome::success(lines.join("\n"), json!({ "report": report }));
            if !report.is_consistent() {
                outcome.status = CommandStatus::Failure;
            }
            Ok(outcome)
        }
    }
}

fn category_line(category: &Category) -> String {
    match &category.description {
        Some(description) => format!("{}\t{description}", category.label),
        None => category.label.clone(),
    }
}

fn record_line(record: &DigestRecord) -> Result<String> {
    let timestamp = record
        .timestamp
        .format(&Rfc3339)
        .context("failed to format record timestamp")?;
    Ok(format!(
        "{}  {}  {}  {}",
        record.digest, record.category, timestamp, record.byte_size
    ))
}
