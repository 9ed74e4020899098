use clap::Parser;
use color_eyre::Result;
use serde_json::json;

mod cli;
mod commands;

use cli::DigestCli;
use commands::ExecutionOutcome;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = DigestCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let outcome = commands::execute(&cli);
    let code = emit_output(&cli, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("digestdb={level},digestdb_core={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(cli: &DigestCli, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.status.exit_code();

    if outcome.passthrough {
        return Ok(code);
    }
    if cli.json {
        let payload = json!({
            "status": outcome.status.as_str(),
            "message": outcome.message,
            "details": outcome.details,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if outcome.is_error {
        eprintln!("error: {}", outcome.message);
    } else if !outcome.message.is_empty() {
        println!("{}", outcome.message);
    }

    Ok(code)
}
