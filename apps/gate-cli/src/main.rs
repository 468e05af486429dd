//! gate-cli：以闸机身份批量提交扫码内容
//!
//! ```text
//! gate-cli verify --server http://127.0.0.1:8080 --device-id GATE-01 --payload gym-1:member-1
//! gate-cli verify --device-id GATE-01 --batch payloads.txt
//! ```
//!
//! 设备密钥取自 `--device-key` 或 `GATE_DEVICE_API_KEY`。

mod batch;
mod client;

use batch::{Summary, Verdict, parse_batch};
use clap::{Args, Parser, Subcommand};
use client::{CliError, ValidateClient};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gate-cli", version, about = "Gym gate verification client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 提交一个或一批扫码载荷
    Verify(VerifyArgs),
}

#[derive(Args)]
struct VerifyArgs {
    #[arg(long, env = "GATE_SERVER_URL", default_value = "http://127.0.0.1:8080")]
    server: String,
    #[arg(long)]
    device_id: String,
    #[arg(long, env = "GATE_DEVICE_API_KEY", hide_env_values = true)]
    device_key: String,
    #[arg(long, conflicts_with = "batch", required_unless_present = "batch")]
    payload: Option<String>,
    /// 每行一个载荷
    #[arg(long)]
    batch: Option<PathBuf>,
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_payloads(args: &VerifyArgs) -> Result<Vec<String>, CliError> {
    if let Some(payload) = &args.payload {
        return Ok(vec![payload.clone()]);
    }
    let Some(path) = &args.batch else {
        return Err(CliError::Config("either --payload or --batch is required".to_string()));
    };
    let content = std::fs::read_to_string(path)
        .map_err(|err| CliError::Config(format!("read {}: {err}", path.display())))?;
    let payloads = parse_batch(&content);
    if payloads.is_empty() {
        return Err(CliError::Config(format!("{} has no payloads", path.display())));
    }
    Ok(payloads)
}

async fn run_verify(args: VerifyArgs) -> Result<Summary, CliError> {
    let payloads = load_payloads(&args)?;
    let client = ValidateClient::new(
        &args.server,
        args.device_key.clone(),
        Duration::from_millis(args.timeout_ms),
    )?;

    let mut summary = Summary::default();
    for payload in &payloads {
        let verdict = match client.validate(&args.device_id, payload).await {
            Ok(decision) => {
                println!(
                    "{}\t{}\t{}",
                    payload,
                    decision.action,
                    decision.reason.as_deref().unwrap_or("-")
                );
                if decision.action == "GRANT_ACCESS" {
                    Verdict::Granted
                } else {
                    Verdict::Denied
                }
            }
            Err(err) => {
                tracing::error!(target: "gate.cli", payload = %payload, error = %err, "validate_failed");
                println!("{payload}\tERROR\t{err}");
                Verdict::Failed
            }
        };
        summary.record(verdict);
    }
    tracing::info!(
        target: "gate.cli",
        granted = summary.granted,
        denied = summary.denied,
        failed = summary.failed,
        "batch_finished"
    );
    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Verify(args) => match run_verify(args).await {
            Ok(summary) => summary.exit_code(),
            Err(err) => {
                eprintln!("gate-cli: {err}");
                ExitCode::from(2)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn payload_and_batch_are_exclusive() {
        let result = Cli::try_parse_from([
            "gate-cli",
            "verify",
            "--device-id",
            "GATE-01",
            "--device-key",
            "k",
            "--payload",
            "gym-1:member-1",
            "--batch",
            "file.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn single_payload_loads_verbatim() {
        let cli = Cli::try_parse_from([
            "gate-cli",
            "verify",
            "--device-id",
            "GATE-01",
            "--device-key",
            "k",
            "--payload",
            "gym-1:member-1",
        ])
        .expect("parse");
        let Command::Verify(args) = cli.command;
        assert_eq!(load_payloads(&args).expect("payloads"), vec!["gym-1:member-1"]);
    }
}
