//! Rankflow CLI - operator interface to the dispatch daemon over JSON-RPC

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9627";
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Parser)]
#[command(name = "rankflow")]
#[command(about = "Rankflow optimization queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "RANKFLOW_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum PriorityArg {
    Low,
    Normal,
    High,
}

impl PriorityArg {
    fn as_str(self) -> &'static str {
        match self {
            PriorityArg::Low => "low",
            PriorityArg::Normal => "normal",
            PriorityArg::High => "high",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue an optimization job for a content item
    Enqueue {
        /// Subject (content item) id
        #[arg(short, long)]
        subject: String,

        /// Payload as JSON string
        #[arg(long)]
        payload: String,

        #[arg(short, long, value_enum, default_value = "normal")]
        priority: PriorityArg,

        /// Score the optimization should reach
        #[arg(short, long)]
        target_score: Option<f64>,
    },

    /// Show a job
    Status { job_id: String },

    /// Make one delivery attempt now
    Dispatch { job_id: String },

    /// Show queue statistics
    Stats,

    /// Run retention GC (and VACUUM when needed)
    Maintenance {
        /// Force VACUUM even if not needed
        #[arg(long)]
        force_vacuum: bool,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct EnqueueRow {
    job_id: String,
    status: String,
}

#[derive(Tabled)]
struct Field {
    field: &'static str,
    value: String,
}

fn field(name: &'static str, value: &Value) -> Field {
    let value = match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Field { field: name, value }
}

fn colored_status(status: &str) -> String {
    match status {
        "completed" => status.green().to_string(),
        "processing" => status.cyan().to_string(),
        "failed" => status.yellow().to_string(),
        "abandoned" => status.red().to_string(),
        _ => status.to_string(),
    }
}

fn mb(bytes: &Value) -> f64 {
    bytes.as_i64().unwrap_or(0) as f64 / BYTES_PER_MB
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0",
        method,
        params,
        id: 1,
    };

    let response: JsonRpcResponse = reqwest::Client::new()
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Enqueue {
            subject,
            payload,
            priority,
            target_score,
        } => {
            let payload: Value = serde_json::from_str(&payload).context("Invalid JSON payload")?;
            let params = json!({
                "subject_id": subject,
                "payload": payload,
                "priority": priority.as_str(),
                "target_score": target_score,
            });

            let result = call_rpc(&cli.rpc_url, "job.enqueue.v1", params).await?;
            let row: EnqueueRow = serde_json::from_value(result)?;

            println!("{}", "✓ Job enqueued".green().bold());
            println!();
            println!("{}", Table::new(vec![row]));
        }

        Commands::Status { job_id } => {
            let view = call_rpc(&cli.rpc_url, "job.status.v1", json!({ "job_id": job_id })).await?;

            let status = view["status"].as_str().unwrap_or("unknown");
            println!("{} {}", "Job".bold(), job_id);
            println!("  {} {}", "Status:".bold(), colored_status(status));
            println!();

            let rows = vec![
                field("subject", &view["subjectId"]),
                field("priority", &view["priority"]),
                field(
                    "attempts",
                    &json!(format!("{}/{}", view["attempts"], view["maxAttempts"])),
                ),
                field("next attempt at", &view["nextAttemptAt"]),
                field("current score", &view["currentScore"]),
                field("target score", &view["targetScore"]),
                field("last error", &view["lastError"]),
            ];
            println!("{}", Table::new(rows));
        }

        Commands::Dispatch { job_id } => {
            let result =
                call_rpc(&cli.rpc_url, "job.dispatch.v1", json!({ "job_id": job_id })).await?;
            let outcome = result["outcome"].as_str().unwrap_or("unknown");
            match outcome {
                "accepted" => println!("{}", format!("✓ Job {} accepted", job_id).green().bold()),
                "skipped" => println!("{}", format!("○ Job {} not claimable right now", job_id).yellow()),
                "retry_scheduled" => println!(
                    "{} next attempt at {}",
                    format!("✗ Job {} delivery failed,", job_id).yellow(),
                    result["next_attempt_at"]
                ),
                _ => println!("Job {}: {}", job_id, outcome),
            }
        }

        Commands::Stats => {
            println!("{}", "Queue Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Total Jobs:".bold(), stats["total_jobs"]);
                    println!("  {} {}", "Pending:".bold(), stats["pending_jobs"]);
                    println!("  {} {}", "Processing:".bold(), stats["processing_jobs"]);
                    println!("  {} {}", "Completed:".bold(), stats["completed_jobs"]);
                    println!("  {} {}", "Failed (retrying):".bold(), stats["failed_jobs"]);
                    println!("  {} {}", "Abandoned:".bold(), stats["abandoned_jobs"]);
                    println!();
                    println!("  {} {:.2} MB", "DB Size:".bold(), mb(&stats["db_size_bytes"]));
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Maintenance { force_vacuum } => {
            println!("{}", "Running maintenance...".cyan().bold());

            let params = json!({ "force_vacuum": force_vacuum });
            let result = call_rpc(&cli.rpc_url, "admin.maintenance.v1", params).await?;

            if result["vacuum_run"].as_bool().unwrap_or(false) {
                println!("  {} VACUUM executed", "✓".green());
            } else {
                println!("  ○ VACUUM skipped (not needed)");
            }
            println!("  {} {} jobs deleted", "✓".green(), result["jobs_deleted"]);
            println!(
                "  {} {:.2} MB → {:.2} MB",
                "DB Size:".bold(),
                mb(&result["db_size_before"]),
                mb(&result["db_size_after"])
            );
        }
    }

    Ok(())
}
