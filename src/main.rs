//! agentmux CLI entry point. Two subcommands: `init` bootstraps a
//! workspace's `.multi-agent-mcp/` tree, `serve` runs the tool-dispatch
//! loop over newline-delimited JSON on stdin/stdout — a minimal stdio
//! framing so the dispatcher in [`agentmux::mcp`] has something to be
//! driven by; the framing itself is not load-bearing (spec's MCP
//! tool-registration transport is out of scope).

use std::io::Write;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use agentmux::config::Settings;
use agentmux::mcp::{ToolCall, ToolContext};

#[derive(Parser)]
#[command(name = "agentmux")]
#[command(about = "Coordination kernel for a multi-agent AI-CLI orchestration server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Repository / workspace root.
    #[arg(short, long, default_value = ".")]
    repo: std::path::PathBuf,

    /// Verbose logging (equivalent to RUST_LOG=debug).
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap a workspace's `.multi-agent-mcp/` tree.
    Init {
        /// Workspace id for the dashboard file name.
        #[arg(long, default_value = "default")]
        workspace_id: String,
    },
    /// Run the tool-dispatch loop, reading one JSON request per line from
    /// stdin and writing one JSON response per line to stdout.
    Serve {
        #[arg(long, default_value = "default")]
        workspace_id: String,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// One line of `serve`'s stdio protocol: `{"tool_name", "caller_agent_id"?,
/// "args"?}` in, a `{success, ...}` JSON object out.
#[derive(serde::Deserialize)]
struct StdioRequest {
    tool_name: String,
    caller_agent_id: Option<String>,
    #[serde(default)]
    args: serde_json::Value,
}

async fn run_serve(ctx: ToolContext) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    info!("agentmux serve: reading tool calls from stdin");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<StdioRequest>(&line) {
            Ok(request) => {
                let call = ToolCall {
                    tool_name: request.tool_name,
                    caller_agent_id: request.caller_agent_id,
                    args: request.args,
                };
                agentmux::mcp::dispatch(&ctx, call).await
            }
            Err(e) => {
                warn!(error = %e, "malformed stdio request line");
                serde_json::json!({ "success": false, "error": format!("malformed request: {e}") })
            }
        };
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        stdout.write_all(&encoded).await?;
        stdout.flush().await?;
    }
    info!("agentmux serve: stdin closed, shutting down");
    Ok(())
}

fn mcp_dir_for(repo: &std::path::Path, settings: &Settings) -> std::path::PathBuf {
    repo.join(&settings.mcp_dir)
}

fn run_init(repo: &std::path::Path, workspace_id: &str, settings: &Settings) -> anyhow::Result<()> {
    let mcp_dir = mcp_dir_for(repo, settings);
    for sub in ["agents", "dashboard", "ipc"] {
        std::fs::create_dir_all(mcp_dir.join(sub))?;
    }
    let ctx = ToolContext::new(mcp_dir.clone(), workspace_id, repo.to_string_lossy().to_string(), settings.clone());
    ctx.dashboard.read()?;
    println!("initialized {} (workspace_id={workspace_id})", mcp_dir.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = Settings::load();
    settings.project_root = cli.repo.clone();

    match cli.command {
        Commands::Init { workspace_id } => {
            if let Err(e) = run_init(&cli.repo, &workspace_id, &settings) {
                error!(error = %e, "init failed");
                std::io::stderr().flush().ok();
                return Err(e);
            }
        }
        Commands::Serve { workspace_id } => {
            let mcp_dir = mcp_dir_for(&cli.repo, &settings);
            let ctx = ToolContext::new(mcp_dir, &workspace_id, cli.repo.to_string_lossy().to_string(), settings);
            run_serve(ctx).await?;
        }
    }

    Ok(())
}
