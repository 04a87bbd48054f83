//! kb-chat - Stream One Knowledge-Base Chat Turn
//!
//! Sends a query (or resumes a message) against a knowledge-base chat server
//! and prints the answer as it streams in. Login state is read from the
//! client state file.
//!
//! # Usage
//!
//! ```bash
//! # Ask a question in an existing session
//! kb-chat --session s1 --query "What changed in v2?"
//!
//! # Search specific knowledge bases without the agent
//! kb-chat -s s1 -q "pricing" --no-agent --kb kb-1 --kb kb-2
//!
//! # Resume the stream of a message that is still generating
//! kb-chat -s s1 -q msg-42 --resume --endpoint /api/v1/knowledge-chat
//!
//! # Ask the server to stop generating a message
//! kb-chat -s s1 -q msg-42 --stop
//!
//! # Print raw event payloads, verbose logs
//! RUST_LOG=debug kb-chat -s s1 -q hello --raw
//! ```
//!
//! Ctrl-C stops the stream. The exit status is non-zero if the turn failed.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use chatstream_core::{
    default_config_path, load_config_from_path, ConfigOverrides, ResponseType, StreamController,
    StreamRequest, StreamResponse, AGENT_CHAT_ENDPOINT,
};

/// Stream one knowledge-base chat turn to the terminal
#[derive(Parser, Debug)]
#[command(name = "kb-chat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Chat session id
    #[arg(short = 's', long, value_name = "ID")]
    session: String,

    /// Query text; the message id with --resume or --stop
    #[arg(short = 'q', long, value_name = "TEXT")]
    query: String,

    /// Chat endpoint path
    #[arg(short = 'e', long, default_value = AGENT_CHAT_ENDPOINT, value_name = "PATH")]
    endpoint: String,

    /// Knowledge base to search (repeatable)
    #[arg(long = "kb", value_name = "ID")]
    knowledge_bases: Vec<String>,

    /// Disable agent mode
    #[arg(long)]
    no_agent: bool,

    /// Enable web search
    #[arg(long)]
    web_search: bool,

    /// Summary model for non-agent mode
    #[arg(long, value_name = "ID")]
    summary_model: Option<String>,

    /// MCP service available to the agent (repeatable)
    #[arg(long = "mcp", value_name = "ID")]
    mcp_services: Vec<String>,

    /// Resume the stream of an existing message (GET)
    #[arg(long, conflicts_with = "stop")]
    resume: bool,

    /// Ask the server to stop generating the message instead of streaming
    #[arg(long)]
    stop: bool,

    /// Print raw event payloads instead of answer text
    #[arg(long)]
    raw: bool,

    /// API server URL
    #[arg(long, env = "KB_CHAT_SERVER", value_name = "URL")]
    server: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "KB_CHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Client state file holding the login token
    #[arg(long, value_name = "FILE")]
    state_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "KB_CHAT_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref server) = self.server {
            overrides = overrides.with_local_endpoint(server.clone());
            overrides.co_hosted = Some(false);
        }
        if let Some(ref path) = self.state_file {
            overrides = overrides.with_state_file(path.clone());
        }
        overrides
    }

    fn request(&self) -> StreamRequest {
        if self.resume {
            return StreamRequest::resume(&self.endpoint, &self.session, &self.query);
        }

        let mut request = StreamRequest::post(&self.endpoint, &self.session, &self.query)
            .with_agent(!self.no_agent);
        if !self.knowledge_bases.is_empty() {
            request = request.with_knowledge_bases(self.knowledge_bases.clone());
        }
        if self.web_search {
            request = request.with_web_search(true);
        }
        if let Some(ref model) = self.summary_model {
            request = request.with_summary_model(model.clone());
        }
        if !self.mcp_services.is_empty() {
            request = request.with_mcp_services(self.mcp_services.clone());
        }
        request
    }
}

/// Initialize logging to stderr with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("kb_chat={level},chatstream_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Render one chunk to the terminal
fn print_chunk(chunk: &serde_json::Value, raw: bool) {
    let mut stdout = std::io::stdout().lock();
    if raw {
        let _ = writeln!(stdout, "{chunk}");
        return;
    }

    let Some(response) = StreamResponse::from_chunk(chunk) else {
        return;
    };
    match response.response_type {
        Some(ResponseType::Answer) => {
            let _ = write!(stdout, "{}", response.content);
            if response.done {
                let _ = writeln!(stdout);
            }
            let _ = stdout.flush();
        }
        Some(ResponseType::Error) => eprintln!("server error: {}", response.content),
        _ => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = load_config_from_path(args.config.clone().or_else(default_config_path))
        .context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        source = %config.source(),
        base_url = config.base_url(),
        state_file = ?config.state_file,
        "Configuration loaded"
    );

    let controller =
        StreamController::from_config(&config).context("Failed to create HTTP transport")?;

    if args.stop {
        let response = controller
            .request_stop(&args.session, &args.query)
            .await
            .context("Stop request failed")?;
        if !response.is_null() {
            println!("{response}");
        }
        return Ok(());
    }

    let raw = args.raw;
    controller.on_chunk(move |chunk| print_chunk(chunk, raw));

    tokio::select! {
        () = controller.start_stream(args.request()) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, stopping stream");
            controller.stop_stream();
        }
    }

    if let Some(e) = controller.error() {
        error!(error = %e, chunks = controller.output().len(), "Turn failed");
        anyhow::bail!("{e}");
    }

    info!(chunks = controller.output().len(), "Turn finished");
    Ok(())
}
