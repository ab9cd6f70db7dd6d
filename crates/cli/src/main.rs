mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use runtime::{BedrockBackend, ConversationState, Session};
use tracing_subscriber::EnvFilter;

use config::{Config, Overrides};
use error::{Error, Result};

#[derive(Parser)]
#[command(name = "toolbox-agent")]
#[command(about = "Chat with a Bedrock model that can use MCP Toolbox tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ./toolbox-agent.toml if present)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// MCP server SSE endpoint
    #[arg(long, value_name = "URL")]
    mcp_url: Option<String>,

    /// Bedrock model id or inference profile
    #[arg(long, value_name = "MODEL_ID")]
    model: Option<String>,

    /// AWS region of the Bedrock runtime
    #[arg(long)]
    region: Option<String>,

    /// Tool rounds allowed per message (0 for no limit)
    #[arg(long, value_name = "N")]
    max_tool_rounds: Option<usize>,

    /// Run the tool calls of one model turn concurrently
    #[arg(long)]
    parallel_tools: bool,

    /// Log progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            mcp_url: self.mcp_url.clone(),
            model: self.model.clone(),
            region: self.region.clone(),
            max_tool_rounds: self.max_tool_rounds,
            parallel_tools: self.parallel_tools,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise stay quiet so logs don't interleave with the prompt.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "info" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        if matches!(e, Error::Connect(_)) {
            eprintln!("Make sure the MCP Toolbox server is running.");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::resolve(cli.config.as_deref(), &cli.overrides())?;

    let mut builder = BedrockBackend::builder(config.bearer_token()?, &config.model.id)
        .region(&config.model.region)
        .max_tokens(config.model.max_tokens);
    if let Some(system) = &config.model.system_prompt {
        builder = builder.system(system);
    }
    if let Some(endpoint) = &config.model.endpoint {
        builder = builder.endpoint(endpoint);
    }
    let backend = builder.build();

    println!("Connecting to MCP server at {}...", config.mcp.url);
    let session = Session::connect(config.client_config())
        .await
        .map_err(Error::Connect)?;

    let tools = session.catalog().names();
    println!("Connected. Model: {}", config.model.id);
    if tools.is_empty() {
        println!("No tools available.");
    } else {
        println!("Available tools: {}", tools.join(", "));
    }
    println!("Type 'quit' to exit, 'clear' to start over.\n");

    let orchestrator = session
        .orchestrator(&backend)
        .max_rounds(config.max_rounds())
        .dispatch(config.dispatch())
        .on_tool_call(|request| println!("  [Executing tool: {}]", request.tool_name));
    let mut conversation = ConversationState::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("You: ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            println!();
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") {
            break;
        }
        if input.eq_ignore_ascii_case("clear") {
            conversation.reset();
            println!("Conversation history cleared.\n");
            continue;
        }

        match orchestrator.converse(&mut conversation, input).await {
            Ok(response) => println!("\nAssistant: {response}\n"),
            Err(e) => eprintln!("\nError: {e}\n"),
        }
    }

    drop(orchestrator);
    session.disconnect().await;
    println!("Goodbye!");
    Ok(())
}
