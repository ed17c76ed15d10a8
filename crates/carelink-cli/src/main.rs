//! carelink: talk to healthcare A2A agents from the command line
//!
//! Usage:
//!   carelink ask policy_agent "Is mental health therapy covered?"
//!   carelink chain "How do I treat a sprained ankle?" --agents health_agent,policy_agent
//!   carelink mcp-serve

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use carelink_a2a::workflow::{self, DEFAULT_FOLLOW_UP, NamedAgent, StepAnswer};
use carelink_a2a::{A2aClient, DelegateToAgentTool, PollOptions, Reconciler};
use carelink_core::tools::{ListDoctorsTool, ToolHandler, ToolRegistry};
use carelink_core::CarelinkConfig;
use carelink_mcp::{McpClient, McpServer, McpToolAdapter};

const NO_ANSWER: &str = "No final text content received or task did not complete successfully.";

#[derive(Parser)]
#[command(name = "carelink")]
#[command(author, version, about = "Ask healthcare agents over the A2A protocol", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.carelink/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print an agent's card
    Card {
        /// Configured agent name or agent URL
        agent: String,
    },

    /// Send a prompt to one agent and wait for its answer
    Ask {
        agent: String,
        prompt: String,

        /// Give up after this many seconds (default: wait until the task settles)
        #[arg(long)]
        timeout: Option<u64>,

        /// Milliseconds between task polls
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Ask agents in turn, feeding each answer to the next agent
    Chain {
        prompt: String,

        #[arg(long, value_delimiter = ',', required = true)]
        agents: Vec<String>,

        /// Question appended to the previous answer for later agents
        #[arg(long, default_value = DEFAULT_FOLLOW_UP)]
        follow_up: String,
    },

    /// Ask several agents the same prompt concurrently
    Fanout {
        prompt: String,

        #[arg(long, value_delimiter = ',', required = true)]
        agents: Vec<String>,
    },

    /// Serve the doctor search and agent delegation tools over MCP on stdio
    McpServe {
        /// Tool to leave out of the served tool list (repeatable)
        #[arg(long = "hide", value_name = "TOOL")]
        hidden: Vec<String>,
    },

    /// Search the doctor directory locally
    Doctors {
        /// Two-letter state code, e.g. CA
        #[arg(long)]
        state: Option<String>,

        #[arg(long)]
        city: Option<String>,
    },

    /// List the tools of a configured MCP server
    Tools {
        server: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CarelinkConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    debug!("Loaded config with {} agents", config.agents.len());

    match cli.command {
        Commands::Card { agent } => cmd_card(&config, &agent).await,
        Commands::Ask {
            agent,
            prompt,
            timeout,
            interval,
        } => cmd_ask(&config, &agent, &prompt, timeout, interval).await,
        Commands::Chain {
            prompt,
            agents,
            follow_up,
        } => cmd_chain(&config, &agents, &prompt, &follow_up).await,
        Commands::Fanout { prompt, agents } => cmd_fanout(&config, &agents, &prompt).await,
        Commands::McpServe { hidden } => cmd_mcp_serve(&config, hidden).await,
        Commands::Doctors { state, city } => cmd_doctors(&config, state, city).await,
        Commands::Tools { server } => cmd_tools(&config, &server).await,
    }
}

fn client_for(config: &CarelinkConfig, agent: &str) -> Result<A2aClient> {
    let agent = config.agent(agent)?;
    Ok(A2aClient::new(agent, &config.http)?)
}

/// Cancelled on Ctrl-C so in-flight polling stops cleanly
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            trigger.cancel();
        }
    });
    token
}

fn named_agents(
    config: &CarelinkConfig,
    names: &[String],
    options: &PollOptions,
    token: &CancellationToken,
) -> Result<Vec<NamedAgent<A2aClient>>> {
    names
        .iter()
        .map(|name| {
            let reconciler = Reconciler::new(client_for(config, name)?)
                .with_options(options.clone())
                .with_cancellation(token.clone());
            Ok(NamedAgent::new(name.clone(), reconciler))
        })
        .collect()
}

fn print_steps(steps: &[StepAnswer]) {
    for step in steps {
        println!("== {} ==", step.agent);
        println!("{}", step.answer.as_deref().unwrap_or(NO_ANSWER));
        println!();
    }
}

async fn cmd_card(config: &CarelinkConfig, agent: &str) -> Result<()> {
    let client = client_for(config, agent)?;
    let card = client.fetch_agent_card().await?;

    println!("{} ({})", card.name, card.version);
    if !card.description.is_empty() {
        println!("{}", card.description);
    }
    println!("URL: {}", card.url);
    println!("Streaming: {}", card.capabilities.streaming);
    for skill in &card.skills {
        println!("- {}: {}", skill.name, skill.description);
        for example in &skill.examples {
            println!("    e.g. {}", example);
        }
    }
    Ok(())
}

async fn cmd_ask(
    config: &CarelinkConfig,
    agent: &str,
    prompt: &str,
    timeout: Option<u64>,
    interval: Option<u64>,
) -> Result<()> {
    let mut options = PollOptions::from(&config.polling);
    if let Some(secs) = timeout {
        options.deadline = Some(Duration::from_secs(secs));
    }
    if let Some(ms) = interval {
        if ms == 0 {
            return Err(anyhow!("--interval must be greater than zero"));
        }
        options.interval = Duration::from_millis(ms);
    }

    let reconciler = Reconciler::new(client_for(config, agent)?)
        .with_options(options)
        .with_cancellation(interrupt_token());

    let answer = reconciler.ask(prompt).await?;
    println!("{}", answer.as_deref().unwrap_or(NO_ANSWER));
    Ok(())
}

async fn cmd_chain(
    config: &CarelinkConfig,
    names: &[String],
    prompt: &str,
    follow_up: &str,
) -> Result<()> {
    let options = PollOptions::from(&config.polling);
    let agents = named_agents(config, names, &options, &interrupt_token())?;
    let steps = workflow::run_sequential(&agents, prompt, follow_up).await?;
    print_steps(&steps);
    Ok(())
}

async fn cmd_fanout(config: &CarelinkConfig, names: &[String], prompt: &str) -> Result<()> {
    let options = PollOptions::from(&config.polling);
    let agents = named_agents(config, names, &options, &interrupt_token())?;
    let steps = workflow::run_parallel(&agents, prompt).await;
    print_steps(&steps);
    Ok(())
}

fn doctors_tool(config: &CarelinkConfig) -> Result<ListDoctorsTool> {
    ListDoctorsTool::new(config.doctors.source.clone())
}

/// Tools offered by `mcp-serve`: doctor search plus delegation to the
/// configured agents
fn served_tools(config: &CarelinkConfig) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(doctors_tool(config)?));
    registry.register(Arc::new(DelegateToAgentTool::new(
        config.agents.clone(),
        &config.http,
        PollOptions::from(&config.polling),
    )?));
    Ok(registry)
}

async fn cmd_mcp_serve(config: &CarelinkConfig, hidden: Vec<String>) -> Result<()> {
    let registry = Arc::new(served_tools(config)?);
    let adapter = McpToolAdapter::with_hidden(registry, hidden);
    let server = McpServer::new(adapter, "carelink");
    server.serve_stdio().await
}

async fn cmd_doctors(
    config: &CarelinkConfig,
    state: Option<String>,
    city: Option<String>,
) -> Result<()> {
    let output = doctors_tool(config)?
        .execute(serde_json::json!({
            "state": state.unwrap_or_default(),
            "city": city.unwrap_or_default(),
        }))
        .await?;
    println!("{}", output);
    Ok(())
}

async fn cmd_tools(config: &CarelinkConfig, server: &str) -> Result<()> {
    let server_config = config.mcp_server(server).ok_or_else(|| {
        anyhow!(
            "Unknown MCP server '{}'. Configured servers: {}",
            server,
            config
                .mcp
                .servers
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;

    let client = McpClient::connect(server_config).await?;
    let tools = client.discover_tools().await;
    client.shutdown().await;

    for tool in tools? {
        println!("{}", tool.name());
        if !tool.description().is_empty() {
            println!("    {}", tool.description());
        }
    }
    Ok(())
}
