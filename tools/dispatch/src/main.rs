use anyhow::{Context, Result};
use clap::Parser;
use livekit_api::services::agent_dispatch::AgentDispatchClient;
use livekit_protocol::CreateAgentDispatchRequest;
use std::env;

/// Must match the agent name the worker registers under.
const AGENT_NAME: &str = "Uritomo-Transcriber";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Room to invite the agent into
    #[arg(default_value = "my-room")]
    room: String,
}

fn env_nonempty(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .with_context(|| format!("{key} is not set"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let url = env_nonempty("LIVEKIT_URL")?;
    let api_key = env_nonempty("LIVEKIT_API_KEY")?;
    let api_secret = env_nonempty("LIVEKIT_API_SECRET")?;

    println!("🚀 inviting agent '{AGENT_NAME}' into room '{}'...", cli.room);

    let client = AgentDispatchClient::with_api_key(&url, &api_key, &api_secret);
    match client
        .create_dispatch(CreateAgentDispatchRequest {
            agent_name: AGENT_NAME.to_string(),
            room: cli.room.clone(),
            ..Default::default()
        })
        .await
    {
        Ok(dispatch) => {
            println!("✅ dispatch created: {}", dispatch.id);
        }
        Err(e) => {
            eprintln!("❌ dispatch failed: {e}");
            std::process::exit(1);
        }
    }

    // The client releases its connection on drop.
    Ok(())
}
