//! Environment-sourced agent settings.

use anyhow::{Context, Result};
use std::env;

pub const DEFAULT_ROOM: &str = "my-room";
pub const DEFAULT_BACKEND_WS_URL: &str = "ws://localhost:8000/meeting";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LiveKit server URL (`LIVEKIT_URL`).
    pub livekit_url: String,
    pub api_key: String,
    pub api_secret: String,

    /// Base URL of the meeting backend websocket (`BACKEND_WS_URL`).
    pub backend_ws_url: String,
    /// Overrides the room-name-derived session id (`TARGET_SESSION_ID`).
    pub session_id_override: Option<String>,
    /// Shared secret for the backend JWT (`BACKEND_AUTH_SECRET`).
    pub backend_secret: String,

    /// Translation API key (`OPENAI_API_KEY`); absent means placeholder mode.
    pub translation_api_key: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
}

fn env_nonempty(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            livekit_url: env_nonempty("LIVEKIT_URL")
                .context("LIVEKIT_URL is not set")?,
            api_key: env_nonempty("LIVEKIT_API_KEY")
                .context("LIVEKIT_API_KEY is not set")?,
            api_secret: env_nonempty("LIVEKIT_API_SECRET")
                .context("LIVEKIT_API_SECRET is not set")?,
            backend_ws_url: env_nonempty("BACKEND_WS_URL")
                .unwrap_or_else(|| DEFAULT_BACKEND_WS_URL.to_string()),
            session_id_override: env_nonempty("TARGET_SESSION_ID"),
            backend_secret: env_nonempty("BACKEND_AUTH_SECRET")
                .unwrap_or_else(|| crate::auth::DEFAULT_BACKEND_SECRET.to_string()),
            translation_api_key: env_nonempty("OPENAI_API_KEY"),
            source_lang: env_nonempty("AGENT_SOURCE_LANG").unwrap_or_else(|| "ja".to_string()),
            target_lang: env_nonempty("AGENT_TARGET_LANG").unwrap_or_else(|| "en".to_string()),
        })
    }

    /// The backend session id: explicit override wins, else the room name.
    pub fn session_id<'a>(&'a self, room_name: &'a str) -> &'a str {
        self.session_id_override.as_deref().unwrap_or(room_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_config(session_id_override: Option<&str>) -> AgentConfig {
        AgentConfig {
            livekit_url: "ws://localhost:7880".to_string(),
            api_key: "devkey".to_string(),
            api_secret: "devsecret".to_string(),
            backend_ws_url: DEFAULT_BACKEND_WS_URL.to_string(),
            session_id_override: session_id_override.map(str::to_string),
            backend_secret: crate::auth::DEFAULT_BACKEND_SECRET.to_string(),
            translation_api_key: None,
            source_lang: "ja".to_string(),
            target_lang: "en".to_string(),
        }
    }

    #[test]
    fn session_id_defaults_to_room_name() {
        let config = dummy_config(None);
        assert_eq!(config.session_id("room-42"), "room-42");
    }

    #[test]
    fn session_id_override_wins() {
        let config = dummy_config(Some("ls_abc123"));
        assert_eq!(config.session_id("room-42"), "ls_abc123");
    }
}
