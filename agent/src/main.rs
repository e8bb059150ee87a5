//! Transcriber agent worker.
//!
//! Joins a LiveKit room, pipes every subscribed audio track through a
//! streaming recognizer, and relays finalized transcripts plus translations
//! to the meeting backend, with a data-channel fallback. Stays up for the
//! lifetime of the job; a dead backend only degrades it to local-only mode.

use anyhow::{Context, Result};
use clap::Parser;
use livekit::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod messages;
mod pipeline;
mod relay;
mod room;
mod stt;
mod translate;

use config::AgentConfig;
use messages::OutboundMessage;
use pipeline::DataPublisher;
use relay::BackendRelay;
use stt::RecognizerBuilder;
use translate::Translator;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Room to join; falls back to LIVEKIT_ROOM, then "my-room".
    room: Option<String>,

    #[arg(short = 'l', long = "log", default_value = "info")]
    log_level: String,
}

struct TrackDeps {
    relay: Arc<BackendRelay>,
    translator: Arc<Translator>,
    publisher: Arc<dyn DataPublisher>,
    stt_api_key: Option<String>,
    source_lang: String,
}

fn spawn_track_pipeline(track: RemoteAudioTrack, identity: String, deps: &TrackDeps) {
    info!(">>> 🎯 audio track from {identity}, starting pipeline");

    let frames = room::track_frame_stream(&track);
    let relay = deps.relay.clone();
    let translator = deps.translator.clone();
    let publisher = deps.publisher.clone();
    let stt_api_key = deps.stt_api_key.clone();
    let source_lang = deps.source_lang.clone();

    tokio::spawn(async move {
        let mut builder = RecognizerBuilder::new().language(source_lang);
        if let Some(key) = stt_api_key {
            builder = builder.api_key(key);
        }

        let session = match builder.connect().await {
            Ok(session) => session,
            Err(e) => {
                warn!("recognizer connect failed for {identity}: {e}");
                return;
            }
        };

        pipeline::run_pipeline(identity, frames, session, relay, translator, publisher).await;
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = AgentConfig::from_env()?;
    let room_name = args
        .room
        .or_else(|| std::env::var("LIVEKIT_ROOM").ok())
        .unwrap_or_else(|| config::DEFAULT_ROOM.to_string());

    let token = room::mint_room_token(&config.api_key, &config.api_secret, &room_name)?;
    let (lk_room, mut events) = room::connect_room(&config.livekit_url, &token).await?;
    let lk_room = Arc::new(lk_room);
    info!(">>> ✅ connected to room '{}'", lk_room.name());

    let session_id = config.session_id(&lk_room.name()).to_string();
    let backend_token = auth::mint_backend_token(&config.backend_secret, 1)
        .context("failed to mint backend token")?;
    let backend_url = relay::build_backend_url(&config.backend_ws_url, &session_id, &backend_token)?;

    info!(">>> 🔌 connecting to backend {}", relay::redact_url(&backend_url));
    let backend = match BackendRelay::connect(&backend_url).await {
        Ok(backend) => {
            backend.send(&OutboundMessage::connect_notice()).await;
            info!(">>> ✅ backend connected");
            backend
        }
        Err(e) => {
            warn!(">>> ⚠️ backend connect error: {e:#}");
            warn!(">>> continuing in local-only mode");
            BackendRelay::offline()
        }
    };

    let deps = TrackDeps {
        relay: Arc::new(backend),
        translator: Arc::new(Translator::new(
            config.translation_api_key.clone(),
            &config.source_lang,
            &config.target_lang,
        )),
        publisher: Arc::new(room::RoomDataPublisher::new(lk_room.clone())),
        stt_api_key: config.translation_api_key.clone(),
        source_lang: config.source_lang.clone(),
    };

    // Audio tracks already in the room when we join.
    for (track, identity) in room::subscribe_existing_audio(&lk_room) {
        spawn_track_pipeline(track, identity, &deps);
    }

    info!(">>> 🎤 waiting for audio...");
    while let Some(event) = events.recv().await {
        match event {
            RoomEvent::TrackSubscribed {
                track,
                publication: _,
                participant,
            } => {
                if let RemoteTrack::Audio(track) = track {
                    spawn_track_pipeline(track, participant.identity().0, &deps);
                }
            }
            RoomEvent::TrackPublished {
                publication,
                participant,
            } => {
                info!(">>> track published by {}", participant.identity().0);
                if publication.kind() == TrackKind::Audio {
                    publication.set_subscribed(true);
                }
            }
            RoomEvent::ParticipantConnected(participant) => {
                info!(">>> participant connected: {}", participant.identity().0);
            }
            _ => {}
        }
    }

    // The job owns the process lifetime; never exit on our own even if the
    // event stream drains.
    std::future::pending::<()>().await;
    Ok(())
}
