//! Media-room glue: access token, connection, track subscription, and the
//! reliable data channel behind the pipeline's publisher seam.

use crate::pipeline::DataPublisher;
use crate::stt::RECOGNIZER_SAMPLE_RATE;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use livekit::prelude::*;
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use livekit_api::access_token::{AccessToken, VideoGrants};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

pub const AGENT_IDENTITY: &str = "agent_transcriber";
pub const AGENT_DISPLAY_NAME: &str = "Uritomo Transcriber";

/// Mint the worker's own room token. There is no agents runtime handing out
/// job credentials here; the worker signs in with the server API key pair.
pub fn mint_room_token(api_key: &str, api_secret: &str, room_name: &str) -> Result<String> {
    let token = AccessToken::with_api_key(api_key, api_secret)
        .with_identity(AGENT_IDENTITY)
        .with_name(AGENT_DISPLAY_NAME)
        .with_grants(VideoGrants {
            room_join: true,
            room: room_name.to_string(),
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
            ..Default::default()
        })
        .to_jwt()
        .context("failed to sign room access token")?;

    Ok(token)
}

pub async fn connect_room(
    url: &str,
    token: &str,
) -> Result<(Room, UnboundedReceiver<RoomEvent>)> {
    let (room, events) = Room::connect(
        url,
        token,
        RoomOptions {
            auto_subscribe: true,
            ..Default::default()
        },
    )
    .await
    .with_context(|| format!("failed to connect to room at {url}"))?;

    Ok((room, events))
}

/// Decoded mono PCM frames at the recognizer's sample rate; the SDK handles
/// decode and resampling.
pub fn track_frame_stream(
    track: &RemoteAudioTrack,
) -> impl Stream<Item = Vec<i16>> + Unpin + Send {
    let native = NativeAudioStream::new(track.rtc_track(), RECOGNIZER_SAMPLE_RATE as i32, 1);
    Box::pin(native.map(|frame| frame.data.to_vec()))
}

/// One-shot startup sweep over participants already in the room: subscribe
/// every audio publication that is not subscribed yet, and return the tracks
/// that are already delivering frames so pipelines can start right away.
pub fn subscribe_existing_audio(room: &Room) -> Vec<(RemoteAudioTrack, String)> {
    let participants = room.remote_participants();
    info!(">>> participants already present: {}", participants.len());

    let mut ready = Vec::new();
    for participant in participants.values() {
        let identity = participant.identity().0;

        for publication in participant.track_publications().values() {
            if publication.kind() != TrackKind::Audio {
                continue;
            }

            if !publication.is_subscribed() {
                info!(">>> subscribing to unsubscribed audio of {identity}");
                publication.set_subscribed(true);
                // Its pipeline starts once the TrackSubscribed event lands.
                continue;
            }

            match publication.track() {
                Some(RemoteTrack::Audio(track)) => ready.push((track, identity.clone())),
                _ => warn!(
                    ">>> audio of {identity} is subscribed but its track is not \
available yet, waiting for the TrackSubscribed event"
                ),
            }
        }
    }

    ready
}

/// The room's reliable data channel as a [`DataPublisher`].
pub struct RoomDataPublisher {
    room: Arc<Room>,
}

impl RoomDataPublisher {
    pub fn new(room: Arc<Room>) -> Self {
        Self { room }
    }
}

#[async_trait]
impl DataPublisher for RoomDataPublisher {
    async fn publish_reliable(&self, payload: Vec<u8>) -> Result<()> {
        self.room
            .local_participant()
            .publish_data(DataPacket {
                payload,
                reliable: true,
                ..Default::default()
            })
            .await
            .context("reliable data publish failed")
    }
}
