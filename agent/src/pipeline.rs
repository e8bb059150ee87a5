//! Per-track forwarding pipeline.
//!
//! One pipeline per subscribed audio track: a forward loop pushes every
//! decoded frame into the recognizer, a consume loop turns finalized
//! utterances into backend frames and a data-channel fallback publish.
//! Every external call is guarded on its own so one failing hop never
//! stops the ones after it, and nothing here retries.

use crate::messages::OutboundMessage;
use crate::relay::BackendRelay;
use crate::stt::RecognizerSession;
use crate::translate::Translator;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

/// Seam for the room's reliable data channel.
#[async_trait]
pub trait DataPublisher: Send + Sync {
    async fn publish_reliable(&self, payload: Vec<u8>) -> anyhow::Result<()>;
}

/// Run both loops until the audio stream ends and the recognizer session
/// drains. No cancellation is wired in; track teardown ends the stream.
pub async fn run_pipeline(
    participant: String,
    mut frames: impl Stream<Item = Vec<i16>> + Unpin + Send,
    mut session: RecognizerSession,
    relay: Arc<BackendRelay>,
    translator: Arc<Translator>,
    publisher: Arc<dyn DataPublisher>,
) {
    let sender = session.sender();

    let forward = async {
        while let Some(pcm) = frames.next().await {
            if sender.push_frame(pcm).await.is_err() {
                warn!("recognizer session gone, dropping remaining audio for {participant}");
                return;
            }
        }

        if let Err(e) = sender.end_input().await {
            warn!("could not signal end of input for {participant}: {e}");
        }
    };

    let consume = async {
        while let Some(event) = session.recv().await {
            if !event.is_final {
                continue;
            }

            let Some(text) = event.top_text() else {
                continue;
            };

            handle_final_transcript(&participant, text, &relay, &translator, &publisher).await;
        }
    };

    tokio::join!(forward, consume);
    info!("pipeline finished for {participant}");
}

async fn handle_final_transcript(
    participant: &str,
    text: &str,
    relay: &BackendRelay,
    translator: &Translator,
    publisher: &Arc<dyn DataPublisher>,
) {
    info!("📝 {participant}: {text}");

    relay
        .send(&OutboundMessage::transcript_chat(text, translator.source_lang()))
        .await;

    let translation = translator.translate(text).await;
    info!("📝 Trans: {}", translation.translated_text);

    let msg = OutboundMessage::translation(translation);
    relay.send(&msg).await;

    // Fallback transport: the same payload over the room's reliable data
    // channel, so frontends still receive it when the backend socket is down.
    match msg.to_json() {
        Ok(payload) => {
            if let Err(e) = publisher.publish_reliable(payload.into_bytes()).await {
                warn!("data channel publish failed: {e:#}");
            }
        }
        Err(e) => warn!("failed to serialize data channel payload: {e}"),
    }
}
